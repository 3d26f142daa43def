use std::path::PathBuf;

use crate::strng;
use crate::strng::Strng;

const NODE_NAME: &str = "NODE_NAME";

/// How the process was launched. `Restart` means the packet-path tables may
/// hold entries from a previous incarnation; the first address batch then
/// triggers a reconciliation pass that garbage-collects anything without a
/// live resource behind it.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum StartupMode {
	#[default]
	Normal,
	Restart,
}

#[derive(Clone, Debug)]
pub struct Config {
	/// Address of the delta discovery server, e.g. `http://istiod:15010`.
	pub xds_address: String,
	/// Local node identity, echoed in every discovery request.
	pub node_name: Strng,
	/// Where the hash-name snapshot is persisted.
	pub snapshot_path: PathBuf,
	pub startup_mode: StartupMode,
}

impl Config {
	pub fn new(xds_address: String, snapshot_path: PathBuf, startup_mode: StartupMode) -> Config {
		Config {
			xds_address,
			node_name: strng::new(std::env::var(NODE_NAME).unwrap_or_default()),
			snapshot_path,
			startup_mode,
		}
	}
}
