use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{self, EnvFilter};

use meshplane::config::{Config, StartupMode};
use meshplane::processor::Processor;
use meshplane::xds::AdsClient;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
	/// Address of the delta discovery server
	#[arg(long, value_name = "address", default_value = "http://localhost:15010")]
	xds_address: String,

	/// Path of the hash-name snapshot file
	#[arg(long, value_name = "file", default_value = "/mnt/workload_hash_name.yaml")]
	snapshot: std::path::PathBuf,

	/// Reconcile tables left behind by a previous incarnation
	#[arg(long)]
	restart: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
	tracing_subscriber::fmt()
		.with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
		.with_writer(std::io::stderr)
		.with_ansi(false)
		.init();

	let args = Args::parse();
	let mode = if args.restart {
		StartupMode::Restart
	} else {
		StartupMode::Normal
	};
	let config = Config::new(args.xds_address, args.snapshot, mode);
	info!(
		address = config.xds_address,
		mode = ?config.startup_mode,
		"starting dataplane controller"
	);

	let processor = Processor::new(&config);
	AdsClient::new(config.xds_address.clone(), processor).run().await?;
	Ok(())
}
