use std::error::Error as StdErr;
use std::fmt;
use std::fmt::Formatter;

use tokio::sync::mpsc;

pub mod authorization;
mod client;
pub mod discovery;
pub mod workload;

pub use client::AdsClient;

/// Type url of the combined workload/service address stream.
pub const ADDRESS_TYPE: &str = "type.googleapis.com/istio.workload.Address";
/// Type url of the authorization policy stream.
pub const AUTHORIZATION_TYPE: &str = "type.googleapis.com/istio.security.Authorization";

struct DisplayStatus<'a>(&'a tonic::Status);

impl fmt::Display for DisplayStatus<'_> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		let s = &self.0;
		write!(f, "status: {:?}, message: {:?}", s.code(), s.message())?;
		if !s.details().is_empty() {
			if let Ok(details) = std::str::from_utf8(s.details()) {
				write!(f, ", details: {details}")?;
			}
		}
		if let Some(src) = s.source().and_then(|s| s.source()) {
			write!(f, ", source: {src}")?;
		}
		Ok(())
	}
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
	#[error("gRPC error {}", DisplayStatus(.0))]
	GrpcStatus(#[from] tonic::Status),
	#[error("gRPC connection error connecting to {}: {}", .0, DisplayStatus(.1))]
	Connection(String, #[source] tonic::Status),
	/// Attempted to send on a MPSC channel which has been canceled
	#[error(transparent)]
	RequestFailure(#[from] Box<mpsc::error::SendError<discovery::DeltaDiscoveryRequest>>),
	#[error("transport error: {0}")]
	Transport(#[from] tonic::transport::Error),
}
