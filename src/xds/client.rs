use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{Instrument, debug, info, info_span, warn};

use super::Error;
use super::discovery::DeltaDiscoveryRequest;
use super::discovery::aggregated_discovery_service_client::AggregatedDiscoveryServiceClient;
use super::{ADDRESS_TYPE, AUTHORIZATION_TYPE};
use crate::processor::Processor;

const INITIAL_BACKOFF: Duration = Duration::from_millis(10);
const MAX_BACKOFF: Duration = Duration::from_secs(15);

/// AdsClient drives the delta discovery stream.
///
/// It owns the processor: each response is applied synchronously, in order,
/// and the ack the processor builds goes back on the same stream. There is
/// no local retry queue — after a reconnect the server re-sends state, which
/// is what converges the tables.
pub struct AdsClient {
	address: String,
	processor: Processor,
	connection_id: u32,
}

impl AdsClient {
	pub fn new(address: String, processor: Processor) -> AdsClient {
		AdsClient {
			address,
			processor,
			connection_id: 0,
		}
	}

	pub async fn run(mut self) -> Result<(), Error> {
		let mut backoff = INITIAL_BACKOFF;
		loop {
			self.connection_id += 1;
			let id = self.connection_id;
			backoff = self
				.run_loop(backoff)
				.instrument(info_span!("xds", id))
				.await;
		}
	}

	async fn run_loop(&mut self, backoff: Duration) -> Duration {
		match self.run_internal().await {
			Err(e @ Error::Connection(_, _)) | Err(e @ Error::Transport(_)) => {
				let backoff = std::cmp::min(MAX_BACKOFF, backoff * 2);
				warn!(
					"xds client connection error: {}, retrying in {:?}",
					e, backoff
				);
				tokio::time::sleep(backoff).await;
				backoff
			},
			Err(ref e @ Error::GrpcStatus(ref status)) => {
				let backoff = if status.code() == tonic::Code::Unknown
					|| status.code() == tonic::Code::Cancelled
					|| status.code() == tonic::Code::DeadlineExceeded
					|| (status.code() == tonic::Code::Unavailable
						&& status.message().contains("transport is closing"))
				{
					// The server went away in an orderly fashion; reconnect
					// eagerly.
					debug!("xds client terminated: {}, retrying in {:?}", e, backoff);
					INITIAL_BACKOFF
				} else {
					warn!("xds client error: {}, retrying in {:?}", e, backoff);
					std::cmp::min(MAX_BACKOFF, backoff * 2)
				};
				tokio::time::sleep(backoff).await;
				backoff
			},
			Err(e) => {
				warn!("xds client error: {:?}, retrying", e);
				INITIAL_BACKOFF
			},
			Ok(_) => {
				warn!("xds client stream complete");
				INITIAL_BACKOFF
			},
		}
	}

	async fn run_internal(&mut self) -> Result<(), Error> {
		let (request_tx, mut request_rx) = mpsc::channel::<DeltaDiscoveryRequest>(100);
		let initial_requests: Vec<DeltaDiscoveryRequest> = [ADDRESS_TYPE, AUTHORIZATION_TYPE]
			.iter()
			.map(|type_url| self.processor.initial_request(type_url))
			.collect();

		let outbound = async_stream::stream! {
			for initial in initial_requests {
				debug!(type_url = initial.type_url, "sending initial request");
				yield initial;
			}
			while let Some(message) = request_rx.recv().await {
				debug!(type_url = message.type_url, "sending request");
				yield message;
			}
			warn!("outbound stream complete");
		};

		let addr = self.address.clone();
		let connection = AggregatedDiscoveryServiceClient::connect(self.address.clone())
			.await?
			.max_decoding_message_size(200 * 1024 * 1024)
			.delta_aggregated_resources(tonic::Request::new(outbound))
			.await;
		let mut response_stream = connection
			.map_err(|src| Error::Connection(addr, src))?
			.into_inner();
		info!("stream established");

		loop {
			let Some(response) = response_stream.message().await? else {
				// The stream ended without a gRPC error.
				return Ok(());
			};
			info!(
				type_url = response.type_url,
				size = response.resources.len(),
				removes = response.removed_resources.len(),
				"received response"
			);
			let ack = self.processor.process_delta(response);
			request_tx
				.send(ack)
				.await
				.map_err(|e| Error::RequestFailure(Box::new(e)))?;
		}
	}
}
