//! Wire types for the envoy delta discovery protocol, hand-maintained and
//! trimmed to the fields this controller reads and writes. Unknown fields
//! sent by the server are skipped on decode.

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Node {
	#[prost(string, tag = "1")]
	pub id: ::prost::alloc::string::String,
}

/// `google.rpc.Status`, carried in the error-detail channel of a request.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Status {
	#[prost(int32, tag = "1")]
	pub code: i32,
	#[prost(string, tag = "2")]
	pub message: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DeltaDiscoveryRequest {
	#[prost(message, optional, tag = "1")]
	pub node: ::core::option::Option<Node>,
	#[prost(string, tag = "2")]
	pub type_url: ::prost::alloc::string::String,
	#[prost(string, repeated, tag = "3")]
	pub resource_names_subscribe: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
	#[prost(string, repeated, tag = "4")]
	pub resource_names_unsubscribe: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
	#[prost(map = "string, string", tag = "5")]
	pub initial_resource_versions:
		::std::collections::HashMap<::prost::alloc::string::String, ::prost::alloc::string::String>,
	#[prost(string, tag = "6")]
	pub response_nonce: ::prost::alloc::string::String,
	#[prost(message, optional, tag = "7")]
	pub error_detail: ::core::option::Option<Status>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Resource {
	#[prost(string, tag = "1")]
	pub version: ::prost::alloc::string::String,
	#[prost(message, optional, tag = "2")]
	pub resource: ::core::option::Option<::prost_types::Any>,
	#[prost(string, tag = "3")]
	pub name: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DeltaDiscoveryResponse {
	#[prost(string, tag = "1")]
	pub system_version_info: ::prost::alloc::string::String,
	#[prost(message, repeated, tag = "2")]
	pub resources: ::prost::alloc::vec::Vec<Resource>,
	#[prost(string, tag = "4")]
	pub type_url: ::prost::alloc::string::String,
	#[prost(string, tag = "5")]
	pub nonce: ::prost::alloc::string::String,
	#[prost(string, repeated, tag = "6")]
	pub removed_resources: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
}

/// Generated client implementations.
pub mod aggregated_discovery_service_client {
	#![allow(unused_variables, dead_code, missing_docs, clippy::wildcard_imports)]
	use tonic::codegen::http::Uri;
	use tonic::codegen::*;

	#[derive(Debug, Clone)]
	pub struct AggregatedDiscoveryServiceClient<T> {
		inner: tonic::client::Grpc<T>,
	}

	impl AggregatedDiscoveryServiceClient<tonic::transport::Channel> {
		/// Attempt to create a new client by connecting to a given endpoint.
		pub async fn connect<D>(dst: D) -> Result<Self, tonic::transport::Error>
		where
			D: TryInto<tonic::transport::Endpoint>,
			D::Error: Into<StdError>,
		{
			let conn = tonic::transport::Endpoint::new(dst)?.connect().await?;
			Ok(Self::new(conn))
		}
	}

	impl<T> AggregatedDiscoveryServiceClient<T>
	where
		T: tonic::client::GrpcService<tonic::body::Body>,
		T::Error: Into<StdError>,
		T::ResponseBody: Body<Data = Bytes> + std::marker::Send + 'static,
		<T::ResponseBody as Body>::Error: Into<StdError> + std::marker::Send,
	{
		pub fn new(inner: T) -> Self {
			let inner = tonic::client::Grpc::new(inner);
			Self { inner }
		}

		pub fn with_origin(inner: T, origin: Uri) -> Self {
			let inner = tonic::client::Grpc::with_origin(inner, origin);
			Self { inner }
		}

		/// Limits the maximum size of a decoded message.
		pub fn max_decoding_message_size(mut self, limit: usize) -> Self {
			self.inner = self.inner.max_decoding_message_size(limit);
			self
		}

		/// Limits the maximum size of an encoded message.
		pub fn max_encoding_message_size(mut self, limit: usize) -> Self {
			self.inner = self.inner.max_encoding_message_size(limit);
			self
		}

		pub async fn delta_aggregated_resources(
			&mut self,
			request: impl tonic::IntoStreamingRequest<Message = super::DeltaDiscoveryRequest>,
		) -> std::result::Result<
			tonic::Response<tonic::codec::Streaming<super::DeltaDiscoveryResponse>>,
			tonic::Status,
		> {
			self.inner.ready().await.map_err(|e| {
				tonic::Status::unknown(format!("Service was not ready: {}", e.into()))
			})?;
			let codec = tonic::codec::ProstCodec::default();
			let path = http::uri::PathAndQuery::from_static(
				"/envoy.service.discovery.v3.AggregatedDiscoveryService/DeltaAggregatedResources",
			);
			let mut req = request.into_streaming_request();
			req.extensions_mut().insert(GrpcMethod::new(
				"envoy.service.discovery.v3.AggregatedDiscoveryService",
				"DeltaAggregatedResources",
			));
			self.inner.streaming(req, path, codec).await
		}
	}
}
