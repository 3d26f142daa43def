//! Wire types for the `Address` resource stream. Workloads and services
//! share one type url; each resource carries one or the other.

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Address {
	#[prost(oneof = "address::Type", tags = "1, 2")]
	pub r#type: ::core::option::Option<address::Type>,
}

/// Nested message and enum types in `Address`.
pub mod address {
	#[derive(Clone, PartialEq, ::prost::Oneof)]
	pub enum Type {
		#[prost(message, tag = "1")]
		Workload(super::Workload),
		#[prost(message, tag = "2")]
		Service(super::Service),
	}
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Workload {
	/// Globally unique identifier, a full resource path like
	/// `cluster//v1/Pod/namespace/name`.
	#[prost(string, tag = "1")]
	pub uid: ::prost::alloc::string::String,
	#[prost(string, tag = "2")]
	pub name: ::prost::alloc::string::String,
	#[prost(string, tag = "3")]
	pub namespace: ::prost::alloc::string::String,
	/// Raw network addresses, 4 or 16 bytes each.
	#[prost(bytes = "vec", repeated, tag = "4")]
	pub addresses: ::prost::alloc::vec::Vec<::prost::alloc::vec::Vec<u8>>,
	/// `ns/hostname` resource names of the services this workload backs.
	#[prost(string, repeated, tag = "5")]
	pub services: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
	#[prost(message, optional, tag = "6")]
	pub waypoint: ::core::option::Option<GatewayAddress>,
	#[prost(enumeration = "NetworkMode", tag = "7")]
	pub network_mode: i32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Service {
	#[prost(string, tag = "1")]
	pub name: ::prost::alloc::string::String,
	#[prost(string, tag = "2")]
	pub namespace: ::prost::alloc::string::String,
	#[prost(string, tag = "3")]
	pub hostname: ::prost::alloc::string::String,
	/// Raw virtual addresses, 4 or 16 bytes each.
	#[prost(bytes = "vec", repeated, tag = "4")]
	pub addresses: ::prost::alloc::vec::Vec<::prost::alloc::vec::Vec<u8>>,
	#[prost(message, repeated, tag = "5")]
	pub ports: ::prost::alloc::vec::Vec<Port>,
	#[prost(message, optional, tag = "6")]
	pub waypoint: ::core::option::Option<GatewayAddress>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Port {
	#[prost(uint32, tag = "1")]
	pub service_port: u32,
	#[prost(uint32, tag = "2")]
	pub target_port: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GatewayAddress {
	#[prost(bytes = "vec", tag = "1")]
	pub address: ::prost::alloc::vec::Vec<u8>,
	#[prost(uint32, tag = "2")]
	pub port: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum NetworkMode {
	Standard = 0,
	HostNetwork = 1,
}
