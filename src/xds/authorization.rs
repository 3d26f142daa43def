//! Wire types for authorization policy resources. The engine forwards these
//! to the policy store untouched; only the identifying fields matter here.

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Authorization {
	#[prost(string, tag = "1")]
	pub name: ::prost::alloc::string::String,
	#[prost(string, tag = "2")]
	pub namespace: ::prost::alloc::string::String,
	#[prost(enumeration = "Scope", tag = "3")]
	pub scope: i32,
	#[prost(enumeration = "Action", tag = "4")]
	pub action: i32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum Scope {
	Global = 0,
	Namespace = 1,
	WorkloadSelector = 2,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum Action {
	Allow = 0,
	Deny = 1,
}
