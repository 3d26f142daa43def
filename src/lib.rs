//! Core of a service-mesh dataplane controller: consumes delta-encoded
//! service-discovery updates and keeps the flat lookup tables the in-kernel
//! packet path reads (frontend, service, endpoint, backend) consistent.

pub mod cache;
pub mod config;
pub mod hashname;
pub mod processor;
pub mod rbac;
pub mod strng;
pub mod tables;
pub mod xds;

pub use strng::Strng;
