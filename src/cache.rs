use std::collections::{HashMap, HashSet};
use std::net::IpAddr;

use serde::Serialize;
use thiserror::Error;

use crate::strng;
use crate::strng::Strng;
use crate::xds::workload as xds;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ResourceError {
	#[error("failed to parse address, had {0} bytes")]
	ByteAddressParse(usize),
	#[error("unknown enum value: {0}")]
	EnumParse(i32),
	#[error("nonempty waypoint is missing an address")]
	MissingWaypointAddress,
}

pub fn byte_to_ip(b: &[u8]) -> Result<IpAddr, ResourceError> {
	match b.len() {
		4 => {
			let v: [u8; 4] = b.try_into().expect("size already proven");
			Ok(IpAddr::from(v))
		},
		16 => {
			let v: [u8; 16] = b.try_into().expect("size already proven");
			Ok(IpAddr::from(v))
		},
		n => Err(ResourceError::ByteAddressParse(n)),
	}
}

/// A proxy hop traffic must be routed through before reaching its target.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
pub struct Waypoint {
	pub address: IpAddr,
	pub port: u16,
}

#[derive(Default, Debug, Clone, Copy, Eq, PartialEq, Serialize)]
pub enum NetworkMode {
	#[default]
	Standard,
	/// The workload shares the node's network namespace; its addresses are
	/// the node's and must not be claimed as frontends.
	HostNetwork,
}

/// The latest accepted state of one workload.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct Workload {
	pub uid: Strng,
	pub name: Strng,
	pub namespace: Strng,
	pub addresses: Vec<IpAddr>,
	/// `ns/hostname` resource names of the services this workload backs.
	pub services: Vec<Strng>,
	pub waypoint: Option<Waypoint>,
	pub network_mode: NetworkMode,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
pub struct ServicePort {
	pub service_port: u16,
	pub target_port: u16,
}

/// The latest accepted state of one service.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct Service {
	/// `ns/hostname`, the key the discovery stream uses for services.
	pub resource_name: Strng,
	pub namespace: Strng,
	pub hostname: Strng,
	pub addresses: Vec<IpAddr>,
	pub ports: Vec<ServicePort>,
	pub waypoint: Option<Waypoint>,
}

impl TryFrom<&xds::GatewayAddress> for Waypoint {
	type Error = ResourceError;

	fn try_from(value: &xds::GatewayAddress) -> Result<Waypoint, ResourceError> {
		if value.address.is_empty() {
			return Err(ResourceError::MissingWaypointAddress);
		}
		Ok(Waypoint {
			address: byte_to_ip(&value.address)?,
			port: value.port as u16,
		})
	}
}

impl TryFrom<&xds::Workload> for Workload {
	type Error = ResourceError;

	fn try_from(resource: &xds::Workload) -> Result<Workload, ResourceError> {
		let waypoint = resource.waypoint.as_ref().map(Waypoint::try_from).transpose()?;
		let addresses = resource
			.addresses
			.iter()
			.map(|a| byte_to_ip(a))
			.collect::<Result<Vec<_>, _>>()?;
		let network_mode = xds::NetworkMode::try_from(resource.network_mode)
			.map_err(|_| ResourceError::EnumParse(resource.network_mode))?;
		Ok(Workload {
			uid: strng::new(&resource.uid),
			name: strng::new(&resource.name),
			namespace: strng::new(&resource.namespace),
			addresses,
			services: resource.services.iter().map(strng::new).collect(),
			waypoint,
			network_mode: match network_mode {
				xds::NetworkMode::Standard => NetworkMode::Standard,
				xds::NetworkMode::HostNetwork => NetworkMode::HostNetwork,
			},
		})
	}
}

impl TryFrom<&xds::Service> for Service {
	type Error = ResourceError;

	fn try_from(resource: &xds::Service) -> Result<Service, ResourceError> {
		let waypoint = resource.waypoint.as_ref().map(Waypoint::try_from).transpose()?;
		let addresses = resource
			.addresses
			.iter()
			.map(|a| byte_to_ip(a))
			.collect::<Result<Vec<_>, _>>()?;
		Ok(Service {
			resource_name: strng::format!("{}/{}", resource.namespace, resource.hostname),
			namespace: strng::new(&resource.namespace),
			hostname: strng::new(&resource.hostname),
			addresses,
			ports: resource
				.ports
				.iter()
				.map(|p| ServicePort {
					service_port: p.service_port as u16,
					target_port: p.target_port as u16,
				})
				.collect(),
			waypoint,
		})
	}
}

/// The change in service membership produced by a workload upsert.
#[derive(Debug, Default, Eq, PartialEq)]
pub struct ServiceDiff {
	pub removed: Vec<Strng>,
	pub added: Vec<Strng>,
}

/// In-memory mirror of the last accepted workload and service records, plus
/// the slot index that locates the exact endpoint to purge when a workload
/// leaves a service.
#[derive(Debug, Default)]
pub struct ResourceCache {
	workloads: HashMap<Strng, Workload>,
	services: HashMap<Strng, Service>,
	/// workload id -> service id -> backend index
	by_workload: HashMap<u32, HashMap<u32, u32>>,
	/// (service id, backend index) -> workload id
	by_slot: HashMap<(u32, u32), u32>,
}

impl ResourceCache {
	pub fn new() -> ResourceCache {
		ResourceCache::default()
	}

	/// Stores `w` and reports how its service membership changed relative to
	/// the previous record. A first-seen workload reports every service as
	/// added. Both sides come back sorted so callers touch slots in a stable
	/// order.
	pub fn add_or_update_workload(&mut self, w: Workload) -> ServiceDiff {
		let previous: HashSet<Strng> = self
			.workloads
			.get(&w.uid)
			.map(|prev| prev.services.iter().cloned().collect())
			.unwrap_or_default();
		let current: HashSet<Strng> = w.services.iter().cloned().collect();
		let mut removed: Vec<Strng> = previous.difference(&current).cloned().collect();
		let mut added: Vec<Strng> = current.difference(&previous).cloned().collect();
		removed.sort();
		added.sort();
		self.workloads.insert(w.uid.clone(), w);
		ServiceDiff { removed, added }
	}

	pub fn workload(&self, uid: &str) -> Option<&Workload> {
		self.workloads.get(uid)
	}

	pub fn delete_workload(&mut self, uid: &str) -> Option<Workload> {
		self.workloads.remove(uid)
	}

	pub fn add_or_update_service(&mut self, s: Service) {
		self.services.insert(s.resource_name.clone(), s);
	}

	pub fn service(&self, name: &str) -> Option<&Service> {
		self.services.get(name)
	}

	pub fn delete_service(&mut self, name: &str) -> Option<Service> {
		self.services.remove(name)
	}

	/// Points `(service_id, backend_index)` at `workload_id`. If the workload
	/// already held a different slot in the same service, that slot mapping
	/// is dropped so the index never aliases.
	pub fn update_relationship(&mut self, workload_id: u32, service_id: u32, backend_index: u32) {
		let slots = self.by_workload.entry(workload_id).or_default();
		if let Some(old) = slots.insert(service_id, backend_index) {
			if old != backend_index && self.by_slot.get(&(service_id, old)) == Some(&workload_id) {
				self.by_slot.remove(&(service_id, old));
			}
		}
		self.by_slot.insert((service_id, backend_index), workload_id);
	}

	/// Clears the slot and the owning workload's entry, returning the
	/// workload id that held it. Missing entries are ignored: removals can
	/// trail a service teardown that already dropped them.
	pub fn delete_relationship(&mut self, service_id: u32, backend_index: u32) -> Option<u32> {
		let workload_id = self.by_slot.remove(&(service_id, backend_index))?;
		if let Some(slots) = self.by_workload.get_mut(&workload_id) {
			if slots.get(&service_id) == Some(&backend_index) {
				slots.remove(&service_id);
			}
			if slots.is_empty() {
				self.by_workload.remove(&workload_id);
			}
		}
		Some(workload_id)
	}

	/// The backend index binding this workload to this service, if any.
	pub fn relationship(&self, workload_id: u32, service_id: u32) -> Option<u32> {
		self.by_workload.get(&workload_id)?.get(&service_id).copied()
	}

	/// The workload occupying this endpoint slot, if any.
	pub fn slot(&self, service_id: u32, backend_index: u32) -> Option<u32> {
		self.by_slot.get(&(service_id, backend_index)).copied()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn workload(uid: &str, services: &[&str]) -> Workload {
		Workload {
			uid: strng::new(uid),
			name: strng::literal!("w"),
			namespace: strng::literal!("ns"),
			addresses: vec!["10.0.0.1".parse().unwrap()],
			services: services.iter().map(strng::new).collect(),
			waypoint: None,
			network_mode: NetworkMode::Standard,
		}
	}

	#[test]
	fn first_seen_workload_adds_everything() {
		let mut cache = ResourceCache::new();
		let diff = cache.add_or_update_workload(workload("u1", &["ns/b", "ns/a"]));
		assert!(diff.removed.is_empty());
		assert_eq!(diff.added, vec!["ns/a", "ns/b"]);
	}

	#[test]
	fn membership_diff_reports_both_sides() {
		let mut cache = ResourceCache::new();
		cache.add_or_update_workload(workload("u1", &["ns/a", "ns/b"]));
		let diff = cache.add_or_update_workload(workload("u1", &["ns/b", "ns/c"]));
		assert_eq!(diff.removed, vec!["ns/a"]);
		assert_eq!(diff.added, vec!["ns/c"]);
	}

	#[test]
	fn unchanged_membership_is_a_noop() {
		let mut cache = ResourceCache::new();
		cache.add_or_update_workload(workload("u1", &["ns/a"]));
		let diff = cache.add_or_update_workload(workload("u1", &["ns/a"]));
		assert_eq!(diff, ServiceDiff::default());
	}

	#[test]
	fn relationship_is_bidirectional() {
		let mut cache = ResourceCache::new();
		cache.update_relationship(10, 20, 1);
		assert_eq!(cache.relationship(10, 20), Some(1));
		assert_eq!(cache.slot(20, 1), Some(10));
		assert_eq!(cache.delete_relationship(20, 1), Some(10));
		assert_eq!(cache.relationship(10, 20), None);
		assert_eq!(cache.slot(20, 1), None);
	}

	#[test]
	fn moving_a_workload_releases_its_old_slot() {
		let mut cache = ResourceCache::new();
		cache.update_relationship(10, 20, 3);
		cache.update_relationship(10, 20, 1);
		assert_eq!(cache.relationship(10, 20), Some(1));
		assert_eq!(cache.slot(20, 3), None);
		assert_eq!(cache.slot(20, 1), Some(10));
	}

	#[test]
	fn tail_move_keeps_the_index_aliased_free() {
		let mut cache = ResourceCache::new();
		// Workload 10 vacates slot 1 and workload 11 moves in from the tail.
		cache.update_relationship(10, 20, 1);
		cache.update_relationship(11, 20, 2);
		cache.delete_relationship(20, 1);
		cache.update_relationship(11, 20, 1);
		assert_eq!(cache.relationship(10, 20), None);
		assert_eq!(cache.relationship(11, 20), Some(1));
		assert_eq!(cache.slot(20, 1), Some(11));
		assert_eq!(cache.slot(20, 2), None);
	}

	#[test]
	fn deleting_a_missing_relationship_is_silent() {
		let mut cache = ResourceCache::new();
		assert_eq!(cache.delete_relationship(1, 1), None);
	}

	#[test]
	fn byte_to_ip_rejects_bad_lengths() {
		assert_eq!(byte_to_ip(&[]), Err(ResourceError::ByteAddressParse(0)));
		assert_eq!(byte_to_ip(&[1, 2, 3]), Err(ResourceError::ByteAddressParse(3)));
	}

	#[test]
	fn byte_to_ip_parses_both_families() {
		assert_eq!(
			byte_to_ip(&[10, 0, 0, 1]).unwrap(),
			"10.0.0.1".parse::<IpAddr>().unwrap()
		);
		let v6: IpAddr = "2001:db8::1".parse().unwrap();
		let octets = match v6 {
			IpAddr::V6(a) => a.octets(),
			_ => unreachable!(),
		};
		assert_eq!(byte_to_ip(&octets).unwrap(), v6);
	}

	#[test]
	fn workload_parse_rejects_unknown_network_mode() {
		let raw = xds::Workload {
			uid: "u1".to_string(),
			addresses: vec![vec![10, 0, 0, 1]],
			network_mode: 42,
			..Default::default()
		};
		assert_eq!(Workload::try_from(&raw), Err(ResourceError::EnumParse(42)));
	}

	#[test]
	fn service_parse_builds_resource_name() {
		let raw = xds::Service {
			name: "svc1".to_string(),
			namespace: "ns".to_string(),
			hostname: "svc1.ns.svc.cluster.local".to_string(),
			addresses: vec![vec![10, 1, 0, 1]],
			ports: vec![xds::Port { service_port: 80, target_port: 8080 }],
			waypoint: None,
		};
		let parsed = Service::try_from(&raw).unwrap();
		assert_eq!(parsed.resource_name, "ns/svc1.ns.svc.cluster.local");
		assert_eq!(parsed.ports[0].service_port, 80);
		assert_eq!(parsed.ports[0].target_port, 8080);
	}
}
