use std::collections::{HashMap, HashSet};

use anyhow::anyhow;
use itertools::Itertools;
use prost::Message;
use tracing::{debug, error, info, warn};

use crate::cache::{NetworkMode, ResourceCache, Service, Workload};
use crate::config::{Config, StartupMode};
use crate::hashname::HashName;
use crate::rbac::PolicyStore;
use crate::strng::Strng;
use crate::tables::{
	BackendKey, BackendValue, EndpointKey, EndpointValue, FrontendKey, FrontendValue, MAX_PORT_NUM,
	MAX_SERVICE_NUM, ServiceKey, ServiceValue, TableStore, ip_bytes, port_be,
};
use crate::xds::authorization::Authorization as XdsAuthorization;
use crate::xds::discovery::{DeltaDiscoveryRequest, DeltaDiscoveryResponse, Node, Resource};
use crate::xds::workload::{Address, address};
use crate::xds::{ADDRESS_TYPE, AUTHORIZATION_TYPE};

/// Port every mesh-managed pod serves health checks on. A service exposing
/// it is itself a management plane and must not be waypoint-redirected.
const STATUS_PORT: u16 = 15021;
/// Port a waypoint accepts tunneled traffic on, regardless of the ports the
/// service advertises.
const WAYPOINT_PORT: u16 = 15019;

/// The table synchronization engine.
///
/// Consumes delta discovery batches one at a time, diffs each record against
/// the resource cache, and performs the ordered table edits that keep the
/// frontend/service/endpoint/backend tables consistent for the packet path.
/// Individual bad resources are logged and skipped; the engine always acks,
/// because the delta protocol re-sends state on reconnect and that is the
/// retry mechanism.
pub struct Processor {
	hash_name: HashName,
	tables: TableStore,
	cache: ResourceCache,
	policies: PolicyStore,
	/// Workloads whose service has not arrived yet, keyed by service name.
	/// Drained once when the service first shows up.
	endpoints_by_service: HashMap<Strng, HashSet<Strng>>,
	node_name: Strng,
	startup_mode: StartupMode,
	reconciled: bool,
}

impl Processor {
	pub fn new(config: &Config) -> Processor {
		Processor {
			hash_name: HashName::load(config.snapshot_path.clone()),
			tables: TableStore::new(),
			cache: ResourceCache::new(),
			policies: PolicyStore::default(),
			endpoints_by_service: HashMap::new(),
			node_name: config.node_name.clone(),
			startup_mode: config.startup_mode,
			reconciled: false,
		}
	}

	fn node(&self) -> Node {
		Node {
			id: format!("meshplane~{}", self.node_name),
		}
	}

	/// The subscription sent for a watched type when a stream opens.
	pub fn initial_request(&self, type_url: &str) -> DeltaDiscoveryRequest {
		DeltaDiscoveryRequest {
			type_url: type_url.to_string(),
			node: Some(self.node()),
			..Default::default()
		}
	}

	/// Applies one delta response and returns the ack for it. The ack always
	/// carries the echoed nonce and never a structured error.
	pub fn process_delta(&mut self, response: DeltaDiscoveryResponse) -> DeltaDiscoveryRequest {
		let ack = DeltaDiscoveryRequest {
			type_url: response.type_url.clone(),
			response_nonce: response.nonce.clone(),
			node: Some(self.node()),
			..Default::default()
		};
		match response.type_url.as_str() {
			ADDRESS_TYPE => self.handle_address_response(response),
			AUTHORIZATION_TYPE => {
				if let Err(err) = self.handle_authorization_response(response) {
					error!(%err, "authorization batch aborted");
				}
			},
			other => error!(type_url = other, "unknown resource type"),
		}
		ack
	}

	fn handle_address_response(&mut self, response: DeltaDiscoveryResponse) {
		for res in &response.resources {
			if let Err(err) = self.handle_address(res) {
				warn!(name = res.name, %err, "skipping address resource");
			}
		}
		self.handle_removed_addresses(&response.removed_resources);
		if self.startup_mode == StartupMode::Restart && !self.reconciled {
			self.reconcile();
		}
		self.reconciled = true;
	}

	fn handle_address(&mut self, res: &Resource) -> anyhow::Result<()> {
		let Some(any) = &res.resource else {
			return Err(anyhow!("resource has no payload"));
		};
		let addr = Address::decode(any.value.as_slice())?;
		match addr.r#type {
			Some(address::Type::Workload(w)) => self.update_workload(Workload::try_from(&w)?),
			Some(address::Type::Service(s)) => self.update_service(Service::try_from(&s)?),
			None => Err(anyhow!("address is neither workload nor service")),
		}
	}

	/// Applies one workload record. A table write failure aborts this
	/// workload; the next delta for the same uid is a full replace and will
	/// re-converge it.
	fn update_workload(&mut self, w: Workload) -> anyhow::Result<()> {
		debug!(uid = %w.uid, "updating workload");
		let workload_id = self.hash_name.resolve(&w.uid);
		let diff = self.cache.add_or_update_workload(w.clone());

		for name in &diff.removed {
			if let Some(buffered) = self.endpoints_by_service.get_mut(name) {
				buffered.remove(&w.uid);
				if buffered.is_empty() {
					self.endpoints_by_service.remove(name);
				}
			}
			let Some(service_id) = self.hash_name.get(name) else {
				continue;
			};
			match self.cache.relationship(workload_id, service_id) {
				Some(backend_index) => self.delete_endpoint(service_id, backend_index)?,
				// The service may have been torn down before this update landed.
				None => debug!(uid = %w.uid, service = %name, "no endpoint slot to release"),
			}
		}

		for name in &diff.added {
			let service_id = self.hash_name.resolve(name);
			match self.tables.service.lookup(&ServiceKey { service_id })? {
				Some(sv) => self.add_endpoint(service_id, sv, workload_id)?,
				None => {
					// The service has not arrived yet; park the membership.
					self
						.endpoints_by_service
						.entry(name.clone())
						.or_default()
						.insert(w.uid.clone());
				},
			}
		}

		let mut backend = BackendValue::default();
		for (i, name) in w.services.iter().enumerate() {
			if i >= MAX_SERVICE_NUM {
				warn!(
					uid = %w.uid,
					dropped = w.services.len() - MAX_SERVICE_NUM,
					"workload exceeds service capacity"
				);
				break;
			}
			backend.services[i] = self.hash_name.resolve(name);
			backend.service_count += 1;
		}
		if let Some(wp) = &w.waypoint {
			backend.waypoint_addr = ip_bytes(wp.address);
			backend.waypoint_port = port_be(wp.port);
		}
		let backend_key = BackendKey { backend_uid: workload_id };
		for addr in &w.addresses {
			backend.ip = ip_bytes(*addr);
			self.tables.backend.update(backend_key, backend)?;
		}

		// Host-network addresses belong to the node, not the workload; they
		// must never be claimed as frontends.
		if w.network_mode != NetworkMode::HostNetwork {
			for addr in &w.addresses {
				self.tables.frontend.update(
					FrontendKey { ip: ip_bytes(*addr) },
					FrontendValue { upstream_id: workload_id },
				)?;
			}
		}
		Ok(())
	}

	/// Applies one service record.
	fn update_service(&mut self, mut s: Service) -> anyhow::Result<()> {
		debug!(name = %s.resource_name, "updating service");
		if let Some(wp) = &s.waypoint {
			// A waypoint that resolves to the service itself, or a service
			// that is a management plane, must not be redirected: the packet
			// path would loop the waypoint's own traffic back into it.
			let self_addressed = s.addresses.first() == Some(&wp.address);
			let exposes_status_port = s.ports.iter().any(|p| p.service_port == STATUS_PORT);
			if self_addressed || exposes_status_port {
				debug!(name = %s.resource_name, "stripping waypoint");
				s.waypoint = None;
			}
		}

		let service_id = self.hash_name.resolve(&s.resource_name);
		for addr in &s.addresses {
			self.tables.frontend.update(
				FrontendKey { ip: ip_bytes(*addr) },
				FrontendValue { upstream_id: service_id },
			)?;
		}

		let mut sv = ServiceValue::default();
		if let Some(wp) = &s.waypoint {
			sv.waypoint_addr = ip_bytes(wp.address);
			sv.waypoint_port = port_be(wp.port);
		}
		if s.ports.len() > MAX_PORT_NUM {
			warn!(
				name = %s.resource_name,
				dropped = s.ports.len() - MAX_PORT_NUM,
				"service exceeds port capacity"
			);
		}
		let is_waypoint = s.resource_name.contains("waypoint");
		for (i, port) in s.ports.iter().take(MAX_PORT_NUM).enumerate() {
			sv.service_port[i] = port_be(port.service_port);
			sv.target_port[i] = if is_waypoint {
				// Waypoints accept everything on their tunnel port.
				port_be(WAYPOINT_PORT)
			} else {
				port_be(port.target_port)
			};
		}

		let service_key = ServiceKey { service_id };
		match self.tables.service.lookup(&service_key)? {
			Some(prev) => {
				// Endpoint churn is driven by workload membership, not by the
				// service definition; an update leaves the slots alone.
				sv.endpoint_count = prev.endpoint_count;
			},
			None => {
				// First appearance: bind every workload that arrived early.
				if let Some(buffered) = self.endpoints_by_service.remove(&s.resource_name) {
					for (i, uid) in buffered.iter().sorted().enumerate() {
						let backend_index = (i + 1) as u32;
						let workload_id = self.hash_name.resolve(uid);
						self.tables.endpoint.update(
							EndpointKey { service_id, backend_index },
							EndpointValue { backend_uid: workload_id },
						)?;
						self.cache.update_relationship(workload_id, service_id, backend_index);
						sv.endpoint_count = backend_index;
					}
				}
			},
		}
		self.tables.service.update(service_key, sv)?;
		self.cache.add_or_update_service(s);
		Ok(())
	}

	/// Binds a workload to the next free slot of a live service.
	fn add_endpoint(
		&mut self,
		service_id: u32,
		mut sv: ServiceValue,
		workload_id: u32,
	) -> anyhow::Result<()> {
		sv.endpoint_count += 1;
		let backend_index = sv.endpoint_count;
		self.tables.endpoint.update(
			EndpointKey { service_id, backend_index },
			EndpointValue { backend_uid: workload_id },
		)?;
		self.tables.service.update(ServiceKey { service_id }, sv)?;
		self.cache.update_relationship(workload_id, service_id, backend_index);
		Ok(())
	}

	/// Removes one endpoint slot, keeping indexes dense: the tail slot moves
	/// into the hole and the count shrinks by one.
	fn delete_endpoint(&mut self, service_id: u32, backend_index: u32) -> anyhow::Result<()> {
		let key = EndpointKey { service_id, backend_index };
		let service_key = ServiceKey { service_id };
		let Some(mut sv) = self.tables.service.lookup(&service_key)? else {
			// No service row means no density to maintain; just clear the slot.
			self.tables.endpoint.delete(&key)?;
			self.cache.delete_relationship(service_id, backend_index);
			return Ok(());
		};
		let last_index = sv.endpoint_count;
		let last_key = EndpointKey { service_id, backend_index: last_index };
		let Some(last) = self.tables.endpoint.lookup(&last_key)? else {
			// The tail slot leaked at some point; delete directly rather than
			// leaking this one too.
			warn!(service_id, backend_index, last_index, "endpoint tail missing, deleting slot directly");
			self.tables.endpoint.delete(&key)?;
			self.cache.delete_relationship(service_id, backend_index);
			return Ok(());
		};
		self.cache.delete_relationship(service_id, backend_index);
		if backend_index != last_index {
			self.tables.endpoint.update(key, last)?;
			self.cache.delete_relationship(service_id, last_index);
			self.cache.update_relationship(last.backend_uid, service_id, backend_index);
		}
		self.tables.endpoint.delete(&last_key)?;
		sv.endpoint_count = last_index - 1;
		self.tables.service.update(service_key, sv)?;
		Ok(())
	}

	fn handle_removed_addresses(&mut self, removed: &[String]) {
		let mut workloads: Vec<&str> = Vec::new();
		let mut services: Vec<&str> = Vec::new();
		for name in removed {
			// Workload uids are full resource paths; service names are `ns/hostname`.
			match name.matches('/').count() {
				n if n > 2 => workloads.push(name),
				1 => services.push(name),
				_ => warn!(name = %name, "cannot classify removed resource"),
			}
		}
		for uid in workloads {
			if let Err(err) = self.remove_workload(uid) {
				warn!(uid, %err, "failed to remove workload");
			}
		}
		for name in services {
			if let Err(err) = self.remove_service(name) {
				warn!(name, %err, "failed to remove service");
			}
		}
	}

	fn remove_workload(&mut self, uid: &str) -> anyhow::Result<()> {
		debug!(uid, "removing workload");
		self.endpoints_by_service.retain(|_, uids| {
			uids.remove(uid);
			!uids.is_empty()
		});
		self.cache.delete_workload(uid);
		let Some(workload_id) = self.hash_name.get(uid) else {
			debug!(uid, "workload was never assigned an id");
			return Ok(());
		};
		let backend_key = BackendKey { backend_uid: workload_id };
		if let Some(backend) = self.tables.backend.lookup(&backend_key)? {
			self.tables.frontend.delete(&FrontendKey { ip: backend.ip })?;
		}
		for (key, _) in self.tables.endpoints_for_backend(workload_id) {
			self.delete_endpoint(key.service_id, key.backend_index)?;
		}
		self.tables.backend.delete(&backend_key)?;
		self.hash_name.delete(uid);
		Ok(())
	}

	fn remove_service(&mut self, name: &str) -> anyhow::Result<()> {
		debug!(name, "removing service");
		self.cache.delete_service(name);
		let Some(service_id) = self.hash_name.get(name) else {
			debug!(name, "service was never assigned an id");
			return Ok(());
		};
		// Frontends go first: the packet path must never chase one into a
		// service row that is already gone.
		for (key, _) in self.tables.frontends_for_upstream(service_id) {
			self.tables.frontend.delete(&key)?;
		}
		let service_key = ServiceKey { service_id };
		let sv = self.tables.service.lookup(&service_key)?;
		self.tables.service.delete(&service_key)?;
		if let Some(sv) = sv {
			for backend_index in 1..=sv.endpoint_count {
				self.tables.endpoint.delete(&EndpointKey { service_id, backend_index })?;
				self.cache.delete_relationship(service_id, backend_index);
			}
		}
		self.hash_name.delete(name);
		Ok(())
	}

	/// One-shot garbage collection after a restart: every snapshot id with
	/// no live workload or service behind it gets its table rows torn down.
	fn reconcile(&mut self) {
		info!("reconciling tables against live resources");
		for (name, id) in self.hash_name.entries() {
			if self.cache.workload(&name).is_some() || self.cache.service(&name).is_some() {
				continue;
			}
			if let Err(err) = self.reconcile_entry(&name, id) {
				warn!(name = %name, id, %err, "failed to reconcile stale entry");
			}
		}
	}

	fn reconcile_entry(&mut self, name: &str, id: u32) -> anyhow::Result<()> {
		if self.tables.backend.lookup(&BackendKey { backend_uid: id })?.is_some() {
			info!(name, id, "garbage-collecting stale workload");
			self.remove_workload(name)
		} else if self.tables.service.lookup(&ServiceKey { service_id: id })?.is_some() {
			info!(name, id, "garbage-collecting stale service");
			self.remove_service(name)
		} else {
			debug!(name, id, "dropping dangling hash-name entry");
			self.hash_name.delete(name);
			Ok(())
		}
	}

	/// Forwards one authorization batch to the policy store. The first
	/// failure aborts the remainder of the batch.
	fn handle_authorization_response(
		&mut self,
		response: DeltaDiscoveryResponse,
	) -> anyhow::Result<()> {
		for res in &response.resources {
			let Some(any) = &res.resource else {
				return Err(anyhow!("authorization {} has no payload", res.name));
			};
			let auth = XdsAuthorization::decode(any.value.as_slice())?;
			self.policies.update_policy(auth)?;
		}
		for name in &response.removed_resources {
			self.policies.remove_policy(name);
		}
		Ok(())
	}
}
