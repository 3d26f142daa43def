use std::collections::HashMap;
use std::hash::Hash;

use thiserror::Error;

mod rows;
pub use rows::*;

/// Errors surfaced by the flat tables. `Lookup` is reserved for failures of
/// the underlying store; a missing row is `Ok(None)`, never an error.
#[derive(Error, Debug)]
pub enum TableError {
	#[error("{table}: lookup failed: {reason}")]
	Lookup { table: &'static str, reason: String },
	#[error("{table}: write failed: {reason}")]
	Write { table: &'static str, reason: String },
}

/// One flat lookup table. Rows are plain values: updates replace the whole
/// row atomically, which is what lets the packet path read concurrently
/// without coordination.
#[derive(Debug)]
pub struct Table<K, V> {
	rows: HashMap<K, V>,
}

impl<K: Copy + Eq + Hash, V: Copy> Table<K, V> {
	fn new() -> Table<K, V> {
		Table { rows: HashMap::new() }
	}

	/// Point lookup. Distinguishes "not found" (`Ok(None)`) from a failure of
	/// the store itself.
	pub fn lookup(&self, key: &K) -> Result<Option<V>, TableError> {
		Ok(self.rows.get(key).copied())
	}

	/// Insert-or-replace. Never fails because the key already exists.
	pub fn update(&mut self, key: K, value: V) -> Result<(), TableError> {
		self.rows.insert(key, value);
		Ok(())
	}

	/// Deletes the row if present. Deleting an absent key is a no-op.
	pub fn delete(&mut self, key: &K) -> Result<(), TableError> {
		self.rows.remove(key);
		Ok(())
	}

	/// Every row matching the predicate.
	pub fn find<F>(&self, mut pred: F) -> Vec<(K, V)>
	where
		F: FnMut(&K, &V) -> bool,
	{
		self.rows
			.iter()
			.filter(|(key, value)| pred(key, value))
			.map(|(key, value)| (*key, *value))
			.collect()
	}

	pub fn len(&self) -> usize {
		self.rows.len()
	}

	pub fn is_empty(&self) -> bool {
		self.rows.is_empty()
	}
}

/// The four packet-path tables. Written only by this process; the packet
/// path reads them on every outbound connect.
#[derive(Debug)]
pub struct TableStore {
	pub frontend: Table<FrontendKey, FrontendValue>,
	pub service: Table<ServiceKey, ServiceValue>,
	pub endpoint: Table<EndpointKey, EndpointValue>,
	pub backend: Table<BackendKey, BackendValue>,
}

impl TableStore {
	pub fn new() -> TableStore {
		TableStore {
			frontend: Table::new(),
			service: Table::new(),
			endpoint: Table::new(),
			backend: Table::new(),
		}
	}

	/// Every endpoint slot bound to the given backend, ordered by (service,
	/// index) so multi-slot removals run the same way every time.
	pub fn endpoints_for_backend(&self, backend_uid: u32) -> Vec<(EndpointKey, EndpointValue)> {
		let mut found = self.endpoint.find(|_, v| v.backend_uid == backend_uid);
		found.sort_by_key(|(k, _)| *k);
		found
	}

	/// Every frontend row pointing at the given upstream.
	pub fn frontends_for_upstream(&self, upstream_id: u32) -> Vec<(FrontendKey, FrontendValue)> {
		let mut found = self.frontend.find(|_, v| v.upstream_id == upstream_id);
		found.sort_by_key(|(k, _)| *k);
		found
	}
}

impl Default for TableStore {
	fn default() -> TableStore {
		TableStore::new()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn update_is_insert_or_replace() {
		let mut store = TableStore::new();
		let key = BackendKey { backend_uid: 1 };
		store
			.backend
			.update(key, BackendValue { service_count: 1, ..Default::default() })
			.unwrap();
		store
			.backend
			.update(key, BackendValue { service_count: 2, ..Default::default() })
			.unwrap();
		assert_eq!(store.backend.len(), 1);
		assert_eq!(store.backend.lookup(&key).unwrap().unwrap().service_count, 2);
	}

	#[test]
	fn lookup_miss_is_not_an_error() {
		let store = TableStore::new();
		assert!(store.service.lookup(&ServiceKey { service_id: 42 }).unwrap().is_none());
	}

	#[test]
	fn delete_is_idempotent() {
		let mut store = TableStore::new();
		let key = FrontendKey { ip: ip_bytes("10.0.0.1".parse().unwrap()) };
		store.frontend.update(key, FrontendValue { upstream_id: 7 }).unwrap();
		store.frontend.delete(&key).unwrap();
		store.frontend.delete(&key).unwrap();
		assert!(store.frontend.is_empty());
	}

	#[test]
	fn find_filters_by_value() {
		let mut store = TableStore::new();
		for i in 1..=3 {
			store
				.endpoint
				.update(
					EndpointKey { service_id: 9, backend_index: i },
					EndpointValue { backend_uid: if i == 2 { 50 } else { 60 } },
				)
				.unwrap();
		}
		let slots = store.endpoints_for_backend(60);
		assert_eq!(slots.len(), 2);
		assert!(slots.iter().all(|(_, v)| v.backend_uid == 60));
	}
}
