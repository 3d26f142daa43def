use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use tracing::warn;

use crate::strng;
use crate::strng::Strng;

/// Bidirectional mapping from variable-length resource names to the compact
/// 32-bit ids the packet-path tables are keyed by.
///
/// Ids are assigned on first sight from a monotonic counter and stay stable
/// until the name is explicitly deleted, across restarts, via an on-disk
/// snapshot. Snapshot writes are non-fatal: an id assignment always succeeds
/// in memory, and losing the snapshot only costs a full reconciliation at
/// the next restart.
pub struct HashName {
	path: PathBuf,
	next_id: u32,
	by_name: HashMap<Strng, u32>,
	by_id: HashMap<u32, Strng>,
}

impl HashName {
	/// Loads the snapshot at `path`, starting empty when it is missing or
	/// unreadable.
	pub fn load<P: Into<PathBuf>>(path: P) -> HashName {
		let path = path.into();
		let mut by_name: HashMap<Strng, u32> = HashMap::new();
		match std::fs::read_to_string(&path) {
			Ok(raw) => match serde_yaml::from_str::<BTreeMap<String, u32>>(&raw) {
				Ok(snapshot) => {
					by_name = snapshot
						.into_iter()
						.map(|(name, id)| (strng::new(name), id))
						.collect();
				},
				Err(err) => {
					warn!(path = %path.display(), %err, "hash-name snapshot unreadable, starting empty")
				},
			},
			Err(err) if err.kind() == std::io::ErrorKind::NotFound => {},
			Err(err) => {
				warn!(path = %path.display(), %err, "hash-name snapshot unreadable, starting empty")
			},
		}
		let by_id = by_name.iter().map(|(name, id)| (*id, name.clone())).collect();
		// Id 0 is never handed out so an all-zeroes row can not alias a real resource.
		let next_id = by_name.values().max().map_or(1, |max| max + 1);
		HashName {
			path,
			next_id,
			by_name,
			by_id,
		}
	}

	/// Returns the id for `name`, assigning and persisting a fresh one on
	/// first sight. Never fails: a snapshot write error is logged and the
	/// in-memory assignment stands.
	pub fn resolve(&mut self, name: &str) -> u32 {
		if let Some(id) = self.by_name.get(name) {
			return *id;
		}
		let id = self.next_id;
		self.next_id += 1;
		let name = strng::new(name);
		self.by_name.insert(name.clone(), id);
		self.by_id.insert(id, name);
		self.persist();
		id
	}

	/// Like [`HashName::resolve`] but never assigns.
	pub fn get(&self, name: &str) -> Option<u32> {
		self.by_name.get(name).copied()
	}

	/// Reverse lookup.
	pub fn name(&self, id: u32) -> Option<Strng> {
		self.by_id.get(&id).cloned()
	}

	/// Removes both directions of the mapping. Unknown names are a no-op.
	pub fn delete(&mut self, name: &str) {
		if let Some(id) = self.by_name.remove(name) {
			self.by_id.remove(&id);
			self.persist();
		}
	}

	/// Every known `(name, id)` pair, sorted by name.
	pub fn entries(&self) -> Vec<(Strng, u32)> {
		let mut all: Vec<(Strng, u32)> = self
			.by_name
			.iter()
			.map(|(name, id)| (name.clone(), *id))
			.collect();
		all.sort();
		all
	}

	fn persist(&self) {
		if let Err(err) = self.try_persist() {
			warn!(path = %self.path.display(), %err, "failed to persist hash-name snapshot");
		}
	}

	fn try_persist(&self) -> anyhow::Result<()> {
		let snapshot: BTreeMap<Strng, u32> = self
			.by_name
			.iter()
			.map(|(name, id)| (name.clone(), *id))
			.collect();
		let raw = serde_yaml::to_string(&snapshot)?;
		// Write-then-rename so a crash mid-write never clobbers the last good
		// snapshot.
		let tmp = self.path.with_extension("tmp");
		std::fs::write(&tmp, raw)?;
		std::fs::rename(&tmp, &self.path)?;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn scratch(name: &str) -> PathBuf {
		let dir = std::env::temp_dir().join(format!("meshplane-hashname-{}", std::process::id()));
		std::fs::create_dir_all(&dir).unwrap();
		let path = dir.join(format!("{name}.yaml"));
		let _ = std::fs::remove_file(&path);
		path
	}

	#[test]
	fn assigns_stable_ids() {
		let mut hn = HashName::load(scratch("assigns_stable_ids"));
		let a = hn.resolve("ns/svc-a");
		let b = hn.resolve("ns/svc-b");
		assert_ne!(a, b);
		assert_eq!(hn.resolve("ns/svc-a"), a);
		assert_eq!(hn.get("ns/svc-a"), Some(a));
		assert_eq!(hn.name(a).as_deref(), Some("ns/svc-a"));
		assert_eq!(hn.name(b).as_deref(), Some("ns/svc-b"));
	}

	#[test]
	fn never_assigns_zero() {
		let mut hn = HashName::load(scratch("never_assigns_zero"));
		assert_ne!(hn.resolve("first"), 0);
	}

	#[test]
	fn survives_restart() {
		let path = scratch("survives_restart");
		let (a, b) = {
			let mut hn = HashName::load(path.clone());
			(hn.resolve("cluster//v1/Pod/ns/w1"), hn.resolve("ns/svc1"))
		};
		let mut hn = HashName::load(path);
		assert_eq!(hn.get("cluster//v1/Pod/ns/w1"), Some(a));
		assert_eq!(hn.get("ns/svc1"), Some(b));
		// The counter resumes past the snapshot, so new names never collide.
		let c = hn.resolve("ns/svc2");
		assert_ne!(c, a);
		assert_ne!(c, b);
	}

	#[test]
	fn delete_removes_both_directions() {
		let path = scratch("delete_removes_both_directions");
		let mut hn = HashName::load(path.clone());
		let id = hn.resolve("ns/svc1");
		hn.delete("ns/svc1");
		assert_eq!(hn.get("ns/svc1"), None);
		assert_eq!(hn.name(id), None);
		// The deletion is durable too.
		let hn = HashName::load(path);
		assert_eq!(hn.get("ns/svc1"), None);
	}

	#[test]
	fn corrupt_snapshot_starts_empty() {
		let path = scratch("corrupt_snapshot_starts_empty");
		std::fs::write(&path, "{{{ not yaml").unwrap();
		let mut hn = HashName::load(path);
		assert_eq!(hn.get("anything"), None);
		assert_ne!(hn.resolve("anything"), 0);
	}

	#[test]
	fn entries_are_sorted() {
		let mut hn = HashName::load(scratch("entries_are_sorted"));
		hn.resolve("b");
		hn.resolve("a");
		hn.resolve("c");
		let names: Vec<_> = hn.entries().into_iter().map(|(n, _)| n).collect();
		assert_eq!(names, vec!["a", "b", "c"]);
	}
}
