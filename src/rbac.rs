use std::collections::{HashMap, HashSet};

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::strng;
use crate::strng::Strng;
use crate::xds::authorization as xds;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PolicyError {
	#[error("unknown enum value: {0}")]
	EnumParse(i32),
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
pub enum RbacScope {
	Global,
	Namespace,
	WorkloadSelector,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
pub enum RbacAction {
	Allow,
	Deny,
}

/// One parsed authorization policy as delivered by the discovery stream.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct Authorization {
	pub name: Strng,
	pub namespace: Strng,
	pub scope: RbacScope,
	pub action: RbacAction,
}

impl Authorization {
	pub fn to_key(&self) -> Strng {
		strng::format!("{}/{}", self.namespace, self.name)
	}
}

impl TryFrom<&xds::Authorization> for Authorization {
	type Error = PolicyError;

	fn try_from(resource: &xds::Authorization) -> Result<Authorization, PolicyError> {
		let scope = xds::Scope::try_from(resource.scope)
			.map_err(|_| PolicyError::EnumParse(resource.scope))?;
		let action = xds::Action::try_from(resource.action)
			.map_err(|_| PolicyError::EnumParse(resource.action))?;
		Ok(Authorization {
			name: strng::new(&resource.name),
			namespace: strng::new(&resource.namespace),
			scope: match scope {
				xds::Scope::Global => RbacScope::Global,
				xds::Scope::Namespace => RbacScope::Namespace,
				xds::Scope::WorkloadSelector => RbacScope::WorkloadSelector,
			},
			action: match action {
				xds::Action::Allow => RbacAction::Allow,
				xds::Action::Deny => RbacAction::Deny,
			},
		})
	}
}

/// Policies the packet-path authorizer consults, keyed by `ns/name` with a
/// per-namespace index for scoped evaluation.
#[derive(Debug, Default)]
pub struct PolicyStore {
	policies: HashMap<Strng, Authorization>,
	by_namespace: HashMap<Strng, HashSet<Strng>>,
}

impl PolicyStore {
	/// Parses and stores one policy. A parse failure is returned to the
	/// caller, which aborts the rest of the authorization batch.
	pub fn update_policy(&mut self, resource: xds::Authorization) -> anyhow::Result<()> {
		let auth = Authorization::try_from(&resource)?;
		let key = auth.to_key();
		match auth.scope {
			RbacScope::Global => {
				self
					.by_namespace
					.entry(strng::literal!(""))
					.or_default()
					.insert(key.clone());
			},
			RbacScope::Namespace => {
				self
					.by_namespace
					.entry(auth.namespace.clone())
					.or_default()
					.insert(key.clone());
			},
			RbacScope::WorkloadSelector => {},
		}
		self.policies.insert(key, auth);
		Ok(())
	}

	pub fn remove_policy(&mut self, name: &str) {
		let Some(auth) = self.policies.remove(name) else {
			debug!(name, "removed policy was not present");
			return;
		};
		let index = match auth.scope {
			RbacScope::Global => Some(strng::literal!("")),
			RbacScope::Namespace => Some(auth.namespace.clone()),
			RbacScope::WorkloadSelector => None,
		};
		if let Some(index) = index {
			if let Some(keys) = self.by_namespace.get_mut(&index) {
				keys.remove(name);
				if keys.is_empty() {
					self.by_namespace.remove(&index);
				}
			}
		}
	}

	pub fn policy(&self, name: &str) -> Option<&Authorization> {
		self.policies.get(name)
	}

	/// Policy keys applying to a namespace ("" holds the global scope).
	pub fn policies_in_namespace(&self, namespace: &str) -> Vec<Strng> {
		let mut keys: Vec<Strng> = self
			.by_namespace
			.get(namespace)
			.map(|keys| keys.iter().cloned().collect())
			.unwrap_or_default();
		keys.sort();
		keys
	}

	pub fn len(&self) -> usize {
		self.policies.len()
	}

	pub fn is_empty(&self) -> bool {
		self.policies.is_empty()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn policy(name: &str, namespace: &str, scope: xds::Scope) -> xds::Authorization {
		xds::Authorization {
			name: name.to_string(),
			namespace: namespace.to_string(),
			scope: scope as i32,
			action: xds::Action::Deny as i32,
		}
	}

	#[test]
	fn upsert_and_remove_round_trip() {
		let mut store = PolicyStore::default();
		store
			.update_policy(policy("deny-all", "prod", xds::Scope::Namespace))
			.unwrap();
		assert_eq!(store.len(), 1);
		let stored = store.policy("prod/deny-all").unwrap();
		assert_eq!(stored.action, RbacAction::Deny);
		assert_eq!(store.policies_in_namespace("prod"), vec!["prod/deny-all"]);

		store.remove_policy("prod/deny-all");
		assert!(store.is_empty());
		assert!(store.policies_in_namespace("prod").is_empty());
	}

	#[test]
	fn global_policies_index_under_the_empty_namespace() {
		let mut store = PolicyStore::default();
		store
			.update_policy(policy("lockdown", "istio-system", xds::Scope::Global))
			.unwrap();
		assert_eq!(
			store.policies_in_namespace(""),
			vec!["istio-system/lockdown"]
		);
		assert!(store.policies_in_namespace("istio-system").is_empty());
	}

	#[test]
	fn selector_policies_are_not_namespace_indexed() {
		let mut store = PolicyStore::default();
		store
			.update_policy(policy("pods-only", "prod", xds::Scope::WorkloadSelector))
			.unwrap();
		assert!(store.policy("prod/pods-only").is_some());
		assert!(store.policies_in_namespace("prod").is_empty());
		store.remove_policy("prod/pods-only");
		assert!(store.is_empty());
	}

	#[test]
	fn unknown_scope_is_rejected() {
		let mut store = PolicyStore::default();
		let mut bad = policy("weird", "prod", xds::Scope::Namespace);
		bad.scope = 9;
		assert!(store.update_policy(bad).is_err());
		assert!(store.is_empty());
	}

	#[test]
	fn removing_an_unknown_policy_is_silent() {
		let mut store = PolicyStore::default();
		store.remove_policy("prod/never-seen");
		assert!(store.is_empty());
	}
}
