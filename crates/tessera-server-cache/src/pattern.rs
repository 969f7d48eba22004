// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use serde::{Deserialize, Serialize};
use tessera_config_core::{ConfigKey, TenantId};

/// Set of cache keys removed by one invalidation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "match", rename_all = "snake_case")]
pub enum InvalidationPattern {
	/// One key at one environment.
	Exact(ConfigKey),
	/// A key at every environment. A write to any layer uses this, since it
	/// changes the resolved value of every descendant environment.
	Scope {
		tenant: TenantId,
		namespace: String,
		key: String,
	},
	/// Every key of a namespace, nested namespaces included.
	Namespace { tenant: TenantId, namespace: String },
	Tenant { tenant: TenantId },
	All,
}

impl InvalidationPattern {
	pub fn scope_of(key: &ConfigKey) -> Self {
		InvalidationPattern::Scope {
			tenant: key.tenant.clone(),
			namespace: key.namespace.clone(),
			key: key.key.clone(),
		}
	}

	pub fn matches(&self, candidate: &ConfigKey) -> bool {
		match self {
			InvalidationPattern::Exact(key) => key == candidate,
			InvalidationPattern::Scope {
				tenant,
				namespace,
				key,
			} => {
				&candidate.tenant == tenant && &candidate.namespace == namespace && &candidate.key == key
			}
			InvalidationPattern::Namespace { tenant, namespace } => {
				&candidate.tenant == tenant && in_namespace(&candidate.namespace, namespace)
			}
			InvalidationPattern::Tenant { tenant } => &candidate.tenant == tenant,
			InvalidationPattern::All => true,
		}
	}

	/// Prefix of [`ConfigKey::config_id`] shared by every matching key.
	pub fn id_prefix(&self) -> String {
		match self {
			InvalidationPattern::Exact(key) => key.config_id(),
			InvalidationPattern::Scope {
				tenant,
				namespace,
				key,
			} => format!("{tenant}/{namespace}/{key}@"),
			InvalidationPattern::Namespace { tenant, namespace } => format!("{tenant}/{namespace}/"),
			InvalidationPattern::Tenant { tenant } => format!("{tenant}/"),
			InvalidationPattern::All => String::new(),
		}
	}
}

fn in_namespace(candidate: &str, namespace: &str) -> bool {
	candidate == namespace
		|| candidate
			.strip_prefix(namespace)
			.is_some_and(|rest| rest.starts_with('/'))
}
