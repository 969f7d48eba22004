// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Identifier newtypes.
//!
//! Tenants, actors and key-encryption-keys are identified by opaque strings
//! supplied by the surrounding platform. Each gets its own newtype so a tenant
//! id can never be passed where a KEK id is expected.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::environment::Environment;

macro_rules! define_string_id {
	($name:ident, $doc:expr) => {
		#[doc = $doc]
		#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
		#[serde(transparent)]
		pub struct $name(String);

		impl $name {
			pub fn new(id: impl Into<String>) -> Self {
				Self(id.into())
			}

			pub fn as_str(&self) -> &str {
				&self.0
			}

			pub fn into_inner(self) -> String {
				self.0
			}
		}

		impl fmt::Display for $name {
			fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
				f.write_str(&self.0)
			}
		}

		impl From<&str> for $name {
			fn from(id: &str) -> Self {
				Self(id.to_string())
			}
		}

		impl From<String> for $name {
			fn from(id: String) -> Self {
				Self(id)
			}
		}
	};
}

define_string_id!(TenantId, "Identifier of a tenant; the isolation boundary for keys and data.");
define_string_id!(ActorId, "Identifier of the user or service performing an operation.");
define_string_id!(KekId, "Identifier of a key-encryption-key held by the key-management provider.");

impl TenantId {
	/// Tenant ids are path segments: non-empty, at most 128 chars, no `/`, `@` or `*`.
	pub fn is_valid(&self) -> bool {
		is_valid_segment(&self.0, 128)
	}
}

impl ActorId {
	/// The anonymous actor used when a request carries no identity.
	pub fn anonymous() -> Self {
		Self(String::new())
	}

	pub fn is_anonymous(&self) -> bool {
		self.0.trim().is_empty()
	}
}

fn is_valid_segment(s: &str, max_len: usize) -> bool {
	!s.is_empty()
		&& s.len() <= max_len
		&& s
			.chars()
			.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

/// Address of a single configuration entry: `(tenant, namespace, key, environment)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConfigKey {
	pub tenant: TenantId,
	pub namespace: String,
	pub key: String,
	pub environment: Environment,
}

impl ConfigKey {
	pub fn new(
		tenant: impl Into<TenantId>,
		namespace: impl Into<String>,
		key: impl Into<String>,
		environment: Environment,
	) -> Self {
		Self {
			tenant: tenant.into(),
			namespace: namespace.into(),
			key: key.into(),
			environment,
		}
	}

	/// Returns the same `(tenant, namespace, key)` at a different environment layer.
	pub fn with_environment(&self, environment: Environment) -> Self {
		Self {
			environment,
			..self.clone()
		}
	}

	/// Returns a sibling key in the same tenant, namespace and environment.
	pub fn sibling(&self, key: impl Into<String>) -> Self {
		Self {
			key: key.into(),
			..self.clone()
		}
	}

	/// Stable identifier of the entry, e.g. `t1/svc/db_pass@production`.
	pub fn config_id(&self) -> String {
		format!("{}@{}", self.scope(), self.environment)
	}

	/// Environment-independent scope `tenant/namespace/key`.
	///
	/// Write exclusion and cache invalidation both operate on this scope, since
	/// a write at one layer changes the resolved value of every descendant layer.
	pub fn scope(&self) -> String {
		format!("{}/{}/{}", self.tenant, self.namespace, self.key)
	}

	/// Validates the key components.
	///
	/// Namespaces may contain `/` separators; keys may not.
	pub fn validate(&self) -> Result<(), String> {
		if !self.tenant.is_valid() {
			return Err(format!("invalid tenant id '{}'", self.tenant));
		}
		if self.namespace.is_empty()
			|| self.namespace.len() > 256
			|| !self.namespace.split('/').all(|s| is_valid_segment(s, 128))
		{
			return Err(format!("invalid namespace '{}'", self.namespace));
		}
		if !is_valid_segment(&self.key, 256) {
			return Err(format!("invalid key '{}'", self.key));
		}
		Ok(())
	}
}

impl fmt::Display for ConfigKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.config_id())
	}
}
