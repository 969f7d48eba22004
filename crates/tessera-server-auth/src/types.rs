// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Type definitions for authorization decisions.
//!
//! - [`Action`]: the operation being attempted
//! - [`Resource`]: what it is attempted on, rendered as a matchable string
//! - [`Decision`]: the outcome and the rule that produced it

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tessera_config_core::{ConfigKey, TenantId};

/// Operations subject to authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
	Read,
	Write,
	Delete,
	Rollback,
	Rotate,
	/// Key lifecycle: provisioning, KEK rotation, deletion scheduling.
	ManageKeys,
}

impl Action {
	pub const ALL: [Action; 6] = [
		Action::Read,
		Action::Write,
		Action::Delete,
		Action::Rollback,
		Action::Rotate,
		Action::ManageKeys,
	];

	pub fn as_str(&self) -> &'static str {
		match self {
			Action::Read => "read",
			Action::Write => "write",
			Action::Delete => "delete",
			Action::Rollback => "rollback",
			Action::Rotate => "rotate",
			Action::ManageKeys => "manage_keys",
		}
	}
}

impl fmt::Display for Action {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
	Config,
	Secret,
	Key,
}

impl ResourceKind {
	pub fn as_str(&self) -> &'static str {
		match self {
			ResourceKind::Config => "config",
			ResourceKind::Secret => "secret",
			ResourceKind::Key => "key",
		}
	}
}

/// A protected resource.
///
/// Rendered as `kind:path`, e.g. `secret:t1/svc/db_pass@production` or
/// `key:t1`, which is what rule patterns match against.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resource {
	pub kind: ResourceKind,
	pub tenant: TenantId,
	pub path: String,
}

impl Resource {
	pub fn config(key: &ConfigKey) -> Self {
		Self {
			kind: ResourceKind::Config,
			tenant: key.tenant.clone(),
			path: key.config_id(),
		}
	}

	pub fn secret(key: &ConfigKey) -> Self {
		Self {
			kind: ResourceKind::Secret,
			tenant: key.tenant.clone(),
			path: key.config_id(),
		}
	}

	pub fn keys(tenant: &TenantId) -> Self {
		Self {
			kind: ResourceKind::Key,
			tenant: tenant.clone(),
			path: tenant.to_string(),
		}
	}
}

impl fmt::Display for Resource {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}:{}", self.kind.as_str(), self.path)
	}
}

/// Request attributes passed through to the policy decision point.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthContext {
	pub request_id: Option<String>,
	pub attributes: BTreeMap<String, String>,
}

impl AuthContext {
	pub fn with_request_id(request_id: impl Into<String>) -> Self {
		Self {
			request_id: Some(request_id.into()),
			attributes: BTreeMap::new(),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Effect {
	Allow,
	Deny,
}

/// Outcome of one policy evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
	pub allowed: bool,
	/// Identifier of the rule that decided. Audit only.
	pub matched_rule: String,
}

impl Decision {
	pub fn allow(rule: impl Into<String>) -> Self {
		Self {
			allowed: true,
			matched_rule: rule.into(),
		}
	}

	pub fn deny(rule: impl Into<String>) -> Self {
		Self {
			allowed: false,
			matched_rule: rule.into(),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tessera_config_core::Environment;

	#[test]
	fn resources_render_as_kind_and_path() {
		let key = ConfigKey::new("t1", "svc", "db_pass", Environment::Production);
		assert_eq!(
			Resource::secret(&key).to_string(),
			"secret:t1/svc/db_pass@production"
		);
		assert_eq!(
			Resource::config(&key).to_string(),
			"config:t1/svc/db_pass@production"
		);
		assert_eq!(Resource::keys(&TenantId::new("t1")).to_string(), "key:t1");
	}
}
