// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Per-tenant key-encryption-key records.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{KekId, TenantId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyStatus {
	/// Used for new wraps. At most one per tenant.
	Active,
	/// Usable for unwrap only.
	Deprecated,
	/// Unwrap still permitted until `deletion_due_at`; then destroyed.
	PendingDeletion,
}

impl KeyStatus {
	pub fn as_str(&self) -> &'static str {
		match self {
			KeyStatus::Active => "active",
			KeyStatus::Deprecated => "deprecated",
			KeyStatus::PendingDeletion => "pending_deletion",
		}
	}
}

impl FromStr for KeyStatus {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"active" => Ok(KeyStatus::Active),
			"deprecated" => Ok(KeyStatus::Deprecated),
			"pending_deletion" => Ok(KeyStatus::PendingDeletion),
			_ => Err(format!("unknown key status: {s}")),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantKey {
	pub tenant_id: TenantId,
	pub kek_id: KekId,
	pub status: KeyStatus,
	pub created_at: DateTime<Utc>,
	pub deprecated_at: Option<DateTime<Utc>>,
	pub deletion_due_at: Option<DateTime<Utc>>,
}

impl TenantKey {
	pub fn new_active(tenant_id: TenantId, kek_id: KekId) -> Self {
		Self {
			tenant_id,
			kek_id,
			status: KeyStatus::Active,
			created_at: Utc::now(),
			deprecated_at: None,
			deletion_due_at: None,
		}
	}

	/// A key may be unwrapped with until its deletion deadline passes.
	pub fn usable_for_unwrap(&self, now: DateTime<Utc>) -> bool {
		match self.deletion_due_at {
			Some(due) => now < due,
			None => true,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::Duration;

	#[test]
	fn status_parses_its_own_name() {
		for status in [KeyStatus::Active, KeyStatus::Deprecated, KeyStatus::PendingDeletion] {
			assert_eq!(status.as_str().parse::<KeyStatus>(), Ok(status));
		}
		assert!("retired".parse::<KeyStatus>().is_err());
	}

	#[test]
	fn pending_deletion_is_usable_until_deadline() {
		let mut key = TenantKey::new_active(TenantId::new("t1"), KekId::new("k1"));
		let now = Utc::now();
		assert!(key.usable_for_unwrap(now));

		key.status = KeyStatus::PendingDeletion;
		key.deletion_due_at = Some(now + Duration::days(7));
		assert!(key.usable_for_unwrap(now + Duration::days(6)));
		assert!(!key.usable_for_unwrap(now + Duration::days(8)));
	}
}
