// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration entries and their immutable version snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::ids::{ActorId, ConfigKey};
use crate::value::{ConfigValue, ValueType};

/// The mutation that produced a version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
	Create,
	Update,
	Delete,
	Rollback,
}

impl ChangeKind {
	pub fn as_str(&self) -> &'static str {
		match self {
			ChangeKind::Create => "create",
			ChangeKind::Update => "update",
			ChangeKind::Delete => "delete",
			ChangeKind::Rollback => "rollback",
		}
	}
}

impl FromStr for ChangeKind {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"create" => Ok(ChangeKind::Create),
			"update" => Ok(ChangeKind::Update),
			"delete" => Ok(ChangeKind::Delete),
			"rollback" => Ok(ChangeKind::Rollback),
			_ => Err(format!("unknown change kind: {s}")),
		}
	}
}

impl fmt::Display for ChangeKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Whether a version may still be served.
///
/// Rotation marks a superseded secret version `Inactive` once it is revoked.
/// Inactive versions stay in history but are never returned as current.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionState {
	#[default]
	Active,
	Inactive,
}

impl VersionState {
	pub fn as_str(&self) -> &'static str {
		match self {
			VersionState::Active => "active",
			VersionState::Inactive => "inactive",
		}
	}
}

impl FromStr for VersionState {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"active" => Ok(VersionState::Active),
			"inactive" => Ok(VersionState::Inactive),
			_ => Err(format!("unknown version state: {s}")),
		}
	}
}

/// Immutable snapshot of an entry at one version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigVersion {
	pub config_id: ConfigKey,
	pub version_number: u64,
	/// `None` for a `Delete` tombstone.
	pub payload: Option<ConfigValue>,
	pub change_kind: ChangeKind,
	pub changed_by: ActorId,
	pub changed_at: DateTime<Utc>,
	pub change_reason: Option<String>,
	pub rollback_target: Option<u64>,
	#[serde(default)]
	pub state: VersionState,
}

impl ConfigVersion {
	pub fn is_tombstone(&self) -> bool {
		self.payload.is_none()
	}

	pub fn is_active(&self) -> bool {
		self.state == VersionState::Active
	}
}

/// Mutable head of a configuration entry, advanced only by version appends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigEntry {
	pub key: ConfigKey,
	pub current_version: u64,
	pub value_type: ValueType,
	pub schema_version: Option<u32>,
	pub deleted: bool,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
	pub created_by: ActorId,
	pub updated_by: ActorId,
}

impl ConfigEntry {
	/// Builds the head for the first version of an entry.
	pub fn from_first_version(version: &ConfigVersion, schema_version: Option<u32>) -> Self {
		Self {
			key: version.config_id.clone(),
			current_version: version.version_number,
			value_type: version
				.payload
				.as_ref()
				.map(ConfigValue::value_type)
				.unwrap_or(ValueType::Structured),
			schema_version,
			deleted: version.is_tombstone(),
			created_at: version.changed_at,
			updated_at: version.changed_at,
			created_by: version.changed_by.clone(),
			updated_by: version.changed_by.clone(),
		}
	}

	/// Advances the head to a newly appended version.
	pub fn advance(&mut self, version: &ConfigVersion, schema_version: Option<u32>) {
		self.current_version = version.version_number;
		if let Some(payload) = &version.payload {
			self.value_type = payload.value_type();
		}
		if schema_version.is_some() {
			self.schema_version = schema_version;
		}
		self.deleted = version.is_tombstone();
		self.updated_at = version.changed_at;
		self.updated_by = version.changed_by.clone();
	}
}
