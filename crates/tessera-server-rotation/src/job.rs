// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Persisted rotation job state.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tessera_config_core::{ActorId, ConfigKey};
use tessera_server_config::{RotationClassConfig, RotationConfig};
use uuid::Uuid;

/// Phase of a rotation job.
///
/// ```text
/// Scheduled -> Generating -> DualValid -> Verifying -> Revoking -> Completed
///                               |             |
///                               +-> Aborted   +-> RolledBack
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationPhase {
	Scheduled,
	Generating,
	DualValid,
	Verifying,
	Revoking,
	Completed,
	/// Health checks failed; the pre-rotation value is current again.
	RolledBack,
	/// Stopped by an operator or by a generated value failing validation.
	Aborted,
}

impl RotationPhase {
	pub fn as_str(&self) -> &'static str {
		match self {
			RotationPhase::Scheduled => "scheduled",
			RotationPhase::Generating => "generating",
			RotationPhase::DualValid => "dual_valid",
			RotationPhase::Verifying => "verifying",
			RotationPhase::Revoking => "revoking",
			RotationPhase::Completed => "completed",
			RotationPhase::RolledBack => "rolled_back",
			RotationPhase::Aborted => "aborted",
		}
	}

	pub fn is_terminal(&self) -> bool {
		matches!(
			self,
			RotationPhase::Completed | RotationPhase::RolledBack | RotationPhase::Aborted
		)
	}

	/// Phases during which the secret is locked against other rotations and writes.
	pub fn holds_lock(&self) -> bool {
		!self.is_terminal() && *self != RotationPhase::Scheduled
	}

	pub fn can_transition_to(&self, next: RotationPhase) -> bool {
		use RotationPhase::*;
		matches!(
			(self, next),
			(Scheduled, Generating)
				| (Scheduled, Aborted)
				| (Generating, DualValid)
				| (Generating, Aborted)
				| (DualValid, Verifying)
				| (DualValid, Aborted)
				| (Verifying, Revoking)
				| (Verifying, RolledBack)
				| (Revoking, Completed)
		)
	}
}

impl fmt::Display for RotationPhase {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Rotation class of a secret. Selects grace window and interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecretClass {
	Ephemeral,
	Standard,
	LongLived,
}

impl SecretClass {
	pub fn as_str(&self) -> &'static str {
		match self {
			SecretClass::Ephemeral => "ephemeral",
			SecretClass::Standard => "standard",
			SecretClass::LongLived => "long_lived",
		}
	}

	pub fn settings(&self, config: &RotationConfig) -> RotationClassConfig {
		match self {
			SecretClass::Ephemeral => config.ephemeral,
			SecretClass::Standard => config.standard,
			SecretClass::LongLived => config.long_lived,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RotationJob {
	pub id: Uuid,
	pub secret: ConfigKey,
	pub class: SecretClass,
	pub phase: RotationPhase,
	/// Version current when the rotation started. Set on entering `Generating`.
	pub old_version: Option<u64>,
	pub new_version: Option<u64>,
	/// Generation does not start before this instant.
	pub start_at: DateTime<Utc>,
	pub notified: bool,
	pub grace_deadline: Option<DateTime<Utc>>,
	pub requested_by: ActorId,
	pub failure_reason: Option<String>,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

impl RotationJob {
	pub fn new(
		secret: ConfigKey,
		class: SecretClass,
		start_at: DateTime<Utc>,
		requested_by: ActorId,
	) -> Self {
		let now = Utc::now();
		Self {
			id: Uuid::new_v4(),
			secret,
			class,
			phase: RotationPhase::Scheduled,
			old_version: None,
			new_version: None,
			start_at,
			notified: false,
			grace_deadline: None,
			requested_by,
			failure_reason: None,
			created_at: now,
			updated_at: now,
		}
	}

	/// Change reason stamped on versions written by this job.
	pub fn marker(&self) -> String {
		format!("rotation {}", self.id)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn only_listed_transitions_are_legal() {
		use RotationPhase::*;
		let all = [
			Scheduled, Generating, DualValid, Verifying, Revoking, Completed, RolledBack, Aborted,
		];
		let legal = [
			(Scheduled, Generating),
			(Scheduled, Aborted),
			(Generating, DualValid),
			(Generating, Aborted),
			(DualValid, Verifying),
			(DualValid, Aborted),
			(Verifying, Revoking),
			(Verifying, RolledBack),
			(Revoking, Completed),
		];
		for from in all {
			for to in all {
				assert_eq!(
					from.can_transition_to(to),
					legal.contains(&(from, to)),
					"{from} -> {to}"
				);
			}
		}
	}

	#[test]
	fn terminal_phases_have_no_successor() {
		for phase in [
			RotationPhase::Completed,
			RotationPhase::RolledBack,
			RotationPhase::Aborted,
		] {
			assert!(phase.is_terminal());
			assert!(!phase.holds_lock());
		}
		assert!(!RotationPhase::Scheduled.holds_lock());
		assert!(RotationPhase::DualValid.holds_lock());
	}

	#[test]
	fn classes_select_their_settings() {
		let config = RotationConfig::default();
		assert!(
			SecretClass::Ephemeral.settings(&config).grace()
				< SecretClass::LongLived.settings(&config).grace()
		);
	}
}
