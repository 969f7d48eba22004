// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Core event types for audit logging.
//!
//! - [`AuditEventType`]: Enumeration of all auditable events
//! - [`AuditSeverity`]: RFC 5424-compatible severity levels
//! - [`AuditLogEntry`]: Complete audit record
//! - [`AuditLogBuilder`]: Fluent API for constructing entries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use uuid::Uuid;

/// Types of events that can be recorded in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
	// Configuration events
	ConfigCreated,
	ConfigUpdated,
	ConfigDeleted,
	ConfigRolledBack,
	ConfigAccessed,
	ConfigPruned,

	// Secret events
	SecretAccessed,
	SecretModified,
	DecryptionFailed,
	TenantIsolationViolation,

	// Access control events
	AccessGranted,
	AccessDenied,

	// Key lifecycle events
	KekCreated,
	KekRotated,
	KekDeletionScheduled,
	DekRewrapped,

	// Rotation events
	RotationScheduled,
	RotationPhaseChanged,
	RotationCompleted,
	RotationRolledBack,
	RotationAborted,

	// Operational events
	CacheBroadcastFailed,
	QuotaExceeded,
}

impl AuditEventType {
	pub fn as_str(&self) -> &'static str {
		match self {
			AuditEventType::ConfigCreated => "config_created",
			AuditEventType::ConfigUpdated => "config_updated",
			AuditEventType::ConfigDeleted => "config_deleted",
			AuditEventType::ConfigRolledBack => "config_rolled_back",
			AuditEventType::ConfigAccessed => "config_accessed",
			AuditEventType::ConfigPruned => "config_pruned",

			AuditEventType::SecretAccessed => "secret_accessed",
			AuditEventType::SecretModified => "secret_modified",
			AuditEventType::DecryptionFailed => "decryption_failed",
			AuditEventType::TenantIsolationViolation => "tenant_isolation_violation",

			AuditEventType::AccessGranted => "access_granted",
			AuditEventType::AccessDenied => "access_denied",

			AuditEventType::KekCreated => "kek_created",
			AuditEventType::KekRotated => "kek_rotated",
			AuditEventType::KekDeletionScheduled => "kek_deletion_scheduled",
			AuditEventType::DekRewrapped => "dek_rewrapped",

			AuditEventType::RotationScheduled => "rotation_scheduled",
			AuditEventType::RotationPhaseChanged => "rotation_phase_changed",
			AuditEventType::RotationCompleted => "rotation_completed",
			AuditEventType::RotationRolledBack => "rotation_rolled_back",
			AuditEventType::RotationAborted => "rotation_aborted",

			AuditEventType::CacheBroadcastFailed => "cache_broadcast_failed",
			AuditEventType::QuotaExceeded => "quota_exceeded",
		}
	}

	/// Returns the default severity for this event type.
	///
	/// - `Info`: normal reads and writes
	/// - `Notice`: destructive or key-lifecycle actions
	/// - `Warning`: denials and degraded operation
	/// - `Error`: automatic rotation rollback
	/// - `Critical`: cross-tenant key use and tag failures
	pub fn default_severity(&self) -> AuditSeverity {
		match self {
			AuditEventType::ConfigCreated
			| AuditEventType::ConfigUpdated
			| AuditEventType::ConfigAccessed
			| AuditEventType::SecretAccessed
			| AuditEventType::SecretModified
			| AuditEventType::AccessGranted
			| AuditEventType::KekCreated
			| AuditEventType::DekRewrapped
			| AuditEventType::RotationScheduled
			| AuditEventType::RotationPhaseChanged
			| AuditEventType::RotationCompleted => AuditSeverity::Info,

			AuditEventType::ConfigDeleted
			| AuditEventType::ConfigRolledBack
			| AuditEventType::ConfigPruned
			| AuditEventType::KekRotated
			| AuditEventType::KekDeletionScheduled
			| AuditEventType::RotationAborted => AuditSeverity::Notice,

			AuditEventType::AccessDenied
			| AuditEventType::CacheBroadcastFailed
			| AuditEventType::QuotaExceeded => AuditSeverity::Warning,

			AuditEventType::RotationRolledBack => AuditSeverity::Error,

			AuditEventType::TenantIsolationViolation | AuditEventType::DecryptionFailed => {
				AuditSeverity::Critical
			}
		}
	}

	/// Security events are always forwarded regardless of the configured minimum severity.
	pub fn is_security_event(&self) -> bool {
		matches!(
			self,
			AuditEventType::TenantIsolationViolation
				| AuditEventType::DecryptionFailed
				| AuditEventType::AccessDenied
		)
	}
}

impl fmt::Display for AuditEventType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Severity levels for audit events, compatible with RFC 5424 syslog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuditSeverity {
	Debug = 7,
	#[default]
	Info = 6,
	Notice = 5,
	Warning = 4,
	Error = 3,
	Critical = 2,
}

impl AuditSeverity {
	/// Returns the RFC 5424 numeric severity code.
	pub fn as_syslog_code(&self) -> u8 {
		*self as u8
	}

	pub fn parse(s: &str) -> Option<AuditSeverity> {
		match s.trim().to_ascii_lowercase().as_str() {
			"debug" => Some(AuditSeverity::Debug),
			"info" => Some(AuditSeverity::Info),
			"notice" => Some(AuditSeverity::Notice),
			"warning" | "warn" => Some(AuditSeverity::Warning),
			"error" => Some(AuditSeverity::Error),
			"critical" => Some(AuditSeverity::Critical),
			_ => None,
		}
	}
}

impl PartialOrd for AuditSeverity {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}

impl Ord for AuditSeverity {
	fn cmp(&self, other: &Self) -> Ordering {
		// Lower numeric value = higher severity (Critical=2 > Debug=7)
		(*other as u8).cmp(&(*self as u8))
	}
}

impl fmt::Display for AuditSeverity {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			AuditSeverity::Debug => "debug",
			AuditSeverity::Info => "info",
			AuditSeverity::Notice => "notice",
			AuditSeverity::Warning => "warning",
			AuditSeverity::Error => "error",
			AuditSeverity::Critical => "critical",
		};
		write!(f, "{s}")
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
	Success,
	Failure,
	Denied,
}

/// An entry in the audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
	pub id: Uuid,
	pub timestamp: DateTime<Utc>,
	pub event_type: AuditEventType,
	pub severity: AuditSeverity,
	pub outcome: AuditOutcome,

	/// Tenant whose data or keys were touched.
	pub tenant_id: Option<String>,
	/// The actor who performed the action (if known).
	pub actor_id: Option<String>,

	/// The type of resource affected (e.g., "config", "secret", "kek").
	pub resource_type: Option<String>,
	/// The ID of the resource affected.
	pub resource_id: Option<String>,

	/// Human-readable description of the action.
	pub action: String,
	/// Policy rule that produced an authorization decision. Never returned to callers.
	pub matched_rule: Option<String>,
	/// Additional event-specific details.
	pub details: serde_json::Value,
	/// Application-level request ID for correlation.
	pub request_id: Option<String>,
}

impl AuditLogEntry {
	/// Create a new audit log builder for the given event type.
	pub fn builder(event_type: AuditEventType) -> AuditLogBuilder {
		AuditLogBuilder::new(event_type)
	}
}

/// Builder for constructing audit log entries with a fluent API.
#[derive(Debug, Clone)]
pub struct AuditLogBuilder {
	event_type: AuditEventType,
	severity: Option<AuditSeverity>,
	outcome: AuditOutcome,
	tenant_id: Option<String>,
	actor_id: Option<String>,
	resource_type: Option<String>,
	resource_id: Option<String>,
	action: Option<String>,
	matched_rule: Option<String>,
	details: serde_json::Value,
	request_id: Option<String>,
}

impl AuditLogBuilder {
	pub fn new(event_type: AuditEventType) -> Self {
		Self {
			event_type,
			severity: None,
			outcome: AuditOutcome::Success,
			tenant_id: None,
			actor_id: None,
			resource_type: None,
			resource_id: None,
			action: None,
			matched_rule: None,
			details: serde_json::Value::Null,
			request_id: None,
		}
	}

	/// Set the severity level. Defaults to the event type's default severity.
	pub fn severity(mut self, severity: AuditSeverity) -> Self {
		self.severity = Some(severity);
		self
	}

	pub fn outcome(mut self, outcome: AuditOutcome) -> Self {
		self.outcome = outcome;
		self
	}

	pub fn tenant(mut self, tenant_id: impl fmt::Display) -> Self {
		self.tenant_id = Some(tenant_id.to_string());
		self
	}

	pub fn actor(mut self, actor_id: impl fmt::Display) -> Self {
		self.actor_id = Some(actor_id.to_string());
		self
	}

	/// Set the resource type and ID affected by this event.
	pub fn resource(
		mut self,
		resource_type: impl Into<String>,
		resource_id: impl Into<String>,
	) -> Self {
		self.resource_type = Some(resource_type.into());
		self.resource_id = Some(resource_id.into());
		self
	}

	/// Set the human-readable action description.
	pub fn action(mut self, action: impl Into<String>) -> Self {
		self.action = Some(action.into());
		self
	}

	pub fn matched_rule(mut self, rule: impl Into<String>) -> Self {
		self.matched_rule = Some(rule.into());
		self
	}

	/// Set additional event-specific details.
	pub fn details(mut self, details: serde_json::Value) -> Self {
		self.details = details;
		self
	}

	pub fn request_id(mut self, request_id: impl Into<String>) -> Self {
		self.request_id = Some(request_id.into());
		self
	}

	pub fn build(self) -> AuditLogEntry {
		AuditLogEntry {
			id: Uuid::new_v4(),
			timestamp: Utc::now(),
			event_type: self.event_type,
			severity: self
				.severity
				.unwrap_or_else(|| self.event_type.default_severity()),
			outcome: self.outcome,
			tenant_id: self.tenant_id,
			actor_id: self.actor_id,
			resource_type: self.resource_type,
			resource_id: self.resource_id,
			action: self.action.unwrap_or_else(|| self.event_type.to_string()),
			matched_rule: self.matched_rule,
			details: self.details,
			request_id: self.request_id,
		}
	}
}
