// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use serde::{Deserialize, Serialize};

use crate::enrichment::EnrichedAuditEvent;
use crate::event::{AuditEventType, AuditSeverity};

/// Selects which events reach the pipeline or an individual sink.
///
/// Security events bypass `min_severity` but still honour explicit exclusions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditFilterConfig {
	pub min_severity: AuditSeverity,
	pub include_events: Option<Vec<AuditEventType>>,
	pub exclude_events: Option<Vec<AuditEventType>>,
}

impl Default for AuditFilterConfig {
	fn default() -> Self {
		Self {
			min_severity: AuditSeverity::Debug,
			include_events: None,
			exclude_events: None,
		}
	}
}

impl AuditFilterConfig {
	pub fn with_min_severity(min_severity: AuditSeverity) -> Self {
		Self {
			min_severity,
			..Default::default()
		}
	}

	pub fn allows(&self, event: &EnrichedAuditEvent) -> bool {
		let entry = &event.base;

		if let Some(excluded) = &self.exclude_events {
			if excluded.contains(&entry.event_type) {
				return false;
			}
		}
		if let Some(included) = &self.include_events {
			if !included.contains(&entry.event_type) {
				return false;
			}
		}

		entry.event_type.is_security_event() || entry.severity >= self.min_severity
	}
}
