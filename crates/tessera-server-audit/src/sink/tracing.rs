// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::Arc;

use async_trait::async_trait;

use crate::enrichment::EnrichedAuditEvent;
use crate::error::AuditSinkError;
use crate::event::AuditSeverity;
use crate::filter::AuditFilterConfig;
use crate::sink::AuditSink;

/// Writes audit events to the `tessera::audit` tracing target.
pub struct TracingAuditSink {
	filter: AuditFilterConfig,
}

impl TracingAuditSink {
	pub fn new(filter: AuditFilterConfig) -> Self {
		Self { filter }
	}
}

impl Default for TracingAuditSink {
	fn default() -> Self {
		Self::new(AuditFilterConfig::default())
	}
}

#[async_trait]
impl AuditSink for TracingAuditSink {
	fn name(&self) -> &str {
		"tracing"
	}

	fn filter(&self) -> &AuditFilterConfig {
		&self.filter
	}

	async fn publish(&self, event: Arc<EnrichedAuditEvent>) -> Result<(), AuditSinkError> {
		let entry = &event.base;
		let details = serde_json::to_string(&entry.details)
			.map_err(|e| AuditSinkError::Permanent(format!("failed to serialize details: {e}")))?;

		macro_rules! emit {
			($level:ident) => {
				::tracing::$level!(
					target: "tessera::audit",
					audit_id = %entry.id,
					event_type = %entry.event_type,
					severity = %entry.severity,
					outcome = ?entry.outcome,
					tenant_id = entry.tenant_id.as_deref(),
					actor_id = entry.actor_id.as_deref(),
					resource_type = entry.resource_type.as_deref(),
					resource_id = entry.resource_id.as_deref(),
					matched_rule = entry.matched_rule.as_deref(),
					instance_id = event.instance_id.as_deref(),
					details = %details,
					"{}",
					entry.action
				)
			};
		}

		match entry.severity {
			AuditSeverity::Critical | AuditSeverity::Error => emit!(error),
			AuditSeverity::Warning => emit!(warn),
			AuditSeverity::Notice | AuditSeverity::Info => emit!(info),
			AuditSeverity::Debug => emit!(debug),
		}
		Ok(())
	}
}
