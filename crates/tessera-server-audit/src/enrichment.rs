// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::event::AuditLogEntry;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichedAuditEvent {
	pub base: AuditLogEntry,
	/// Identity of the server instance that produced the event.
	pub instance_id: Option<String>,
}

#[async_trait]
pub trait AuditEnricher: Send + Sync {
	async fn enrich(&self, event: AuditLogEntry) -> EnrichedAuditEvent;
}

#[derive(Debug, Clone, Default)]
pub struct NoopEnricher;

#[async_trait]
impl AuditEnricher for NoopEnricher {
	async fn enrich(&self, event: AuditLogEntry) -> EnrichedAuditEvent {
		EnrichedAuditEvent {
			base: event,
			instance_id: None,
		}
	}
}

/// Stamps every event with the local instance id.
#[derive(Debug, Clone)]
pub struct InstanceEnricher {
	instance_id: String,
}

impl InstanceEnricher {
	pub fn new(instance_id: impl Into<String>) -> Self {
		Self {
			instance_id: instance_id.into(),
		}
	}
}

#[async_trait]
impl AuditEnricher for InstanceEnricher {
	async fn enrich(&self, event: AuditLogEntry) -> EnrichedAuditEvent {
		EnrichedAuditEvent {
			base: event,
			instance_id: Some(self.instance_id.clone()),
		}
	}
}
