// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::enrichment::EnrichedAuditEvent;
use crate::error::AuditSinkError;
use crate::event::{AuditEventType, AuditLogEntry};
use crate::filter::AuditFilterConfig;
use crate::sink::AuditSink;

/// Keeps published events in memory. Used by tests and local tooling.
#[derive(Default)]
pub struct MemoryAuditSink {
	filter: AuditFilterConfig,
	events: Mutex<Vec<AuditLogEntry>>,
}

impl MemoryAuditSink {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn events(&self) -> Vec<AuditLogEntry> {
		self.events
			.lock()
			.map(|events| events.clone())
			.unwrap_or_default()
	}

	pub fn events_of(&self, event_type: AuditEventType) -> Vec<AuditLogEntry> {
		self.events()
			.into_iter()
			.filter(|e| e.event_type == event_type)
			.collect()
	}

	/// Polls until at least `count` events of `event_type` arrived or `timeout` elapses.
	pub async fn wait_for(
		&self,
		event_type: AuditEventType,
		count: usize,
		timeout: Duration,
	) -> Vec<AuditLogEntry> {
		let deadline = tokio::time::Instant::now() + timeout;
		loop {
			let found = self.events_of(event_type);
			if found.len() >= count || tokio::time::Instant::now() >= deadline {
				return found;
			}
			tokio::time::sleep(Duration::from_millis(5)).await;
		}
	}
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
	fn name(&self) -> &str {
		"memory"
	}

	fn filter(&self) -> &AuditFilterConfig {
		&self.filter
	}

	async fn publish(&self, event: Arc<EnrichedAuditEvent>) -> Result<(), AuditSinkError> {
		let mut events = self
			.events
			.lock()
			.map_err(|_| AuditSinkError::Permanent("memory sink lock poisoned".to_string()))?;
		events.push(event.base.clone());
		Ok(())
	}
}
