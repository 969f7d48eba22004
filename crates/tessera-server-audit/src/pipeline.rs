// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::Arc;

use tessera_common_secret::REDACTED;
use tokio::sync::mpsc;
use tracing::{instrument, warn};

use crate::enrichment::{AuditEnricher, EnrichedAuditEvent, NoopEnricher};
use crate::error::{AuditError, AuditResult};
use crate::event::{AuditLogEntry, AuditSeverity};
use crate::filter::AuditFilterConfig;
use crate::sink::AuditSink;
use tessera_server_config::{AuditConfig, QueueOverflowPolicy};

/// Detail keys whose values are always replaced with [`REDACTED`].
const SENSITIVE_KEYS: &[&str] = &[
	"value",
	"plaintext",
	"password",
	"secret",
	"token",
	"dek",
	"kek_material",
	"key_material",
];

fn redact_details(value: &mut serde_json::Value) {
	match value {
		serde_json::Value::Object(map) => {
			for (key, v) in map.iter_mut() {
				let lowered = key.to_ascii_lowercase();
				if SENSITIVE_KEYS.iter().any(|s| lowered == *s) {
					*v = serde_json::Value::String(REDACTED.to_string());
				} else {
					redact_details(v);
				}
			}
		}
		serde_json::Value::Array(items) => items.iter_mut().for_each(redact_details),
		_ => {}
	}
}

/// Non-blocking audit emitter.
///
/// Events are queued on a bounded channel; a background task enriches, filters,
/// redacts and fans them out to every sink.
pub struct AuditService {
	tx: mpsc::Sender<AuditLogEntry>,
	overflow_policy: QueueOverflowPolicy,
	enabled: bool,
}

impl AuditService {
	pub fn new(
		enricher: Arc<dyn AuditEnricher>,
		global_filter: AuditFilterConfig,
		queue_capacity: usize,
		overflow_policy: QueueOverflowPolicy,
		sinks: Vec<Arc<dyn AuditSink>>,
	) -> Self {
		let (tx, rx) = mpsc::channel(queue_capacity.max(1));

		tokio::spawn(Self::background_task(rx, enricher, global_filter, sinks));

		Self {
			tx,
			overflow_policy,
			enabled: true,
		}
	}

	/// Builds a service from the `audit` configuration section.
	pub fn from_config(
		config: &AuditConfig,
		enricher: Arc<dyn AuditEnricher>,
		sinks: Vec<Arc<dyn AuditSink>>,
	) -> AuditResult<Self> {
		let min_severity = AuditSeverity::parse(&config.min_severity).ok_or_else(|| {
			AuditError::ConfigError(format!("unknown severity '{}'", config.min_severity))
		})?;
		let mut service = Self::new(
			enricher,
			AuditFilterConfig::with_min_severity(min_severity),
			config.queue_capacity,
			config.queue_overflow_policy,
			sinks,
		);
		service.enabled = config.enabled;
		Ok(service)
	}

	/// A service with a single sink and no filtering. Convenient for tests.
	pub fn with_sink(sink: Arc<dyn AuditSink>) -> Self {
		Self::new(
			Arc::new(NoopEnricher),
			AuditFilterConfig::default(),
			1024,
			QueueOverflowPolicy::DropNewest,
			vec![sink],
		)
	}

	async fn background_task(
		mut rx: mpsc::Receiver<AuditLogEntry>,
		enricher: Arc<dyn AuditEnricher>,
		global_filter: AuditFilterConfig,
		sinks: Vec<Arc<dyn AuditSink>>,
	) {
		while let Some(entry) = rx.recv().await {
			let mut enriched: EnrichedAuditEvent = enricher.enrich(entry).await;

			if !global_filter.allows(&enriched) {
				continue;
			}

			redact_details(&mut enriched.base.details);

			let event = Arc::new(enriched);

			for sink in &sinks {
				if !sink.filter().allows(&event) {
					continue;
				}

				let sink = Arc::clone(sink);
				let event = Arc::clone(&event);

				tokio::spawn(async move {
					if let Err(e) = sink.publish(Arc::clone(&event)).await {
						warn!(
							sink = sink.name(),
							error = %e,
							event_type = %event.base.event_type,
							resource_id = event.base.resource_id.as_deref(),
							"audit sink publish failed"
						);
					}
				});
			}
		}
	}

	/// Queue an audit event for processing.
	///
	/// Returns `true` if the event was queued. A rejected event is written to
	/// the local log so its loss is never silent.
	///
	/// # Overflow Policy Behavior
	///
	/// - `Block`: Spawns a task to send (non-blocking to caller, but event will be sent)
	/// - `DropNewest`: Uses try_send, drops new events when queue is full
	/// - `DropOldest`: Currently behaves like DropNewest (drops new events when full)
	#[instrument(skip(self, entry), fields(event_type = %entry.event_type))]
	pub fn log(&self, entry: AuditLogEntry) -> bool {
		if !self.enabled {
			return false;
		}
		match self.overflow_policy {
			QueueOverflowPolicy::Block => {
				let tx = self.tx.clone();
				tokio::spawn(async move {
					if let Err(e) = tx.send(entry).await {
						log_lost_event(&e.0, "audit pipeline closed");
					}
				});
				true
			}
			QueueOverflowPolicy::DropNewest | QueueOverflowPolicy::DropOldest => {
				match self.tx.try_send(entry) {
					Ok(()) => true,
					Err(mpsc::error::TrySendError::Full(entry)) => {
						log_lost_event(&entry, "audit queue full");
						false
					}
					Err(mpsc::error::TrySendError::Closed(entry)) => {
						log_lost_event(&entry, "audit pipeline closed");
						false
					}
				}
			}
		}
	}

	pub async fn log_blocking(&self, entry: AuditLogEntry) -> AuditResult<()> {
		self.tx.send(entry).await.map_err(|e| {
			log_lost_event(&e.0, "audit pipeline closed");
			AuditError::Shutdown
		})
	}
}

fn log_lost_event(entry: &AuditLogEntry, reason: &str) {
	warn!(
		target: "tessera::audit::fallback",
		audit_id = %entry.id,
		event_type = %entry.event_type,
		severity = %entry.severity,
		tenant_id = entry.tenant_id.as_deref(),
		actor_id = entry.actor_id.as_deref(),
		resource_id = entry.resource_id.as_deref(),
		reason,
		"audit event not delivered"
	);
}
