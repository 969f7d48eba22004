// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde::Serialize;
use serde_json::json;
use tessera_config_core::ConfigKey;
use tessera_server_audit::{AuditEventType, AuditLogEntry, AuditOutcome, AuditService};
use tessera_server_config::CacheConfig;
use tessera_server_db::{CommitEvent, CommitListener};
use tessera_server_resolve::{Resolution, ResolutionEngine};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::local::LocalTier;
use crate::pattern::InvalidationPattern;
use crate::shared::{SharedEntry, SharedTier};
use crate::transport::{Delivery, InvalidationMessage, InvalidationTransport};

/// Upper bound for one broadcast retry delay.
const MAX_BROADCAST_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
	pub local_hits: u64,
	pub shared_hits: u64,
	pub misses: u64,
	pub invalidations: u64,
	pub broadcast_failures: u64,
}

#[derive(Default)]
struct Counters {
	local_hits: AtomicU64,
	shared_hits: AtomicU64,
	misses: AtomicU64,
	invalidations: AtomicU64,
	broadcast_failures: AtomicU64,
}

/// Read-through cache in front of [`ResolutionEngine`].
///
/// Reads consult the local tier, then the shared tier, then resolve. Writes
/// invalidate synchronously on this instance and in the shared tier, and
/// broadcast the invalidation to other instances in the background.
pub struct CacheLayer {
	instance: Uuid,
	engine: Arc<ResolutionEngine>,
	local: LocalTier,
	shared: Option<Arc<dyn SharedTier>>,
	transport: Option<Arc<dyn InvalidationTransport>>,
	audit: Option<Arc<AuditService>>,
	config: CacheConfig,
	counters: Arc<Counters>,
}

impl CacheLayer {
	pub fn new(engine: Arc<ResolutionEngine>, config: CacheConfig) -> Self {
		Self {
			instance: Uuid::new_v4(),
			engine,
			local: LocalTier::new(config.local_capacity, config.local_ttl()),
			shared: None,
			transport: None,
			audit: None,
			config,
			counters: Arc::default(),
		}
	}

	pub fn with_shared_tier(mut self, shared: Arc<dyn SharedTier>) -> Self {
		self.shared = Some(shared);
		self
	}

	pub fn with_transport(mut self, transport: Arc<dyn InvalidationTransport>) -> Self {
		self.transport = Some(transport);
		self
	}

	pub fn with_audit(mut self, audit: Arc<AuditService>) -> Self {
		self.audit = Some(audit);
		self
	}

	pub fn instance_id(&self) -> Uuid {
		self.instance
	}

	pub fn local(&self) -> &LocalTier {
		&self.local
	}

	pub fn stats(&self) -> CacheStats {
		CacheStats {
			local_hits: self.counters.local_hits.load(Ordering::Relaxed),
			shared_hits: self.counters.shared_hits.load(Ordering::Relaxed),
			misses: self.counters.misses.load(Ordering::Relaxed),
			invalidations: self.counters.invalidations.load(Ordering::Relaxed),
			broadcast_failures: self.counters.broadcast_failures.load(Ordering::Relaxed),
		}
	}

	/// Commit listener that invalidates this cache. Holds a weak reference so
	/// the store does not keep the cache alive.
	pub fn commit_listener(self: &Arc<Self>) -> Arc<dyn CommitListener> {
		Arc::new(InvalidateOnCommit {
			cache: Arc::downgrade(self),
		})
	}

	#[instrument(skip(self), fields(config_id = %key))]
	pub async fn get(&self, key: &ConfigKey) -> Result<Arc<Resolution>> {
		if let Some(hit) = self.local.get(key) {
			self.counters.local_hits.fetch_add(1, Ordering::Relaxed);
			return Ok(hit);
		}

		let epoch = self.local.epoch();
		let id = key.config_id();

		if let Some(resolution) = self.shared_lookup(&id, key).await {
			self.counters.shared_hits.fetch_add(1, Ordering::Relaxed);
			let resolution = Arc::new(resolution);
			self.local.insert_if_current(epoch, Arc::clone(&resolution));
			return Ok(resolution);
		}

		self.counters.misses.fetch_add(1, Ordering::Relaxed);
		let resolution = Arc::new(self.engine.resolve(key).await?);
		if !self.local.insert_if_current(epoch, Arc::clone(&resolution)) {
			debug!("invalidated during resolve, fill discarded");
			return Ok(resolution);
		}
		self.shared_fill(&id, epoch, &resolution).await;
		Ok(resolution)
	}

	/// Removes matching entries here and in the shared tier, then broadcasts
	/// the pattern to other instances.
	///
	/// Local removal has completed when this returns. A broadcast failure is
	/// retried in the background and never surfaces to the caller.
	#[instrument(skip(self))]
	pub async fn invalidate(&self, pattern: &InvalidationPattern) {
		let removed = self.local.invalidate(pattern);
		self.counters.invalidations.fetch_add(1, Ordering::Relaxed);
		debug!(removed, "local tier invalidated");

		if let Some(shared) = &self.shared {
			if let Err(e) = shared.delete_prefix(&pattern.id_prefix()).await {
				warn!(error = %e, tier = shared.name(), "shared tier invalidation failed");
			}
		}

		self.broadcast(pattern.clone());
	}

	/// Applies invalidations published by other instances until `shutdown`
	/// fires or the transport closes.
	pub async fn spawn_subscriber(
		self: &Arc<Self>,
		shutdown: CancellationToken,
	) -> Result<Option<JoinHandle<()>>> {
		let Some(transport) = &self.transport else {
			return Ok(None);
		};
		let mut deliveries = transport.subscribe(&self.config.invalidation_topic).await?;
		let cache = Arc::clone(self);

		let handle = tokio::spawn(async move {
			info!(instance = %cache.instance, "cache invalidation subscriber started");
			loop {
				tokio::select! {
					_ = shutdown.cancelled() => break,
					delivery = deliveries.next() => match delivery {
						Some(delivery) => cache.apply_delivery(delivery),
						None => {
							warn!("invalidation transport closed, clearing local tier");
							cache.local.clear();
							break;
						}
					},
				}
			}
			info!(instance = %cache.instance, "cache invalidation subscriber stopped");
		});
		Ok(Some(handle))
	}

	/// Applies one delivery. Idempotent: replays and reordering only cause
	/// extra misses.
	pub fn apply_delivery(&self, delivery: Delivery) {
		match delivery {
			Delivery::Payload(bytes) => match serde_json::from_slice::<InvalidationMessage>(&bytes) {
				Ok(message) if message.origin == self.instance => {}
				Ok(message) => {
					let removed = self.local.invalidate(&message.pattern);
					self.counters.invalidations.fetch_add(1, Ordering::Relaxed);
					debug!(origin = %message.origin, removed, "remote invalidation applied");
				}
				Err(e) => {
					warn!(error = %e, "malformed invalidation message, clearing local tier");
					self.local.clear();
				}
			},
			Delivery::Gap => {
				warn!("invalidation messages lost, clearing local tier");
				self.local.clear();
			}
		}
	}

	async fn shared_lookup(&self, id: &str, key: &ConfigKey) -> Option<Resolution> {
		let shared = self.shared.as_ref()?;
		let bytes = match shared.get(id).await {
			Ok(bytes) => bytes?,
			Err(e) => {
				warn!(error = %e, tier = shared.name(), "shared tier read failed");
				return None;
			}
		};
		match serde_json::from_slice::<SharedEntry>(&bytes) {
			Ok(entry) => Some(entry.into_resolution(key.clone())),
			Err(e) => {
				warn!(error = %e, config_id = id, "undecodable shared entry ignored");
				None
			}
		}
	}

	async fn shared_fill(&self, id: &str, epoch: u64, resolution: &Resolution) {
		let Some(shared) = &self.shared else {
			return;
		};
		let Some(entry) = SharedEntry::from_resolution(resolution) else {
			return;
		};
		let bytes = match serde_json::to_vec(&entry) {
			Ok(bytes) => bytes,
			Err(e) => {
				warn!(error = %e, "shared entry serialization failed");
				return;
			}
		};
		if let Err(e) = shared.put(id, bytes, self.config.shared_ttl()).await {
			warn!(error = %e, tier = shared.name(), "shared tier write failed");
			return;
		}
		// An invalidation may have deleted the prefix between resolve and put.
		if self.local.epoch() != epoch {
			if let Err(e) = shared.delete_prefix(id).await {
				warn!(error = %e, tier = shared.name(), "shared tier cleanup failed");
			}
		}
	}

	fn broadcast(&self, pattern: InvalidationPattern) {
		let Some(transport) = self.transport.clone() else {
			return;
		};
		let message = InvalidationMessage {
			origin: self.instance,
			pattern,
		};
		let payload = match serde_json::to_vec(&message) {
			Ok(payload) => payload,
			Err(e) => {
				warn!(error = %e, "invalidation message serialization failed");
				return;
			}
		};

		let topic = self.config.invalidation_topic.clone();
		let attempts = self.config.broadcast_retry_attempts.max(1);
		let base = self.config.broadcast_retry_base();
		let audit = self.audit.clone();
		let counters = Arc::clone(&self.counters);

		tokio::spawn(async move {
			for attempt in 0..attempts {
				let err = match transport.publish(&topic, payload.clone()).await {
					Ok(()) => return,
					Err(e) => e,
				};
				if attempt + 1 < attempts {
					let delay = backoff_delay(base, attempt);
					warn!(
						error = %err,
						attempt = attempt + 1,
						max_attempts = attempts,
						delay_ms = delay.as_millis() as u64,
						"invalidation broadcast failed, retrying"
					);
					tokio::time::sleep(delay).await;
					continue;
				}

				warn!(error = %err, attempts, "invalidation broadcast abandoned");
				counters.broadcast_failures.fetch_add(1, Ordering::Relaxed);
				if let Some(audit) = &audit {
					audit.log(
						AuditLogEntry::builder(AuditEventType::CacheBroadcastFailed)
							.outcome(AuditOutcome::Failure)
							.resource("cache", topic.clone())
							.action("broadcast invalidation")
							.details(json!({
								"attempts": attempts,
								"pattern": message.pattern,
							}))
							.build(),
					);
				}
			}
		});
	}
}

fn backoff_delay(base: Duration, attempt: u32) -> Duration {
	let exponential = base.as_secs_f64() * 2f64.powi(attempt as i32);
	let capped = exponential.min(MAX_BROADCAST_DELAY.as_secs_f64());
	Duration::from_secs_f64(capped * (0.5 + fastrand::f64()))
}

struct InvalidateOnCommit {
	cache: Weak<CacheLayer>,
}

#[async_trait]
impl CommitListener for InvalidateOnCommit {
	async fn on_commit(&self, event: &CommitEvent) {
		if let Some(cache) = self.cache.upgrade() {
			cache
				.invalidate(&InvalidationPattern::scope_of(&event.key))
				.await;
		}
	}
}
