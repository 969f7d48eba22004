// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Bounded, TTL-limited cache of each tenant's active KEK identifier.
//!
//! Only identifiers are cached. KEK material stays inside the provider.

use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use lru::LruCache;
use tessera_config_core::{KekId, TenantId};

#[derive(Clone, Debug)]
struct CachedKek {
	kek_id: KekId,
	expires_at: Instant,
}

pub struct KekCache {
	ttl: Duration,
	inner: Mutex<LruCache<TenantId, CachedKek>>,
}

impl KekCache {
	pub fn new(capacity: usize, ttl: Duration) -> Self {
		let size = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
		Self {
			ttl,
			inner: Mutex::new(LruCache::new(size)),
		}
	}

	pub fn ttl(&self) -> Duration {
		self.ttl
	}

	/// Returns the cached active KEK for a tenant if present and not expired.
	pub fn get(&self, tenant_id: &TenantId) -> Option<KekId> {
		self.get_with_now(tenant_id, Instant::now())
	}

	pub fn insert(&self, tenant_id: TenantId, kek_id: KekId) {
		self.insert_with_now(tenant_id, kek_id, Instant::now());
	}

	pub fn invalidate(&self, tenant_id: &TenantId) {
		self.lock().pop(tenant_id);
	}

	pub fn clear(&self) {
		self.lock().clear();
	}

	pub fn len(&self) -> usize {
		self.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	#[cfg(test)]
	pub(crate) fn get_at(&self, tenant_id: &TenantId, now: Instant) -> Option<KekId> {
		self.get_with_now(tenant_id, now)
	}

	#[cfg(test)]
	pub(crate) fn insert_at(&self, tenant_id: TenantId, kek_id: KekId, now: Instant) {
		self.insert_with_now(tenant_id, kek_id, now);
	}

	fn lock(&self) -> MutexGuard<'_, LruCache<TenantId, CachedKek>> {
		match self.inner.lock() {
			Ok(guard) => guard,
			Err(poisoned) => poisoned.into_inner(),
		}
	}

	fn insert_with_now(&self, tenant_id: TenantId, kek_id: KekId, now: Instant) {
		let entry = CachedKek {
			kek_id,
			expires_at: now + self.ttl,
		};
		self.lock().put(tenant_id, entry);
	}

	fn get_with_now(&self, tenant_id: &TenantId, now: Instant) -> Option<KekId> {
		let mut inner = self.lock();
		match inner.get(tenant_id) {
			Some(entry) if entry.expires_at > now => Some(entry.kek_id.clone()),
			Some(_) => {
				inner.pop(tenant_id);
				None
			}
			None => None,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn returns_inserted_value() {
		let cache = KekCache::new(4, Duration::from_secs(60));
		cache.insert(TenantId::new("t1"), KekId::new("k1"));
		assert_eq!(cache.get(&TenantId::new("t1")), Some(KekId::new("k1")));
		assert_eq!(cache.get(&TenantId::new("t2")), None);
	}

	#[test]
	fn entries_expire_after_ttl() {
		let cache = KekCache::new(4, Duration::from_secs(10));
		let start = Instant::now();
		cache.insert_at(TenantId::new("t1"), KekId::new("k1"), start);

		assert!(cache
			.get_at(&TenantId::new("t1"), start + Duration::from_secs(5))
			.is_some());
		assert!(cache
			.get_at(&TenantId::new("t1"), start + Duration::from_secs(11))
			.is_none());
		assert!(cache.is_empty());
	}

	#[test]
	fn capacity_evicts_least_recently_used() {
		let cache = KekCache::new(2, Duration::from_secs(60));
		cache.insert(TenantId::new("t1"), KekId::new("k1"));
		cache.insert(TenantId::new("t2"), KekId::new("k2"));
		cache.get(&TenantId::new("t1"));
		cache.insert(TenantId::new("t3"), KekId::new("k3"));

		assert!(cache.get(&TenantId::new("t1")).is_some());
		assert!(cache.get(&TenantId::new("t2")).is_none());
		assert!(cache.get(&TenantId::new("t3")).is_some());
	}

	#[test]
	fn invalidate_removes_tenant() {
		let cache = KekCache::new(4, Duration::from_secs(60));
		cache.insert(TenantId::new("t1"), KekId::new("k1"));
		cache.invalidate(&TenantId::new("t1"));
		assert!(cache.get(&TenantId::new("t1")).is_none());
	}

	#[test]
	fn zero_capacity_is_clamped() {
		let cache = KekCache::new(0, Duration::from_secs(60));
		cache.insert(TenantId::new("t1"), KekId::new("k1"));
		assert_eq!(cache.len(), 1);
	}
}
