// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Process-local LRU tier.

use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use lru::LruCache;
use tessera_config_core::ConfigKey;
use tessera_server_resolve::Resolution;

use crate::pattern::InvalidationPattern;

struct LocalEntry {
	resolution: Arc<Resolution>,
	expires_at: Instant,
}

struct Inner {
	entries: LruCache<ConfigKey, LocalEntry>,
	/// Template dependency -> cached keys whose value was rendered from it.
	dependents: HashMap<ConfigKey, HashSet<ConfigKey>>,
	/// Bumped by every invalidation.
	epoch: u64,
}

impl Inner {
	fn remove(&mut self, key: &ConfigKey) -> bool {
		match self.entries.pop(key) {
			Some(entry) => {
				self.unlink(key, &entry.resolution);
				true
			}
			None => false,
		}
	}

	/// Drops `key` from the dependent sets of everything it was rendered from.
	fn unlink(&mut self, key: &ConfigKey, resolution: &Resolution) {
		for dependency in &resolution.dependencies {
			if let Some(dependents) = self.dependents.get_mut(dependency) {
				dependents.remove(key);
				if dependents.is_empty() {
					self.dependents.remove(dependency);
				}
			}
		}
	}
}

/// Bounded, TTL-limited cache of resolutions.
///
/// A fill records the epoch observed before resolving and is discarded if
/// an invalidation ran in the meantime, so a slow miss can never reinsert a
/// value older than a completed write.
pub struct LocalTier {
	inner: Mutex<Inner>,
	ttl: Duration,
}

impl LocalTier {
	pub fn new(capacity: usize, ttl: Duration) -> Self {
		let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
		Self {
			inner: Mutex::new(Inner {
				entries: LruCache::new(capacity),
				dependents: HashMap::new(),
				epoch: 0,
			}),
			ttl,
		}
	}

	pub fn get(&self, key: &ConfigKey) -> Option<Arc<Resolution>> {
		self.get_at(key, Instant::now())
	}

	pub(crate) fn get_at(&self, key: &ConfigKey, now: Instant) -> Option<Arc<Resolution>> {
		let mut inner = self.lock();
		match inner.entries.get(key) {
			Some(entry) if entry.expires_at > now => Some(Arc::clone(&entry.resolution)),
			Some(_) => {
				inner.remove(key);
				None
			}
			None => None,
		}
	}

	pub fn epoch(&self) -> u64 {
		self.lock().epoch
	}

	/// Inserts `resolution` unless an invalidation happened after `epoch`.
	/// Returns whether the entry was stored.
	pub fn insert_if_current(&self, epoch: u64, resolution: Arc<Resolution>) -> bool {
		self.insert_at(epoch, resolution, Instant::now())
	}

	pub(crate) fn insert_at(&self, epoch: u64, resolution: Arc<Resolution>, now: Instant) -> bool {
		let mut inner = self.lock();
		if inner.epoch != epoch {
			return false;
		}
		let key = resolution.key.clone();
		inner.remove(&key);
		for dependency in &resolution.dependencies {
			inner
				.dependents
				.entry(dependency.clone())
				.or_default()
				.insert(key.clone());
		}
		let evicted = inner.entries.push(
			key,
			LocalEntry {
				resolution,
				expires_at: now + self.ttl,
			},
		);
		if let Some((evicted_key, entry)) = evicted {
			inner.unlink(&evicted_key, &entry.resolution);
		}
		true
	}

	/// Removes every entry matching `pattern`, and every entry rendered from a
	/// matching key. Returns the number of entries removed.
	pub fn invalidate(&self, pattern: &InvalidationPattern) -> usize {
		let mut inner = self.lock();
		inner.epoch = inner.epoch.wrapping_add(1);

		let mut doomed: HashSet<ConfigKey> = inner
			.entries
			.iter()
			.map(|(key, _)| key)
			.filter(|key| pattern.matches(key))
			.cloned()
			.collect();

		let matching_dependencies: Vec<ConfigKey> = inner
			.dependents
			.keys()
			.filter(|dependency| pattern.matches(dependency))
			.cloned()
			.collect();
		for dependency in matching_dependencies {
			if let Some(dependents) = inner.dependents.remove(&dependency) {
				doomed.extend(dependents);
			}
		}

		let mut removed = 0;
		for key in &doomed {
			if inner.remove(key) {
				removed += 1;
			}
		}
		removed
	}

	pub fn clear(&self) {
		let mut inner = self.lock();
		inner.epoch = inner.epoch.wrapping_add(1);
		inner.entries.clear();
		inner.dependents.clear();
	}

	pub fn len(&self) -> usize {
		self.lock().entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	fn lock(&self) -> MutexGuard<'_, Inner> {
		self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::collections::BTreeSet;
	use tessera_config_core::{Environment, ResolvedValue};

	fn key(name: &str) -> ConfigKey {
		ConfigKey::new("t1", "svc", name, Environment::Production)
	}

	fn resolution(name: &str, deps: &[&str]) -> Arc<Resolution> {
		Arc::new(Resolution {
			key: key(name),
			value: ResolvedValue::String(name.to_string()),
			layers: vec![(Environment::Production, 1)],
			dependencies: deps.iter().map(|d| key(d)).collect::<BTreeSet<_>>(),
		})
	}

	#[test]
	fn entries_expire() {
		let tier = LocalTier::new(10, Duration::from_secs(60));
		let now = Instant::now();
		assert!(tier.insert_at(0, resolution("a", &[]), now));

		assert!(tier.get_at(&key("a"), now + Duration::from_secs(59)).is_some());
		assert!(tier.get_at(&key("a"), now + Duration::from_secs(61)).is_none());
		assert!(tier.is_empty());
	}

	#[test]
	fn least_recently_used_is_evicted() {
		let tier = LocalTier::new(2, Duration::from_secs(60));
		tier.insert_if_current(0, resolution("a", &[]));
		tier.insert_if_current(0, resolution("b", &[]));
		tier.get(&key("a"));
		tier.insert_if_current(0, resolution("c", &[]));

		assert!(tier.get(&key("a")).is_some());
		assert!(tier.get(&key("b")).is_none());
		assert!(tier.get(&key("c")).is_some());
	}

	#[test]
	fn stale_fill_is_discarded() {
		let tier = LocalTier::new(10, Duration::from_secs(60));
		let epoch = tier.epoch();
		tier.invalidate(&InvalidationPattern::scope_of(&key("a")));

		assert!(!tier.insert_if_current(epoch, resolution("a", &[])));
		assert!(tier.get(&key("a")).is_none());
		assert!(tier.insert_if_current(tier.epoch(), resolution("a", &[])));
	}

	#[test]
	fn invalidating_a_dependency_drops_dependents() {
		let tier = LocalTier::new(10, Duration::from_secs(60));
		tier.insert_if_current(0, resolution("host", &[]));
		tier.insert_if_current(0, resolution("url", &["host", "port"]));
		tier.insert_if_current(0, resolution("other", &[]));

		let removed = tier.invalidate(&InvalidationPattern::scope_of(&key("host")));
		assert_eq!(removed, 2);
		assert!(tier.get(&key("url")).is_none());
		assert!(tier.get(&key("other")).is_some());
	}

	#[test]
	fn repeated_invalidation_is_a_no_op() {
		let tier = LocalTier::new(10, Duration::from_secs(60));
		tier.insert_if_current(0, resolution("a", &[]));
		let pattern = InvalidationPattern::Exact(key("a"));
		assert_eq!(tier.invalidate(&pattern), 1);
		assert_eq!(tier.invalidate(&pattern), 0);
		assert_eq!(tier.invalidate(&InvalidationPattern::All), 0);
	}

	#[test]
	fn zero_capacity_is_clamped() {
		let tier = LocalTier::new(0, Duration::from_secs(1));
		tier.insert_if_current(0, resolution("a", &[]));
		assert_eq!(tier.len(), 1);
	}

	#[test]
	fn evicted_and_expired_entries_leave_no_dependency_links() {
		let tier = LocalTier::new(1, Duration::from_secs(60));
		let now = Instant::now();
		tier.insert_at(0, resolution("url", &["host", "port"]), now);
		tier.insert_at(0, resolution("dsn", &["user"]), now);

		assert!(tier.get_at(&key("url"), now).is_none());
		{
			let inner = tier.lock();
			assert_eq!(inner.dependents.len(), 1);
			assert!(inner.dependents.contains_key(&key("user")));
		}

		assert!(tier.get_at(&key("dsn"), now + Duration::from_secs(61)).is_none());
		assert!(tier.lock().dependents.is_empty());

		// Replacing an entry forgets what the old value was rendered from.
		tier.insert_at(0, resolution("dsn", &["user"]), now);
		tier.insert_at(0, resolution("dsn", &["pass"]), now);
		let inner = tier.lock();
		assert_eq!(inner.dependents.keys().cloned().collect::<Vec<_>>(), vec![key("pass")]);
	}
}
