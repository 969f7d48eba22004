// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Shared tier reachable from every instance.
//!
//! Only plaintext-free resolutions reach this tier: a value carrying a
//! decrypted secret, or rendered from other keys, stays process-local.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tessera_config_core::{Environment, ResolvedValue};
use tessera_server_resolve::Resolution;

use crate::error::Result;

#[async_trait]
pub trait SharedTier: Send + Sync {
	fn name(&self) -> &str;

	async fn get(&self, id: &str) -> Result<Option<Vec<u8>>>;

	async fn put(&self, id: &str, bytes: Vec<u8>, ttl: Duration) -> Result<()>;

	/// Removes every entry whose id starts with `prefix`.
	async fn delete_prefix(&self, prefix: &str) -> Result<usize>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum SharedValue {
	Bytes(Vec<u8>),
	String(String),
	Integer(i64),
	Float(f64),
	Boolean(bool),
	Array(Vec<SharedValue>),
	Object(BTreeMap<String, SharedValue>),
}

impl SharedValue {
	/// `None` if the value holds a secret anywhere.
	pub fn from_resolved(value: &ResolvedValue) -> Option<Self> {
		Some(match value {
			ResolvedValue::Bytes(b) => SharedValue::Bytes(b.clone()),
			ResolvedValue::String(s) => SharedValue::String(s.clone()),
			ResolvedValue::Integer(i) => SharedValue::Integer(*i),
			ResolvedValue::Float(f) => SharedValue::Float(*f),
			ResolvedValue::Boolean(b) => SharedValue::Boolean(*b),
			ResolvedValue::Array(items) => SharedValue::Array(
				items
					.iter()
					.map(SharedValue::from_resolved)
					.collect::<Option<Vec<_>>>()?,
			),
			ResolvedValue::Object(fields) => SharedValue::Object(
				fields
					.iter()
					.map(|(k, v)| SharedValue::from_resolved(v).map(|v| (k.clone(), v)))
					.collect::<Option<BTreeMap<_, _>>>()?,
			),
			ResolvedValue::Secret(_) => return None,
		})
	}

	pub fn into_resolved(self) -> ResolvedValue {
		match self {
			SharedValue::Bytes(b) => ResolvedValue::Bytes(b),
			SharedValue::String(s) => ResolvedValue::String(s),
			SharedValue::Integer(i) => ResolvedValue::Integer(i),
			SharedValue::Float(f) => ResolvedValue::Float(f),
			SharedValue::Boolean(b) => ResolvedValue::Boolean(b),
			SharedValue::Array(items) => {
				ResolvedValue::Array(items.into_iter().map(SharedValue::into_resolved).collect())
			}
			SharedValue::Object(fields) => ResolvedValue::Object(
				fields
					.into_iter()
					.map(|(k, v)| (k, v.into_resolved()))
					.collect(),
			),
		}
	}
}

/// Serialized form of a resolution in the shared tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharedEntry {
	pub value: SharedValue,
	pub layers: Vec<(Environment, u64)>,
}

impl SharedEntry {
	/// `None` for resolutions that must not leave the process.
	pub fn from_resolution(resolution: &Resolution) -> Option<Self> {
		if !resolution.dependencies.is_empty() {
			return None;
		}
		Some(Self {
			value: SharedValue::from_resolved(&resolution.value)?,
			layers: resolution.layers.clone(),
		})
	}

	pub fn into_resolution(self, key: tessera_config_core::ConfigKey) -> Resolution {
		Resolution {
			key,
			value: self.value.into_resolved(),
			layers: self.layers,
			dependencies: Default::default(),
		}
	}
}

struct Stored {
	bytes: Arc<Vec<u8>>,
	expires_at: Instant,
}

/// Single-process stand-in for a networked key-value tier.
#[derive(Default)]
pub struct InMemorySharedTier {
	entries: DashMap<String, Stored>,
}

impl InMemorySharedTier {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}
}

#[async_trait]
impl SharedTier for InMemorySharedTier {
	fn name(&self) -> &str {
		"memory"
	}

	async fn get(&self, id: &str) -> Result<Option<Vec<u8>>> {
		let now = Instant::now();
		let hit = match self.entries.get(id) {
			Some(stored) if stored.expires_at > now => Some(stored.bytes.as_ref().clone()),
			Some(_) => None,
			None => return Ok(None),
		};
		if hit.is_none() {
			self.entries.remove_if(id, |_, stored| stored.expires_at <= now);
		}
		Ok(hit)
	}

	async fn put(&self, id: &str, bytes: Vec<u8>, ttl: Duration) -> Result<()> {
		self.entries.insert(
			id.to_string(),
			Stored {
				bytes: Arc::new(bytes),
				expires_at: Instant::now() + ttl,
			},
		);
		Ok(())
	}

	async fn delete_prefix(&self, prefix: &str) -> Result<usize> {
		let before = self.entries.len();
		self.entries.retain(|id, _| !id.starts_with(prefix));
		Ok(before.saturating_sub(self.entries.len()))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::collections::BTreeSet;
	use tessera_common_secret::SecretBytes;
	use tessera_config_core::ConfigKey;

	fn key() -> ConfigKey {
		ConfigKey::new("t1", "svc", "db", Environment::Production)
	}

	fn resolution(value: ResolvedValue) -> Resolution {
		Resolution {
			key: key(),
			value,
			layers: vec![(Environment::Global, 3), (Environment::Production, 1)],
			dependencies: BTreeSet::new(),
		}
	}

	#[test]
	fn secrets_never_become_shared() {
		let nested = ResolvedValue::Object(BTreeMap::from([
			("host".to_string(), ResolvedValue::String("db".into())),
			(
				"password".to_string(),
				ResolvedValue::Secret(SecretBytes::new(b"pw123".to_vec())),
			),
		]));
		assert!(SharedEntry::from_resolution(&resolution(nested)).is_none());
	}

	#[test]
	fn rendered_values_stay_local() {
		let mut rendered = resolution(ResolvedValue::String("db:5432".into()));
		rendered.dependencies.insert(key().sibling("port"));
		assert!(SharedEntry::from_resolution(&rendered).is_none());
	}

	#[test]
	fn plain_values_survive_serialization() {
		let original = resolution(ResolvedValue::Object(BTreeMap::from([
			("pool".to_string(), ResolvedValue::Integer(10)),
			(
				"hosts".to_string(),
				ResolvedValue::Array(vec![ResolvedValue::String("a".into())]),
			),
		])));
		let entry = SharedEntry::from_resolution(&original).unwrap();
		let bytes = serde_json::to_vec(&entry).unwrap();
		let back: SharedEntry = serde_json::from_slice(&bytes).unwrap();
		assert_eq!(back.into_resolution(key()), original);
	}

	#[tokio::test]
	async fn expired_entries_are_misses() {
		let tier = InMemorySharedTier::new();
		tier.put("t1/svc/db@production", b"x".to_vec(), Duration::ZERO)
			.await
			.unwrap();
		assert_eq!(tier.get("t1/svc/db@production").await.unwrap(), None);
		assert!(tier.is_empty());
	}

	#[tokio::test]
	async fn delete_prefix_removes_matching_ids() {
		let tier = InMemorySharedTier::new();
		let ttl = Duration::from_secs(60);
		for id in ["t1/svc/db@global", "t1/svc/db@edge", "t1/svc/dbx@edge", "t2/svc/db@edge"] {
			tier.put(id, vec![1], ttl).await.unwrap();
		}
		assert_eq!(tier.delete_prefix("t1/svc/db@").await.unwrap(), 2);
		assert_eq!(tier.len(), 2);
		assert_eq!(tier.delete_prefix("").await.unwrap(), 2);
	}
}
