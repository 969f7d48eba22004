// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Cross-instance invalidation transport.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{CacheError, Result};
use crate::pattern::InvalidationPattern;

/// Default channel capacity per topic.
const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Item observed by a subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
	Payload(Vec<u8>),
	/// Messages were lost. The subscriber cannot tell which keys changed.
	Gap,
}

/// Publish/subscribe channel shared by every instance.
///
/// Delivery is at-least-once from the publisher's point of view: a publish
/// that returns `Ok` reaches every live subscriber or is reported to it as a
/// [`Delivery::Gap`].
#[async_trait]
pub trait InvalidationTransport: Send + Sync {
	async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()>;

	async fn subscribe(&self, topic: &str) -> Result<BoxStream<'static, Delivery>>;
}

/// Wire format of an invalidation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidationMessage {
	/// Instance that published the message. Instances ignore their own.
	pub origin: Uuid,
	pub pattern: InvalidationPattern,
}

/// In-process bus over tokio broadcast channels, one per topic.
pub struct InMemoryBus {
	channels: DashMap<String, broadcast::Sender<Vec<u8>>>,
	capacity: usize,
	available: AtomicBool,
	published: AtomicU64,
}

impl Default for InMemoryBus {
	fn default() -> Self {
		Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
	}
}

impl InMemoryBus {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_capacity(capacity: usize) -> Self {
		Self {
			channels: DashMap::new(),
			capacity: capacity.max(1),
			available: AtomicBool::new(true),
			published: AtomicU64::new(0),
		}
	}

	/// Simulates an outage: while unavailable every publish fails.
	pub fn set_available(&self, available: bool) {
		self.available.store(available, Ordering::SeqCst);
	}

	/// Successful publishes so far.
	pub fn published(&self) -> u64 {
		self.published.load(Ordering::SeqCst)
	}

	fn sender(&self, topic: &str) -> broadcast::Sender<Vec<u8>> {
		self.channels
			.entry(topic.to_string())
			.or_insert_with(|| broadcast::channel(self.capacity).0)
			.clone()
	}
}

#[async_trait]
impl InvalidationTransport for InMemoryBus {
	async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
		if !self.available.load(Ordering::SeqCst) {
			return Err(CacheError::TransportUnavailable(format!(
				"topic '{topic}' unreachable"
			)));
		}
		// No receivers is not an error: nobody holds anything to invalidate.
		let receivers = self.sender(topic).send(payload).unwrap_or(0);
		self.published.fetch_add(1, Ordering::SeqCst);
		debug!(topic, receivers, "published invalidation");
		Ok(())
	}

	async fn subscribe(&self, topic: &str) -> Result<BoxStream<'static, Delivery>> {
		let receiver = self.sender(topic).subscribe();
		let topic = topic.to_string();
		let deliveries = stream::unfold(receiver, move |mut receiver| {
			let topic = topic.clone();
			async move {
				match receiver.recv().await {
					Ok(payload) => Some((Delivery::Payload(payload), receiver)),
					Err(broadcast::error::RecvError::Lagged(missed)) => {
						warn!(topic, missed, "invalidation subscriber lagged");
						Some((Delivery::Gap, receiver))
					}
					Err(broadcast::error::RecvError::Closed) => None,
				}
			}
		});
		Ok(deliveries.boxed())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn subscribers_receive_published_payloads() {
		let bus = InMemoryBus::new();
		let mut a = bus.subscribe("inv").await.unwrap();
		let mut b = bus.subscribe("inv").await.unwrap();

		bus.publish("inv", b"hello".to_vec()).await.unwrap();

		assert_eq!(a.next().await, Some(Delivery::Payload(b"hello".to_vec())));
		assert_eq!(b.next().await, Some(Delivery::Payload(b"hello".to_vec())));
		assert_eq!(bus.published(), 1);
	}

	#[tokio::test]
	async fn topics_are_isolated() {
		let bus = InMemoryBus::new();
		let mut other = bus.subscribe("other").await.unwrap();
		bus.publish("inv", vec![1]).await.unwrap();
		bus.publish("other", vec![2]).await.unwrap();
		assert_eq!(other.next().await, Some(Delivery::Payload(vec![2])));
	}

	#[tokio::test]
	async fn unavailable_bus_rejects_publish() {
		let bus = InMemoryBus::new();
		bus.set_available(false);
		let err = bus.publish("inv", vec![1]).await.unwrap_err();
		assert!(matches!(err, CacheError::TransportUnavailable(_)));
		assert_eq!(bus.published(), 0);

		bus.set_available(true);
		bus.publish("inv", vec![1]).await.unwrap();
	}

	#[tokio::test]
	async fn overflow_surfaces_as_gap() {
		let bus = InMemoryBus::with_capacity(2);
		let mut sub = bus.subscribe("inv").await.unwrap();
		for i in 0..5u8 {
			bus.publish("inv", vec![i]).await.unwrap();
		}
		assert_eq!(sub.next().await, Some(Delivery::Gap));
		assert_eq!(sub.next().await, Some(Delivery::Payload(vec![3])));
		assert_eq!(sub.next().await, Some(Delivery::Payload(vec![4])));
	}
}
