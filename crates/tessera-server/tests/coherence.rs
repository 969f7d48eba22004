// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

mod common;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use common::{ctx, harness, harness_with};
use tessera_config_core::{ConfigKey, ConfigValue, Environment, ResolvedValue};
use tessera_server::{TesseraBuilder, WriteOptions};
use tessera_server_cache::{InMemoryBus, InMemorySharedTier};
use tessera_server_auth::RulePolicy;
use tessera_server_config::{CryptoConfig, ServerConfig};
use tessera_server_db::InMemoryStore;
use tessera_server_secrets::{KeyHierarchy, LocalKms};
use tokio_util::sync::CancellationToken;

fn key(name: &str, environment: Environment) -> ConfigKey {
	ConfigKey::new("t1", "svc", name, environment)
}

#[tokio::test]
async fn reads_follow_writes_on_the_same_instance() {
	let h = harness().await;
	let service = h.tessera.service();
	let timeout = key("timeout", Environment::Production);

	for n in 1..=20 {
		service
			.put(
				&h.editor,
				&timeout,
				ConfigValue::Integer(n),
				WriteOptions::default(),
				&ctx(),
			)
			.await
			.unwrap();
		let read = service.get(&h.editor, &timeout, &ctx()).await.unwrap();
		assert_eq!(read.value, ResolvedValue::Integer(n));
	}
}

#[tokio::test]
async fn lower_layer_writes_reach_cached_higher_layers() {
	let h = harness().await;
	let service = h.tessera.service();
	let mut global = BTreeMap::new();
	global.insert("pool".to_string(), ConfigValue::Integer(5));
	global.insert("host".to_string(), ConfigValue::String("db".into()));
	let mut production = BTreeMap::new();
	production.insert("pool".to_string(), ConfigValue::Integer(50));

	let db_global = key("db", Environment::Global);
	let db_production = key("db", Environment::Production);
	service
		.put(&h.editor, &db_global, ConfigValue::Object(global.clone()), WriteOptions::default(), &ctx())
		.await
		.unwrap();
	service
		.put(&h.editor, &db_production, ConfigValue::Object(production), WriteOptions::default(), &ctx())
		.await
		.unwrap();
	let merged = service.get(&h.editor, &db_production, &ctx()).await.unwrap();
	assert_eq!(merged.layers.len(), 2);

	global.insert("host".to_string(), ConfigValue::String("db-replica".into()));
	service
		.put(&h.editor, &db_global, ConfigValue::Object(global), WriteOptions::default(), &ctx())
		.await
		.unwrap();

	let merged = service.get(&h.editor, &db_production, &ctx()).await.unwrap();
	let object = match &merged.value {
		ResolvedValue::Object(object) => object,
		other => panic!("expected an object, got {other:?}"),
	};
	assert_eq!(object["host"], ResolvedValue::String("db-replica".into()));
	assert_eq!(object["pool"], ResolvedValue::Integer(50));
}

#[tokio::test]
async fn concurrent_writers_produce_gap_free_versions() {
	let h = harness().await;
	let service = Arc::clone(h.tessera.service());
	let counter = key("counter", Environment::Production);

	let mut tasks = Vec::new();
	for writer in 0..8 {
		let service = Arc::clone(&service);
		let counter = counter.clone();
		let actor = h.editor.clone();
		tasks.push(tokio::spawn(async move {
			for n in 0..10 {
				service
					.put(
						&actor,
						&counter,
						ConfigValue::Integer(writer * 100 + n),
						WriteOptions::default(),
						&ctx(),
					)
					.await
					.unwrap();
			}
		}));
	}
	for task in tasks {
		task.await.unwrap();
	}

	let history = service.history(&h.editor, &counter, &ctx()).await.unwrap();
	let numbers: Vec<u64> = history.iter().map(|v| v.version_number).collect();
	assert_eq!(numbers, (1..=80).collect::<Vec<u64>>());
}

#[tokio::test]
async fn writes_on_one_instance_reach_another() {
	let durable = Arc::new(InMemoryStore::new());
	let shared = Arc::new(InMemorySharedTier::new());
	let bus = Arc::new(InMemoryBus::new());
	let keys = Arc::new(KeyHierarchy::new(Arc::new(LocalKms::new()), &CryptoConfig::default()));

	let wire = |config: ServerConfig, policy: Arc<RulePolicy>| {
		TesseraBuilder::new(config, policy)
			.durable_store(durable.clone())
			.shared_tier(shared.clone())
			.transport(bus.clone())
			.key_hierarchy(keys.clone())
	};
	let a = harness_with(&wire).await;
	let b = harness_with(&wire).await;

	let shutdown = CancellationToken::new();
	let mut handles = a.tessera.start(shutdown.clone()).await.unwrap();
	handles.extend(b.tessera.start(shutdown.clone()).await.unwrap());

	let timeout = key("timeout", Environment::Production);
	a.tessera
		.service()
		.put(&a.editor, &timeout, ConfigValue::Integer(30), WriteOptions::default(), &ctx())
		.await
		.unwrap();
	let read = b.tessera.service().get(&b.editor, &timeout, &ctx()).await.unwrap();
	assert_eq!(read.value, ResolvedValue::Integer(30));

	a.tessera
		.service()
		.put(&a.editor, &timeout, ConfigValue::Integer(45), WriteOptions::default(), &ctx())
		.await
		.unwrap();

	let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
	loop {
		let read = b.tessera.service().get(&b.editor, &timeout, &ctx()).await.unwrap();
		if read.value == ResolvedValue::Integer(45) {
			break;
		}
		assert!(tokio::time::Instant::now() < deadline, "instance b kept a stale value");
		tokio::time::sleep(Duration::from_millis(10)).await;
	}

	shutdown.cancel();
	for handle in handles {
		handle.await.unwrap();
	}
}
