// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

mod common;

use std::time::Duration;

use common::{ctx, db_pass, harness};
use tessera_config_core::{ActorId, ConfigKey, ConfigValue, Environment, ErrorKind};
use tessera_server::WriteOptions;
use tessera_server_audit::AuditEventType;
use tessera_server_auth::{Action, Rule, DEFAULT_DENY_RULE};

fn timeout_key() -> ConfigKey {
	ConfigKey::new("t1", "svc", "timeout", Environment::Production)
}

#[tokio::test]
async fn unknown_actor_is_denied_without_naming_the_rule() {
	let h = harness().await;
	let service = h.tessera.service();
	service
		.put(
			&h.editor,
			&timeout_key(),
			ConfigValue::Integer(30),
			WriteOptions::default(),
			&ctx(),
		)
		.await
		.unwrap();

	let stranger = ActorId::new("mallory");
	let err = service
		.get(&stranger, &timeout_key(), &ctx())
		.await
		.unwrap_err();

	assert_eq!(err.kind(), ErrorKind::Forbidden);
	assert!(!err.to_string().contains(DEFAULT_DENY_RULE));

	let denied = h
		.audit
		.wait_for(AuditEventType::AccessDenied, 1, Duration::from_secs(1))
		.await;
	let entry = denied
		.iter()
		.find(|e| e.actor_id.as_deref() == Some("mallory"))
		.unwrap();
	assert_eq!(entry.matched_rule.as_deref(), Some(DEFAULT_DENY_RULE));
}

#[tokio::test]
async fn explicit_deny_beats_role_allow() {
	let h = harness().await;
	let service = h.tessera.service();
	let key = db_pass();
	service
		.put_secret(&h.editor, &key, b"pw123", WriteOptions::default(), &ctx())
		.await
		.unwrap();

	h.policy
		.add_rule(Rule::deny(
			"freeze-db-secrets",
			"deploy-bot",
			"secret:t1/svc/db_*",
			&[Action::Write],
		))
		.await;

	let err = service
		.put_secret(&h.editor, &key, b"pw999", WriteOptions::default(), &ctx())
		.await
		.unwrap_err();
	assert_eq!(err.kind(), ErrorKind::Forbidden);
	assert!(!err.to_string().contains("freeze-db-secrets"));

	// Reads stay allowed; the deny covers writes only.
	let read = service.get(&h.editor, &key, &ctx()).await.unwrap();
	assert_eq!(common::secret_of(&read.value), b"pw123");
}

#[tokio::test]
async fn viewers_read_config_but_never_secrets() {
	let h = harness().await;
	let service = h.tessera.service();
	service
		.put(
			&h.editor,
			&timeout_key(),
			ConfigValue::Integer(30),
			WriteOptions::default(),
			&ctx(),
		)
		.await
		.unwrap();
	service
		.put_secret(&h.editor, &db_pass(), b"pw123", WriteOptions::default(), &ctx())
		.await
		.unwrap();

	let read = service.get(&h.viewer, &timeout_key(), &ctx()).await.unwrap();
	assert_eq!(read.value, tessera_config_core::ResolvedValue::Integer(30));

	let err = service
		.get(&h.viewer, &db_pass(), &ctx())
		.await
		.unwrap_err();
	assert_eq!(err.kind(), ErrorKind::Forbidden);
	assert!(!format!("{err:?}").contains("pw123"));

	let write = service
		.put(
			&h.viewer,
			&timeout_key(),
			ConfigValue::Integer(5),
			WriteOptions::default(),
			&ctx(),
		)
		.await
		.unwrap_err();
	assert_eq!(write.kind(), ErrorKind::Forbidden);
}

#[tokio::test]
async fn anonymous_callers_are_unauthorized() {
	let h = harness().await;
	let err = h
		.tessera
		.service()
		.get(&ActorId::anonymous(), &timeout_key(), &ctx())
		.await
		.unwrap_err();
	assert_eq!(err.kind(), ErrorKind::Unauthorized);
}

#[tokio::test]
async fn tenants_cannot_reach_each_other() {
	let h = harness().await;
	let service = h.tessera.service();
	service
		.put_secret(&h.editor, &db_pass(), b"pw123", WriteOptions::default(), &ctx())
		.await
		.unwrap();

	let foreign = ConfigKey::new("t2", "svc", "db_pass", Environment::Production);
	let err = service
		.put_secret(&h.admin, &foreign, b"pw000", WriteOptions::default(), &ctx())
		.await
		.unwrap_err();
	assert_eq!(err.kind(), ErrorKind::Forbidden);

	let err = service
		.rotate_tenant_key(&h.editor, &"t1".into(), &ctx())
		.await
		.unwrap_err();
	assert_eq!(err.kind(), ErrorKind::Forbidden);
}

#[tokio::test]
async fn denied_secret_reads_resolve_nothing() {
	let h = harness().await;
	let service = h.tessera.service();
	let global = ConfigKey::new("t1", "svc", "api_token", Environment::Global);
	service
		.put_secret(&h.editor, &global, b"tok-1", WriteOptions::default(), &ctx())
		.await
		.unwrap();
	service
		.put_secret(&h.editor, &db_pass(), b"pw123", WriteOptions::default(), &ctx())
		.await
		.unwrap();

	// The production key has no entry of its own and inherits the global secret.
	let inherited = global.with_environment(Environment::Production);
	for key in [db_pass(), inherited.clone()] {
		let err = service.get(&h.viewer, &key, &ctx()).await.unwrap_err();
		assert_eq!(err.kind(), ErrorKind::Forbidden);
	}
	assert!(h.tessera.cache().local().is_empty());

	let read = service.get(&h.editor, &inherited, &ctx()).await.unwrap();
	assert_eq!(common::secret_of(&read.value), b"tok-1");
}

#[tokio::test]
async fn listing_returns_only_readable_live_entries() {
	let h = harness().await;
	let service = h.tessera.service();
	let staging = timeout_key().with_environment(Environment::Staging);
	let other_ns = ConfigKey::new("t1", "billing", "currency", Environment::Production);
	let removed = ConfigKey::new("t1", "svc", "legacy", Environment::Production);
	for key in [timeout_key(), staging.clone(), other_ns.clone(), removed.clone()] {
		service
			.put(&h.editor, &key, ConfigValue::Integer(1), WriteOptions::default(), &ctx())
			.await
			.unwrap();
	}
	service
		.delete(&h.editor, &removed, None, &ctx())
		.await
		.unwrap();

	let tenant = "t1".into();
	let all = service
		.list(&h.viewer, &tenant, None, None, &ctx())
		.await
		.unwrap();
	assert_eq!(all.len(), 3);
	assert!(all.iter().all(|e| !e.deleted));

	let svc_prod = service
		.list(&h.viewer, &tenant, Some("svc"), Some(Environment::Production), &ctx())
		.await
		.unwrap();
	let keys: Vec<_> = svc_prod.iter().map(|e| e.key.clone()).collect();
	assert_eq!(keys, vec![timeout_key()]);

	let stranger = service
		.list(&ActorId::new("mallory"), &tenant, None, None, &ctx())
		.await
		.unwrap();
	assert!(stranger.is_empty());

	let err = service
		.list(&ActorId::anonymous(), &tenant, None, None, &ctx())
		.await
		.unwrap_err();
	assert_eq!(err.kind(), ErrorKind::Unauthorized);

	let err = service
		.list(&h.viewer, &"bad tenant".into(), None, None, &ctx())
		.await
		.unwrap_err();
	assert_eq!(err.kind(), ErrorKind::InvalidInput);
}
