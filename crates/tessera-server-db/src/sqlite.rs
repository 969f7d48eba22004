// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! SQLite-backed [`DurableStore`] and [`TenantKeyStore`].
//!
//! Appends run in a transaction that re-reads the entry head, so a stale
//! `expected_version` is detected even across processes sharing the database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Sqlite, SqlitePool, Transaction};
use tessera_config_core::{
	ActorId, ConfigEntry, ConfigKey, ConfigValue, ConfigVersion, Environment, KekId, TenantId,
	TenantKey, VersionState,
};

use crate::durable::{select_prunable, AppendRequest, DurableStore};
use crate::error::{Result, StoreError};
use crate::keys::TenantKeyStore;

type EntryRow = (
	String,
	String,
	String,
	String,
	i64,
	String,
	Option<i64>,
	bool,
	DateTime<Utc>,
	DateTime<Utc>,
	String,
	String,
);

type KeyRow = (
	String,
	String,
	String,
	DateTime<Utc>,
	Option<DateTime<Utc>>,
	Option<DateTime<Utc>>,
);

type VersionRow = (
	i64,
	Option<String>,
	String,
	String,
	DateTime<Utc>,
	Option<String>,
	Option<i64>,
	String,
);

const ENTRY_COLUMNS: &str = "tenant_id, namespace, key, environment, current_version, value_type, \
	schema_version, deleted, created_at, updated_at, created_by, updated_by";

const VERSION_COLUMNS: &str = "version_number, payload, change_kind, changed_by, changed_at, \
	change_reason, rollback_target, state";

#[derive(Clone)]
pub struct SqliteStore {
	pool: SqlitePool,
}

impl SqliteStore {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	/// Creates the tables used by this store if they do not exist.
	#[tracing::instrument(skip(self))]
	pub async fn migrate(&self) -> Result<()> {
		sqlx::query(
			r#"
			CREATE TABLE IF NOT EXISTS config_entries (
				config_id TEXT PRIMARY KEY,
				tenant_id TEXT NOT NULL,
				namespace TEXT NOT NULL,
				key TEXT NOT NULL,
				environment TEXT NOT NULL,
				current_version INTEGER NOT NULL,
				value_type TEXT NOT NULL,
				schema_version INTEGER,
				deleted INTEGER NOT NULL DEFAULT 0,
				created_at TEXT NOT NULL,
				updated_at TEXT NOT NULL,
				created_by TEXT NOT NULL,
				updated_by TEXT NOT NULL
			)
			"#,
		)
		.execute(&self.pool)
		.await?;

		sqlx::query(
			"CREATE INDEX IF NOT EXISTS idx_config_entries_tenant ON config_entries(tenant_id)",
		)
		.execute(&self.pool)
		.await?;

		sqlx::query(
			r#"
			CREATE TABLE IF NOT EXISTS config_versions (
				config_id TEXT NOT NULL REFERENCES config_entries(config_id),
				version_number INTEGER NOT NULL,
				payload TEXT,
				change_kind TEXT NOT NULL,
				changed_by TEXT NOT NULL,
				changed_at TEXT NOT NULL,
				change_reason TEXT,
				rollback_target INTEGER,
				state TEXT NOT NULL DEFAULT 'active',
				PRIMARY KEY (config_id, version_number)
			)
			"#,
		)
		.execute(&self.pool)
		.await?;

		sqlx::query(
			r#"
			CREATE TABLE IF NOT EXISTS tenant_keys (
				kek_id TEXT PRIMARY KEY,
				tenant_id TEXT NOT NULL,
				status TEXT NOT NULL,
				created_at TEXT NOT NULL,
				deprecated_at TEXT,
				deletion_due_at TEXT
			)
			"#,
		)
		.execute(&self.pool)
		.await?;

		tracing::debug!("config store schema ready");
		Ok(())
	}

	async fn entry_in_tx(
		tx: &mut Transaction<'_, Sqlite>,
		config_id: &str,
	) -> Result<Option<ConfigEntry>> {
		let row = sqlx::query_as::<_, EntryRow>(&format!(
			"SELECT {ENTRY_COLUMNS} FROM config_entries WHERE config_id = ?"
		))
		.bind(config_id)
		.fetch_optional(&mut **tx)
		.await?;
		row.map(entry_from_row).transpose()
	}
}

fn entry_from_row(row: EntryRow) -> Result<ConfigEntry> {
	let (
		tenant_id,
		namespace,
		key,
		environment,
		current_version,
		value_type,
		schema_version,
		deleted,
		created_at,
		updated_at,
		created_by,
		updated_by,
	) = row;
	let environment: Environment = environment.parse().map_err(StoreError::Internal)?;
	Ok(ConfigEntry {
		key: ConfigKey::new(tenant_id, namespace, key, environment),
		current_version: current_version as u64,
		value_type: value_type.parse().map_err(StoreError::Internal)?,
		schema_version: schema_version.map(|v| v as u32),
		deleted,
		created_at,
		updated_at,
		created_by: ActorId::new(created_by),
		updated_by: ActorId::new(updated_by),
	})
}

fn key_from_row(row: KeyRow) -> Result<TenantKey> {
	let (kek_id, tenant_id, status, created_at, deprecated_at, deletion_due_at) = row;
	Ok(TenantKey {
		tenant_id: TenantId::new(tenant_id),
		kek_id: KekId::new(kek_id),
		status: status.parse().map_err(StoreError::Internal)?,
		created_at,
		deprecated_at,
		deletion_due_at,
	})
}

fn version_from_row(key: &ConfigKey, row: VersionRow) -> Result<ConfigVersion> {
	let (
		version_number,
		payload,
		change_kind,
		changed_by,
		changed_at,
		change_reason,
		rollback_target,
		state,
	) = row;
	let payload = payload
		.as_deref()
		.map(serde_json::from_str::<ConfigValue>)
		.transpose()?;
	Ok(ConfigVersion {
		config_id: key.clone(),
		version_number: version_number as u64,
		payload,
		change_kind: change_kind.parse().map_err(StoreError::Internal)?,
		changed_by: ActorId::new(changed_by),
		changed_at,
		change_reason,
		rollback_target: rollback_target.map(|v| v as u64),
		state: state.parse().map_err(StoreError::Internal)?,
	})
}

#[async_trait]
impl DurableStore for SqliteStore {
	fn backend(&self) -> &'static str {
		"sqlite"
	}

	#[tracing::instrument(skip(self, request), fields(config_id = %request.key))]
	async fn append_version(&self, request: AppendRequest) -> Result<ConfigVersion> {
		let config_id = request.key.config_id();
		let payload_json = request
			.payload
			.as_ref()
			.map(serde_json::to_string)
			.transpose()?;

		let mut tx = self.pool.begin().await?;
		let existing = Self::entry_in_tx(&mut tx, &config_id).await?;
		let actual = existing.as_ref().map(|e| e.current_version).unwrap_or(0);
		if actual != request.expected_version {
			return Err(StoreError::VersionConflict {
				config_id,
				expected: request.expected_version,
				actual,
			});
		}

		let version = ConfigVersion {
			config_id: request.key.clone(),
			version_number: actual + 1,
			payload: request.payload,
			change_kind: request.change_kind,
			changed_by: request.changed_by,
			changed_at: Utc::now(),
			change_reason: request.change_reason,
			rollback_target: request.rollback_target,
			state: VersionState::Active,
		};
		let entry = match existing {
			Some(mut entry) => {
				entry.advance(&version, request.schema_version);
				entry
			}
			None => ConfigEntry::from_first_version(&version, request.schema_version),
		};

		sqlx::query(
			r#"
			INSERT INTO config_entries (config_id, tenant_id, namespace, key, environment,
				current_version, value_type, schema_version, deleted, created_at, updated_at,
				created_by, updated_by)
			VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
			ON CONFLICT(config_id) DO UPDATE SET
				current_version = excluded.current_version,
				value_type = excluded.value_type,
				schema_version = excluded.schema_version,
				deleted = excluded.deleted,
				updated_at = excluded.updated_at,
				updated_by = excluded.updated_by
			"#,
		)
		.bind(&config_id)
		.bind(entry.key.tenant.as_str())
		.bind(&entry.key.namespace)
		.bind(&entry.key.key)
		.bind(entry.key.environment.as_str())
		.bind(entry.current_version as i64)
		.bind(entry.value_type.as_str())
		.bind(entry.schema_version.map(i64::from))
		.bind(entry.deleted)
		.bind(entry.created_at)
		.bind(entry.updated_at)
		.bind(entry.created_by.as_str())
		.bind(entry.updated_by.as_str())
		.execute(&mut *tx)
		.await?;

		sqlx::query(
			r#"
			INSERT INTO config_versions (config_id, version_number, payload, change_kind,
				changed_by, changed_at, change_reason, rollback_target, state)
			VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
			"#,
		)
		.bind(&config_id)
		.bind(version.version_number as i64)
		.bind(payload_json)
		.bind(version.change_kind.as_str())
		.bind(version.changed_by.as_str())
		.bind(version.changed_at)
		.bind(&version.change_reason)
		.bind(version.rollback_target.map(|v| v as i64))
		.bind(version.state.as_str())
		.execute(&mut *tx)
		.await?;

		tx.commit().await?;
		Ok(version)
	}

	#[tracing::instrument(skip(self), fields(config_id = %key))]
	async fn read_version(&self, key: &ConfigKey, version: u64) -> Result<Option<ConfigVersion>> {
		let row = sqlx::query_as::<_, VersionRow>(&format!(
			"SELECT {VERSION_COLUMNS} FROM config_versions WHERE config_id = ? AND version_number = ?"
		))
		.bind(key.config_id())
		.bind(version as i64)
		.fetch_optional(&self.pool)
		.await?;
		row.map(|r| version_from_row(key, r)).transpose()
	}

	#[tracing::instrument(skip(self), fields(config_id = %key))]
	async fn read_current(&self, key: &ConfigKey) -> Result<Option<ConfigVersion>> {
		let row = sqlx::query_as::<_, VersionRow>(&format!(
			r#"
			SELECT {VERSION_COLUMNS} FROM config_versions
			WHERE config_id = ?
			  AND version_number = (SELECT current_version FROM config_entries WHERE config_id = ?)
			"#
		))
		.bind(key.config_id())
		.bind(key.config_id())
		.fetch_optional(&self.pool)
		.await?;
		row.map(|r| version_from_row(key, r)).transpose()
	}

	#[tracing::instrument(skip(self), fields(config_id = %key))]
	async fn read_entry(&self, key: &ConfigKey) -> Result<Option<ConfigEntry>> {
		let row = sqlx::query_as::<_, EntryRow>(&format!(
			"SELECT {ENTRY_COLUMNS} FROM config_entries WHERE config_id = ?"
		))
		.bind(key.config_id())
		.fetch_optional(&self.pool)
		.await?;
		row.map(entry_from_row).transpose()
	}

	#[tracing::instrument(skip(self), fields(config_id = %key))]
	async fn history(&self, key: &ConfigKey) -> Result<Vec<ConfigVersion>> {
		let rows = sqlx::query_as::<_, VersionRow>(&format!(
			"SELECT {VERSION_COLUMNS} FROM config_versions WHERE config_id = ? ORDER BY version_number"
		))
		.bind(key.config_id())
		.fetch_all(&self.pool)
		.await?;
		rows.into_iter()
			.map(|r| version_from_row(key, r))
			.collect()
	}

	#[tracing::instrument(skip(self), fields(config_id = %key))]
	async fn set_version_state(
		&self,
		key: &ConfigKey,
		version: u64,
		state: VersionState,
	) -> Result<()> {
		let result = sqlx::query(
			"UPDATE config_versions SET state = ? WHERE config_id = ? AND version_number = ?",
		)
		.bind(state.as_str())
		.bind(key.config_id())
		.bind(version as i64)
		.execute(&self.pool)
		.await?;

		if result.rows_affected() == 0 {
			return Err(StoreError::NotFound(format!(
				"{} version {version}",
				key.config_id()
			)));
		}
		Ok(())
	}

	#[tracing::instrument(skip(self, payload), fields(config_id = %key))]
	async fn replace_payload(
		&self,
		key: &ConfigKey,
		version: u64,
		payload: ConfigValue,
	) -> Result<()> {
		let payload_json = serde_json::to_string(&payload)?;
		let result = sqlx::query(
			r#"
			UPDATE config_versions SET payload = ?
			WHERE config_id = ? AND version_number = ? AND payload IS NOT NULL
			"#,
		)
		.bind(payload_json)
		.bind(key.config_id())
		.bind(version as i64)
		.execute(&self.pool)
		.await?;

		if result.rows_affected() == 0 {
			return Err(StoreError::NotFound(format!(
				"{} version {version} with a payload",
				key.config_id()
			)));
		}
		Ok(())
	}

	#[tracing::instrument(skip(self), fields(config_id = %key))]
	async fn prune(&self, key: &ConfigKey, keep_latest: usize) -> Result<Vec<u64>> {
		let config_id = key.config_id();
		let mut tx = self.pool.begin().await?;
		let Some(entry) = Self::entry_in_tx(&mut tx, &config_id).await? else {
			return Ok(Vec::new());
		};
		let numbers: Vec<i64> = sqlx::query_scalar(
			"SELECT version_number FROM config_versions WHERE config_id = ? ORDER BY version_number",
		)
		.bind(&config_id)
		.fetch_all(&mut *tx)
		.await?;
		let numbers: Vec<u64> = numbers.into_iter().map(|n| n as u64).collect();

		let removed = select_prunable(&numbers, keep_latest, entry.current_version);
		for number in &removed {
			sqlx::query("DELETE FROM config_versions WHERE config_id = ? AND version_number = ?")
				.bind(&config_id)
				.bind(*number as i64)
				.execute(&mut *tx)
				.await?;
		}
		tx.commit().await?;
		Ok(removed)
	}

	#[tracing::instrument(skip(self))]
	async fn count_entries(&self, tenant_id: &TenantId) -> Result<usize> {
		let count: i64 = sqlx::query_scalar(
			"SELECT COUNT(*) FROM config_entries WHERE tenant_id = ? AND deleted = 0",
		)
		.bind(tenant_id.as_str())
		.fetch_one(&self.pool)
		.await?;
		Ok(count as usize)
	}

	#[tracing::instrument(skip(self))]
	async fn list_entries(&self, tenant_id: &TenantId) -> Result<Vec<ConfigEntry>> {
		let rows = sqlx::query_as::<_, EntryRow>(&format!(
			"SELECT {ENTRY_COLUMNS} FROM config_entries WHERE tenant_id = ? ORDER BY config_id"
		))
		.bind(tenant_id.as_str())
		.fetch_all(&self.pool)
		.await?;
		rows.into_iter().map(entry_from_row).collect()
	}

	#[tracing::instrument(skip(self))]
	async fn find_by_kek(&self, kek_id: &KekId) -> Result<Vec<ConfigVersion>> {
		// Coarse text match first; the payload is then checked structurally.
		let pattern = format!("%{}%", kek_id.as_str());
		let rows = sqlx::query_as::<_, (String, String, String, String, i64, Option<String>, String, String, DateTime<Utc>, Option<String>, Option<i64>, String)>(
			r#"
			SELECT e.tenant_id, e.namespace, e.key, e.environment,
				v.version_number, v.payload, v.change_kind, v.changed_by, v.changed_at,
				v.change_reason, v.rollback_target, v.state
			FROM config_versions v
			JOIN config_entries e ON e.config_id = v.config_id
			WHERE v.payload LIKE ?
			ORDER BY v.config_id, v.version_number
			"#,
		)
		.bind(pattern)
		.fetch_all(&self.pool)
		.await?;

		let mut found = Vec::new();
		for (
			tenant_id,
			namespace,
			key,
			environment,
			version_number,
			payload,
			change_kind,
			changed_by,
			changed_at,
			change_reason,
			rollback_target,
			state,
		) in rows
		{
			let environment: Environment = environment.parse().map_err(StoreError::Internal)?;
			let key = ConfigKey::new(tenant_id, namespace, key, environment);
			let version = version_from_row(
				&key,
				(
					version_number,
					payload,
					change_kind,
					changed_by,
					changed_at,
					change_reason,
					rollback_target,
					state,
				),
			)?;
			if version
				.payload
				.as_ref()
				.is_some_and(|p| p.references_kek(kek_id))
			{
				found.push(version);
			}
		}
		Ok(found)
	}
}

#[async_trait]
impl TenantKeyStore for SqliteStore {
	#[tracing::instrument(skip(self, key), fields(kek_id = %key.kek_id))]
	async fn save_key(&self, key: &TenantKey) -> Result<()> {
		sqlx::query(
			r#"
			INSERT INTO tenant_keys (kek_id, tenant_id, status, created_at, deprecated_at,
				deletion_due_at)
			VALUES (?, ?, ?, ?, ?, ?)
			ON CONFLICT(kek_id) DO UPDATE SET
				status = excluded.status,
				deprecated_at = excluded.deprecated_at,
				deletion_due_at = excluded.deletion_due_at
			"#,
		)
		.bind(key.kek_id.as_str())
		.bind(key.tenant_id.as_str())
		.bind(key.status.as_str())
		.bind(key.created_at)
		.bind(key.deprecated_at)
		.bind(key.deletion_due_at)
		.execute(&self.pool)
		.await?;
		Ok(())
	}

	#[tracing::instrument(skip(self))]
	async fn load_keys(&self) -> Result<Vec<TenantKey>> {
		let rows = sqlx::query_as::<_, KeyRow>(
			r#"
			SELECT kek_id, tenant_id, status, created_at, deprecated_at, deletion_due_at
			FROM tenant_keys
			ORDER BY created_at, kek_id
			"#,
		)
		.fetch_all(&self.pool)
		.await?;
		rows.into_iter().map(key_from_row).collect()
	}

	#[tracing::instrument(skip(self))]
	async fn remove_key(&self, kek_id: &KekId) -> Result<bool> {
		let result = sqlx::query("DELETE FROM tenant_keys WHERE kek_id = ?")
			.bind(kek_id.as_str())
			.execute(&self.pool)
			.await?;
		Ok(result.rows_affected() > 0)
	}
}
