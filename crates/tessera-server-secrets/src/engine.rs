// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::Arc;

use serde_json::json;
use tessera_common_secret::SecretBytes;
use tessera_config_core::{Algorithm, EncryptedPayload, KekId, TenantId, ENVELOPE_FORMAT_VERSION};
use tessera_server_audit::{
	AuditEventType, AuditLogEntry, AuditOutcome, AuditService, AuditSeverity,
};
use tracing::{debug, instrument, warn};

use crate::crypto;
use crate::error::{CryptoError, CryptoResult};
use crate::hierarchy::KeyAccess;

/// Envelope encryption of secret values.
pub struct EncryptionEngine {
	keys: Arc<dyn KeyAccess>,
	audit: Option<Arc<AuditService>>,
}

impl EncryptionEngine {
	pub fn new(keys: Arc<dyn KeyAccess>) -> Self {
		Self { keys, audit: None }
	}

	pub fn with_audit(mut self, audit: Arc<AuditService>) -> Self {
		self.audit = Some(audit);
		self
	}

	/// Encrypts `plaintext` under a fresh DEK wrapped by the tenant's active KEK.
	#[instrument(skip(self, plaintext), fields(tenant_id = %tenant_id, len = plaintext.len()))]
	pub async fn encrypt(
		&self,
		plaintext: &[u8],
		tenant_id: &TenantId,
	) -> CryptoResult<EncryptedPayload> {
		let kek_id = self.keys.active_kek(tenant_id).await?;

		let dek = crypto::generate_dek();
		let nonce = crypto::generate_nonce();
		let algorithm = Algorithm::Aes256Gcm;
		let aad = EncryptedPayload::aad(algorithm, ENVELOPE_FORMAT_VERSION, tenant_id.as_str());

		let (ciphertext, tag) = crypto::seal(&dek, &nonce, &aad, plaintext)?;
		let wrapped_dek = self.keys.wrap_dek(&kek_id, dek.as_slice()).await?;

		debug!(kek_id = %kek_id, "encrypted secret payload");
		Ok(EncryptedPayload {
			ciphertext,
			nonce: nonce.to_vec(),
			auth_tag: tag.to_vec(),
			wrapped_dek,
			kek_id,
			algorithm,
			format_version: ENVELOPE_FORMAT_VERSION,
		})
	}

	/// Decrypts an envelope owned by `tenant_id`.
	///
	/// A KEK belonging to another tenant fails closed with
	/// [`CryptoError::TenantIsolationViolation`] and is audited as a security
	/// event. A tag mismatch never yields partial plaintext.
	#[instrument(skip(self, payload), fields(tenant_id = %tenant_id, kek_id = %payload.kek_id))]
	pub async fn decrypt(
		&self,
		payload: &EncryptedPayload,
		tenant_id: &TenantId,
	) -> CryptoResult<SecretBytes> {
		if payload.format_version != ENVELOPE_FORMAT_VERSION {
			return Err(CryptoError::InvalidPayload(format!(
				"unsupported envelope format version {}",
				payload.format_version
			)));
		}

		self.ensure_owner(&payload.kek_id, tenant_id, "decrypt").await?;

		let dek = match self
			.keys
			.unwrap_dek(&payload.kek_id, &payload.wrapped_dek)
			.await
		{
			Ok(dek) => dek,
			Err(CryptoError::AuthenticationFailed) => {
				self.decryption_failed(payload, tenant_id, "wrapped DEK rejected");
				return Err(CryptoError::AuthenticationFailed);
			}
			Err(e) => return Err(e),
		};

		let aad = EncryptedPayload::aad(payload.algorithm, payload.format_version, tenant_id.as_str());
		let mut plaintext = match crypto::open(
			&dek,
			&payload.nonce,
			&aad,
			&payload.ciphertext,
			&payload.auth_tag,
		) {
			Ok(plaintext) => plaintext,
			Err(CryptoError::AuthenticationFailed) => {
				self.decryption_failed(payload, tenant_id, "authentication tag mismatch");
				return Err(CryptoError::AuthenticationFailed);
			}
			Err(e) => return Err(e),
		};
		drop(dek);

		Ok(SecretBytes::new(std::mem::take(&mut *plaintext)))
	}

	/// Re-wraps the DEK of `payload` under `target_kek`.
	///
	/// Ciphertext, nonce and tag are unchanged; only `wrapped_dek` and
	/// `kek_id` differ in the result.
	#[instrument(skip(self, payload), fields(tenant_id = %tenant_id, from = %payload.kek_id, to = %target_kek))]
	pub async fn rewrap(
		&self,
		payload: &EncryptedPayload,
		tenant_id: &TenantId,
		target_kek: &KekId,
	) -> CryptoResult<EncryptedPayload> {
		if &payload.kek_id == target_kek {
			return Ok(payload.clone());
		}
		self.ensure_owner(&payload.kek_id, tenant_id, "rewrap").await?;
		self.ensure_owner(target_kek, tenant_id, "rewrap").await?;

		let dek = self
			.keys
			.unwrap_dek(&payload.kek_id, &payload.wrapped_dek)
			.await?;
		let wrapped_dek = self.keys.wrap_dek(target_kek, dek.as_slice()).await?;

		Ok(EncryptedPayload {
			wrapped_dek,
			kek_id: target_kek.clone(),
			..payload.clone()
		})
	}

	async fn ensure_owner(
		&self,
		kek_id: &KekId,
		tenant_id: &TenantId,
		operation: &str,
	) -> CryptoResult<()> {
		match self.keys.owner_of(kek_id).await {
			Some(owner) if &owner == tenant_id => Ok(()),
			Some(owner) => {
				warn!(
					kek_id = %kek_id,
					requesting_tenant = %tenant_id,
					key_owner = %owner,
					operation,
					"cross-tenant key use rejected"
				);
				self.emit(
					AuditLogEntry::builder(AuditEventType::TenantIsolationViolation)
						.severity(AuditSeverity::Critical)
						.outcome(AuditOutcome::Denied)
						.tenant(tenant_id)
						.resource("kek", kek_id.as_str())
						.action(operation)
						.details(json!({ "key_owner": owner.as_str() }))
						.build(),
				);
				Err(CryptoError::TenantIsolationViolation {
					tenant: tenant_id.clone(),
				})
			}
			None => Err(CryptoError::UnknownKey(kek_id.clone())),
		}
	}

	fn decryption_failed(&self, payload: &EncryptedPayload, tenant_id: &TenantId, reason: &str) {
		warn!(kek_id = %payload.kek_id, tenant_id = %tenant_id, reason, "secret decryption failed");
		self.emit(
			AuditLogEntry::builder(AuditEventType::DecryptionFailed)
				.outcome(AuditOutcome::Failure)
				.tenant(tenant_id)
				.resource("kek", payload.kek_id.as_str())
				.action("decrypt")
				.details(json!({ "reason": reason }))
				.build(),
		);
	}

	fn emit(&self, entry: AuditLogEntry) {
		if let Some(audit) = &self.audit {
			audit.log(entry);
		}
	}
}
