// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Background re-wrapping of stored envelopes after a KEK rotation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tessera_config_core::KekId;
use tessera_server_db::VersionStore;
use tessera_server_secrets::{EncryptionEngine, RewrapRequest, WrappedKeyReferences};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::error::Result;

const MAX_ATTEMPTS: u32 = 3;
const RETRY_BASE: Duration = Duration::from_millis(200);

/// Moves stored envelopes from a deprecated KEK to the tenant's new one.
///
/// Only the wrapped DEK and KEK id of each envelope change; ciphertext is
/// untouched, so no resolved value changes and no cache entry is invalidated.
pub struct RewrapWorker {
	store: Arc<VersionStore>,
	encryption: Arc<EncryptionEngine>,
}

impl RewrapWorker {
	pub fn new(store: Arc<VersionStore>, encryption: Arc<EncryptionEngine>) -> Self {
		Self { store, encryption }
	}

	/// Re-wraps every stored version that still references `request.from_kek`.
	/// Returns the number of versions rewritten.
	#[instrument(skip(self), fields(tenant_id = %request.tenant_id, from = %request.from_kek, to = %request.to_kek))]
	pub async fn rewrap(&self, request: &RewrapRequest) -> Result<usize> {
		let mut rewritten = 0;
		for version in self.store.find_by_kek(&request.from_kek).await? {
			if version.config_id.tenant != request.tenant_id {
				warn!(
					config_id = %version.config_id,
					"skipping envelope owned by another tenant"
				);
				continue;
			}
			let Some(mut payload) = version.payload else {
				continue;
			};
			for envelope in payload.secrets_mut() {
				if envelope.kek_id != request.from_kek {
					continue;
				}
				*envelope = self
					.encryption
					.rewrap(envelope, &request.tenant_id, &request.to_kek)
					.await?;
			}
			self.store
				.replace_rewrapped(&version.config_id, version.version_number, payload)
				.await?;
			rewritten += 1;
		}
		info!(rewritten, "re-wrapped stored envelopes");
		Ok(rewritten)
	}

	/// Processes requests until `shutdown` fires or the sender is dropped.
	///
	/// A request that keeps failing is given up after a few attempts; the old
	/// KEK then stays referenced and cannot be scheduled for deletion.
	pub fn spawn(
		self,
		mut requests: mpsc::UnboundedReceiver<RewrapRequest>,
		shutdown: CancellationToken,
	) -> JoinHandle<()> {
		tokio::spawn(async move {
			loop {
				let request = tokio::select! {
					_ = shutdown.cancelled() => break,
					next = requests.recv() => match next {
						Some(request) => request,
						None => break,
					},
				};
				self.process(&request, &shutdown).await;
			}
			debug!("re-wrap worker stopped");
		})
	}

	async fn process(&self, request: &RewrapRequest, shutdown: &CancellationToken) {
		for attempt in 1..=MAX_ATTEMPTS {
			match self.rewrap(request).await {
				Ok(_) => return,
				Err(e) if e.kind().is_retryable() && attempt < MAX_ATTEMPTS => {
					let delay = RETRY_BASE * 2u32.pow(attempt - 1);
					warn!(attempt, error = %e, ?delay, "re-wrap failed, retrying");
					tokio::select! {
						_ = shutdown.cancelled() => return,
						_ = tokio::time::sleep(delay) => {}
					}
				}
				Err(e) => {
					error!(
						tenant_id = %request.tenant_id,
						from = %request.from_kek,
						error = %e,
						"re-wrap abandoned"
					);
					return;
				}
			}
		}
	}
}

/// Counts stored versions still wrapped under a KEK, for deletion checks.
pub struct StoreKeyReferences {
	store: Arc<VersionStore>,
}

impl StoreKeyReferences {
	pub fn new(store: Arc<VersionStore>) -> Self {
		Self { store }
	}
}

#[async_trait]
impl WrappedKeyReferences for StoreKeyReferences {
	async fn count_references(&self, kek_id: &KekId) -> std::result::Result<usize, String> {
		self.store
			.find_by_kek(kek_id)
			.await
			.map(|versions| versions.len())
			.map_err(|e| e.to_string())
	}
}
