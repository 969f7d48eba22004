// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::collections::HashMap;

use async_trait::async_trait;
use tessera_config_core::ConfigKey;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::Result;
use crate::job::RotationJob;

/// Durable record of rotation jobs, so a restart resumes each job at the
/// phase it had reached.
#[async_trait]
pub trait RotationJobStore: Send + Sync {
	async fn save(&self, job: &RotationJob) -> Result<()>;

	async fn get(&self, id: Uuid) -> Result<Option<RotationJob>>;

	/// Non-terminal jobs, oldest first.
	async fn list_open(&self) -> Result<Vec<RotationJob>>;

	/// Every job for one secret, oldest first.
	async fn list_for(&self, secret: &ConfigKey) -> Result<Vec<RotationJob>>;
}

#[derive(Default)]
pub struct InMemoryJobStore {
	jobs: RwLock<HashMap<Uuid, RotationJob>>,
}

impl InMemoryJobStore {
	pub fn new() -> Self {
		Self::default()
	}
}

#[async_trait]
impl RotationJobStore for InMemoryJobStore {
	async fn save(&self, job: &RotationJob) -> Result<()> {
		self.jobs.write().await.insert(job.id, job.clone());
		Ok(())
	}

	async fn get(&self, id: Uuid) -> Result<Option<RotationJob>> {
		Ok(self.jobs.read().await.get(&id).cloned())
	}

	async fn list_open(&self) -> Result<Vec<RotationJob>> {
		let mut open: Vec<RotationJob> = self
			.jobs
			.read()
			.await
			.values()
			.filter(|job| !job.phase.is_terminal())
			.cloned()
			.collect();
		open.sort_by_key(|job| job.created_at);
		Ok(open)
	}

	async fn list_for(&self, secret: &ConfigKey) -> Result<Vec<RotationJob>> {
		let mut jobs: Vec<RotationJob> = self
			.jobs
			.read()
			.await
			.values()
			.filter(|job| &job.secret == secret)
			.cloned()
			.collect();
		jobs.sort_by_key(|job| job.created_at);
		Ok(jobs)
	}
}
