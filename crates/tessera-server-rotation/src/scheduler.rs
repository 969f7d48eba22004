// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::manager::RotationManager;

/// Periodically advances due rotation jobs until cancelled.
pub struct RotationScheduler {
	manager: Arc<RotationManager>,
	poll: Duration,
}

impl RotationScheduler {
	pub fn new(manager: Arc<RotationManager>) -> Self {
		let poll = manager.config().scheduler_poll();
		Self::with_poll(manager, poll)
	}

	pub fn with_poll(manager: Arc<RotationManager>, poll: Duration) -> Self {
		Self {
			manager,
			poll: poll.max(Duration::from_millis(1)),
		}
	}

	/// Recovers interrupted jobs, then ticks every poll interval.
	///
	/// A cancelled scheduler finishes the tick in progress; a phase is never
	/// abandoned half way.
	pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
		tokio::spawn(async move {
			match self.manager.recover().await {
				Ok(open) => info!(open = open.len(), "rotation scheduler started"),
				Err(e) => warn!(error = %e, "rotation recovery failed"),
			}

			let mut interval = tokio::time::interval(self.poll);
			interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
			loop {
				tokio::select! {
					_ = shutdown.cancelled() => {
						info!("rotation scheduler shutting down");
						break;
					}
					_ = interval.tick() => {
						match self.manager.tick().await {
							Ok(0) => {}
							Ok(advanced) => debug!(advanced, "rotation jobs advanced"),
							Err(e) => warn!(error = %e, "rotation tick failed"),
						}
					}
				}
			}
		})
	}
}
