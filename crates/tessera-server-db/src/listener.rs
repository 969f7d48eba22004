// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use async_trait::async_trait;
use tessera_config_core::{ChangeKind, ConfigKey};

/// A committed change to one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitEvent {
	pub key: ConfigKey,
	pub version_number: u64,
	/// `None` for changes that do not append a version (state change,
	/// re-wrap, pruning).
	pub change_kind: Option<ChangeKind>,
}

/// Observer invoked inside the write section, after the durable commit and
/// before the write is acknowledged.
///
/// Listeners must not fail the write. Anything slow or fallible (for example
/// a cross-instance broadcast) belongs on a spawned task.
#[async_trait]
pub trait CommitListener: Send + Sync {
	async fn on_commit(&self, event: &CommitEvent);
}
