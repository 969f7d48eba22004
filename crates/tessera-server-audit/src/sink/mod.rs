// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

pub mod memory;
pub mod tracing;

use std::sync::Arc;

use async_trait::async_trait;

use crate::enrichment::EnrichedAuditEvent;
use crate::filter::AuditFilterConfig;

pub use crate::error::AuditSinkError;

/// Destination for audit events.
///
/// Each publish runs on its own task; a slow or failing sink never delays others.
#[async_trait]
pub trait AuditSink: Send + Sync {
	fn name(&self) -> &str;
	fn filter(&self) -> &AuditFilterConfig;
	async fn publish(&self, event: Arc<EnrichedAuditEvent>) -> Result<(), AuditSinkError>;
}
