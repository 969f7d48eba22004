// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Audit trail for configuration reads, writes, key lifecycle and authorization.
//!
//! Events are queued on a bounded channel and fanned out to [`AuditSink`]s by a
//! background task, so emitting an event never blocks the calling operation.

pub mod enrichment;
pub mod error;
pub mod event;
pub mod filter;
pub mod pipeline;
pub mod sink;

pub use enrichment::{AuditEnricher, EnrichedAuditEvent, InstanceEnricher, NoopEnricher};
pub use error::{AuditError, AuditResult, AuditSinkError};
pub use event::{AuditEventType, AuditLogBuilder, AuditLogEntry, AuditOutcome, AuditSeverity};
pub use filter::AuditFilterConfig;
pub use pipeline::AuditService;
pub use sink::memory::MemoryAuditSink;
pub use sink::tracing::TracingAuditSink;
pub use sink::AuditSink;

pub use tessera_server_config::{AuditConfig, QueueOverflowPolicy};
