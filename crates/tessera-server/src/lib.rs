// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Tessera configuration and secret service.
//!
//! [`ConfigService`] is the single entry point for reads and writes:
//!
//! ```text
//! read:  AuthorizationGate -> CacheLayer -> (miss) ResolutionEngine -> VersionStore + EncryptionEngine
//! write: AuthorizationGate -> VersionStore -> CacheLayer invalidation -> optional rotation scheduling
//! ```
//!
//! [`TesseraBuilder`] wires the components from a
//! [`ServerConfig`](tessera_server_config::ServerConfig), and
//! [`Tessera::start`] spawns the background tasks.

pub mod app;
pub mod error;
pub mod rewrap;
pub mod service;
pub mod telemetry;

pub use app::{Tessera, TesseraBuilder};
pub use error::{Result, ServiceError};
pub use rewrap::{RewrapWorker, StoreKeyReferences};
pub use service::{ConfigService, WriteOptions, WriteOutcome};
pub use telemetry::init_tracing;
