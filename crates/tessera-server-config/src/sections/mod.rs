// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sections.

pub mod audit;
pub mod auth;
pub mod cache;
pub mod crypto;
pub mod database;
pub mod logging;
pub mod rotation;
pub mod store;

pub use audit::{AuditConfig, AuditConfigLayer, QueueOverflowPolicy};
pub use auth::{AuthConfig, AuthConfigLayer};
pub use cache::{CacheConfig, CacheConfigLayer, DEFAULT_INVALIDATION_TOPIC};
pub use crypto::{CryptoConfig, CryptoConfigLayer};
pub use database::{DatabaseConfig, DatabaseConfigLayer, StoreBackend};
pub use logging::{LoggingConfig, LoggingConfigLayer};
pub use rotation::{
	RotationClassConfig, RotationClassConfigLayer, RotationConfig, RotationConfigLayer,
};
pub use store::{StoreConfig, StoreConfigLayer};
