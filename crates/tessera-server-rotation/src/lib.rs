// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Automated secret rotation.
//!
//! A rotation replaces a secret's value without downtime: the new value is
//! generated and written while the old one stays readable for a grace window,
//! consumers report health against the new value, and only then is the old
//! value retired. Failed health checks restore the old value.
//!
//! Jobs are persisted through [`RotationJobStore`] and advanced by
//! [`RotationManager::run`], either directly or by a [`RotationScheduler`].

pub mod collaborators;
pub mod error;
pub mod job;
pub mod manager;
pub mod scheduler;
pub mod store;

pub use collaborators::{
	HealthCheck, HealthSignal, RandomSecretGenerator, RotationNotifier, SecretGenerator,
	TracingNotifier,
};
pub use error::{Result, RotationError};
pub use job::{RotationJob, RotationPhase, SecretClass};
pub use manager::RotationManager;
pub use scheduler::RotationScheduler;
pub use store::{InMemoryJobStore, RotationJobStore};
