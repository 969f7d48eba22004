// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Authorization for configuration and secret operations.
//!
//! [`AuthorizationGate`] sits in front of every read and write. It asks a
//! [`PolicyDecisionPoint`] for a decision, caches it briefly and audits it.
//! Denials are fail-closed: no matching rule, a matching deny rule or a
//! failing decision point all deny.

pub mod error;
pub mod gate;
pub mod policy;
pub mod types;

pub use error::{AuthzError, Result};
pub use gate::{AuthorizationGate, POLICY_ERROR_RULE, UNAUTHENTICATED_RULE};
pub use policy::{glob_match, PolicyDecisionPoint, Role, Rule, RulePolicy, DEFAULT_DENY_RULE};
pub use types::{Action, AuthContext, Decision, Effect, Resource, ResourceKind};
