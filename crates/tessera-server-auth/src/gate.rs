// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use lru::LruCache;
use serde_json::json;
use tessera_config_core::ActorId;
use tessera_server_audit::{AuditEventType, AuditLogEntry, AuditOutcome, AuditService};
use tessera_server_config::AuthConfig;
use tracing::{debug, instrument, warn};

use crate::error::{AuthzError, Result};
use crate::policy::PolicyDecisionPoint;
use crate::types::{Action, AuthContext, Decision, Resource};

/// Rule id recorded when the decision point itself failed.
pub const POLICY_ERROR_RULE: &str = "policy-error";

/// Rule id recorded for requests without an identity.
pub const UNAUTHENTICATED_RULE: &str = "unauthenticated";

type DecisionKey = (ActorId, Resource, Action);

struct CachedDecision {
	decision: Decision,
	expires_at: Instant,
}

/// Front door for every read and write.
///
/// Decisions are cached per `(actor, resource, action)` for a short TTL.
/// Failures of the decision point deny and are not cached. Every decision,
/// cached or not, is audited together with the rule that produced it.
pub struct AuthorizationGate {
	pdp: Arc<dyn PolicyDecisionPoint>,
	decisions: Mutex<LruCache<DecisionKey, CachedDecision>>,
	ttl: Duration,
	audit: Option<Arc<AuditService>>,
}

impl AuthorizationGate {
	pub fn new(pdp: Arc<dyn PolicyDecisionPoint>, config: &AuthConfig) -> Self {
		let capacity =
			NonZeroUsize::new(config.decision_cache_capacity).unwrap_or(NonZeroUsize::MIN);
		Self {
			pdp,
			decisions: Mutex::new(LruCache::new(capacity)),
			ttl: config.decision_ttl(),
			audit: None,
		}
	}

	pub fn with_audit(mut self, audit: Arc<AuditService>) -> Self {
		self.audit = Some(audit);
		self
	}

	/// Returns `Ok(())` if allowed, [`AuthzError::Forbidden`] if denied and
	/// [`AuthzError::Unauthorized`] for anonymous actors.
	pub async fn check(
		&self,
		actor: &ActorId,
		resource: &Resource,
		action: Action,
		context: &AuthContext,
	) -> Result<()> {
		let decision = self.decide(actor, resource, action, context).await?;
		if decision.allowed {
			Ok(())
		} else {
			Err(AuthzError::Forbidden {
				action: action.to_string(),
				resource: resource.to_string(),
			})
		}
	}

	#[instrument(skip(self, context), fields(actor = %actor, resource = %resource, action = %action))]
	pub async fn decide(
		&self,
		actor: &ActorId,
		resource: &Resource,
		action: Action,
		context: &AuthContext,
	) -> Result<Decision> {
		if actor.is_anonymous() {
			self.record(
				actor,
				resource,
				action,
				&Decision::deny(UNAUTHENTICATED_RULE),
				false,
				context,
			);
			return Err(AuthzError::Unauthorized);
		}

		let key = (actor.clone(), resource.clone(), action);
		if let Some(decision) = self.cached(&key, Instant::now()) {
			debug!(allowed = decision.allowed, "cached decision");
			self.record(actor, resource, action, &decision, true, context);
			return Ok(decision);
		}

		let decision = match self.pdp.decide(actor, resource, action, context).await {
			Ok(decision) => {
				self.lock().put(
					key,
					CachedDecision {
						decision: decision.clone(),
						expires_at: Instant::now() + self.ttl,
					},
				);
				decision
			}
			Err(e) => {
				warn!(error = %e, "policy decision failed, denying");
				Decision::deny(POLICY_ERROR_RULE)
			}
		};

		debug!(allowed = decision.allowed, "policy decision");
		self.record(actor, resource, action, &decision, false, context);
		Ok(decision)
	}

	/// Drops cached decisions for one actor, e.g. after a role change.
	pub fn invalidate_actor(&self, actor: &ActorId) {
		let mut decisions = self.lock();
		let stale: Vec<DecisionKey> = decisions
			.iter()
			.filter(|((cached_actor, _, _), _)| cached_actor == actor)
			.map(|(key, _)| key.clone())
			.collect();
		for key in stale {
			decisions.pop(&key);
		}
	}

	pub fn clear(&self) {
		self.lock().clear();
	}

	fn cached(&self, key: &DecisionKey, now: Instant) -> Option<Decision> {
		let mut decisions = self.lock();
		match decisions.get(key) {
			Some(cached) if cached.expires_at > now => Some(cached.decision.clone()),
			Some(_) => {
				decisions.pop(key);
				None
			}
			None => None,
		}
	}

	fn record(
		&self,
		actor: &ActorId,
		resource: &Resource,
		action: Action,
		decision: &Decision,
		cached: bool,
		context: &AuthContext,
	) {
		let Some(audit) = &self.audit else {
			return;
		};
		let (event_type, outcome) = if decision.allowed {
			(AuditEventType::AccessGranted, AuditOutcome::Success)
		} else {
			(AuditEventType::AccessDenied, AuditOutcome::Denied)
		};
		let mut entry = AuditLogEntry::builder(event_type)
			.outcome(outcome)
			.tenant(&resource.tenant)
			.actor(actor)
			.resource(resource.kind.as_str(), resource.path.clone())
			.action(action.as_str())
			.matched_rule(decision.matched_rule.clone())
			.details(json!({ "cached": cached }));
		if let Some(request_id) = &context.request_id {
			entry = entry.request_id(request_id.clone());
		}
		audit.log(entry.build());
	}

	fn lock(&self) -> MutexGuard<'_, LruCache<DecisionKey, CachedDecision>> {
		self.decisions
			.lock()
			.unwrap_or_else(|poisoned| poisoned.into_inner())
	}
}
