// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Policy decision points.
//!
//! [`RulePolicy`] evaluates explicit allow/deny rules whose actor and resource
//! patterns are globs (`*` any run of characters, `?` one character, `\`
//! escapes the next character). Any matching deny wins; with no matching rule
//! the decision is deny.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tessera_config_core::{ActorId, TenantId};
use tokio::sync::RwLock;
use tracing::instrument;

use crate::error::{AuthzError, Result};
use crate::types::{Action, AuthContext, Decision, Effect, Resource};

/// Rule id reported when nothing matched.
pub const DEFAULT_DENY_RULE: &str = "default-deny";

/// Decides whether `actor` may perform `action` on `resource`.
#[async_trait]
pub trait PolicyDecisionPoint: Send + Sync {
	async fn decide(
		&self,
		actor: &ActorId,
		resource: &Resource,
		action: Action,
		context: &AuthContext,
	) -> Result<Decision>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
	pub id: String,
	pub effect: Effect,
	/// Glob over the actor id.
	pub actor: String,
	/// Glob over the rendered resource, e.g. `secret:t1/*`.
	pub resource: String,
	/// Actions covered. Empty covers every action.
	#[serde(default)]
	pub actions: Vec<Action>,
}

impl Rule {
	pub fn allow(
		id: impl Into<String>,
		actor: impl Into<String>,
		resource: impl Into<String>,
		actions: &[Action],
	) -> Self {
		Self {
			id: id.into(),
			effect: Effect::Allow,
			actor: actor.into(),
			resource: resource.into(),
			actions: actions.to_vec(),
		}
	}

	pub fn deny(
		id: impl Into<String>,
		actor: impl Into<String>,
		resource: impl Into<String>,
		actions: &[Action],
	) -> Self {
		Self {
			effect: Effect::Deny,
			..Self::allow(id, actor, resource, actions)
		}
	}

	pub fn matches(&self, actor: &ActorId, resource: &str, action: Action) -> bool {
		(self.actions.is_empty() || self.actions.contains(&action))
			&& glob_match(&self.actor, actor.as_str())
			&& glob_match(&self.resource, resource)
	}
}

/// Built-in roles, scoped to one tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
	/// Everything, key management included.
	Admin,
	/// Reads and writes configuration and secrets, rotates secrets.
	Editor,
	/// Reads configuration. Never secrets.
	Viewer,
	/// Reads configuration and key metadata.
	Auditor,
}

impl Role {
	pub fn as_str(&self) -> &'static str {
		match self {
			Role::Admin => "admin",
			Role::Editor => "editor",
			Role::Viewer => "viewer",
			Role::Auditor => "auditor",
		}
	}

	/// Expands the role into allow rules for `actor` within `tenant`.
	///
	/// The actor and tenant are matched literally, even if they contain glob
	/// characters.
	pub fn rules(&self, actor: &ActorId, tenant: &TenantId) -> Vec<Rule> {
		let id = |suffix: &str| format!("role:{}:{}:{}:{}", self.as_str(), tenant, actor, suffix);
		let scope = escape_glob(tenant.as_str());
		let config = format!("config:{scope}/*");
		let secret = format!("secret:{scope}/*");
		let keys = format!("key:{scope}");
		let actor = escape_glob(actor.as_str());
		let actor = actor.as_str();

		match self {
			Role::Admin => vec![
				Rule::allow(id("config"), actor, config, &[]),
				Rule::allow(id("secret"), actor, secret, &[]),
				Rule::allow(id("keys"), actor, keys, &[]),
			],
			Role::Editor => {
				let edits = [Action::Read, Action::Write, Action::Delete, Action::Rollback];
				vec![
					Rule::allow(id("config"), actor, config, &edits),
					Rule::allow(
						id("secret"),
						actor,
						secret,
						&[
							Action::Read,
							Action::Write,
							Action::Delete,
							Action::Rollback,
							Action::Rotate,
						],
					),
				]
			}
			Role::Viewer => vec![Rule::allow(id("config"), actor, config, &[Action::Read])],
			Role::Auditor => vec![
				Rule::allow(id("config"), actor, config, &[Action::Read]),
				Rule::allow(id("keys"), actor, keys, &[Action::Read]),
			],
		}
	}
}

/// In-memory rule set.
#[derive(Default)]
pub struct RulePolicy {
	rules: RwLock<Vec<Rule>>,
}

impl RulePolicy {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_rules(rules: Vec<Rule>) -> Self {
		Self {
			rules: RwLock::new(rules),
		}
	}

	pub async fn add_rule(&self, rule: Rule) {
		self.rules.write().await.push(rule);
	}

	/// Adds the rules of `role` for `actor` within `tenant`.
	pub async fn grant(&self, actor: &ActorId, role: Role, tenant: &TenantId) -> Result<()> {
		if actor.is_anonymous() {
			return Err(AuthzError::InvalidGrant("anonymous actor".to_string()));
		}
		if !tenant.is_valid() {
			return Err(AuthzError::InvalidGrant(format!("invalid tenant id {tenant:?}")));
		}
		self.rules.write().await.extend(role.rules(actor, tenant));
		Ok(())
	}

	/// Removes every rule with `id`. Returns whether any was removed.
	pub async fn remove_rule(&self, id: &str) -> bool {
		let mut rules = self.rules.write().await;
		let before = rules.len();
		rules.retain(|r| r.id != id);
		rules.len() != before
	}

	pub async fn rules(&self) -> Vec<Rule> {
		self.rules.read().await.clone()
	}
}

#[async_trait]
impl PolicyDecisionPoint for RulePolicy {
	#[instrument(level = "debug", skip(self, context), fields(actor = %actor, resource = %resource, action = %action))]
	async fn decide(
		&self,
		actor: &ActorId,
		resource: &Resource,
		action: Action,
		context: &AuthContext,
	) -> Result<Decision> {
		let target = resource.to_string();
		let rules = self.rules.read().await;

		let mut allowed_by: Option<&Rule> = None;
		for rule in rules.iter().filter(|r| r.matches(actor, &target, action)) {
			match rule.effect {
				Effect::Deny => return Ok(Decision::deny(rule.id.clone())),
				Effect::Allow => {
					allowed_by.get_or_insert(rule);
				}
			}
		}

		Ok(match allowed_by {
			Some(rule) => Decision::allow(rule.id.clone()),
			None => Decision::deny(DEFAULT_DENY_RULE),
		})
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token {
	Literal(char),
	One,
	Many,
}

fn tokenize(pattern: &str) -> Vec<Token> {
	let mut tokens = Vec::with_capacity(pattern.len());
	let mut chars = pattern.chars();
	while let Some(c) = chars.next() {
		tokens.push(match c {
			'\\' => Token::Literal(chars.next().unwrap_or('\\')),
			'*' => Token::Many,
			'?' => Token::One,
			c => Token::Literal(c),
		});
	}
	tokens
}

/// Escapes glob characters so `text` matches only itself.
pub fn escape_glob(text: &str) -> String {
	let mut escaped = String::with_capacity(text.len());
	for c in text.chars() {
		if matches!(c, '*' | '?' | '\\') {
			escaped.push('\\');
		}
		escaped.push(c);
	}
	escaped
}

/// Matches `text` against a glob where `*` matches any run of characters,
/// `?` exactly one, and `\` makes the next character literal.
pub fn glob_match(pattern: &str, text: &str) -> bool {
	let pattern = tokenize(pattern);
	let text: Vec<char> = text.chars().collect();

	let (mut p, mut t) = (0, 0);
	let mut star: Option<(usize, usize)> = None;

	while t < text.len() {
		match pattern.get(p) {
			Some(Token::One) => {
				p += 1;
				t += 1;
				continue;
			}
			Some(Token::Literal(c)) if *c == text[t] => {
				p += 1;
				t += 1;
				continue;
			}
			Some(Token::Many) => {
				star = Some((p, t));
				p += 1;
				continue;
			}
			_ => {}
		}
		match star {
			Some((star_p, star_t)) => {
				p = star_p + 1;
				t = star_t + 1;
				star = Some((star_p, star_t + 1));
			}
			None => return false,
		}
	}

	pattern[p..].iter().all(|token| *token == Token::Many)
}
