// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Deployment environments and the resolution precedence chain.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A configuration layer, ordered lowest to highest priority.
///
/// The derived `Ord` follows declaration order, so `Global < Development < ... < Edge`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
	Global,
	Development,
	Staging,
	Production,
	Edge,
}

impl Environment {
	pub const ALL: [Environment; 5] = [
		Environment::Global,
		Environment::Development,
		Environment::Staging,
		Environment::Production,
		Environment::Edge,
	];

	pub fn as_str(&self) -> &'static str {
		match self {
			Environment::Global => "global",
			Environment::Development => "development",
			Environment::Staging => "staging",
			Environment::Production => "production",
			Environment::Edge => "edge",
		}
	}

	/// Layers consulted when resolving at this environment, lowest priority first.
	///
	/// The chain is `Global` followed by every ancestor up to and including `self`.
	pub fn precedence_chain(&self) -> Vec<Environment> {
		Self::ALL.iter().copied().filter(|env| env <= self).collect()
	}

	/// Environments whose resolved value may change when `self` is written.
	pub fn descendants(&self) -> Vec<Environment> {
		Self::ALL.iter().copied().filter(|env| env >= self).collect()
	}
}

impl fmt::Display for Environment {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for Environment {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_ascii_lowercase().as_str() {
			"global" | "base" | "default" => Ok(Environment::Global),
			"development" | "dev" => Ok(Environment::Development),
			"staging" | "stage" => Ok(Environment::Staging),
			"production" | "prod" => Ok(Environment::Production),
			"edge" => Ok(Environment::Edge),
			other => Err(format!("unknown environment '{other}'")),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn chain_is_ordered_lowest_first() {
		assert_eq!(
			Environment::Production.precedence_chain(),
			vec![
				Environment::Global,
				Environment::Development,
				Environment::Staging,
				Environment::Production
			]
		);
		assert_eq!(
			Environment::Global.precedence_chain(),
			vec![Environment::Global]
		);
	}

	#[test]
	fn descendants_include_self() {
		assert_eq!(
			Environment::Production.descendants(),
			vec![Environment::Production, Environment::Edge]
		);
		assert_eq!(Environment::Global.descendants().len(), 5);
	}

	#[test]
	fn parses_aliases() {
		assert_eq!("prod".parse::<Environment>().unwrap(), Environment::Production);
		assert_eq!("BASE".parse::<Environment>().unwrap(), Environment::Global);
		assert_eq!(" dev ".parse::<Environment>().unwrap(), Environment::Development);
		assert!("qa".parse::<Environment>().is_err());
	}

	#[test]
	fn display_round_trips_through_from_str() {
		for env in Environment::ALL {
			assert_eq!(env.to_string().parse::<Environment>().unwrap(), env);
		}
	}
}
