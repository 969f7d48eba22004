// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Partial configuration layer produced by each source.

use serde::Deserialize;

use crate::sections::{
	AuditConfigLayer, AuthConfigLayer, CacheConfigLayer, CryptoConfigLayer, DatabaseConfigLayer,
	LoggingConfigLayer, RotationConfigLayer, StoreConfigLayer,
};

/// One source's view of the configuration. Absent sections are `None`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct ServerConfigLayer {
	#[serde(default)]
	pub logging: Option<LoggingConfigLayer>,
	#[serde(default)]
	pub database: Option<DatabaseConfigLayer>,
	#[serde(default)]
	pub crypto: Option<CryptoConfigLayer>,
	#[serde(default)]
	pub store: Option<StoreConfigLayer>,
	#[serde(default)]
	pub cache: Option<CacheConfigLayer>,
	#[serde(default)]
	pub auth: Option<AuthConfigLayer>,
	#[serde(default)]
	pub rotation: Option<RotationConfigLayer>,
	#[serde(default)]
	pub audit: Option<AuditConfigLayer>,
}

macro_rules! merge_section {
	($self:ident, $other:ident, $field:ident) => {
		match ($self.$field.as_mut(), $other.$field) {
			(Some(current), Some(other)) => current.merge(other),
			(None, Some(other)) => $self.$field = Some(other),
			(_, None) => {}
		}
	};
}

impl ServerConfigLayer {
	/// Merges a higher-precedence layer into this one, field by field.
	pub fn merge(&mut self, other: ServerConfigLayer) {
		merge_section!(self, other, logging);
		merge_section!(self, other, database);
		merge_section!(self, other, crypto);
		merge_section!(self, other, store);
		merge_section!(self, other, cache);
		merge_section!(self, other, auth);
		merge_section!(self, other, rotation);
		merge_section!(self, other, audit);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_merge_is_field_wise() {
		let mut base: ServerConfigLayer = toml::from_str(
			r#"
			[cache]
			local_capacity = 10
			local_ttl_secs = 5
			"#,
		)
		.unwrap();
		let overlay: ServerConfigLayer = toml::from_str(
			r#"
			[cache]
			local_ttl_secs = 9
			"#,
		)
		.unwrap();
		base.merge(overlay);

		let cache = base.cache.unwrap();
		assert_eq!(cache.local_capacity, Some(10));
		assert_eq!(cache.local_ttl_secs, Some(9));
	}
}
