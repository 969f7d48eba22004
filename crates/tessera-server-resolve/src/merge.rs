// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Layer merging.
//!
//! Objects merge key by key, recursively. Every other value kind is replaced
//! wholesale by the higher layer. An object or array meeting a value of a
//! different kind is a [`ResolveError::SchemaMismatch`]; the merge never
//! coerces.

use tessera_config_core::ConfigValue;

use crate::error::{ResolveError, Result};

/// Merges `overlay` (higher priority) on top of `base`.
pub fn deep_merge(base: ConfigValue, overlay: ConfigValue) -> Result<ConfigValue> {
	merge_at(base, overlay, "$")
}

fn merge_at(base: ConfigValue, overlay: ConfigValue, path: &str) -> Result<ConfigValue> {
	match (base, overlay) {
		(ConfigValue::Object(mut acc), ConfigValue::Object(layer)) => {
			for (key, value) in layer {
				let merged = match acc.remove(&key) {
					Some(existing) => merge_at(existing, value, &format!("{path}.{key}"))?,
					None => value,
				};
				acc.insert(key, merged);
			}
			Ok(ConfigValue::Object(acc))
		}
		(ConfigValue::Array(_), overlay @ ConfigValue::Array(_)) => Ok(overlay),
		(base, overlay) if is_container(&base) || is_container(&overlay) => {
			Err(ResolveError::mismatch(
				path,
				format!(
					"cannot merge {} over {}",
					overlay.kind_name(),
					base.kind_name()
				),
			))
		}
		(_, overlay) => Ok(overlay),
	}
}

fn is_container(value: &ConfigValue) -> bool {
	matches!(value, ConfigValue::Object(_) | ConfigValue::Array(_))
}
