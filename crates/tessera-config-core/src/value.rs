// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Stored and resolved configuration values.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tessera_common_secret::SecretBytes;

use crate::ids::KekId;
use crate::payload::EncryptedPayload;

/// Broad classification recorded on a [`ConfigEntry`](crate::ConfigEntry).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
	OpaqueBytes,
	Structured,
	SecretReference,
}

impl ValueType {
	pub fn as_str(&self) -> &'static str {
		match self {
			ValueType::OpaqueBytes => "opaque_bytes",
			ValueType::Structured => "structured",
			ValueType::SecretReference => "secret_reference",
		}
	}
}

impl std::str::FromStr for ValueType {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"opaque_bytes" => Ok(ValueType::OpaqueBytes),
			"structured" => Ok(ValueType::Structured),
			"secret_reference" => Ok(ValueType::SecretReference),
			_ => Err(format!("unknown value type: {s}")),
		}
	}
}

/// A value as stored in a [`ConfigVersion`](crate::ConfigVersion).
///
/// Objects use a `BTreeMap` so serialization and merging are deterministic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ConfigValue {
	Bytes(#[serde(with = "crate::payload::base64_bytes")] Vec<u8>),
	String(String),
	Integer(i64),
	Float(f64),
	Boolean(bool),
	Array(Vec<ConfigValue>),
	Object(BTreeMap<String, ConfigValue>),
	/// A string with `{{key}}` placeholders, rendered during resolution.
	Template(String),
	Secret(EncryptedPayload),
}

impl ConfigValue {
	pub fn value_type(&self) -> ValueType {
		match self {
			ConfigValue::Bytes(_) => ValueType::OpaqueBytes,
			ConfigValue::Secret(_) => ValueType::SecretReference,
			ConfigValue::String(_)
			| ConfigValue::Integer(_)
			| ConfigValue::Float(_)
			| ConfigValue::Boolean(_)
			| ConfigValue::Array(_)
			| ConfigValue::Object(_)
			| ConfigValue::Template(_) => ValueType::Structured,
		}
	}

	pub fn kind_name(&self) -> &'static str {
		match self {
			ConfigValue::Bytes(_) => "bytes",
			ConfigValue::String(_) => "string",
			ConfigValue::Integer(_) => "integer",
			ConfigValue::Float(_) => "float",
			ConfigValue::Boolean(_) => "boolean",
			ConfigValue::Array(_) => "array",
			ConfigValue::Object(_) => "object",
			ConfigValue::Template(_) => "template",
			ConfigValue::Secret(_) => "secret",
		}
	}

	pub fn is_secret(&self) -> bool {
		matches!(self, ConfigValue::Secret(_))
	}

	/// True if this value, or any nested value, is an encrypted secret.
	pub fn contains_secret(&self) -> bool {
		match self {
			ConfigValue::Secret(_) => true,
			ConfigValue::Array(items) => items.iter().any(ConfigValue::contains_secret),
			ConfigValue::Object(map) => map.values().any(ConfigValue::contains_secret),
			_ => false,
		}
	}

	/// True if any nested secret has its DEK wrapped under `kek_id`.
	pub fn references_kek(&self, kek_id: &KekId) -> bool {
		match self {
			ConfigValue::Secret(payload) => &payload.kek_id == kek_id,
			ConfigValue::Array(items) => items.iter().any(|v| v.references_kek(kek_id)),
			ConfigValue::Object(map) => map.values().any(|v| v.references_kek(kek_id)),
			_ => false,
		}
	}

	/// Mutable references to every encrypted secret in this value, depth first.
	pub fn secrets_mut(&mut self) -> Vec<&mut EncryptedPayload> {
		let mut found = Vec::new();
		collect_secrets(self, &mut found);
		found
	}

	pub fn as_str(&self) -> Option<&str> {
		match self {
			ConfigValue::String(s) => Some(s),
			_ => None,
		}
	}

	pub fn as_object(&self) -> Option<&BTreeMap<String, ConfigValue>> {
		match self {
			ConfigValue::Object(map) => Some(map),
			_ => None,
		}
	}

	/// Size of the serialized value, used for quota accounting.
	pub fn encoded_len(&self) -> usize {
		serde_json::to_vec(self).map(|v| v.len()).unwrap_or(usize::MAX)
	}
}

fn collect_secrets<'a>(value: &'a mut ConfigValue, found: &mut Vec<&'a mut EncryptedPayload>) {
	match value {
		ConfigValue::Secret(payload) => found.push(payload),
		ConfigValue::Array(items) => {
			for item in items.iter_mut() {
				collect_secrets(item, found);
			}
		}
		ConfigValue::Object(map) => {
			for item in map.values_mut() {
				collect_secrets(item, found);
			}
		}
		_ => {}
	}
}

impl From<&str> for ConfigValue {
	fn from(value: &str) -> Self {
		ConfigValue::String(value.to_string())
	}
}

impl From<String> for ConfigValue {
	fn from(value: String) -> Self {
		ConfigValue::String(value)
	}
}

impl From<i64> for ConfigValue {
	fn from(value: i64) -> Self {
		ConfigValue::Integer(value)
	}
}

impl From<bool> for ConfigValue {
	fn from(value: bool) -> Self {
		ConfigValue::Boolean(value)
	}
}

/// The effective value returned by resolution. Secrets are decrypted.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedValue {
	Bytes(Vec<u8>),
	String(String),
	Integer(i64),
	Float(f64),
	Boolean(bool),
	Array(Vec<ResolvedValue>),
	Object(BTreeMap<String, ResolvedValue>),
	Secret(SecretBytes),
}

impl ResolvedValue {
	pub fn kind_name(&self) -> &'static str {
		match self {
			ResolvedValue::Bytes(_) => "bytes",
			ResolvedValue::String(_) => "string",
			ResolvedValue::Integer(_) => "integer",
			ResolvedValue::Float(_) => "float",
			ResolvedValue::Boolean(_) => "boolean",
			ResolvedValue::Array(_) => "array",
			ResolvedValue::Object(_) => "object",
			ResolvedValue::Secret(_) => "secret",
		}
	}

	pub fn as_str(&self) -> Option<&str> {
		match self {
			ResolvedValue::String(s) => Some(s),
			_ => None,
		}
	}

	pub fn as_secret(&self) -> Option<&SecretBytes> {
		match self {
			ResolvedValue::Secret(s) => Some(s),
			_ => None,
		}
	}

	/// Scalar rendering used for template substitution.
	///
	/// Secrets and containers have no scalar rendering.
	pub fn render_scalar(&self) -> Option<String> {
		match self {
			ResolvedValue::String(s) => Some(s.clone()),
			ResolvedValue::Integer(i) => Some(i.to_string()),
			ResolvedValue::Float(f) => Some(f.to_string()),
			ResolvedValue::Boolean(b) => Some(b.to_string()),
			ResolvedValue::Bytes(_)
			| ResolvedValue::Array(_)
			| ResolvedValue::Object(_)
			| ResolvedValue::Secret(_) => None,
		}
	}

	/// True if this value, or any nested value, is a decrypted secret.
	pub fn contains_secret(&self) -> bool {
		match self {
			ResolvedValue::Secret(_) => true,
			ResolvedValue::Array(items) => items.iter().any(ResolvedValue::contains_secret),
			ResolvedValue::Object(map) => map.values().any(ResolvedValue::contains_secret),
			_ => false,
		}
	}
}
