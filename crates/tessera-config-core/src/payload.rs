// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Envelope-encrypted secret payloads.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::ids::KekId;

/// Envelope layout version. Bound into the AAD of every payload.
pub const ENVELOPE_FORMAT_VERSION: u8 = 1;

/// Authenticated cipher used for the payload body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Algorithm {
	#[serde(rename = "AES-256-GCM")]
	Aes256Gcm,
}

impl Algorithm {
	pub fn as_str(&self) -> &'static str {
		match self {
			Algorithm::Aes256Gcm => "AES-256-GCM",
		}
	}
}

impl fmt::Display for Algorithm {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// A secret encrypted under a per-secret DEK, with the DEK wrapped by a tenant KEK.
///
/// `wrapped_dek` can only be opened by the key-management provider holding
/// `kek_id`. The plaintext DEK is never part of this struct.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedPayload {
	#[serde(with = "base64_bytes")]
	pub ciphertext: Vec<u8>,
	#[serde(with = "base64_bytes")]
	pub nonce: Vec<u8>,
	#[serde(with = "base64_bytes")]
	pub auth_tag: Vec<u8>,
	#[serde(with = "base64_bytes")]
	pub wrapped_dek: Vec<u8>,
	pub kek_id: KekId,
	pub algorithm: Algorithm,
	#[serde(default = "default_format_version")]
	pub format_version: u8,
}

fn default_format_version() -> u8 {
	ENVELOPE_FORMAT_VERSION
}

impl EncryptedPayload {
	/// Additional authenticated data for this envelope.
	///
	/// Binds algorithm, format version and owning tenant. The KEK id is left
	/// out so a DEK can be re-wrapped under a new KEK without touching the body.
	pub fn aad(algorithm: Algorithm, format_version: u8, tenant: &str) -> Vec<u8> {
		format!("tessera:{}:v{}:{}", algorithm.as_str(), format_version, tenant).into_bytes()
	}
}

impl fmt::Debug for EncryptedPayload {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("EncryptedPayload")
			.field("kek_id", &self.kek_id)
			.field("algorithm", &self.algorithm)
			.field("format_version", &self.format_version)
			.field("ciphertext_len", &self.ciphertext.len())
			.finish_non_exhaustive()
	}
}

pub(crate) mod base64_bytes {
	use super::*;

	pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_str(&BASE64.encode(bytes))
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
		let encoded = String::deserialize(deserializer)?;
		BASE64.decode(encoded).map_err(serde::de::Error::custom)
	}
}
