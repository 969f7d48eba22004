// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Wrapper types for sensitive values.
//!
//! [`Secret<T>`] holds a value that must never reach logs, error messages, or
//! serialized output by accident. `Debug`, `Display`, and `Serialize` all emit
//! [`REDACTED`]; the inner value is only reachable through [`Secret::expose`].
//! The inner value is zeroized when the wrapper is dropped.
//!
//! ```
//! use tessera_common_secret::SecretString;
//!
//! let password = SecretString::new("pw123".to_string());
//! assert_eq!(format!("{password:?}"), "[REDACTED]");
//! assert_eq!(password.expose(), "pw123");
//! ```

use std::fmt;

use zeroize::Zeroize;

/// Placeholder printed instead of a secret value.
pub const REDACTED: &str = "[REDACTED]";

/// A value that is redacted from all formatting and zeroized on drop.
pub struct Secret<T: Zeroize> {
	inner: T,
}

/// A secret UTF-8 string.
pub type SecretString = Secret<String>;

/// Secret raw bytes (decrypted payloads, key material).
pub type SecretBytes = Secret<Vec<u8>>;

impl<T: Zeroize> Secret<T> {
	pub fn new(inner: T) -> Self {
		Self { inner }
	}

	/// Returns a reference to the protected value.
	///
	/// Call sites should keep the exposed value on the stack for as short a
	/// time as possible and never pass it to a logging macro.
	pub fn expose(&self) -> &T {
		&self.inner
	}

	/// Maps the protected value into a new secret without exposing it to callers.
	pub fn map<U: Zeroize>(&self, f: impl FnOnce(&T) -> U) -> Secret<U> {
		Secret::new(f(&self.inner))
	}
}

impl SecretBytes {
	/// Interprets the bytes as UTF-8, returning `None` on invalid input.
	pub fn to_secret_string(&self) -> Option<SecretString> {
		std::str::from_utf8(&self.inner)
			.ok()
			.map(|s| SecretString::new(s.to_string()))
	}

	pub fn len(&self) -> usize {
		self.inner.len()
	}

	pub fn is_empty(&self) -> bool {
		self.inner.is_empty()
	}
}

impl From<String> for SecretString {
	fn from(value: String) -> Self {
		Self::new(value)
	}
}

impl From<&str> for SecretString {
	fn from(value: &str) -> Self {
		Self::new(value.to_string())
	}
}

impl From<Vec<u8>> for SecretBytes {
	fn from(value: Vec<u8>) -> Self {
		Self::new(value)
	}
}

impl<T: Zeroize> Drop for Secret<T> {
	fn drop(&mut self) {
		self.inner.zeroize();
	}
}

impl<T: Zeroize + Clone> Clone for Secret<T> {
	fn clone(&self) -> Self {
		Self::new(self.inner.clone())
	}
}

impl<T: Zeroize + PartialEq> PartialEq for Secret<T> {
	fn eq(&self, other: &Self) -> bool {
		self.inner == other.inner
	}
}

impl<T: Zeroize + Eq> Eq for Secret<T> {}

impl<T: Zeroize + Default> Default for Secret<T> {
	fn default() -> Self {
		Self::new(T::default())
	}
}

impl<T: Zeroize> fmt::Debug for Secret<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(REDACTED)
	}
}

impl<T: Zeroize> fmt::Display for Secret<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(REDACTED)
	}
}

#[cfg(feature = "serde")]
impl<T: Zeroize> serde::Serialize for Secret<T> {
	fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_str(REDACTED)
	}
}

#[cfg(feature = "serde")]
impl<'de, T: Zeroize + serde::Deserialize<'de>> serde::Deserialize<'de> for Secret<T> {
	fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		T::deserialize(deserializer).map(Secret::new)
	}
}
