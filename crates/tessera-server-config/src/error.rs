// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration errors.

use std::path::PathBuf;

use tessera_config_core::ErrorKind;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
	#[error("failed to read config file {path}: {source}")]
	FileRead {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("failed to parse config file {path}: {source}")]
	TomlParse {
		path: PathBuf,
		#[source]
		source: toml::de::Error,
	},

	#[error("invalid value for {key}: {message}")]
	InvalidValue { key: String, message: String },

	#[error("configuration validation failed: {0}")]
	Validation(String),
}

impl ConfigError {
	pub fn kind(&self) -> ErrorKind {
		match self {
			ConfigError::FileRead { .. } => ErrorKind::Internal,
			ConfigError::TomlParse { .. }
			| ConfigError::InvalidValue { .. }
			| ConfigError::Validation(_) => ErrorKind::InvalidInput,
		}
	}
}
