// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use tessera_server_config::LoggingConfig;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::error::{Result, ServiceError};

/// Installs the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over `logging.level`. Fails if a subscriber
/// is already installed.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
	let filter = match EnvFilter::try_from_default_env() {
		Ok(filter) => filter,
		Err(_) => EnvFilter::try_new(&config.level)
			.map_err(|e| ServiceError::Startup(format!("invalid log level '{}': {e}", config.level)))?,
	};

	let registry = tracing_subscriber::registry().with(filter);
	let installed = if config.json {
		registry.with(fmt::layer().json()).try_init()
	} else {
		registry.with(fmt::layer()).try_init()
	};
	installed.map_err(|e| ServiceError::Startup(e.to_string()))
}
