// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Secret rotation settings.
//!
//! Grace windows and rotation intervals are set per secret class: short for
//! ephemeral tokens, long for long-lived credentials.

use serde::{Deserialize, Serialize};
use std::time::Duration;

const HOUR: u64 = 60 * 60;
const DAY: u64 = 24 * HOUR;

/// Grace window and interval for one secret class.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RotationClassConfig {
	pub grace_secs: u64,
	pub interval_secs: u64,
}

impl RotationClassConfig {
	pub fn grace(&self) -> Duration {
		Duration::from_secs(self.grace_secs)
	}

	pub fn interval(&self) -> Duration {
		Duration::from_secs(self.interval_secs)
	}
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RotationClassConfigLayer {
	pub grace_secs: Option<u64>,
	pub interval_secs: Option<u64>,
}

impl RotationClassConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.grace_secs.is_some() {
			self.grace_secs = other.grace_secs;
		}
		if other.interval_secs.is_some() {
			self.interval_secs = other.interval_secs;
		}
	}

	fn finalize(self, default: RotationClassConfig) -> RotationClassConfig {
		RotationClassConfig {
			grace_secs: self.grace_secs.unwrap_or(default.grace_secs),
			interval_secs: self.interval_secs.unwrap_or(default.interval_secs),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RotationConfig {
	pub enabled: bool,
	/// Delay between the pre-rotation notification and generating the new value.
	pub notification_lead_secs: u64,
	pub scheduler_poll_secs: u64,
	pub ephemeral: RotationClassConfig,
	pub standard: RotationClassConfig,
	pub long_lived: RotationClassConfig,
}

impl RotationConfig {
	pub fn notification_lead(&self) -> Duration {
		Duration::from_secs(self.notification_lead_secs)
	}

	pub fn scheduler_poll(&self) -> Duration {
		Duration::from_secs(self.scheduler_poll_secs)
	}
}

impl Default for RotationConfig {
	fn default() -> Self {
		RotationConfigLayer::default().finalize()
	}
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RotationConfigLayer {
	pub enabled: Option<bool>,
	pub notification_lead_secs: Option<u64>,
	pub scheduler_poll_secs: Option<u64>,
	pub ephemeral: Option<RotationClassConfigLayer>,
	pub standard: Option<RotationClassConfigLayer>,
	pub long_lived: Option<RotationClassConfigLayer>,
}

fn merge_class(
	current: &mut Option<RotationClassConfigLayer>,
	other: Option<RotationClassConfigLayer>,
) {
	match (current.as_mut(), other) {
		(Some(current), Some(other)) => current.merge(other),
		(None, Some(other)) => *current = Some(other),
		(_, None) => {}
	}
}

impl RotationConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.enabled.is_some() {
			self.enabled = other.enabled;
		}
		if other.notification_lead_secs.is_some() {
			self.notification_lead_secs = other.notification_lead_secs;
		}
		if other.scheduler_poll_secs.is_some() {
			self.scheduler_poll_secs = other.scheduler_poll_secs;
		}
		merge_class(&mut self.ephemeral, other.ephemeral);
		merge_class(&mut self.standard, other.standard);
		merge_class(&mut self.long_lived, other.long_lived);
	}

	pub fn finalize(self) -> RotationConfig {
		RotationConfig {
			enabled: self.enabled.unwrap_or(true),
			notification_lead_secs: self.notification_lead_secs.unwrap_or(5 * 60),
			scheduler_poll_secs: self.scheduler_poll_secs.unwrap_or(60),
			ephemeral: self.ephemeral.unwrap_or_default().finalize(RotationClassConfig {
				grace_secs: 5 * 60,
				interval_secs: HOUR,
			}),
			standard: self.standard.unwrap_or_default().finalize(RotationClassConfig {
				grace_secs: DAY,
				interval_secs: 30 * DAY,
			}),
			long_lived: self.long_lived.unwrap_or_default().finalize(RotationClassConfig {
				grace_secs: 7 * DAY,
				interval_secs: 90 * DAY,
			}),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_class_defaults_scale_with_lifetime() {
		let config = RotationConfig::default();
		assert!(config.ephemeral.grace() < config.standard.grace());
		assert!(config.standard.grace() < config.long_lived.grace());
	}

	#[test]
	fn test_partial_class_override_keeps_other_field() {
		let mut layer = RotationConfigLayer::default();
		layer.merge(RotationConfigLayer {
			ephemeral: Some(RotationClassConfigLayer {
				grace_secs: Some(30),
				interval_secs: None,
			}),
			..Default::default()
		});
		let config = layer.finalize();
		assert_eq!(config.ephemeral.grace_secs, 30);
		assert_eq!(config.ephemeral.interval_secs, HOUR);
	}
}
