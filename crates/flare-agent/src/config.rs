// Copyright (c) 2025 Flare Contributors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Agent configuration and identity.

use flare_core::CaptureLimits;
use url::Url;
use uuid::Uuid;

use crate::error::{AgentError, Result};

/// Agent version reported during registration.
pub const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");
/// Runtime descriptor reported during registration.
pub const RUNTIME: &str = "rust";
/// Runtime version: the toolchain floor this crate declares.
pub const RUNTIME_VERSION: &str = env!("CARGO_PKG_RUST_VERSION");

/// Immutable agent configuration, constructed once at initialization
/// and read for the lifetime of the process.
#[derive(Debug, Clone)]
pub struct AgentConfig {
	pub api_key: String,
	/// Collector WebSocket endpoint (ws:// or wss://).
	pub endpoint: Url,
	pub environment: String,
	/// Probability in [0, 1] that an eligible error is captured.
	pub sample_rate: f64,
	/// Bounds applied when serializing local variables.
	pub limits: CaptureLimits,
	pub debug: bool,
	/// Stable per-process agent identifier.
	pub agent_id: String,
	pub hostname: String,
}

impl AgentConfig {
	/// Creates a new builder.
	pub fn builder() -> AgentConfigBuilder {
		AgentConfigBuilder::new()
	}
}

/// Builder for [`AgentConfig`].
pub struct AgentConfigBuilder {
	api_key: Option<String>,
	endpoint: Option<String>,
	environment: Option<String>,
	sample_rate: f64,
	limits: CaptureLimits,
	debug: bool,
	agent_id: Option<String>,
	hostname: Option<String>,
}

impl AgentConfigBuilder {
	pub fn new() -> Self {
		Self {
			api_key: None,
			endpoint: None,
			environment: None,
			sample_rate: 1.0,
			limits: CaptureLimits::default(),
			debug: false,
			agent_id: None,
			hostname: None,
		}
	}

	/// Sets the API key used in the registration handshake.
	pub fn api_key(mut self, key: impl Into<String>) -> Self {
		self.api_key = Some(key.into());
		self
	}

	/// Sets the collector endpoint.
	///
	/// Example: `wss://collect.flare.example/agent`
	pub fn endpoint(mut self, url: impl Into<String>) -> Self {
		self.endpoint = Some(url.into());
		self
	}

	/// Sets the environment name.
	///
	/// Example: `production`, `staging`, `development`
	pub fn environment(mut self, env: impl Into<String>) -> Self {
		self.environment = Some(env.into());
		self
	}

	/// Sets the sampling rate, clamped to [0, 1].
	pub fn sample_rate(mut self, rate: f64) -> Self {
		self.sample_rate = rate.clamp(0.0, 1.0);
		self
	}

	/// Sets the maximum serialization recursion depth.
	pub fn max_depth(mut self, depth: usize) -> Self {
		self.limits.max_depth = depth;
		self
	}

	/// Sets the maximum captured string length.
	pub fn max_string_length(mut self, len: usize) -> Self {
		self.limits.max_string_length = len;
		self
	}

	/// Sets the maximum captured collection size.
	pub fn max_collection_size(mut self, size: usize) -> Self {
		self.limits.max_collection_size = size;
		self
	}

	/// Enables verbose diagnostics.
	pub fn debug(mut self, debug: bool) -> Self {
		self.debug = debug;
		self
	}

	/// Overrides the generated agent identifier.
	pub fn agent_id(mut self, id: impl Into<String>) -> Self {
		self.agent_id = Some(id.into());
		self
	}

	/// Overrides the detected hostname.
	pub fn hostname(mut self, hostname: impl Into<String>) -> Self {
		self.hostname = Some(hostname.into());
		self
	}

	/// Builds the configuration.
	pub fn build(self) -> Result<AgentConfig> {
		let api_key = self.api_key.ok_or(AgentError::MissingApiKey)?;
		let endpoint = self.endpoint.ok_or(AgentError::MissingEndpoint)?;
		let endpoint = Url::parse(&endpoint)
			.map_err(|e| AgentError::InvalidEndpoint(e.to_string()))?;
		if !matches!(endpoint.scheme(), "ws" | "wss") {
			return Err(AgentError::InvalidEndpoint(format!(
				"unsupported scheme: {}",
				endpoint.scheme()
			)));
		}

		Ok(AgentConfig {
			api_key,
			endpoint,
			environment: self.environment.unwrap_or_else(|| "production".to_string()),
			sample_rate: self.sample_rate,
			limits: self.limits,
			debug: self.debug,
			agent_id: self
				.agent_id
				.unwrap_or_else(|| Uuid::now_v7().to_string()),
			hostname: self.hostname.unwrap_or_else(detect_hostname),
		})
	}
}

impl Default for AgentConfigBuilder {
	fn default() -> Self {
		Self::new()
	}
}

fn detect_hostname() -> String {
	hostname::get()
		.ok()
		.and_then(|name| name.into_string().ok())
		.unwrap_or_else(|| "unknown".to_string())
}
