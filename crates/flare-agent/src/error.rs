// Copyright (c) 2025 Flare Contributors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Error types for the agent.

use thiserror::Error;

/// Result type alias for agent operations.
pub type Result<T> = std::result::Result<T, AgentError>;

/// Errors that can occur while configuring the agent.
///
/// Captures and transport failures never surface as errors: the agent
/// observes failures in the host process without becoming one, so
/// those paths degrade to diagnostics instead.
#[derive(Debug, Error)]
pub enum AgentError {
	#[error("API key is required")]
	MissingApiKey,

	#[error("collector endpoint is required")]
	MissingEndpoint,

	#[error("invalid collector endpoint: {0}")]
	InvalidEndpoint(String),
}
