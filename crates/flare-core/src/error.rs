// Copyright (c) 2025 Flare Contributors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Error types for the core crate.

use thiserror::Error;

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors that can occur while encoding or decoding wire messages.
#[derive(Debug, Error)]
pub enum CoreError {
	#[error("wire encoding failed: {0}")]
	Encode(#[source] serde_json::Error),

	#[error("malformed inbound message: {0}")]
	Decode(#[source] serde_json::Error),
}
