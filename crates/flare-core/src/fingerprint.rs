// Copyright (c) 2025 Flare Contributors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Fingerprinting for grouping reports from the same call site.
//!
//! Grouping is by exception type and call site, deliberately not by
//! message text: two errors thrown from the same place with different
//! interpolated messages share a fingerprint.

use sha2::{Digest, Sha256};

use crate::stacktrace::StackFrame;

/// Length of the hex fingerprint.
pub const FINGERPRINT_LEN: usize = 16;

/// How many non-native frames contribute to the fingerprint.
const FINGERPRINT_FRAMES: usize = 5;

/// Computes a 16-character lowercase-hex fingerprint for an error
/// class.
///
/// The seed is the exception type (`"Error"` when empty) followed by
/// `method:line` for the first [`FINGERPRINT_FRAMES`] non-native
/// frames, joined with `:`, hashed with SHA-256 and truncated.
pub fn fingerprint(exception_type: &str, frames: &[StackFrame]) -> String {
	let exception_type = if exception_type.is_empty() {
		"Error"
	} else {
		exception_type
	};

	let mut parts = Vec::with_capacity(1 + FINGERPRINT_FRAMES);
	parts.push(exception_type.to_string());
	for frame in frames
		.iter()
		.filter(|f| !f.is_native)
		.take(FINGERPRINT_FRAMES)
	{
		parts.push(format!(
			"{}:{}",
			frame.method_name,
			frame.line_number.unwrap_or(0)
		));
	}

	let digest = Sha256::digest(parts.join(":").as_bytes());
	hex::encode(digest)[..FINGERPRINT_LEN].to_string()
}
