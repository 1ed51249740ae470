// Copyright (c) 2025 Flare Contributors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! The exception report, ready for transmission to the collector.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::stacktrace::StackFrame;
use crate::value::CapturedVariable;

/// Globally unique identifier of one report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReportId(pub Uuid);

impl ReportId {
	pub fn new() -> Self {
		Self(Uuid::now_v7())
	}
}

impl Default for ReportId {
	fn default() -> Self {
		Self::new()
	}
}

impl fmt::Display for ReportId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl FromStr for ReportId {
	type Err = uuid::Error;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Ok(Self(Uuid::parse_str(s)?))
	}
}

/// The structured record of one captured exception.
///
/// Immutable once constructed; the capture pipeline owns it until it
/// is handed to the transport for wire serialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExceptionReport {
	pub id: ReportId,
	pub exception_type: String,
	pub message: String,
	pub fingerprint: String,
	pub stack_trace: Vec<StackFrame>,
	/// Serialized local variables; empty unless explicitly supplied.
	#[serde(default)]
	pub local_variables: BTreeMap<String, CapturedVariable>,
	/// Merged ambient context, call-site context, and current user.
	#[serde(default)]
	pub context: BTreeMap<String, serde_json::Value>,
	pub captured_at: DateTime<Utc>,
}
