// Copyright (c) 2025 Flare Contributors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! JSON wire protocol spoken over the persistent collector socket.
//!
//! Every frame is a JSON object `{type, payload, timestamp}`. Outbound
//! frames are `register` (the authentication handshake) and
//! `exception`; inbound frames are `registered` (handshake ack) and
//! `error` (a backend-reported problem, diagnostic only).

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::report::ExceptionReport;

/// Envelope wrapping any wire message with its send timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
	#[serde(flatten)]
	pub message: T,
	/// Unix epoch milliseconds.
	pub timestamp: i64,
}

impl<T> Envelope<T> {
	pub fn new(message: T) -> Self {
		Self {
			message,
			timestamp: Utc::now().timestamp_millis(),
		}
	}
}

impl<T: Serialize> Envelope<T> {
	/// Encodes the envelope as a JSON text frame.
	pub fn encode(&self) -> Result<String> {
		serde_json::to_string(self).map_err(CoreError::Encode)
	}
}

/// Messages sent agent → collector.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Outbound {
	Register(RegisterPayload),
	Exception(ExceptionPayload),
}

/// Messages pushed collector → agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Inbound {
	/// Acknowledges registration; the transport may start flushing.
	Registered(serde_json::Value),
	/// Backend-reported problem, surfaced for diagnostics only.
	Error(ErrorNotice),
}

/// Decodes an inbound JSON text frame.
pub fn decode_inbound(text: &str) -> Result<Envelope<Inbound>> {
	serde_json::from_str(text).map_err(CoreError::Decode)
}

/// Registration handshake payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterPayload {
	pub api_key: String,
	pub agent_id: String,
	pub hostname: String,
	pub runtime: String,
	pub runtime_version: String,
	pub agent_version: String,
	pub environment: String,
}

/// Runtime descriptor attached to every exception frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeInfo {
	pub name: String,
	pub version: String,
}

/// Exception frame payload: the report plus agent/runtime metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExceptionPayload {
	#[serde(flatten)]
	pub report: ExceptionReport,
	pub agent_id: String,
	pub environment: String,
	pub runtime: String,
	pub runtime_info: RuntimeInfo,
}

/// Backend-reported problem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorNotice {
	pub message: String,
}
