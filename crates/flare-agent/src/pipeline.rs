// Copyright (c) 2025 Flare Contributors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Capture pipeline: sampling, context merging, and report assembly.

use std::collections::BTreeMap;

use chrono::Utc;
use rand::Rng;
use serde_json::Value;

use flare_core::{
	fingerprint, parse_stack_trace, serialize_value, CaptureLimits, CaptureValue, CapturedVariable,
	ExceptionReport, ReportId,
};

/// The identity of the current user, merged into every report's
/// context under the `"user"` key.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct UserContext {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub id: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub email: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub username: Option<String>,
}

/// Sampling decision for one eligible error.
///
/// A rate of 1.0 or above always captures, 0.0 or below never does,
/// anything between is a uniform draw.
pub(crate) fn should_sample(rate: f64) -> bool {
	decide(rate, || rand::thread_rng().gen())
}

fn decide(rate: f64, draw: impl FnOnce() -> f64) -> bool {
	if rate >= 1.0 {
		true
	} else if rate <= 0.0 {
		false
	} else {
		draw() < rate
	}
}

/// Merges context layers in increasing precedence: ambient custom
/// context, call-site context, current user. Later keys overwrite
/// earlier ones on collision.
pub(crate) fn merge_context(
	ambient: &BTreeMap<String, Value>,
	call_site: Option<&BTreeMap<String, Value>>,
	user: Option<&UserContext>,
) -> BTreeMap<String, Value> {
	let mut merged = ambient.clone();
	if let Some(call_site) = call_site {
		merged.extend(call_site.iter().map(|(k, v)| (k.clone(), v.clone())));
	}
	if let Some(user) = user {
		if let Ok(value) = serde_json::to_value(user) {
			merged.insert("user".to_string(), value);
		}
	}
	merged
}

/// Everything the capture paths supply for one report.
pub(crate) struct CaptureRequest<'a> {
	pub exception_type: &'a str,
	pub message: &'a str,
	pub stack: &'a str,
	pub call_site_context: Option<BTreeMap<String, Value>>,
	pub locals: Option<&'a [(String, CaptureValue)]>,
}

/// Assembles a transmission-ready report: parses the stack, derives
/// the fingerprint, merges context, and serializes any supplied
/// locals under the configured limits.
pub(crate) fn build_report(
	request: CaptureRequest<'_>,
	ambient: &BTreeMap<String, Value>,
	user: Option<&UserContext>,
	limits: &CaptureLimits,
) -> ExceptionReport {
	let stack_trace = parse_stack_trace(request.stack);
	let fingerprint = fingerprint(request.exception_type, &stack_trace);

	let local_variables: BTreeMap<String, CapturedVariable> = request
		.locals
		.unwrap_or_default()
		.iter()
		.map(|(name, value)| (name.clone(), serialize_value(name, value, limits)))
		.collect();

	ExceptionReport {
		id: ReportId::new(),
		exception_type: request.exception_type.to_string(),
		message: request.message.to_string(),
		fingerprint,
		stack_trace,
		local_variables,
		context: merge_context(ambient, request.call_site_context.as_ref(), user),
		captured_at: Utc::now(),
	}
}
