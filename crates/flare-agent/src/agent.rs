// Copyright (c) 2025 Flare Contributors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! The agent: the single explicit context object tying config,
//! capture pipeline, and transport together.
//!
//! One agent per process is the intended lifecycle: init → active →
//! shutdown. The handle is cheaply cloneable; all clones share the
//! same state.

use std::backtrace::Backtrace;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use serde_json::Value;
use tracing::{debug, info, warn};

use flare_core::CaptureValue;

use crate::config::AgentConfig;
use crate::hooks;
use crate::pipeline::{self, CaptureRequest, UserContext};
use crate::transport::Transport;

/// Handle to a running agent.
#[derive(Clone)]
pub struct Agent {
	inner: Arc<AgentInner>,
}

pub(crate) struct AgentInner {
	config: Arc<AgentConfig>,
	transport: Transport,
	custom_context: RwLock<BTreeMap<String, Value>>,
	user: RwLock<Option<UserContext>>,
	closed: AtomicBool,
}

impl Agent {
	/// Creates an agent and spawns its transport task. Must be called
	/// within a tokio runtime. The connection is not opened until
	/// [`Agent::connect`].
	pub fn new(config: AgentConfig) -> Self {
		let config = Arc::new(config);
		let transport = Transport::spawn(Arc::clone(&config));
		info!(
			endpoint = %config.endpoint,
			environment = %config.environment,
			agent_id = %config.agent_id,
			"agent initialized"
		);
		Self {
			inner: Arc::new(AgentInner {
				config,
				transport,
				custom_context: RwLock::new(BTreeMap::new()),
				user: RwLock::new(None),
				closed: AtomicBool::new(false),
			}),
		}
	}

	/// Opens the collector connection; no-op when already open.
	pub fn connect(&self) {
		self.inner.transport.connect();
	}

	/// Closes the collector connection and cancels pending reconnects.
	pub fn disconnect(&self) {
		self.inner.transport.disconnect();
	}

	/// Installs automatic capture of panics. Idempotent.
	pub fn install(&self) {
		hooks::install(self);
	}

	/// Deactivates automatic capture.
	pub fn uninstall(&self) {
		hooks::uninstall();
	}

	/// Replaces the ambient custom context atomically.
	pub fn set_context(&self, context: BTreeMap<String, Value>) {
		if let Ok(mut guard) = self.inner.custom_context.write() {
			*guard = context;
		}
	}

	/// Replaces the current user atomically.
	pub fn set_user(&self, user: Option<UserContext>) {
		if let Ok(mut guard) = self.inner.user.write() {
			*guard = user;
		}
	}

	/// Captures an error value, deriving its type name and a fresh
	/// backtrace. This is the manual capture path: supplied locals are
	/// serialized into the report.
	pub fn capture_error<E: std::error::Error>(
		&self,
		error: &E,
		context: Option<BTreeMap<String, Value>>,
		locals: Option<&[(String, CaptureValue)]>,
	) {
		let stack = Backtrace::force_capture().to_string();
		self.capture(
			std::any::type_name_of_val(error),
			&error.to_string(),
			&stack,
			context,
			locals,
		);
	}

	/// Captures an exception from its parts.
	pub fn capture(
		&self,
		exception_type: &str,
		message: &str,
		stack: &str,
		context: Option<BTreeMap<String, Value>>,
		locals: Option<&[(String, CaptureValue)]>,
	) {
		self.capture_inner(exception_type, message, stack, context, locals);
	}

	/// Awaits a fallible future, reporting its error as an unhandled
	/// asynchronous failure before passing it through unchanged.
	pub async fn watch<F, T, E>(&self, future: F) -> Result<T, E>
	where
		F: Future<Output = Result<T, E>>,
		E: std::error::Error,
	{
		let result = future.await;
		if let Err(e) = &result {
			let stack = Backtrace::force_capture().to_string();
			let mut context = BTreeMap::new();
			context.insert("origin".to_string(), Value::from("unhandledrejection"));
			self.capture_inner(
				std::any::type_name_of_val(e),
				&e.to_string(),
				&stack,
				Some(context),
				None,
			);
		}
		result
	}

	/// Automatic capture entry used by the panic hook.
	pub(crate) fn handle_panic(&self, message: &str, location: Option<String>) {
		let stack = Backtrace::force_capture().to_string();
		let mut context = BTreeMap::new();
		context.insert("origin".to_string(), Value::from("error"));
		if let Some(location) = location {
			context.insert("location".to_string(), Value::from(location));
		}
		self.capture_inner("panic", message, &stack, Some(context), None);
	}

	fn capture_inner(
		&self,
		exception_type: &str,
		message: &str,
		stack: &str,
		call_site_context: Option<BTreeMap<String, Value>>,
		locals: Option<&[(String, CaptureValue)]>,
	) {
		if self.inner.closed.load(Ordering::SeqCst) {
			warn!("capture after shutdown ignored");
			return;
		}
		if !pipeline::should_sample(self.inner.config.sample_rate) {
			return;
		}

		let ambient = self
			.inner
			.custom_context
			.read()
			.map(|guard| guard.clone())
			.unwrap_or_default();
		let user = self
			.inner
			.user
			.read()
			.map(|guard| guard.clone())
			.unwrap_or_default();

		let report = pipeline::build_report(
			CaptureRequest {
				exception_type,
				message,
				stack,
				call_site_context,
				locals,
			},
			&ambient,
			user.as_ref(),
			&self.inner.config.limits,
		);

		debug!(
			id = %report.id,
			fingerprint = %report.fingerprint,
			exception_type = %report.exception_type,
			"captured exception report"
		);
		self.inner.transport.send_report(report);
	}

	/// Shuts the agent down: deactivates hooks, closes the transport,
	/// and rejects further captures. Idempotent.
	pub fn shutdown(&self) {
		if self.inner.closed.swap(true, Ordering::SeqCst) {
			return;
		}
		hooks::uninstall();
		self.inner.transport.disconnect();
		self.inner.transport.shutdown();
		info!("agent shut down");
	}

	/// Returns true once the agent has been shut down.
	pub fn is_closed(&self) -> bool {
		self.inner.closed.load(Ordering::SeqCst)
	}

	#[cfg(test)]
	pub(crate) fn transport(&self) -> &Transport {
		&self.inner.transport
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	fn test_agent() -> Agent {
		let config = AgentConfig::builder()
			.api_key("key_123")
			.endpoint("ws://127.0.0.1:1")
			.build()
			.unwrap();
		Agent::new(config)
	}

	#[tokio::test]
	async fn capture_after_shutdown_is_a_no_op() {
		let agent = test_agent();
		agent.shutdown();
		assert!(agent.is_closed());
		// Must not panic or error.
		agent.capture("Error", "late", "Error: late", None, None);
	}

	#[tokio::test]
	async fn double_shutdown_is_ok() {
		let agent = test_agent();
		agent.shutdown();
		agent.shutdown();
	}

	#[tokio::test]
	async fn captured_report_reaches_the_transport_queue() {
		let agent = test_agent();
		agent.capture(
			"TypeError",
			"x is null",
			"TypeError: x is null\n    at foo (/app.js:42:1)",
			None,
			None,
		);
		let status = agent.transport().status().await.unwrap();
		assert_eq!(status.queued, 1);
		agent.shutdown();
	}

	#[tokio::test]
	async fn zero_sample_rate_captures_nothing() {
		let config = AgentConfig::builder()
			.api_key("key_123")
			.endpoint("ws://127.0.0.1:1")
			.sample_rate(0.0)
			.build()
			.unwrap();
		let agent = Agent::new(config);
		for _ in 0..50 {
			agent.capture("Error", "boom", "Error: boom", None, None);
		}
		let status = agent.transport().status().await.unwrap();
		assert_eq!(status.queued, 0);
		agent.shutdown();
	}

	#[tokio::test]
	async fn context_setters_replace_atomically() {
		let agent = test_agent();
		let mut context = BTreeMap::new();
		context.insert("region".to_string(), json!("eu-west"));
		agent.set_context(context);
		agent.set_user(Some(UserContext {
			id: Some("u1".to_string()),
			..Default::default()
		}));

		let mut replacement = BTreeMap::new();
		replacement.insert("region".to_string(), json!("us-east"));
		agent.set_context(replacement);

		let guard = agent.inner.custom_context.read().unwrap();
		assert_eq!(guard["region"], json!("us-east"));
		assert_eq!(guard.len(), 1);
		drop(guard);
		agent.shutdown();
	}

	#[tokio::test]
	async fn watch_reports_and_passes_the_error_through() {
		let agent = test_agent();
		let result: Result<(), std::io::Error> = agent
			.watch(async {
				Err(std::io::Error::new(std::io::ErrorKind::Other, "async boom"))
			})
			.await;
		assert!(result.is_err());
		let status = agent.transport().status().await.unwrap();
		assert_eq!(status.queued, 1);
		agent.shutdown();
	}
}
