// Copyright (c) 2025 Flare Contributors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Example: capture an error with local variables using the Flare
//! agent.
//!
//! Run with:
//!   cargo run --example capture -p flare-agent

use std::collections::BTreeMap;

use flare_agent::{Agent, AgentConfig, CaptureValue, UserContext};
use serde_json::json;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	tracing_subscriber::fmt()
		.with_env_filter(
			tracing_subscriber::EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| "flare_agent=debug".into()),
		)
		.init();

	let api_key =
		std::env::var("FLARE_API_KEY").expect("FLARE_API_KEY environment variable required");
	let endpoint = std::env::var("FLARE_ENDPOINT")
		.unwrap_or_else(|_| "ws://127.0.0.1:8181/agent".to_string());

	println!("Initializing agent...");
	println!("  Endpoint: {}", endpoint);

	let config = AgentConfig::builder()
		.api_key(&api_key)
		.endpoint(&endpoint)
		.environment("development")
		.build()?;

	let agent = Agent::new(config);
	agent.install();
	agent.connect();

	// Ambient context attached to every report.
	let mut context = BTreeMap::new();
	context.insert("example".to_string(), json!(true));
	agent.set_context(context);

	agent.set_user(Some(UserContext {
		id: Some("user_example_123".to_string()),
		email: Some("example@example.com".to_string()),
		username: Some("example_user".to_string()),
	}));

	// Manual capture with a synthetic trace and local variables.
	println!("\nCapturing test error...");
	let locals = vec![
		("retries".to_string(), CaptureValue::Number(3.0)),
		(
			"request".to_string(),
			CaptureValue::object(
				Some("Request"),
				vec![
					(
						"path".to_string(),
						CaptureValue::String("/api/data".to_string()),
					),
					("body".to_string(), CaptureValue::Null),
				],
			),
		),
	];
	agent.capture(
		"TypeError",
		"x is null",
		"TypeError: x is null\n    at loadData (/srv/app/data.js:42:13)\n    at main (/srv/app/index.js:7:1)",
		None,
		Some(&locals),
	);

	// Give the transport a moment to deliver before shutting down.
	tokio::time::sleep(std::time::Duration::from_secs(2)).await;

	agent.shutdown();
	println!("\nAgent shutdown complete.");

	Ok(())
}
