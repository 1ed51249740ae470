// Copyright (c) 2025 Flare Contributors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! In-process error-telemetry agent.
//!
//! Flare intercepts unhandled failures, serializes bounded snapshots
//! of program state around the failure point, fingerprints them for
//! grouping, and streams structured reports to a remote collector over
//! a persistent WebSocket.
//!
//! # Example
//!
//! ```ignore
//! use flare_agent::{Agent, AgentConfig};
//!
//! let config = AgentConfig::builder()
//!     .api_key("your_api_key")
//!     .endpoint("wss://collect.flare.example/agent")
//!     .environment("production")
//!     .build()?;
//!
//! let agent = Agent::new(config);
//! agent.install();
//! agent.connect();
//!
//! // Manual capture with locals
//! if let Err(e) = do_something() {
//!     agent.capture_error(&e, None, None);
//! }
//!
//! agent.shutdown();
//! ```

pub mod agent;
pub mod config;
pub mod error;
mod hooks;
mod pipeline;
pub mod transport;

pub use agent::Agent;
pub use config::{AgentConfig, AgentConfigBuilder};
pub use error::{AgentError, Result};
pub use pipeline::UserContext;
pub use transport::{ConnectionState, Transport, TransportStatus};

// Re-export the core types callers need to hand values to the agent.
pub use flare_core::{CaptureLimits, CaptureValue, CapturedVariable, ExceptionReport, StackFrame};
