// Copyright (c) 2025 Flare Contributors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Core types and algorithms for the Flare error-telemetry system.
//!
//! This crate provides the pieces of the agent with no I/O concerns:
//! bounded serialization of runtime values into a transmissible tree,
//! stack-trace parsing into structured frames, deterministic
//! fingerprinting for error grouping, and the wire envelope types
//! exchanged with the collector. It is used by the in-process agent
//! (`flare-agent`) and by any server-side consumer of the wire format.

pub mod error;
pub mod fingerprint;
pub mod report;
pub mod stacktrace;
pub mod value;
pub mod wire;

pub use error::{CoreError, Result};
pub use fingerprint::fingerprint;
pub use report::{ExceptionReport, ReportId};
pub use stacktrace::{parse_stack_trace, StackFrame, MAX_FRAMES};
pub use value::{serialize_value, CaptureLimits, CaptureValue, CapturedVariable};
pub use wire::{Envelope, ExceptionPayload, Inbound, Outbound, RegisterPayload, RuntimeInfo};
