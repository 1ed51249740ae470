// Copyright (c) 2025 Flare Contributors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Automatic capture of panics via the process-wide panic hook.
//!
//! The std panic hook cannot be safely popped once chained, so the
//! hook itself is installed at most once per process and reads the
//! active agent from a global slot: `install` fills the slot
//! (idempotent), `uninstall` empties it, turning the chained hook into
//! a pass-through.

use std::panic::PanicHookInfo;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, OnceLock};

use tracing::debug;

use crate::agent::Agent;

static HOOK_CHAINED: AtomicBool = AtomicBool::new(false);

fn agent_slot() -> &'static Mutex<Option<Agent>> {
	static SLOT: OnceLock<Mutex<Option<Agent>>> = OnceLock::new();
	SLOT.get_or_init(|| Mutex::new(None))
}

/// Activates automatic panic capture for `agent`. Repeat installs are
/// no-ops while an agent is active.
pub(crate) fn install(agent: &Agent) {
	{
		let Ok(mut slot) = agent_slot().lock() else {
			return;
		};
		if slot.is_some() {
			debug!("automatic capture already installed");
			return;
		}
		*slot = Some(agent.clone());
	}

	if !HOOK_CHAINED.swap(true, Ordering::SeqCst) {
		let previous = std::panic::take_hook();
		std::panic::set_hook(Box::new(move |info| {
			if let Some(agent) = active_agent() {
				agent.handle_panic(&panic_message(info), panic_location(info));
			}
			previous(info);
		}));
		debug!("panic hook chained");
	}
}

/// Deactivates automatic capture.
pub(crate) fn uninstall() {
	if let Ok(mut slot) = agent_slot().lock() {
		*slot = None;
	}
}

fn active_agent() -> Option<Agent> {
	agent_slot().lock().ok().and_then(|slot| slot.clone())
}

fn panic_message(info: &PanicHookInfo<'_>) -> String {
	if let Some(s) = info.payload().downcast_ref::<&str>() {
		(*s).to_string()
	} else if let Some(s) = info.payload().downcast_ref::<String>() {
		s.clone()
	} else {
		"panic with non-string payload".to_string()
	}
}

fn panic_location(info: &PanicHookInfo<'_>) -> Option<String> {
	info.location()
		.map(|loc| format!("{}:{}:{}", loc.file(), loc.line(), loc.column()))
}
