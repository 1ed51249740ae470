// Copyright (c) 2025 Flare Contributors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Parsing of free-form stack trace text into structured frames.
//!
//! The trace format is the conventional `at method (path:line:col)`
//! shape: the first line is the exception header, every following line
//! must carry the `at ` marker to be considered at all. Parsing is
//! total; lines the grammar does not recognize still surface as frames
//! carrying their raw content.

use serde::{Deserialize, Serialize};

/// Maximum number of frames retained per trace; excess is dropped.
pub const MAX_FRAMES: usize = 50;

const FRAME_MARKER: &str = "at ";
const ANONYMOUS: &str = "<anonymous>";

/// One structured entry of a parsed call stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackFrame {
	/// Function or method name, `"<anonymous>"` when unknown.
	pub method_name: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub file_name: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub file_path: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub line_number: Option<u32>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub column_number: Option<u32>,
	pub is_native: bool,
}

impl StackFrame {
	fn named(method_name: &str) -> Self {
		Self {
			method_name: method_name.to_string(),
			file_name: None,
			file_path: None,
			line_number: None,
			column_number: None,
			is_native: false,
		}
	}

	fn native(method_name: &str) -> Self {
		Self {
			is_native: true,
			..Self::named(method_name)
		}
	}

	fn located(method_name: &str, location: Location) -> Self {
		Self {
			file_name: Some(location.file_name),
			file_path: Some(location.file_path),
			line_number: Some(location.line),
			column_number: Some(location.column),
			..Self::named(method_name)
		}
	}
}

struct Location {
	file_name: String,
	file_path: String,
	line: u32,
	column: u32,
}

/// Parses trace text into at most [`MAX_FRAMES`] frames.
///
/// The header line is skipped; lines without the `at ` marker are
/// discarded. Never fails.
pub fn parse_stack_trace(trace: &str) -> Vec<StackFrame> {
	let mut frames = Vec::new();
	for line in trace.lines().skip(1) {
		if frames.len() >= MAX_FRAMES {
			break;
		}
		let Some(content) = line.trim().strip_prefix(FRAME_MARKER) else {
			continue;
		};
		frames.push(parse_frame(content.trim()));
	}
	frames
}

fn parse_frame(content: &str) -> StackFrame {
	if is_native_marker(content) {
		return StackFrame::native(ANONYMOUS);
	}

	// `<method> (<location>)`
	if let Some((method, location)) = split_method_location(content) {
		if is_native_marker(location) {
			return StackFrame::native(method);
		}
		if let Some(location) = parse_location(location) {
			return StackFrame::located(method, location);
		}
	}

	// bare `<location>`
	if let Some(location) = parse_location(content) {
		return StackFrame::located(ANONYMOUS, location);
	}

	// Unrecognized shape: keep the raw content so no line vanishes.
	StackFrame::named(content)
}

fn is_native_marker(s: &str) -> bool {
	s == "[native code]" || s.starts_with("native")
}

fn split_method_location(content: &str) -> Option<(&str, &str)> {
	let rest = content.strip_suffix(')')?;
	let open = rest.rfind(" (")?;
	Some((&rest[..open], &rest[open + 2..]))
}

/// Parses `<path>:<line>:<column>`, splitting the file name off the
/// last path segment (either slash style).
fn parse_location(s: &str) -> Option<Location> {
	let mut parts = s.rsplitn(3, ':');
	let column = parts.next()?.parse().ok()?;
	let line = parts.next()?.parse().ok()?;
	let file_path = parts.next()?;
	if file_path.is_empty() {
		return None;
	}
	let file_name = file_path
		.rsplit(['/', '\\'])
		.next()
		.unwrap_or(file_path)
		.to_string();
	Some(Location {
		file_name,
		file_path: file_path.to_string(),
		line,
		column,
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	#[test]
	fn parses_method_with_location() {
		let trace = "TypeError: x is null\n    at foo (/srv/app/handlers.js:42:13)";
		let frames = parse_stack_trace(trace);
		assert_eq!(frames.len(), 1);
		assert_eq!(frames[0].method_name, "foo");
		assert_eq!(frames[0].file_name.as_deref(), Some("handlers.js"));
		assert_eq!(frames[0].file_path.as_deref(), Some("/srv/app/handlers.js"));
		assert_eq!(frames[0].line_number, Some(42));
		assert_eq!(frames[0].column_number, Some(13));
		assert!(!frames[0].is_native);
	}

	#[test]
	fn parses_bare_location() {
		let trace = "Error\n    at /srv/app/index.js:7:1";
		let frames = parse_stack_trace(trace);
		assert_eq!(frames[0].method_name, "<anonymous>");
		assert_eq!(frames[0].file_name.as_deref(), Some("index.js"));
		assert_eq!(frames[0].line_number, Some(7));
	}

	#[test]
	fn header_line_is_skipped() {
		let trace = "at fake (/x.js:1:1)\n    at real (/y.js:2:2)";
		let frames = parse_stack_trace(trace);
		assert_eq!(frames.len(), 1);
		assert_eq!(frames[0].method_name, "real");
	}

	#[test]
	fn lines_without_marker_are_discarded() {
		let trace = "Error\nsome noise\n    at foo (/a.js:1:1)\n\t<garbage>";
		let frames = parse_stack_trace(trace);
		assert_eq!(frames.len(), 1);
		assert_eq!(frames[0].method_name, "foo");
	}

	#[test]
	fn native_frames_have_no_location() {
		let trace = "Error\n    at [native code]\n    at map (native)";
		let frames = parse_stack_trace(trace);
		assert_eq!(frames.len(), 2);
		assert!(frames[0].is_native);
		assert_eq!(frames[0].method_name, "<anonymous>");
		assert!(frames[1].is_native);
		assert_eq!(frames[1].method_name, "map");
		assert!(frames[1].file_path.is_none());
	}

	#[test]
	fn windows_paths_split_on_backslash() {
		let trace = "Error\n    at run (C:\\app\\main.js:10:5)";
		let frames = parse_stack_trace(trace);
		assert_eq!(frames[0].file_name.as_deref(), Some("main.js"));
		assert_eq!(frames[0].file_path.as_deref(), Some("C:\\app\\main.js"));
	}

	#[test]
	fn unparsable_content_becomes_raw_frame() {
		let trace = "Error\n    at something entirely different";
		let frames = parse_stack_trace(trace);
		assert_eq!(frames.len(), 1);
		assert_eq!(frames[0].method_name, "something entirely different");
		assert!(!frames[0].is_native);
		assert!(frames[0].file_path.is_none());
	}

	#[test]
	fn frame_count_caps_at_fifty() {
		let mut trace = String::from("Error\n");
		for i in 0..80 {
			trace.push_str(&format!("    at f{i} (/a.js:{i}:1)\n"));
		}
		let frames = parse_stack_trace(&trace);
		assert_eq!(frames.len(), MAX_FRAMES);
		assert_eq!(frames[0].method_name, "f0");
		assert_eq!(frames[49].method_name, "f49");
	}

	#[test]
	fn empty_input_yields_no_frames() {
		assert!(parse_stack_trace("").is_empty());
		assert!(parse_stack_trace("just a header").is_empty());
	}

	proptest! {
		#[test]
		fn parsing_is_total(trace in "\\PC{0,400}") {
			let frames = parse_stack_trace(&trace);
			prop_assert!(frames.len() <= MAX_FRAMES);
		}

		#[test]
		fn multiline_parsing_is_total(lines in proptest::collection::vec("\\PC{0,60}", 0..60)) {
			let trace = lines.join("\n");
			let frames = parse_stack_trace(&trace);
			prop_assert!(frames.len() <= MAX_FRAMES);
		}
	}
}
