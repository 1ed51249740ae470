// Copyright (c) 2025 Flare Contributors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Bounded serialization of runtime values into a transmissible tree.
//!
//! The serializer converts an arbitrary [`CaptureValue`] graph into a
//! finite [`CapturedVariable`] tree. Depth, string length, and
//! collection size are all capped by [`CaptureLimits`], and a per-call
//! visited set breaks reference cycles, so serialization terminates for
//! any input and never panics.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet};
use std::rc::Rc;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Placeholder rendered when a value is revisited within one capture.
const CIRCULAR: &str = "<circular>";

/// How many fields an object preview shows before eliding the rest.
const PREVIEW_FIELDS: usize = 3;

/// Shared list cell for array values. Reference-counted so cyclic
/// structures are constructible.
pub type ArrayCell = Rc<RefCell<Vec<CaptureValue>>>;

/// Shared field-list cell for object values, preserving declaration
/// order.
pub type FieldsCell = Rc<RefCell<Vec<(String, CaptureValue)>>>;

/// A runtime value eligible for capture, as a closed classification.
///
/// Recognized structured built-ins (dates, errors, map-likes,
/// set-likes, URLs) carry only their one-line summary inputs and are
/// never recursed into. Arrays and objects hold shared cells so the
/// same node may appear at several points in the graph, including its
/// own descendants.
#[derive(Debug, Clone)]
pub enum CaptureValue {
	Null,
	Undefined,
	Bool(bool),
	Number(f64),
	BigInt(i128),
	String(String),
	Symbol(String),
	Function { name: Option<String> },
	Date(DateTime<Utc>),
	Error { error_type: String, message: String },
	Map { len: usize },
	Set { len: usize },
	Url(String),
	Array(ArrayCell),
	Object { class: Option<String>, fields: FieldsCell },
}

impl CaptureValue {
	/// Wraps a vector of elements as a shared array value.
	pub fn array(elements: Vec<CaptureValue>) -> Self {
		Self::Array(Rc::new(RefCell::new(elements)))
	}

	/// Wraps named fields as a shared object value.
	pub fn object(class: Option<&str>, fields: Vec<(String, CaptureValue)>) -> Self {
		Self::Object {
			class: class.map(str::to_string),
			fields: Rc::new(RefCell::new(fields)),
		}
	}

	/// The type tag reported for this value.
	fn type_name(&self) -> String {
		match self {
			Self::Null => "null".to_string(),
			Self::Undefined => "undefined".to_string(),
			Self::Bool(_) => "boolean".to_string(),
			Self::Number(_) => "number".to_string(),
			Self::BigInt(_) => "bigint".to_string(),
			Self::String(_) => "string".to_string(),
			Self::Symbol(_) => "symbol".to_string(),
			Self::Function { .. } => "function".to_string(),
			Self::Date(_) => "Date".to_string(),
			Self::Error { .. } => "Error".to_string(),
			Self::Map { .. } => "Map".to_string(),
			Self::Set { .. } => "Set".to_string(),
			Self::Url(_) => "URL".to_string(),
			Self::Array(_) => "array".to_string(),
			Self::Object { class, .. } => {
				class.clone().unwrap_or_else(|| "Object".to_string())
			}
		}
	}
}

/// Bounds applied to one capture call.
#[derive(Debug, Clone)]
pub struct CaptureLimits {
	/// Maximum recursion depth; the limit is inclusive, values at the
	/// limit render their summary but do not recurse.
	pub max_depth: usize,
	/// Maximum rendered string length before truncation.
	pub max_string_length: usize,
	/// Maximum number of elements or fields recursed into.
	pub max_collection_size: usize,
}

impl Default for CaptureLimits {
	fn default() -> Self {
		Self {
			max_depth: 3,
			max_string_length: 1024,
			max_collection_size: 25,
		}
	}
}

/// One captured variable in the serialized tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapturedVariable {
	pub name: String,
	#[serde(rename = "type")]
	pub type_name: String,
	pub value: String,
	pub is_null: bool,
	pub is_truncated: bool,
	/// Recursed object fields. Mutually exclusive with
	/// `array_elements`; omitted when no fields were captured.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub children: Option<BTreeMap<String, CapturedVariable>>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub array_elements: Option<Vec<CapturedVariable>>,
	/// True element count, which may exceed the captured elements.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub array_length: Option<usize>,
}

impl CapturedVariable {
	fn leaf(name: &str, type_name: String, value: String, is_null: bool, is_truncated: bool) -> Self {
		Self {
			name: name.to_string(),
			type_name,
			value,
			is_null,
			is_truncated,
			children: None,
			array_elements: None,
			array_length: None,
		}
	}
}

/// Serializes `value` under `name` into a bounded tree.
///
/// Total for any input: cycles render as `"<circular>"`, and every
/// dimension of the output is capped by `limits`.
pub fn serialize_value(name: &str, value: &CaptureValue, limits: &CaptureLimits) -> CapturedVariable {
	let mut visited = HashSet::new();
	serialize_at(name, value, 0, limits, &mut visited)
}

fn serialize_at(
	name: &str,
	value: &CaptureValue,
	depth: usize,
	limits: &CaptureLimits,
	visited: &mut HashSet<usize>,
) -> CapturedVariable {
	match value {
		CaptureValue::Null => {
			CapturedVariable::leaf(name, value.type_name(), "null".to_string(), true, false)
		}
		CaptureValue::Undefined => {
			CapturedVariable::leaf(name, value.type_name(), "undefined".to_string(), false, false)
		}
		CaptureValue::Bool(b) => {
			CapturedVariable::leaf(name, value.type_name(), b.to_string(), false, false)
		}
		CaptureValue::Number(n) => {
			CapturedVariable::leaf(name, value.type_name(), n.to_string(), false, false)
		}
		CaptureValue::BigInt(n) => {
			CapturedVariable::leaf(name, value.type_name(), n.to_string(), false, false)
		}
		CaptureValue::String(s) => {
			let (rendered, truncated) = clip(s, limits.max_string_length);
			CapturedVariable::leaf(name, value.type_name(), rendered, false, truncated)
		}
		CaptureValue::Symbol(desc) => CapturedVariable::leaf(
			name,
			value.type_name(),
			format!("Symbol({desc})"),
			false,
			false,
		),
		CaptureValue::Function { name: fn_name } => CapturedVariable::leaf(
			name,
			value.type_name(),
			format!("[Function: {}]", fn_name.as_deref().unwrap_or("anonymous")),
			false,
			false,
		),
		CaptureValue::Date(d) => CapturedVariable::leaf(
			name,
			value.type_name(),
			d.to_rfc3339_opts(SecondsFormat::Millis, true),
			false,
			false,
		),
		CaptureValue::Error { error_type, message } => CapturedVariable::leaf(
			name,
			value.type_name(),
			format!("{error_type}: {message}"),
			false,
			false,
		),
		CaptureValue::Map { len } => {
			CapturedVariable::leaf(name, value.type_name(), format!("Map({len})"), false, false)
		}
		CaptureValue::Set { len } => {
			CapturedVariable::leaf(name, value.type_name(), format!("Set({len})"), false, false)
		}
		CaptureValue::Url(href) => {
			let (rendered, truncated) = clip(href, limits.max_string_length);
			CapturedVariable::leaf(name, value.type_name(), rendered, false, truncated)
		}
		CaptureValue::Array(cell) => {
			if !visited.insert(Rc::as_ptr(cell) as usize) {
				return circular(name, value.type_name());
			}
			serialize_array(name, value.type_name(), cell, depth, limits, visited)
		}
		CaptureValue::Object { class: _, fields } => {
			if !visited.insert(Rc::as_ptr(fields) as usize) {
				return circular(name, value.type_name());
			}
			serialize_object(name, value.type_name(), fields, depth, limits, visited)
		}
	}
}

fn serialize_array(
	name: &str,
	type_name: String,
	cell: &ArrayCell,
	depth: usize,
	limits: &CaptureLimits,
	visited: &mut HashSet<usize>,
) -> CapturedVariable {
	let Ok(items) = cell.try_borrow() else {
		return circular(name, type_name);
	};
	let len = items.len();
	let mut var =
		CapturedVariable::leaf(name, type_name, format!("Array({len})"), false, false);
	var.array_length = Some(len);
	if depth < limits.max_depth && len <= limits.max_collection_size {
		var.array_elements = Some(
			items
				.iter()
				.enumerate()
				.map(|(i, item)| serialize_at(&i.to_string(), item, depth + 1, limits, visited))
				.collect(),
		);
	}
	var
}

fn serialize_object(
	name: &str,
	type_name: String,
	cell: &FieldsCell,
	depth: usize,
	limits: &CaptureLimits,
	visited: &mut HashSet<usize>,
) -> CapturedVariable {
	let Ok(fields) = cell.try_borrow() else {
		return circular(name, type_name);
	};
	let (preview, truncated) = clip(&object_preview(&fields), limits.max_string_length);
	let mut var = CapturedVariable::leaf(name, type_name, preview, false, truncated);
	if depth < limits.max_depth {
		let children: BTreeMap<String, CapturedVariable> = fields
			.iter()
			.take(limits.max_collection_size)
			.map(|(field, value)| {
				(
					field.clone(),
					serialize_at(field, value, depth + 1, limits, visited),
				)
			})
			.collect();
		if !children.is_empty() {
			var.children = Some(children);
		}
	}
	var
}

fn circular(name: &str, type_name: String) -> CapturedVariable {
	CapturedVariable::leaf(name, type_name, CIRCULAR.to_string(), false, false)
}

/// Truncates `s` to at most `max` characters, reporting whether
/// anything was cut.
fn clip(s: &str, max: usize) -> (String, bool) {
	if s.chars().count() <= max {
		(s.to_string(), false)
	} else {
		(s.chars().take(max).collect(), true)
	}
}

/// One-line preview of an object's leading fields.
fn object_preview(fields: &[(String, CaptureValue)]) -> String {
	let mut parts: Vec<String> = fields
		.iter()
		.take(PREVIEW_FIELDS)
		.map(|(name, value)| format!("{name}: {}", short_render(value)))
		.collect();
	if fields.len() > PREVIEW_FIELDS {
		parts.push("...".to_string());
	}
	format!("{{{}}}", parts.join(", "))
}

fn short_render(value: &CaptureValue) -> String {
	match value {
		CaptureValue::Null => "null".to_string(),
		CaptureValue::Undefined => "undefined".to_string(),
		CaptureValue::Bool(b) => b.to_string(),
		CaptureValue::Number(n) => n.to_string(),
		CaptureValue::BigInt(n) => n.to_string(),
		CaptureValue::String(s) => {
			let (clipped, _) = clip(s, 16);
			format!("\"{clipped}\"")
		}
		CaptureValue::Symbol(_) => "Symbol".to_string(),
		CaptureValue::Function { .. } => "[Function]".to_string(),
		CaptureValue::Date(_) => "[Date]".to_string(),
		CaptureValue::Error { error_type, .. } => format!("[{error_type}]"),
		CaptureValue::Map { len } => format!("Map({len})"),
		CaptureValue::Set { len } => format!("Set({len})"),
		CaptureValue::Url(_) => "[URL]".to_string(),
		CaptureValue::Array(cell) => match cell.try_borrow() {
			Ok(items) => format!("Array({})", items.len()),
			Err(_) => "Array".to_string(),
		},
		CaptureValue::Object { class, .. } => {
			class.clone().unwrap_or_else(|| "{...}".to_string())
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	fn limits() -> CaptureLimits {
		CaptureLimits::default()
	}

	#[test]
	fn primitives_render_textually() {
		let var = serialize_value("n", &CaptureValue::Number(42.0), &limits());
		assert_eq!(var.type_name, "number");
		assert_eq!(var.value, "42");
		assert!(!var.is_null);

		let var = serialize_value("b", &CaptureValue::Bool(true), &limits());
		assert_eq!(var.value, "true");

		let var = serialize_value("big", &CaptureValue::BigInt(9_007_199_254_740_993), &limits());
		assert_eq!(var.type_name, "bigint");
		assert_eq!(var.value, "9007199254740993");
	}

	#[test]
	fn null_and_undefined_are_distinct() {
		let null = serialize_value("v", &CaptureValue::Null, &limits());
		assert_eq!(null.type_name, "null");
		assert_eq!(null.value, "null");
		assert!(null.is_null);

		let undef = serialize_value("v", &CaptureValue::Undefined, &limits());
		assert_eq!(undef.type_name, "undefined");
		assert_eq!(undef.value, "undefined");
		assert!(!undef.is_null);
	}

	#[test]
	fn long_string_truncates_to_exact_limit() {
		let mut lim = limits();
		lim.max_string_length = 10;
		let var = serialize_value("s", &CaptureValue::String("a".repeat(50)), &lim);
		assert_eq!(var.value.chars().count(), 10);
		assert!(var.is_truncated);

		let var = serialize_value("s", &CaptureValue::String("short".to_string()), &lim);
		assert_eq!(var.value, "short");
		assert!(!var.is_truncated);
	}

	#[test]
	fn string_at_limit_is_not_truncated() {
		let mut lim = limits();
		lim.max_string_length = 5;
		let var = serialize_value("s", &CaptureValue::String("exact".to_string()), &lim);
		assert_eq!(var.value, "exact");
		assert!(!var.is_truncated);
	}

	#[test]
	fn function_renders_placeholder() {
		let named = CaptureValue::Function {
			name: Some("handler".to_string()),
		};
		assert_eq!(serialize_value("f", &named, &limits()).value, "[Function: handler]");

		let anon = CaptureValue::Function { name: None };
		assert_eq!(serialize_value("f", &anon, &limits()).value, "[Function: anonymous]");
	}

	#[test]
	fn builtins_summarize_without_recursion() {
		let var = serialize_value("m", &CaptureValue::Map { len: 3 }, &limits());
		assert_eq!(var.type_name, "Map");
		assert_eq!(var.value, "Map(3)");
		assert!(var.children.is_none());

		let var = serialize_value("s", &CaptureValue::Set { len: 0 }, &limits());
		assert_eq!(var.value, "Set(0)");

		let date = CaptureValue::Date("2025-06-01T12:00:00Z".parse().unwrap());
		let var = serialize_value("d", &date, &limits());
		assert_eq!(var.type_name, "Date");
		assert_eq!(var.value, "2025-06-01T12:00:00.000Z");

		let err = CaptureValue::Error {
			error_type: "TypeError".to_string(),
			message: "x is null".to_string(),
		};
		let var = serialize_value("e", &err, &limits());
		assert_eq!(var.type_name, "Error");
		assert_eq!(var.value, "TypeError: x is null");
	}

	#[test]
	fn array_reports_length_and_elements() {
		let arr = CaptureValue::array(vec![
			CaptureValue::Number(1.0),
			CaptureValue::Number(2.0),
		]);
		let var = serialize_value("a", &arr, &limits());
		assert_eq!(var.type_name, "array");
		assert_eq!(var.array_length, Some(2));
		let elements = var.array_elements.unwrap();
		assert_eq!(elements.len(), 2);
		assert_eq!(elements[0].name, "0");
		assert_eq!(elements[0].value, "1");
		assert!(var.children.is_none());
	}

	#[test]
	fn oversized_array_reports_length_only() {
		let mut lim = limits();
		lim.max_collection_size = 3;
		let arr = CaptureValue::array(vec![CaptureValue::Number(0.0); 10]);
		let var = serialize_value("a", &arr, &lim);
		assert_eq!(var.array_length, Some(10));
		assert!(var.array_elements.is_none());
	}

	#[test]
	fn object_children_capped_at_collection_size() {
		let mut lim = limits();
		lim.max_collection_size = 2;
		let obj = CaptureValue::object(
			None,
			vec![
				("a".to_string(), CaptureValue::Number(1.0)),
				("b".to_string(), CaptureValue::Number(2.0)),
				("c".to_string(), CaptureValue::Number(3.0)),
			],
		);
		let var = serialize_value("o", &obj, &lim);
		assert_eq!(var.type_name, "Object");
		let children = var.children.unwrap();
		assert_eq!(children.len(), 2);
		assert!(children.contains_key("a"));
		assert!(children.contains_key("b"));
	}

	#[test]
	fn empty_object_omits_children() {
		let obj = CaptureValue::object(Some("Empty"), Vec::new());
		let var = serialize_value("o", &obj, &limits());
		assert_eq!(var.type_name, "Empty");
		assert!(var.children.is_none());
	}

	#[test]
	fn depth_limit_is_inclusive() {
		let mut lim = limits();
		lim.max_depth = 1;
		let inner = CaptureValue::object(
			None,
			vec![("deep".to_string(), CaptureValue::Number(1.0))],
		);
		let obj = CaptureValue::object(None, vec![("inner".to_string(), inner)]);
		let var = serialize_value("o", &obj, &lim);
		// Depth 0 recurses into depth 1; depth 1 renders a summary only.
		let children = var.children.unwrap();
		let inner_var = &children["inner"];
		assert!(inner_var.children.is_none());
		assert!(!inner_var.value.is_empty());
	}

	#[test]
	fn cyclic_array_terminates() {
		let cell: ArrayCell = Rc::new(RefCell::new(Vec::new()));
		cell.borrow_mut().push(CaptureValue::Array(Rc::clone(&cell)));
		let var = serialize_value("a", &CaptureValue::Array(cell), &limits());
		let elements = var.array_elements.unwrap();
		assert_eq!(elements[0].value, "<circular>");
	}

	#[test]
	fn cyclic_object_terminates() {
		let fields: FieldsCell = Rc::new(RefCell::new(Vec::new()));
		let obj = CaptureValue::Object {
			class: Some("Node".to_string()),
			fields: Rc::clone(&fields),
		};
		fields.borrow_mut().push(("me".to_string(), obj.clone()));
		let var = serialize_value("o", &obj, &limits());
		let children = var.children.unwrap();
		assert_eq!(children["me"].value, "<circular>");
		assert_eq!(children["me"].type_name, "Node");
	}

	#[test]
	fn shared_node_renders_once() {
		let shared = CaptureValue::object(
			None,
			vec![("x".to_string(), CaptureValue::Number(1.0))],
		);
		let root = CaptureValue::object(
			None,
			vec![
				("first".to_string(), shared.clone()),
				("second".to_string(), shared),
			],
		);
		let var = serialize_value("o", &root, &limits());
		let children = var.children.unwrap();
		assert!(children["first"].children.is_some());
		assert_eq!(children["second"].value, "<circular>");
	}

	#[test]
	fn preview_lists_leading_fields() {
		let obj = CaptureValue::object(
			None,
			vec![
				("a".to_string(), CaptureValue::Number(1.0)),
				("b".to_string(), CaptureValue::String("hi".to_string())),
				("c".to_string(), CaptureValue::Bool(false)),
				("d".to_string(), CaptureValue::Null),
			],
		);
		let var = serialize_value("o", &obj, &limits());
		assert_eq!(var.value, "{a: 1, b: \"hi\", c: false, ...}");
	}

	#[test]
	fn serializes_to_camel_case_json() {
		let var = serialize_value("s", &CaptureValue::String("x".to_string()), &limits());
		let json = serde_json::to_value(&var).unwrap();
		assert_eq!(json["type"], "string");
		assert_eq!(json["isNull"], false);
		assert_eq!(json["isTruncated"], false);
		assert!(json.get("children").is_none());
		assert!(json.get("arrayElements").is_none());
	}

	proptest! {
		#[test]
		fn clip_never_exceeds_limit(s in ".{0,200}", max in 0usize..64) {
			let (clipped, truncated) = clip(&s, max);
			prop_assert!(clipped.chars().count() <= max || !truncated);
			if truncated {
				prop_assert_eq!(clipped.chars().count(), max);
			} else {
				prop_assert_eq!(clipped, s);
			}
		}

		#[test]
		fn numbers_never_panic(n in any::<f64>()) {
			let var = serialize_value("n", &CaptureValue::Number(n), &limits());
			prop_assert_eq!(var.type_name, "number");
		}
	}
}
