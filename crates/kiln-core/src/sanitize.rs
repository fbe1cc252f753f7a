//! Data sanitizer.
//!
//! Produces an acyclic, JSON-representable snapshot of page data before it is
//! handed to a component or embedded in generated client code.
//!
//! The walk follows these rules:
//!
//! - arrays and objects already open on the current path are omitted, so a
//!   back-reference never loops, while the same object may still appear in
//!   sibling branches;
//! - keys listed in [`SanitizePolicy::denied_keys`] are skipped without being
//!   evaluated;
//! - keys starting with [`SanitizePolicy::private_prefix`] are skipped;
//! - functions, `undefined` and `null` are omitted below the top level;
//! - getters are evaluated and their result is sanitized, a failing getter is
//!   omitted.
//!
//! ```
//! use kiln_core::sanitize::sanitize;
//! use kiln_core::value::{PageObject, PageValue};
//!
//! let page = PageObject::new().with("title", "Home").with("_cache", 1);
//! page.insert("self", page.clone());
//!
//! let clean = sanitize(&PageValue::Object(page));
//! assert_eq!(clean, serde_json::json!({"title": "Home"}));
//! ```

use std::cell::RefCell;
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ConfigError, ConfigResult};
use crate::value::{PageArray, PageObject, PageValue};

/// Property that throws when read on the host's page objects.
pub const TEMPLATE_CONTENT_KEY: &str = "templateContent";

/// Prefix marking host-internal properties.
pub const PRIVATE_PREFIX: &str = "_";

/// Which properties the sanitizer refuses to follow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SanitizePolicy {
	/// Keys skipped without evaluation.
	pub denied_keys: BTreeSet<String>,
	/// Keys starting with this prefix are skipped. `None` disables the check.
	pub private_prefix: Option<String>,
}

impl Default for SanitizePolicy {
	fn default() -> Self {
		Self {
			denied_keys: BTreeSet::from([TEMPLATE_CONTENT_KEY.to_string()]),
			private_prefix: Some(PRIVATE_PREFIX.to_string()),
		}
	}
}

impl SanitizePolicy {
	/// Creates the default policy.
	pub fn new() -> Self {
		Self::default()
	}

	/// A policy that excludes nothing but cycles, functions and nulls.
	pub fn permissive() -> Self {
		Self {
			denied_keys: BTreeSet::new(),
			private_prefix: None,
		}
	}

	/// Adds a key to the denylist.
	pub fn deny(mut self, key: impl Into<String>) -> Self {
		self.denied_keys.insert(key.into());
		self
	}

	/// Sets the private-key prefix.
	pub fn private_prefix(mut self, prefix: Option<impl Into<String>>) -> Self {
		self.private_prefix = prefix.map(Into::into);
		self
	}

	/// Returns `true` if a property with this name must not be read.
	pub fn excludes(&self, key: &str) -> bool {
		if self.denied_keys.contains(key) {
			return true;
		}
		self.private_prefix
			.as_deref()
			.is_some_and(|prefix| key.starts_with(prefix))
	}

	/// Validates the policy.
	pub fn validate(&self) -> ConfigResult<()> {
		if self.denied_keys.iter().any(|key| key.is_empty()) {
			return Err(ConfigError::InvalidPolicy(
				"denied keys must not be empty".to_string(),
			));
		}
		if self.private_prefix.as_deref() == Some("") {
			return Err(ConfigError::InvalidPolicy(
				"private prefix must not be empty, omit it to disable the check".to_string(),
			));
		}
		Ok(())
	}
}

/// Sanitizes a value with the default policy.
pub fn sanitize(value: &PageValue) -> Value {
	sanitize_with(value, &SanitizePolicy::default())
}

/// Sanitizes a value with an explicit policy.
///
/// A top-level value that has no JSON form (undefined, null, a function)
/// becomes `null`.
pub fn sanitize_with(value: &PageValue, policy: &SanitizePolicy) -> Value {
	Sanitizer::new(policy).visit(value, None).unwrap_or(Value::Null)
}

/// Serializes sanitized data for embedding inside generated script source.
///
/// Output is indented with four spaces. `</` is written as `<\/` so the
/// data cannot terminate an enclosing `<script>` element, and the line
/// separators U+2028/U+2029 are escaped for older script parsers.
pub fn to_embedded_json(value: &Value) -> String {
	let mut buf = Vec::new();
	let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
	let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
	if value.serialize(&mut serializer).is_err() {
		return "null".to_string();
	}
	String::from_utf8(buf)
		.unwrap_or_else(|_| "null".to_string())
		.replace("</", "<\\/")
		.replace('\u{2028}', "\\u2028")
		.replace('\u{2029}', "\\u2029")
}

/// Walk state: the identities of arrays and objects open on the current path.
struct Sanitizer<'a> {
	policy: &'a SanitizePolicy,
	open: RefCell<Vec<usize>>,
}

/// Pops the open stack when a subtree is left, on every exit path.
struct OpenGuard<'s> {
	open: &'s RefCell<Vec<usize>>,
}

impl<'s> OpenGuard<'s> {
	/// Pushes `identity`, or returns `None` if it is already open.
	fn enter(open: &'s RefCell<Vec<usize>>, identity: usize) -> Option<Self> {
		let mut stack = open.borrow_mut();
		if stack.contains(&identity) {
			return None;
		}
		stack.push(identity);
		Some(Self { open })
	}
}

impl Drop for OpenGuard<'_> {
	fn drop(&mut self) {
		self.open.borrow_mut().pop();
	}
}

impl<'a> Sanitizer<'a> {
	fn new(policy: &'a SanitizePolicy) -> Self {
		Self {
			policy,
			open: RefCell::new(Vec::new()),
		}
	}

	/// Returns `None` when the value must be omitted.
	fn visit(&self, value: &PageValue, key: Option<&str>) -> Option<Value> {
		match value {
			PageValue::Undefined | PageValue::Null | PageValue::Function(_) => None,
			PageValue::Bool(b) => Some(Value::Bool(*b)),
			PageValue::Number(n) => Some(Value::Number(n.clone())),
			PageValue::String(s) => Some(Value::String(s.clone())),
			PageValue::Array(array) => self.visit_array(array),
			PageValue::Object(object) => self.visit_object(object),
			PageValue::Getter(lazy) => match lazy.evaluate() {
				Ok(resolved) => self.visit(&resolved, key),
				Err(err) => {
					tracing::warn!(
						key = key.unwrap_or("<root>"),
						error = %err,
						"omitting page data property whose getter failed"
					);
					None
				}
			},
		}
	}

	fn visit_array(&self, array: &PageArray) -> Option<Value> {
		let _guard = OpenGuard::enter(&self.open, array.identity())?;
		let items = array
			.snapshot()
			.iter()
			.filter_map(|item| self.visit(item, None))
			.collect();
		Some(Value::Array(items))
	}

	fn visit_object(&self, object: &PageObject) -> Option<Value> {
		let _guard = OpenGuard::enter(&self.open, object.identity())?;
		let mut map = Map::new();
		for (key, value) in object.snapshot() {
			if self.policy.excludes(&key) {
				continue;
			}
			if let Some(clean) = self.visit(&value, Some(&key)) {
				map.insert(key, clean);
			}
		}
		Some(Value::Object(map))
	}
}
