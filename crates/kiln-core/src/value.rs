//! Page data model.
//!
//! The host engine hands every render a data object that it owns. That object
//! may contain back-references to itself, callables, and lazily evaluated
//! properties. [`PageValue`] models that shape so the sanitizer can walk it.
//!
//! Arrays and objects are shared handles. Cloning a [`PageObject`] clones the
//! handle, not the contents, which is what makes cycles expressible:
//!
//! ```
//! use kiln_core::value::{PageObject, PageValue};
//!
//! let page = PageObject::new();
//! page.insert("title", "Home");
//! page.insert("self", PageValue::Object(page.clone()));
//! assert_eq!(page.len(), 2);
//! ```
//!
//! A cycle built this way is never freed. Hosts that build long-lived graphs
//! should break them explicitly once a build finishes.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;

/// Error returned by a lazily evaluated property.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct GetterError(pub String);

impl GetterError {
	/// Creates a getter error with the given message.
	pub fn new(message: impl Into<String>) -> Self {
		Self(message.into())
	}
}

/// Result of evaluating a [`LazyValue`].
pub type GetterResult = Result<PageValue, GetterError>;

/// A value reachable from page data.
#[derive(Clone, Default)]
pub enum PageValue {
	/// Absent value.
	#[default]
	Undefined,
	/// Explicit null.
	Null,
	/// Boolean.
	Bool(bool),
	/// Finite number.
	Number(serde_json::Number),
	/// String.
	String(String),
	/// Shared, ordered sequence.
	Array(PageArray),
	/// Shared, ordered key/value map.
	Object(PageObject),
	/// Callable value. Never serialized.
	Function(PageFunction),
	/// Property evaluated on access.
	Getter(LazyValue),
}

impl PageValue {
	/// Wraps a closure as a lazily evaluated property.
	pub fn getter<F>(f: F) -> Self
	where
		F: Fn() -> GetterResult + Send + Sync + 'static,
	{
		Self::Getter(LazyValue::new(f))
	}

	/// Wraps a closure as a function value.
	pub fn function<F>(f: F) -> Self
	where
		F: Fn(&[PageValue]) -> PageValue + Send + Sync + 'static,
	{
		Self::Function(PageFunction::new(f))
	}

	/// Returns `true` for [`PageValue::Undefined`] and [`PageValue::Null`].
	pub fn is_nullish(&self) -> bool {
		matches!(self, Self::Undefined | Self::Null)
	}

	/// Returns the string contents, if this is a string.
	pub fn as_str(&self) -> Option<&str> {
		match self {
			Self::String(s) => Some(s),
			_ => None,
		}
	}

	/// Returns the object handle, if this is an object.
	pub fn as_object(&self) -> Option<&PageObject> {
		match self {
			Self::Object(object) => Some(object),
			_ => None,
		}
	}

	/// Returns the array handle, if this is an array.
	pub fn as_array(&self) -> Option<&PageArray> {
		match self {
			Self::Array(array) => Some(array),
			_ => None,
		}
	}

	/// Reads a property from an object value.
	///
	/// Getters are returned unevaluated.
	pub fn get(&self, key: &str) -> Option<PageValue> {
		self.as_object().and_then(|object| object.get(key))
	}
}

impl fmt::Debug for PageValue {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Undefined => write!(f, "Undefined"),
			Self::Null => write!(f, "Null"),
			Self::Bool(b) => write!(f, "Bool({b})"),
			Self::Number(n) => write!(f, "Number({n})"),
			Self::String(s) => write!(f, "String({s:?})"),
			Self::Array(array) => fmt::Debug::fmt(array, f),
			Self::Object(object) => fmt::Debug::fmt(object, f),
			Self::Function(_) => write!(f, "Function"),
			Self::Getter(_) => write!(f, "Getter"),
		}
	}
}

impl From<serde_json::Value> for PageValue {
	fn from(value: serde_json::Value) -> Self {
		match value {
			serde_json::Value::Null => Self::Null,
			serde_json::Value::Bool(b) => Self::Bool(b),
			serde_json::Value::Number(n) => Self::Number(n),
			serde_json::Value::String(s) => Self::String(s),
			serde_json::Value::Array(items) => {
				Self::Array(PageArray::from_vec(items.into_iter().map(Self::from).collect()))
			}
			serde_json::Value::Object(map) => {
				let object = PageObject::new();
				for (key, value) in map {
					object.insert(key, Self::from(value));
				}
				Self::Object(object)
			}
		}
	}
}

impl From<&str> for PageValue {
	fn from(value: &str) -> Self {
		Self::String(value.to_string())
	}
}

impl From<String> for PageValue {
	fn from(value: String) -> Self {
		Self::String(value)
	}
}

impl From<bool> for PageValue {
	fn from(value: bool) -> Self {
		Self::Bool(value)
	}
}

impl From<i64> for PageValue {
	fn from(value: i64) -> Self {
		Self::Number(value.into())
	}
}

impl From<i32> for PageValue {
	fn from(value: i32) -> Self {
		Self::Number(value.into())
	}
}

impl From<u64> for PageValue {
	fn from(value: u64) -> Self {
		Self::Number(value.into())
	}
}

impl From<f64> for PageValue {
	/// Non-finite numbers have no JSON form and become `Null`.
	fn from(value: f64) -> Self {
		serde_json::Number::from_f64(value)
			.map(Self::Number)
			.unwrap_or(Self::Null)
	}
}

impl From<PageObject> for PageValue {
	fn from(value: PageObject) -> Self {
		Self::Object(value)
	}
}

impl From<PageArray> for PageValue {
	fn from(value: PageArray) -> Self {
		Self::Array(value)
	}
}

/// Shared, ordered sequence of page values.
#[derive(Clone, Default)]
pub struct PageArray(Arc<RwLock<Vec<PageValue>>>);

impl PageArray {
	/// Creates an empty array.
	pub fn new() -> Self {
		Self::default()
	}

	/// Creates an array from existing values.
	pub fn from_vec(items: Vec<PageValue>) -> Self {
		Self(Arc::new(RwLock::new(items)))
	}

	/// Appends a value.
	pub fn push(&self, value: impl Into<PageValue>) {
		self.0.write().push(value.into());
	}

	/// Returns the number of elements.
	pub fn len(&self) -> usize {
		self.0.read().len()
	}

	/// Returns `true` if the array has no elements.
	pub fn is_empty(&self) -> bool {
		self.0.read().is_empty()
	}

	/// Copies the element handles out so no lock is held while they are visited.
	pub fn snapshot(&self) -> Vec<PageValue> {
		self.0.read().clone()
	}

	/// Address of the shared allocation.
	pub fn identity(&self) -> usize {
		Arc::as_ptr(&self.0) as *const () as usize
	}

	/// Returns `true` if both handles point at the same array.
	pub fn ptr_eq(&self, other: &Self) -> bool {
		Arc::ptr_eq(&self.0, &other.0)
	}
}

impl fmt::Debug for PageArray {
	// Contents may be cyclic, so only the shape is printed.
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "Array(len = {})", self.len())
	}
}

/// Shared key/value map that preserves insertion order.
#[derive(Clone, Default)]
pub struct PageObject(Arc<RwLock<Vec<(String, PageValue)>>>);

impl PageObject {
	/// Creates an empty object.
	pub fn new() -> Self {
		Self::default()
	}

	/// Inserts or replaces a property. A replaced key keeps its position.
	pub fn insert(&self, key: impl Into<String>, value: impl Into<PageValue>) {
		let key = key.into();
		let value = value.into();
		let mut entries = self.0.write();
		match entries.iter_mut().find(|(existing, _)| *existing == key) {
			Some((_, slot)) => *slot = value,
			None => entries.push((key, value)),
		}
	}

	/// Builder form of [`insert`](Self::insert).
	pub fn with(self, key: impl Into<String>, value: impl Into<PageValue>) -> Self {
		self.insert(key, value);
		self
	}

	/// Returns a property handle.
	pub fn get(&self, key: &str) -> Option<PageValue> {
		self.0
			.read()
			.iter()
			.find(|(existing, _)| existing == key)
			.map(|(_, value)| value.clone())
	}

	/// Removes a property, returning it.
	pub fn remove(&self, key: &str) -> Option<PageValue> {
		let mut entries = self.0.write();
		let index = entries.iter().position(|(existing, _)| existing == key)?;
		Some(entries.remove(index).1)
	}

	/// Returns the number of properties.
	pub fn len(&self) -> usize {
		self.0.read().len()
	}

	/// Returns `true` if the object has no properties.
	pub fn is_empty(&self) -> bool {
		self.0.read().is_empty()
	}

	/// Property names in insertion order.
	pub fn keys(&self) -> Vec<String> {
		self.0.read().iter().map(|(key, _)| key.clone()).collect()
	}

	/// Copies the entries out so no lock is held while they are visited.
	pub fn snapshot(&self) -> Vec<(String, PageValue)> {
		self.0.read().clone()
	}

	/// Address of the shared allocation.
	pub fn identity(&self) -> usize {
		Arc::as_ptr(&self.0) as *const () as usize
	}

	/// Returns `true` if both handles point at the same object.
	pub fn ptr_eq(&self, other: &Self) -> bool {
		Arc::ptr_eq(&self.0, &other.0)
	}
}

impl fmt::Debug for PageObject {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_tuple("Object").field(&self.keys()).finish()
	}
}

type FunctionImpl = dyn Fn(&[PageValue]) -> PageValue + Send + Sync;

/// Callable page value.
#[derive(Clone)]
pub struct PageFunction(Arc<FunctionImpl>);

impl PageFunction {
	/// Wraps a closure.
	pub fn new<F>(f: F) -> Self
	where
		F: Fn(&[PageValue]) -> PageValue + Send + Sync + 'static,
	{
		Self(Arc::new(f))
	}

	/// Invokes the function.
	pub fn call(&self, args: &[PageValue]) -> PageValue {
		(self.0)(args)
	}
}

type GetterImpl = dyn Fn() -> GetterResult + Send + Sync;

/// Property whose value is computed when it is read.
#[derive(Clone)]
pub struct LazyValue(Arc<GetterImpl>);

impl LazyValue {
	/// Wraps a closure.
	pub fn new<F>(f: F) -> Self
	where
		F: Fn() -> GetterResult + Send + Sync + 'static,
	{
		Self(Arc::new(f))
	}

	/// Runs the getter.
	pub fn evaluate(&self) -> GetterResult {
		(self.0)()
	}
}
