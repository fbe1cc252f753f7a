//! UI rendering capability.
//!
//! A [`ComponentRuntime`] evaluates server bundles and turns components into
//! markup. Components and elements live inside the runtime and are referred
//! to by opaque handles, so the trait stays object safe and independent of
//! the JavaScript engine behind it.

use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use kiln_bundler::Artifact;
use serde_json::Value;

use crate::error::RuntimeResult;

/// Handle to a component exported by an evaluated module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentHandle(u64);

impl ComponentHandle {
	/// Wraps a runtime-assigned id.
	pub fn new(id: u64) -> Self {
		Self(id)
	}

	/// Runtime-assigned id.
	pub fn id(&self) -> u64 {
		self.0
	}
}

impl fmt::Display for ComponentHandle {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "component#{}", self.0)
	}
}

/// Handle to an element created from a component and its props.
///
/// Rendering consumes the element.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct ElementHandle(u64);

impl ElementHandle {
	/// Wraps a runtime-assigned id.
	pub fn new(id: u64) -> Self {
		Self(id)
	}

	/// Runtime-assigned id.
	pub fn id(&self) -> u64 {
		self.0
	}
}

/// Exports read from an evaluated server bundle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModuleExports {
	/// The default export, when it is a component.
	pub default: Option<ComponentHandle>,
	/// The `data` export, when present.
	pub data: Option<Value>,
}

/// Evaluates server bundles and renders their components.
#[async_trait]
pub trait ComponentRuntime: Send + Sync {
	/// Evaluates a server bundle. `origin` is the component path, used for
	/// diagnostics.
	async fn load_module(&self, artifact: &Artifact, origin: &Path) -> RuntimeResult<ModuleExports>;

	/// Creates an element from `component` with `props`.
	async fn create_element(&self, component: &ComponentHandle, props: &Value) -> RuntimeResult<ElementHandle>;

	/// Renders markup carrying the markers the client needs to reconcile.
	async fn render_to_string(&self, element: ElementHandle) -> RuntimeResult<String>;

	/// Renders plain markup.
	async fn render_to_static_markup(&self, element: ElementHandle) -> RuntimeResult<String>;

	/// Drops a component that is no longer needed.
	async fn release(&self, _component: ComponentHandle) {}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	#[rstest]
	fn test_handles() {
		let component = ComponentHandle::new(7);
		let element = ElementHandle::new(8);

		assert_eq!(component.id(), 7);
		assert_eq!(component.to_string(), "component#7");
		assert_eq!(element.id(), 8);
	}
}
