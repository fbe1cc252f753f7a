//! Test doubles for the bundler and the UI runtime.
//!
//! Enabled with the `testing` feature.
//!
//! ```
//! use kiln_render::testing::{MockBundler, MockComponent, MockRuntime};
//!
//! let bundler = MockBundler::new();
//! bundler.register("/site/index.jsx", "// index");
//!
//! let runtime = MockRuntime::new();
//! runtime.register(
//!     "// index",
//!     MockComponent::new(|props| format!("<span>{}</span>", props["label"].as_str().unwrap_or(""))),
//! );
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use kiln_bundler::{Artifact, BundleEntry, BundleError, BundleOptions, BundleOutput, BundleResult, Bundler};
use parking_lot::Mutex;
use serde_json::Value;

use crate::error::{RuntimeError, RuntimeResult};
use crate::runtime::{ComponentHandle, ComponentRuntime, ElementHandle, ModuleExports};

/// Bundler returning registered code per file path.
///
/// Source entries are returned verbatim, so tests can inspect generated
/// client scripts. Disk outputs are written to the requested scratch
/// directory.
#[derive(Debug, Default)]
pub struct MockBundler {
	artifacts: Mutex<HashMap<PathBuf, String>>,
	failures: Mutex<HashMap<PathBuf, String>>,
	source_failure: Mutex<Option<String>>,
	calls: Mutex<Vec<(BundleEntry, BundleOptions)>>,
}

impl MockBundler {
	/// Creates an empty bundler.
	pub fn new() -> Self {
		Self::default()
	}

	/// Returns `code` for the file entry `path`.
	pub fn register(&self, path: impl Into<PathBuf>, code: impl Into<String>) {
		self.artifacts.lock().insert(path.into(), code.into());
	}

	/// Fails file entry `path` with a build error carrying `diagnostic`.
	pub fn fail(&self, path: impl Into<PathBuf>, diagnostic: impl Into<String>) {
		self.failures.lock().insert(path.into(), diagnostic.into());
	}

	/// Fails every source entry with a build error carrying `diagnostic`.
	pub fn fail_sources(&self, diagnostic: impl Into<String>) {
		*self.source_failure.lock() = Some(diagnostic.into());
	}

	/// Every call received so far, in order.
	pub fn calls(&self) -> Vec<(BundleEntry, BundleOptions)> {
		self.calls.lock().clone()
	}

	/// Number of calls for file entry `path`.
	pub fn file_calls(&self, path: &Path) -> usize {
		self.calls
			.lock()
			.iter()
			.filter(|(entry, _)| matches!(entry, BundleEntry::File(p) if p == path))
			.count()
	}

	fn code_for(&self, entry: &BundleEntry) -> BundleResult<String> {
		let failure = match entry {
			BundleEntry::File(path) => self.failures.lock().get(path).cloned(),
			BundleEntry::Source { .. } => self.source_failure.lock().clone(),
		};
		if let Some(diagnostic) = failure {
			return Err(BundleError::Build {
				entry: entry.display_name(),
				diagnostic,
			});
		}

		match entry {
			BundleEntry::File(path) => self
				.artifacts
				.lock()
				.get(path)
				.cloned()
				.ok_or_else(|| BundleError::Build {
					entry: entry.display_name(),
					diagnostic: format!("ERROR: Could not resolve \"{}\"", path.display()),
				}),
			BundleEntry::Source { contents, .. } => Ok(contents.clone()),
		}
	}
}

#[async_trait]
impl Bundler for MockBundler {
	async fn bundle(&self, entry: &BundleEntry, options: &BundleOptions) -> BundleResult<Artifact> {
		self.calls.lock().push((entry.clone(), options.clone()));
		let code = self.code_for(entry)?;
		match &options.output {
			BundleOutput::Memory => Ok(Artifact::InMemory { code }),
			BundleOutput::Disk(scratch) => {
				let path = scratch.write(&entry.stem(), "js", &code).await?;
				Ok(Artifact::OnDisk { path })
			}
		}
	}
}

type RenderFn = dyn Fn(&Value) -> String + Send + Sync;

/// A component served by [`MockRuntime`].
#[derive(Clone)]
pub struct MockComponent {
	render: Option<Arc<RenderFn>>,
	data: Option<Value>,
	failure: Option<String>,
}

impl MockComponent {
	/// Component rendering its props with `render`.
	pub fn new<F>(render: F) -> Self
	where
		F: Fn(&Value) -> String + Send + Sync + 'static,
	{
		Self {
			render: Some(Arc::new(render)),
			data: None,
			failure: None,
		}
	}

	/// Module with a `data` export and no default export.
	pub fn data_only(data: Value) -> Self {
		Self {
			render: None,
			data: Some(data),
			failure: None,
		}
	}

	/// Module with neither export.
	pub fn empty() -> Self {
		Self {
			render: None,
			data: None,
			failure: None,
		}
	}

	/// Adds a `data` export.
	pub fn with_data(mut self, data: Value) -> Self {
		self.data = Some(data);
		self
	}

	/// Makes rendering fail with `message`.
	pub fn failing(mut self, message: impl Into<String>) -> Self {
		self.failure = Some(message.into());
		self
	}
}

impl std::fmt::Debug for MockComponent {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("MockComponent")
			.field("has_default", &self.render.is_some())
			.field("data", &self.data)
			.field("failure", &self.failure)
			.finish()
	}
}

#[derive(Default)]
struct MockState {
	modules: HashMap<String, MockComponent>,
	components: HashMap<u64, MockComponent>,
	elements: HashMap<u64, (MockComponent, Value)>,
	released: Vec<ComponentHandle>,
	props: Vec<Value>,
	loads: usize,
}

/// Runtime mapping artifact code to registered [`MockComponent`]s.
///
/// `render_to_string` wraps markup in `<!--$-->` / `<!--/$-->` markers,
/// `render_to_static_markup` returns it as is.
#[derive(Default)]
pub struct MockRuntime {
	state: Mutex<MockState>,
	next_id: AtomicU64,
}

impl MockRuntime {
	/// Creates an empty runtime.
	pub fn new() -> Self {
		Self::default()
	}

	/// Serves `component` for artifacts whose code is `code`.
	pub fn register(&self, code: impl Into<String>, component: MockComponent) {
		self.state.lock().modules.insert(code.into(), component);
	}

	/// Components released so far.
	pub fn released(&self) -> Vec<ComponentHandle> {
		self.state.lock().released.clone()
	}

	/// Props passed to `create_element`, in order.
	pub fn props(&self) -> Vec<Value> {
		self.state.lock().props.clone()
	}

	/// Number of modules evaluated.
	pub fn loads(&self) -> usize {
		self.state.lock().loads
	}

	/// Number of components still registered.
	pub fn live_components(&self) -> usize {
		self.state.lock().components.len()
	}

	fn next_id(&self) -> u64 {
		self.next_id.fetch_add(1, Ordering::Relaxed) + 1
	}

	fn render(&self, element: ElementHandle) -> RuntimeResult<String> {
		let (component, props) = self
			.state
			.lock()
			.elements
			.remove(&element.id())
			.ok_or(RuntimeError::UnknownHandle(element.id()))?;
		if let Some(message) = component.failure {
			return Err(RuntimeError::Render(message));
		}
		let render = component
			.render
			.ok_or(RuntimeError::UnknownHandle(element.id()))?;
		Ok(render(&props))
	}
}

impl std::fmt::Debug for MockRuntime {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let state = self.state.lock();
		f.debug_struct("MockRuntime")
			.field("modules", &state.modules.len())
			.field("components", &state.components.len())
			.field("elements", &state.elements.len())
			.finish()
	}
}

#[async_trait]
impl ComponentRuntime for MockRuntime {
	async fn load_module(&self, artifact: &Artifact, origin: &Path) -> RuntimeResult<ModuleExports> {
		let code = artifact.read_to_string().await.map_err(|e| match e {
			BundleError::Io { path, source } => RuntimeError::Io { path, source },
			other => RuntimeError::Evaluation(other.to_string()),
		})?;

		let id = self.next_id();
		let mut state = self.state.lock();
		state.loads += 1;
		let module = state.modules.get(&code).cloned().ok_or_else(|| {
			RuntimeError::Evaluation(format!(
				"ReferenceError: no module registered for {}",
				origin.display()
			))
		})?;

		let default = if module.render.is_some() {
			state.components.insert(id, module.clone());
			Some(ComponentHandle::new(id))
		} else {
			None
		};

		Ok(ModuleExports {
			default,
			data: module.data,
		})
	}

	async fn create_element(&self, component: &ComponentHandle, props: &Value) -> RuntimeResult<ElementHandle> {
		let id = self.next_id();
		let mut state = self.state.lock();
		let module = state
			.components
			.get(&component.id())
			.cloned()
			.ok_or(RuntimeError::UnknownHandle(component.id()))?;
		state.props.push(props.clone());
		state.elements.insert(id, (module, props.clone()));
		Ok(ElementHandle::new(id))
	}

	async fn render_to_string(&self, element: ElementHandle) -> RuntimeResult<String> {
		self.render(element)
			.map(|markup| format!("<!--$-->{}<!--/$-->", markup))
	}

	async fn render_to_static_markup(&self, element: ElementHandle) -> RuntimeResult<String> {
		self.render(element)
	}

	async fn release(&self, component: ComponentHandle) {
		let mut state = self.state.lock();
		state.components.remove(&component.id());
		state.released.push(component);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use kiln_bundler::ScratchDir;
	use serde_json::json;

	#[tokio::test]
	async fn test_mock_bundler_disk_output() {
		let dir = tempfile::tempdir().unwrap();
		let bundler = MockBundler::new();
		bundler.register("/site/index.jsx", "// index");
		let options = BundleOptions::server().output(BundleOutput::Disk(ScratchDir::new(dir.path())));

		let artifact = bundler
			.bundle(&BundleEntry::file("/site/index.jsx"), &options)
			.await
			.unwrap();

		assert!(artifact.path().unwrap().starts_with(dir.path()));
		assert_eq!(artifact.read_to_string().await.unwrap(), "// index");
	}

	#[tokio::test]
	async fn test_mock_runtime_round() {
		let runtime = MockRuntime::new();
		runtime.register(
			"// a",
			MockComponent::new(|props| format!("<b>{}</b>", props["n"])),
		);

		let exports = runtime
			.load_module(&Artifact::in_memory("// a"), Path::new("a.jsx"))
			.await
			.unwrap();
		let component = exports.default.unwrap();
		let element = runtime.create_element(&component, &json!({"n": 1})).await.unwrap();
		let markup = runtime.render_to_string(element).await.unwrap();

		assert_eq!(markup, "<!--$--><b>1</b><!--/$-->");
		runtime.release(component).await;
		assert_eq!(runtime.live_components(), 0);
		assert!(matches!(
			runtime.create_element(&component, &json!({})).await,
			Err(RuntimeError::UnknownHandle(_))
		));
	}
}
