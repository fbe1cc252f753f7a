//! Component loader.
//!
//! Builds the server bundle of a component and evaluates it in the
//! [`ComponentRuntime`] to obtain its default export and optional `data`
//! export.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use kiln_bundler::{BundleOptions, BundleOutput, Bundler, ScratchDir};
use kiln_core::{ArtifactStorage, KilnConfig};
use serde_json::{Map, Value};

use crate::entry::ComponentSource;
use crate::error::{PageError, PageResult, RuntimeError};
use crate::runtime::{ComponentHandle, ComponentRuntime};

/// A component module after evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedComponent {
	/// The default export, when it is a component.
	pub exported_component: Option<ComponentHandle>,
	/// The `data` export, when present.
	pub declared_data: Option<Value>,
	/// Resolved component path.
	pub origin: PathBuf,
}

impl LoadedComponent {
	/// Returns the default export or [`PageError::MissingDefaultExport`].
	pub fn require_component(&self) -> PageResult<ComponentHandle> {
		self.exported_component
			.ok_or_else(|| PageError::MissingDefaultExport {
				path: self.origin.clone(),
			})
	}
}

/// Loads component modules through the bundler and the runtime.
#[derive(Clone)]
pub struct ComponentLoader {
	config: Arc<KilnConfig>,
	bundler: Arc<dyn Bundler>,
	runtime: Arc<dyn ComponentRuntime>,
	working_dir: PathBuf,
}

impl ComponentLoader {
	/// Creates a loader.
	pub fn new(config: Arc<KilnConfig>, bundler: Arc<dyn Bundler>, runtime: Arc<dyn ComponentRuntime>) -> Self {
		let working_dir = config.resolved_working_dir();
		Self {
			config,
			bundler,
			runtime,
			working_dir,
		}
	}

	/// Runtime components are evaluated in.
	pub fn runtime(&self) -> &Arc<dyn ComponentRuntime> {
		&self.runtime
	}

	/// Directory relative component paths are resolved against.
	pub fn working_dir(&self) -> &Path {
		&self.working_dir
	}

	/// Options used for server bundles.
	pub fn server_options(&self) -> BundleOptions {
		let output = match self.config.artifact_storage {
			ArtifactStorage::Memory => BundleOutput::Memory,
			ArtifactStorage::Disk => BundleOutput::Disk(ScratchDir::new(self.config.resolved_scratch_dir())),
		};
		BundleOptions::server()
			.externals(self.config.server_externals.iter().cloned())
			.output(output)
	}

	/// Bundles and evaluates `source`.
	///
	/// The server bundle is built with the configured externals and artifact
	/// storage, then handed to the runtime exactly once. The caller owns the
	/// returned component handle and must release it.
	///
	/// # Arguments
	///
	/// * `source` - component file or inline source text
	///
	/// # Errors
	///
	/// Returns an error if:
	/// - the bundler fails ([`PageError::Bundle`])
	/// - an on-disk artifact cannot be read ([`PageError::Io`])
	/// - the runtime rejects the module ([`PageError::ModuleEvaluation`])
	///
	/// A missing default export is not an error here; see
	/// [`LoadedComponent::require_component`].
	pub async fn load(&self, source: &ComponentSource) -> PageResult<LoadedComponent> {
		let origin = source.origin(&self.working_dir);
		let entry = source.to_bundle_entry(&self.working_dir);

		tracing::debug!(path = %origin.display(), "building server bundle");
		let artifact = self
			.bundler
			.bundle(&entry, &self.server_options())
			.await
			.map_err(|e| PageError::bundle(&origin, e))?;

		let exports = self
			.runtime
			.load_module(&artifact, &origin)
			.await
			.map_err(|e| match e {
				RuntimeError::Io { path, source } => PageError::Io { path, source },
				other => PageError::ModuleEvaluation {
					path: origin.clone(),
					message: other.to_string(),
				},
			})?;

		Ok(LoadedComponent {
			exported_component: exports.default,
			declared_data: exports.data,
			origin,
		})
	}

	/// Returns the `data` export of the component at `path`, or an empty
	/// object when it declares none. A default export is not required.
	///
	/// # Errors
	///
	/// Same as [`ComponentLoader::load`].
	pub async fn declared_data(&self, path: &Path) -> PageResult<Value> {
		let loaded = self.load(&ComponentSource::file(path)).await?;
		if let Some(component) = loaded.exported_component {
			self.runtime.release(component).await;
		}
		Ok(loaded
			.declared_data
			.unwrap_or_else(|| Value::Object(Map::new())))
	}
}
