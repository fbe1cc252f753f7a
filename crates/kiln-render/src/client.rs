//! Client code generation.
//!
//! [`ClientBootstrap`] produces the entry script that loads the component in
//! the browser and attaches it to the mount container.
//! [`ClientCodeGenerator`] bundles that script into a single self-executing
//! program.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use kiln_bundler::{BundleEntry, BundleOptions, Bundler, ScratchDir};
use kiln_core::{ClientApi, KilnConfig, RenderMode, to_embedded_json};
use serde_json::Value;

use crate::entry::{ComponentEntry, ComponentSource};
use crate::error::{PageError, PageResult};

/// How the client attaches the component to the mount container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttachMethod {
	/// Build the UI from scratch.
	FreshRender,
	/// Adopt server-rendered markup.
	Reconcile,
}

impl AttachMethod {
	/// Attach method used by `mode`, or `None` when the mode ships no client
	/// code.
	pub fn for_mode(mode: RenderMode) -> Option<Self> {
		match mode {
			RenderMode::Static => None,
			RenderMode::Dynamic => Some(Self::FreshRender),
			RenderMode::Hydrate => Some(Self::Reconcile),
		}
	}
}

/// Client entry script for one component.
#[derive(Debug, Clone)]
pub struct ClientBootstrap<'a> {
	/// Import specifier of the component module.
	pub module_ref: &'a str,
	/// Sanitized props.
	pub data: &'a Value,
	/// Attach method.
	pub attach: AttachMethod,
	/// DOM id of the mount container.
	pub mount_id: &'a str,
	/// Browser API to target.
	pub api: ClientApi,
}

impl ClientBootstrap<'_> {
	/// Renders the script text.
	pub fn render(&self) -> String {
		let module_ref = json_string(self.module_ref);
		let mount = format!("document.getElementById({})", json_string(self.mount_id));
		let data = to_embedded_json(self.data);

		let (imports, attach) = match (self.api, self.attach) {
			(ClientApi::Legacy, AttachMethod::Reconcile) => (
				"const ReactDOM = require(\"react-dom\");",
				format!("ReactDOM.hydrate(App, {});", mount),
			),
			(ClientApi::Legacy, AttachMethod::FreshRender) => (
				"const ReactDOM = require(\"react-dom\");",
				format!("ReactDOM.render(App, {});", mount),
			),
			(ClientApi::Root, AttachMethod::Reconcile) => (
				"const ReactDOMClient = require(\"react-dom/client\");",
				format!("ReactDOMClient.hydrateRoot({}, App);", mount),
			),
			(ClientApi::Root, AttachMethod::FreshRender) => (
				"const ReactDOMClient = require(\"react-dom/client\");",
				format!("ReactDOMClient.createRoot({}).render(App);", mount),
			),
		};

		format!(
			"const component = require({module_ref});\n\
			 const React = require(\"react\");\n\
			 {imports}\n\
			 const App = React.createElement(\n\
			 \x20   component.default,\n\
			 \x20   {data},\n\
			 \x20   null\n\
			 );\n\
			 {attach}\n"
		)
	}
}

fn json_string(s: &str) -> String {
	// Serializing a str cannot fail.
	serde_json::to_string(s)
		.unwrap_or_else(|_| "\"\"".to_string())
		.replace("</", "<\\/")
}

/// Generates bundled client code for components.
#[derive(Clone)]
pub struct ClientCodeGenerator {
	config: Arc<KilnConfig>,
	bundler: Arc<dyn Bundler>,
	working_dir: PathBuf,
}

impl ClientCodeGenerator {
	/// Creates a generator.
	pub fn new(config: Arc<KilnConfig>, bundler: Arc<dyn Bundler>) -> Self {
		let working_dir = config.resolved_working_dir();
		Self {
			config,
			bundler,
			working_dir,
		}
	}

	/// Options used for client bundles.
	pub fn client_options(&self) -> BundleOptions {
		BundleOptions::browser().minify(self.config.minify)
	}

	/// Builds the self-executing client program for `entry`.
	///
	/// An inline component is written to a uniquely named module inside its
	/// `resolve_dir` for the duration of the call, so its relative imports
	/// resolve exactly as they did for the server bundle.
	///
	/// # Errors
	///
	/// Returns [`PageError::Bundle`] naming the component when the temporary
	/// module cannot be written, when the browser bundle fails to build, or
	/// when an on-disk bundle cannot be read back.
	pub async fn generate(&self, entry: &ComponentEntry, data: &Value, attach: AttachMethod) -> PageResult<String> {
		let origin = entry.source.origin(&self.working_dir);
		let (module_path, temporary) = self.module_path(&entry.source, &origin).await?;

		let result = self.bundle_bootstrap(entry, data, attach, &module_path, &origin).await;
		if temporary {
			remove_temporary(&module_path).await;
		}
		result
	}

	async fn bundle_bootstrap(
		&self,
		entry: &ComponentEntry,
		data: &Value,
		attach: AttachMethod,
		module_path: &Path,
		origin: &Path,
	) -> PageResult<String> {
		let module_ref = module_path.to_string_lossy();
		let script = ClientBootstrap {
			module_ref: &module_ref,
			data,
			attach,
			mount_id: &entry.mount_id,
			api: self.config.client_api,
		}
		.render();

		let bundle_entry = BundleEntry::source(script, &self.working_dir)
			.with_sourcefile(format!("{}.client.js", entry.source.stem()));

		tracing::debug!(path = %origin.display(), ?attach, "building client bundle");
		let artifact = self
			.bundler
			.bundle(&bundle_entry, &self.client_options())
			.await
			.map_err(|e| PageError::bundle(origin, e))?;

		artifact
			.read_to_string()
			.await
			.map_err(|e| PageError::bundle(origin, e))
	}

	// Returns the module path and whether it was written for this call.
	async fn module_path(&self, source: &ComponentSource, origin: &Path) -> PageResult<(PathBuf, bool)> {
		match source {
			ComponentSource::File(_) => Ok((origin.to_path_buf(), false)),
			ComponentSource::Inline {
				source: code,
				resolve_dir,
				name,
			} => {
				let extension = Path::new(name)
					.extension()
					.and_then(|ext| ext.to_str())
					.unwrap_or("jsx");
				let path = ScratchDir::new(resolve_dir)
					.write(&format!("{}{}", TEMPORARY_PREFIX, source.stem()), extension, code)
					.await
					.map_err(|e| PageError::bundle(origin, e))?;
				Ok((path, true))
			}
		}
	}
}

/// Name prefix of the modules written for inline components.
const TEMPORARY_PREFIX: &str = "kiln-inline-";

async fn remove_temporary(path: &Path) {
	if let Err(e) = tokio::fs::remove_file(path).await {
		tracing::warn!(path = %path.display(), error = %e, "failed to remove temporary inline module");
	}
}
