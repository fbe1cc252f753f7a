//! Host engine interface.
//!
//! The host registers a [`TemplateExtension`] for its component file
//! extensions, asks it for each file's declared data, compiles each template
//! once and renders the compiled template with the merged page data.
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! use kiln_core::{KilnConfig, PageObject, PageValue};
//! use kiln_render::{ComponentRuntime, ComponentTemplates, TemplateExtension};
//!
//! # async fn example(runtime: Arc<dyn ComponentRuntime>) -> Result<(), Box<dyn std::error::Error>> {
//! let templates = ComponentTemplates::from_config(KilnConfig::default(), runtime)?;
//! let path = Path::new("src/pages/index.jsx");
//!
//! let declared = templates.get_data(path).await?;
//! let template = templates.compile(None, path);
//! let page = PageObject::new().with("title", "Home");
//! let html = template.render(&PageValue::Object(page)).await?;
//! # let _ = (declared, html);
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use kiln_bundler::{Bundler, CachingBundler, EsbuildBundler};
use kiln_core::{ConfigResult, KilnConfig, PageValue};
use serde_json::Value;

use crate::entry::ComponentEntry;
use crate::error::PageResult;
use crate::pipeline::RenderPipeline;
use crate::runtime::ComponentRuntime;

type SyncDerive = dyn Fn(&PageValue) -> String + Send + Sync;
type AsyncDerive = dyn Fn(PageValue) -> BoxFuture<'static, String> + Send + Sync;

/// A template body computed from page data, e.g. a permalink function.
#[derive(Clone)]
pub enum DeriveFn {
	/// Returns the output directly.
	Sync(Arc<SyncDerive>),
	/// Returns the output asynchronously.
	Async(Arc<AsyncDerive>),
}

impl DeriveFn {
	/// Wraps a synchronous function.
	pub fn sync<F>(f: F) -> Self
	where
		F: Fn(&PageValue) -> String + Send + Sync + 'static,
	{
		Self::Sync(Arc::new(f))
	}

	/// Wraps an asynchronous function.
	pub fn future<F, Fut>(f: F) -> Self
	where
		F: Fn(PageValue) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = String> + Send + 'static,
	{
		Self::Async(Arc::new(move |data| f(data).boxed()))
	}

	/// Invokes the function with `data`.
	pub async fn call(&self, data: &PageValue) -> String {
		match self {
			Self::Sync(f) => f(data),
			Self::Async(f) => f(data.clone()).await,
		}
	}
}

impl fmt::Debug for DeriveFn {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Sync(_) => f.write_str("DeriveFn::Sync"),
			Self::Async(_) => f.write_str("DeriveFn::Async"),
		}
	}
}

/// Template body handed over by the host.
#[derive(Debug, Clone)]
pub enum TemplateBody {
	/// Literal text.
	Literal(String),
	/// Function of the page data.
	Function(DeriveFn),
}

impl From<&str> for TemplateBody {
	fn from(s: &str) -> Self {
		Self::Literal(s.to_string())
	}
}

impl From<String> for TemplateBody {
	fn from(s: String) -> Self {
		Self::Literal(s)
	}
}

impl From<DeriveFn> for TemplateBody {
	fn from(f: DeriveFn) -> Self {
		Self::Function(f)
	}
}

/// What a compiled template does when rendered.
#[derive(Debug, Clone)]
pub enum TemplateKind {
	/// Returns the literal.
	Literal(String),
	/// Returns the function's result.
	Derived(DeriveFn),
	/// Renders the component file.
	Component,
}

impl TemplateKind {
	/// Resolves a host body. An absent or empty body means the component
	/// file itself is rendered.
	pub fn resolve(body: Option<TemplateBody>) -> Self {
		match body {
			Some(TemplateBody::Literal(s)) if !s.is_empty() => Self::Literal(s),
			Some(TemplateBody::Function(f)) => Self::Derived(f),
			Some(TemplateBody::Literal(_)) | None => Self::Component,
		}
	}
}

/// Seam between the host template engine and the plugin.
#[async_trait]
pub trait TemplateExtension: Send + Sync {
	/// File extensions handled, without the dot.
	fn extensions(&self) -> &[String];

	/// Returns `true` if `path` has a handled extension.
	fn handles(&self, path: &Path) -> bool {
		path.extension()
			.and_then(|ext| ext.to_str())
			.is_some_and(|ext| self.extensions().iter().any(|known| known == ext))
	}

	/// Data declared by the component at `path`.
	async fn get_data(&self, path: &Path) -> PageResult<Value>;

	/// Compiles the template at `path`.
	fn compile(&self, body: Option<TemplateBody>, path: &Path) -> CompiledTemplate;
}

/// Component template extension.
#[derive(Clone)]
pub struct ComponentTemplates {
	config: Arc<KilnConfig>,
	pipeline: RenderPipeline,
	cache: Option<Arc<CachingBundler<Arc<dyn Bundler>>>>,
}

impl ComponentTemplates {
	/// Validates `config` and wires the pipeline.
	///
	/// The bundler is wrapped in a [`CachingBundler`] when
	/// [`KilnConfig::bundle_cache`] is set.
	///
	/// # Errors
	///
	/// Returns the [`ConfigError`](kiln_core::ConfigError) from
	/// [`KilnConfig::validate`] when the mount id, the extension list or the
	/// sanitize policy is invalid. Nothing is bundled or evaluated before
	/// validation succeeds.
	///
	/// # Example
	///
	/// ```ignore
	/// let templates = ComponentTemplates::new(
	///     KilnConfig::builder().mode(RenderMode::Static).build()?,
	///     Arc::new(EsbuildBundler::new("esbuild")),
	///     runtime,
	/// )?;
	/// ```
	pub fn new(
		config: KilnConfig,
		bundler: Arc<dyn Bundler>,
		runtime: Arc<dyn ComponentRuntime>,
	) -> ConfigResult<Self> {
		config.validate()?;
		let config = Arc::new(config);

		let (bundler, cache) = if config.bundle_cache {
			let cache = Arc::new(CachingBundler::new(bundler));
			let shared: Arc<dyn Bundler> = cache.clone();
			(shared, Some(cache))
		} else {
			(bundler, None)
		};

		tracing::info!(
			mode = %config.mode,
			extensions = ?config.extensions,
			mount_id = %config.mount_id,
			bundle_cache = config.bundle_cache,
			"registered component templates"
		);

		Ok(Self {
			pipeline: RenderPipeline::new(config.clone(), bundler, runtime),
			config,
			cache,
		})
	}

	/// Like [`ComponentTemplates::new`] with an [`EsbuildBundler`] built from
	/// the `[bundler]` settings.
	///
	/// # Errors
	///
	/// Same as [`ComponentTemplates::new`]. A missing esbuild binary is only
	/// reported by the first render.
	pub fn from_config(config: KilnConfig, runtime: Arc<dyn ComponentRuntime>) -> ConfigResult<Self> {
		let bundler = Arc::new(EsbuildBundler::from_config(&config));
		Self::new(config, bundler, runtime)
	}

	/// Active configuration.
	pub fn config(&self) -> &KilnConfig {
		&self.config
	}

	/// Render pipeline.
	pub fn pipeline(&self) -> &RenderPipeline {
		&self.pipeline
	}

	/// Bundle cache, when enabled.
	pub fn bundle_cache(&self) -> Option<&CachingBundler<Arc<dyn Bundler>>> {
		self.cache.as_deref()
	}

	/// Marks the start of a host build run.
	///
	/// The bundle cache only tracks the entry file of each component, so
	/// bundles from a previous run are dropped here to pick up changes in
	/// imported modules. A no-op when the cache is disabled.
	pub fn begin_build(&self) {
		if let Some(cache) = &self.cache {
			cache.clear();
		}
	}

	/// Renders an arbitrary component entry.
	pub async fn render_entry(&self, entry: &ComponentEntry, data: &PageValue) -> PageResult<String> {
		self.pipeline.render(entry, data).await
	}
}

#[async_trait]
impl TemplateExtension for ComponentTemplates {
	fn extensions(&self) -> &[String] {
		&self.config.extensions
	}

	async fn get_data(&self, path: &Path) -> PageResult<Value> {
		self.pipeline.loader().declared_data(path).await
	}

	fn compile(&self, body: Option<TemplateBody>, path: &Path) -> CompiledTemplate {
		CompiledTemplate {
			kind: TemplateKind::resolve(body),
			entry: ComponentEntry::file(path, self.config.mount_id.clone()),
			pipeline: self.pipeline.clone(),
		}
	}
}

/// A template ready to render. Cheap to clone and safe to render
/// concurrently.
#[derive(Clone)]
pub struct CompiledTemplate {
	kind: TemplateKind,
	entry: ComponentEntry,
	pipeline: RenderPipeline,
}

impl CompiledTemplate {
	/// Resolved template kind.
	pub fn kind(&self) -> &TemplateKind {
		&self.kind
	}

	/// Component entry rendered for [`TemplateKind::Component`].
	pub fn entry(&self) -> &ComponentEntry {
		&self.entry
	}

	/// Produces the output for `data`.
	pub async fn render(&self, data: &PageValue) -> PageResult<String> {
		match &self.kind {
			TemplateKind::Literal(s) => Ok(s.clone()),
			TemplateKind::Derived(f) => Ok(f.call(data).await),
			TemplateKind::Component => self.pipeline.render(&self.entry, data).await,
		}
	}
}

impl fmt::Debug for CompiledTemplate {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("CompiledTemplate")
			.field("kind", &self.kind)
			.field("entry", &self.entry)
			.finish()
	}
}
