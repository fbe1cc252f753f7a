//! # Kiln
//!
//! Component templates for static site engines.
//!
//! A component file (`.jsx`, `.tsx`) becomes a page in one of three modes:
//!
//! - `static` - server-rendered markup only
//! - `dynamic` - an empty mount container plus a client bundle that renders in
//!   the browser
//! - `hydrate` (default) - server-rendered markup plus a client bundle that
//!   adopts it
//!
//! ## Feature Flags
//!
//! - `boa` - in-process JavaScript runtime for evaluating server bundles
//! - `testing` - test doubles for the bundler and the UI runtime
//! - `full` - all of the above
//!
//! ## Quick Example
//!
//! ```rust,ignore
//! use kiln::prelude::*;
//!
//! let runtime = Arc::new(BoaRuntime::new(ui_library_source)?);
//! let config = KilnConfig::discover(".")?.with_env_overrides()?;
//! let templates = ComponentTemplates::from_config(config, runtime)?;
//!
//! let path = Path::new("src/pages/index.jsx");
//! let declared = templates.get_data(path).await?;
//! let html = templates
//!     .compile(None, path)
//!     .render(&PageObject::new().with("title", "Home").into())
//!     .await?;
//! ```

pub mod bundler;
pub mod core;
pub mod render;

pub use kiln_bundler::{
	Artifact, BundleEntry, BundleError, BundleOptions, Bundler, CachingBundler, EsbuildBundler,
	Loader,
};
pub use kiln_core::{
	ClientApi, ConfigError, KilnConfig, PageObject, PageValue, RenderMode, SanitizePolicy,
	sanitize,
};
pub use kiln_render::{
	CompiledTemplate, ComponentEntry, ComponentRuntime, ComponentSource, ComponentTemplates,
	PageError, PageResult, RenderPipeline, TemplateBody, TemplateExtension,
};

#[cfg(feature = "boa")]
pub use kiln_render::BoaRuntime;

/// Commonly used items.
pub mod prelude {
	pub use std::path::Path;
	pub use std::sync::Arc;

	pub use crate::{
		ClientApi, CompiledTemplate, ComponentEntry, ComponentRuntime, ComponentSource,
		ComponentTemplates, KilnConfig, PageError, PageObject, PageResult, PageValue, RenderMode,
		TemplateBody, TemplateExtension,
	};

	// External
	pub use async_trait::async_trait;

	#[cfg(feature = "boa")]
	pub use crate::BoaRuntime;
}
