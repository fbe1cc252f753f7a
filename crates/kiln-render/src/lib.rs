//! # Kiln Render
//!
//! Renders component templates in one of three modes:
//!
//! - **static**: server markup only
//! - **dynamic**: an empty mount container plus client code that renders in
//!   the browser
//! - **hydrate**: server markup plus client code that adopts it
//!
//! ## Architecture
//!
//! ```text
//! host engine
//!     │ get_data / compile / render
//!     ▼
//! ComponentTemplates ──► RenderPipeline
//!                          ├─ sanitize (kiln-core)
//!                          ├─ ComponentLoader ──► Bundler (server) ──► ComponentRuntime
//!                          └─ ClientCodeGenerator ──► Bundler (browser)
//! ```
//!
//! The UI library is reached only through [`ComponentRuntime`]. With the
//! `boa` feature, [`BoaRuntime`] evaluates server bundles in-process.

pub mod client;
pub mod entry;
pub mod error;
pub mod loader;
pub mod pipeline;
pub mod runtime;
pub mod template;

#[cfg(feature = "boa")]
pub mod boa;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use client::{AttachMethod, ClientBootstrap, ClientCodeGenerator};
pub use entry::{ComponentEntry, ComponentSource};
pub use error::{PageError, PageResult, RuntimeError, RuntimeResult};
pub use loader::{ComponentLoader, LoadedComponent};
pub use pipeline::{RenderPipeline, assemble_fragment};
pub use runtime::{ComponentHandle, ComponentRuntime, ElementHandle, ModuleExports};
pub use template::{
	CompiledTemplate, ComponentTemplates, DeriveFn, TemplateBody, TemplateExtension, TemplateKind,
};

#[cfg(feature = "boa")]
pub use boa::{BoaRuntime, BoaRuntimeBuilder};
