//! Component loading, client bootstrap generation and the render pipeline.
//!
//! # Examples
//!
//! ```rust,no_run
//! use kiln::render::{ComponentTemplates, TemplateExtension};
//! ```

pub use kiln_render::*;
