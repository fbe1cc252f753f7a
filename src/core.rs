//! Configuration, page values and the data sanitizer.
//!
//! # Examples
//!
//! ```rust,no_run
//! use kiln::core::{KilnConfig, RenderMode};
//!
//! let config = KilnConfig::builder().mode(RenderMode::Static).build()?;
//! # Ok::<(), kiln::core::ConfigError>(())
//! ```

pub use kiln_core::*;
