//! Bundler adapter.
//!
//! # Examples
//!
//! ```rust,no_run
//! use kiln::bundler::{Bundler, EsbuildBundler};
//! ```

pub use kiln_bundler::*;
