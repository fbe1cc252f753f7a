//! # Kiln Bundler
//!
//! Turns a component module (a file or inline source) and its imports into a
//! single JavaScript artifact.
//!
//! - [`Bundler`]: the async seam the render pipeline calls
//! - [`EsbuildBundler`]: runs the `esbuild` executable
//! - [`CachingBundler`]: reuses server bundles of unchanged files
//! - [`ScratchDir`]: uniquely named files for on-disk artifacts
//!
//! ```no_run
//! use kiln_bundler::{BundleEntry, BundleOptions, Bundler, EsbuildBundler};
//!
//! # async fn example() -> Result<(), kiln_bundler::BundleError> {
//! let bundler = EsbuildBundler::new("esbuild").with_working_dir("/site");
//! let options = BundleOptions::server().externals(["react", "react-dom"]);
//! let artifact = bundler.bundle(&BundleEntry::file("pages/index.jsx"), &options).await?;
//! println!("{}", artifact.read_to_string().await?);
//! # Ok(())
//! # }
//! ```

pub mod bundle;
pub mod cache;
pub mod error;
pub mod esbuild;
pub mod scratch;

pub use bundle::{Artifact, BundleEntry, BundleOptions, BundleOutput, BundleTarget, Bundler, Loader};
pub use cache::CachingBundler;
pub use error::{BundleError, BundleResult};
pub use esbuild::EsbuildBundler;
pub use scratch::ScratchDir;
