//! Render error types.

use std::path::PathBuf;

use kiln_bundler::BundleError;
use kiln_core::ConfigError;
use thiserror::Error;

/// Result type for UI runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Result type for page operations.
pub type PageResult<T> = Result<T, PageError>;

/// Errors raised by a [`ComponentRuntime`](crate::ComponentRuntime).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RuntimeError {
	/// Evaluating a server bundle failed.
	#[error("module evaluation failed: {0}")]
	Evaluation(String),

	/// Creating an element or generating markup failed.
	#[error("component rendering failed: {0}")]
	Render(String),

	/// A component or element handle is not (or no longer) registered.
	#[error("unknown runtime handle {0}")]
	UnknownHandle(u64),

	/// The runtime cannot accept work.
	#[error("runtime unavailable: {0}")]
	Unavailable(String),

	/// Reading an on-disk artifact failed.
	#[error("failed to read {}: {source}", path.display())]
	Io {
		/// File that was being read.
		path: PathBuf,
		/// Underlying error.
		#[source]
		source: std::io::Error,
	},
}

/// Errors raised while producing a page.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PageError {
	/// The server or client bundle could not be built.
	#[error("failed to bundle {}: {source}", path.display())]
	Bundle {
		/// Component path.
		path: PathBuf,
		/// Bundler error.
		#[source]
		source: BundleError,
	},

	/// The component module has no default export.
	#[error("Page {} doesn't export a default component", path.display())]
	MissingDefaultExport {
		/// Component path.
		path: PathBuf,
	},

	/// The server bundle could not be evaluated.
	#[error("failed to evaluate {}: {message}", path.display())]
	ModuleEvaluation {
		/// Component path.
		path: PathBuf,
		/// Runtime diagnostic.
		message: String,
	},

	/// Element creation or markup generation failed. The cause is logged.
	#[error("failed to render {}", path.display())]
	RenderFailure {
		/// Component path.
		path: PathBuf,
	},

	/// The plugin configuration is invalid.
	#[error(transparent)]
	Configuration(#[from] ConfigError),

	/// Reading or writing a file failed.
	#[error("I/O error at {}: {source}", path.display())]
	Io {
		/// File involved.
		path: PathBuf,
		/// Underlying error.
		#[source]
		source: std::io::Error,
	},
}

impl PageError {
	/// Wraps a bundler error for `path`.
	pub fn bundle(path: impl Into<PathBuf>, source: BundleError) -> Self {
		Self::Bundle {
			path: path.into(),
			source,
		}
	}

	/// Component path the error refers to, if any.
	pub fn path(&self) -> Option<&std::path::Path> {
		match self {
			Self::Bundle { path, .. }
			| Self::MissingDefaultExport { path }
			| Self::ModuleEvaluation { path, .. }
			| Self::RenderFailure { path }
			| Self::Io { path, .. } => Some(path),
			Self::Configuration(_) => None,
		}
	}
}
