//! Bundler error types.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for bundler operations.
pub type BundleResult<T> = Result<T, BundleError>;

/// Errors raised while producing a bundle.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BundleError {
	/// The bundler ran and reported errors.
	#[error("failed to bundle {entry}:\n{diagnostic}")]
	Build {
		/// Display name of the entry.
		entry: String,
		/// Diagnostic text reported by the bundler.
		diagnostic: String,
	},

	/// The bundler process could not be started.
	#[error("failed to start bundler '{}': {source}", binary.display())]
	Spawn {
		/// Executable that was invoked.
		binary: PathBuf,
		/// Underlying error.
		#[source]
		source: std::io::Error,
	},

	/// The bundler succeeded but produced no code.
	#[error("bundler produced no output for {entry}")]
	EmptyOutput {
		/// Display name of the entry.
		entry: String,
	},

	/// Reading or writing an artifact failed.
	#[error("bundler I/O error at {}: {source}", path.display())]
	Io {
		/// File or directory involved.
		path: PathBuf,
		/// Underlying error.
		#[source]
		source: std::io::Error,
	},
}

impl BundleError {
	/// Builds an [`BundleError::Io`] for `path`.
	pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
		Self::Io {
			path: path.into(),
			source,
		}
	}

	/// Returns `true` if the bundler executable could not be found.
	pub fn is_missing_binary(&self) -> bool {
		matches!(self, Self::Spawn { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	#[rstest]
	fn test_build_error_display() {
		let err = BundleError::Build {
			entry: "pages/index.jsx".to_string(),
			diagnostic: "ERROR: Unexpected \"}\"".to_string(),
		};
		assert_eq!(
			err.to_string(),
			"failed to bundle pages/index.jsx:\nERROR: Unexpected \"}\""
		);
	}

	#[rstest]
	fn test_is_missing_binary() {
		let missing = BundleError::Spawn {
			binary: PathBuf::from("esbuild"),
			source: std::io::Error::from(std::io::ErrorKind::NotFound),
		};
		let denied = BundleError::Spawn {
			binary: PathBuf::from("esbuild"),
			source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
		};

		assert!(missing.is_missing_binary());
		assert!(!denied.is_missing_binary());
	}
}
