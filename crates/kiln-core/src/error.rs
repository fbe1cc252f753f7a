//! Configuration error types.
//!
//! Every variant is raised at registration time, before any page is
//! processed.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while building or validating a [`KilnConfig`](crate::KilnConfig).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
	/// Unknown render mode string.
	#[error("invalid render mode '{0}': expected one of static, dynamic, hydrate")]
	InvalidRenderMode(String),

	/// Unknown client API string.
	#[error("invalid client api '{0}': expected one of legacy, root")]
	InvalidClientApi(String),

	/// Unknown artifact storage string.
	#[error("invalid artifact storage '{0}': expected one of memory, disk")]
	InvalidArtifactStorage(String),

	/// Mount identifier cannot be used as a DOM id.
	#[error("invalid mount id '{id}': {reason}")]
	InvalidMountId {
		/// Offending identifier.
		id: String,
		/// Why it was rejected.
		reason: &'static str,
	},

	/// No template extensions were configured.
	#[error("at least one template extension must be configured")]
	NoExtensions,

	/// A template extension is malformed.
	#[error("invalid template extension '{extension}': {reason}")]
	InvalidExtension {
		/// Offending extension.
		extension: String,
		/// Why it was rejected.
		reason: &'static str,
	},

	/// The same extension was listed twice.
	#[error("template extension '{0}' is listed more than once")]
	DuplicateExtension(String),

	/// An environment override could not be parsed.
	#[error("invalid value '{value}' for environment variable {key}")]
	InvalidEnv {
		/// Variable name.
		key: String,
		/// Raw value.
		value: String,
	},

	/// The sanitize policy is malformed.
	#[error("invalid sanitize policy: {0}")]
	InvalidPolicy(String),

	/// TOML parsing error.
	#[error("failed to parse configuration: {0}")]
	Toml(String),

	/// Configuration file could not be read.
	#[error("failed to read configuration file {path}: {source}")]
	Io {
		/// File that was being read.
		path: PathBuf,
		/// Underlying error.
		#[source]
		source: std::io::Error,
	},
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		Self::Toml(err.to_string())
	}
}
