//! # Kiln Core
//!
//! Shared building blocks for Kiln component templates:
//!
//! - [`config`]: plugin configuration, loaded from `kiln.toml`, the
//!   environment or a builder
//! - [`value`]: the dynamic page data model handed over by the host engine
//! - [`sanitize`]: turns arbitrary page data into acyclic JSON
//!
//! Nothing in this crate performs I/O beyond reading configuration files.

pub mod config;
pub mod error;
pub mod sanitize;
pub mod value;

pub use config::{
	ArtifactStorage, BundlerSettings, ClientApi, KilnConfig, KilnConfigBuilder, RenderMode,
	CONFIG_FILENAME, DEFAULT_MOUNT_ID,
};
pub use error::{ConfigError, ConfigResult};
pub use sanitize::{SanitizePolicy, sanitize, sanitize_with, to_embedded_json};
pub use value::{GetterError, GetterResult, LazyValue, PageArray, PageFunction, PageObject, PageValue};
