//! Plugin configuration.
//!
//! A [`KilnConfig`] is built once when the extension is registered with the
//! host engine and is immutable afterwards. Every component receives it by
//! shared reference.
//!
//! Configuration can come from a TOML file (`kiln.toml`):
//!
//! ```toml
//! mount_id = "app"
//! mode = "hydrate"
//! minify = true
//! extensions = ["jsx", "tsx"]
//! client_api = "root"
//!
//! [sanitize]
//! denied_keys = ["templateContent", "collections"]
//! private_prefix = "_"
//!
//! [bundler]
//! binary = "node_modules/.bin/esbuild"
//! ```
//!
//! or from the builder:
//!
//! ```
//! use kiln_core::{KilnConfig, RenderMode};
//!
//! let config = KilnConfig::builder()
//!     .mode(RenderMode::Static)
//!     .mount_id("app")
//!     .build()
//!     .unwrap();
//! assert_eq!(config.mode, RenderMode::Static);
//! ```

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::sanitize::SanitizePolicy;

/// Default DOM id the client bundle attaches to.
pub const DEFAULT_MOUNT_ID: &str = "root";

/// Default file name looked up by [`KilnConfig::discover`].
pub const CONFIG_FILENAME: &str = "kiln.toml";

/// Rendering strategy, fixed per registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum RenderMode {
	/// Server-rendered markup only, no client code.
	Static,
	/// Empty mount point; the browser builds the UI.
	Dynamic,
	/// Server-rendered markup plus client code that reconciles against it.
	#[default]
	Hydrate,
}

impl RenderMode {
	/// Lower-case name used in configuration.
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Static => "static",
			Self::Dynamic => "dynamic",
			Self::Hydrate => "hydrate",
		}
	}

	/// Returns `true` if this mode embeds a client bundle.
	pub fn needs_client_bundle(&self) -> bool {
		!matches!(self, Self::Static)
	}

	/// Returns `true` if this mode renders markup on the server.
	pub fn renders_on_server(&self) -> bool {
		!matches!(self, Self::Dynamic)
	}
}

impl fmt::Display for RenderMode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for RenderMode {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_ascii_lowercase().as_str() {
			"static" => Ok(Self::Static),
			"dynamic" => Ok(Self::Dynamic),
			"hydrate" => Ok(Self::Hydrate),
			_ => Err(ConfigError::InvalidRenderMode(s.to_string())),
		}
	}
}

impl TryFrom<String> for RenderMode {
	type Error = ConfigError;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		value.parse()
	}
}

impl From<RenderMode> for String {
	fn from(mode: RenderMode) -> Self {
		mode.as_str().to_string()
	}
}

/// Browser API the client bootstrap is generated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ClientApi {
	/// `ReactDOM.render` / `ReactDOM.hydrate` from `react-dom`.
	#[default]
	Legacy,
	/// `createRoot` / `hydrateRoot` from `react-dom/client`.
	Root,
}

impl ClientApi {
	/// Lower-case name used in configuration.
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Legacy => "legacy",
			Self::Root => "root",
		}
	}
}

impl FromStr for ClientApi {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_ascii_lowercase().as_str() {
			"legacy" => Ok(Self::Legacy),
			"root" => Ok(Self::Root),
			_ => Err(ConfigError::InvalidClientApi(s.to_string())),
		}
	}
}

impl TryFrom<String> for ClientApi {
	type Error = ConfigError;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		value.parse()
	}
}

impl From<ClientApi> for String {
	fn from(api: ClientApi) -> Self {
		api.as_str().to_string()
	}
}

/// Where bundler output is kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ArtifactStorage {
	/// Returned as text from the bundler.
	#[default]
	Memory,
	/// Written to a uniquely named file under the scratch directory.
	Disk,
}

impl ArtifactStorage {
	/// Lower-case name used in configuration.
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Memory => "memory",
			Self::Disk => "disk",
		}
	}
}

impl FromStr for ArtifactStorage {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_ascii_lowercase().as_str() {
			"memory" => Ok(Self::Memory),
			"disk" => Ok(Self::Disk),
			_ => Err(ConfigError::InvalidArtifactStorage(s.to_string())),
		}
	}
}

impl TryFrom<String> for ArtifactStorage {
	type Error = ConfigError;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		value.parse()
	}
}

impl From<ArtifactStorage> for String {
	fn from(storage: ArtifactStorage) -> Self {
		storage.as_str().to_string()
	}
}

/// Settings for the external bundler process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BundlerSettings {
	/// Path or name of the `esbuild` executable.
	pub binary: PathBuf,
	/// Arguments placed before the generated flags, e.g. `["esbuild"]` when
	/// `binary` is `npx`.
	pub args: Vec<String>,
}

impl Default for BundlerSettings {
	fn default() -> Self {
		Self {
			binary: PathBuf::from("esbuild"),
			args: Vec::new(),
		}
	}
}

/// Plugin-wide configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KilnConfig {
	/// DOM id of the element the client bundle attaches to.
	pub mount_id: String,
	/// Rendering strategy.
	pub mode: RenderMode,
	/// Minify client bundles.
	pub minify: bool,
	/// File extensions handled as component templates, without the dot.
	pub extensions: Vec<String>,
	/// Directory component paths are resolved against. Defaults to the
	/// process working directory.
	pub working_dir: Option<PathBuf>,
	/// Directory for transient build artifacts. Defaults to `<temp>/kiln`.
	pub scratch_dir: Option<PathBuf>,
	/// Where bundler output is kept.
	pub artifact_storage: ArtifactStorage,
	/// Reuse server bundles per file path while the file is unchanged.
	pub bundle_cache: bool,
	/// Browser API used by the client bootstrap.
	pub client_api: ClientApi,
	/// Modules left out of server bundles because the runtime supplies them.
	pub server_externals: Vec<String>,
	/// Which page data properties are never read.
	pub sanitize: SanitizePolicy,
	/// External bundler settings.
	pub bundler: BundlerSettings,
}

impl Default for KilnConfig {
	fn default() -> Self {
		Self {
			mount_id: DEFAULT_MOUNT_ID.to_string(),
			mode: RenderMode::default(),
			minify: true,
			extensions: vec!["jsx".to_string(), "tsx".to_string()],
			working_dir: None,
			scratch_dir: None,
			artifact_storage: ArtifactStorage::default(),
			bundle_cache: false,
			client_api: ClientApi::default(),
			server_externals: vec!["react".to_string(), "react-dom".to_string()],
			sanitize: SanitizePolicy::default(),
			bundler: BundlerSettings::default(),
		}
	}
}

impl KilnConfig {
	/// Creates a configuration builder.
	pub fn builder() -> KilnConfigBuilder {
		KilnConfigBuilder::new()
	}

	/// Parses and validates a TOML document.
	pub fn from_toml_str(s: &str) -> ConfigResult<Self> {
		let config: Self = toml::from_str(s)?;
		config.validate()?;
		Ok(config)
	}

	/// Reads, parses and validates a TOML file.
	pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
		let path = path.as_ref();
		let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
			path: path.to_path_buf(),
			source,
		})?;
		Self::from_toml_str(&contents)
	}

	/// Loads `kiln.toml` from `dir` if present, otherwise the defaults.
	pub fn discover(dir: impl AsRef<Path>) -> ConfigResult<Self> {
		let path = dir.as_ref().join(CONFIG_FILENAME);
		if path.is_file() {
			Self::from_file(path)
		} else {
			Ok(Self::default())
		}
	}

	/// Applies `KILN_*` overrides from the process environment.
	pub fn with_env_overrides(mut self) -> ConfigResult<Self> {
		self.apply_env(std::env::vars())?;
		self.validate()?;
		Ok(self)
	}

	/// Applies `KILN_*` overrides from an explicit set of variables.
	///
	/// Recognized: `KILN_MODE`, `KILN_MINIFY`, `KILN_MOUNT_ID`, `KILN_ESBUILD`.
	/// Unrelated variables are ignored.
	pub fn apply_env<I, K, V>(&mut self, vars: I) -> ConfigResult<()>
	where
		I: IntoIterator<Item = (K, V)>,
		K: AsRef<str>,
		V: Into<String>,
	{
		for (key, value) in vars {
			let key = key.as_ref();
			match key {
				"KILN_MODE" => self.mode = value.into().parse()?,
				"KILN_MINIFY" => {
					let value = value.into();
					self.minify = parse_env_bool(&value).ok_or_else(|| ConfigError::InvalidEnv {
						key: key.to_string(),
						value,
					})?;
				}
				"KILN_MOUNT_ID" => self.mount_id = value.into(),
				"KILN_ESBUILD" => self.bundler.binary = PathBuf::from(value.into()),
				_ => {}
			}
		}
		Ok(())
	}

	/// Validates the configuration.
	pub fn validate(&self) -> ConfigResult<()> {
		validate_mount_id(&self.mount_id)?;
		validate_extensions(&self.extensions)?;
		self.sanitize.validate()?;
		Ok(())
	}

	/// Returns `true` if `path` has one of the configured extensions.
	pub fn matches_extension(&self, path: &Path) -> bool {
		path.extension()
			.and_then(|ext| ext.to_str())
			.is_some_and(|ext| self.extensions.iter().any(|known| known == ext))
	}

	/// Directory component paths are resolved against.
	pub fn resolved_working_dir(&self) -> PathBuf {
		match &self.working_dir {
			Some(dir) => dir.clone(),
			None => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
		}
	}

	/// Directory for transient build artifacts.
	pub fn resolved_scratch_dir(&self) -> PathBuf {
		match &self.scratch_dir {
			Some(dir) => dir.clone(),
			None => std::env::temp_dir().join("kiln"),
		}
	}
}

fn parse_env_bool(value: &str) -> Option<bool> {
	match value.trim().to_ascii_lowercase().as_str() {
		"1" | "true" | "yes" | "on" => Some(true),
		"0" | "false" | "no" | "off" => Some(false),
		_ => None,
	}
}

fn validate_mount_id(id: &str) -> ConfigResult<()> {
	let reason = if id.is_empty() {
		"must not be empty"
	} else if id.chars().any(char::is_whitespace) {
		"must not contain whitespace"
	} else if id.chars().any(|c| matches!(c, '"' | '\'' | '<' | '>' | '&' | '`')) {
		"must not contain quotes, '&' or angle brackets"
	} else if id.chars().any(char::is_control) {
		"must not contain control characters"
	} else {
		return Ok(());
	};
	Err(ConfigError::InvalidMountId {
		id: id.to_string(),
		reason,
	})
}

fn validate_extensions(extensions: &[String]) -> ConfigResult<()> {
	if extensions.is_empty() {
		return Err(ConfigError::NoExtensions);
	}

	let mut seen = HashSet::new();
	for extension in extensions {
		let reason = if extension.is_empty() {
			Some("must not be empty")
		} else if extension.starts_with('.') {
			Some("must not start with '.'")
		} else if !extension.chars().all(|c| c.is_ascii_alphanumeric()) {
			Some("must contain only ASCII alphanumeric characters")
		} else {
			None
		};
		if let Some(reason) = reason {
			return Err(ConfigError::InvalidExtension {
				extension: extension.clone(),
				reason,
			});
		}
		if !seen.insert(extension.as_str()) {
			return Err(ConfigError::DuplicateExtension(extension.clone()));
		}
	}
	Ok(())
}

/// Builder for [`KilnConfig`].
#[derive(Debug, Clone, Default)]
pub struct KilnConfigBuilder {
	config: KilnConfig,
}

impl KilnConfigBuilder {
	/// Starts from the defaults.
	pub fn new() -> Self {
		Self::default()
	}

	/// Sets the mount identifier.
	pub fn mount_id(mut self, id: impl Into<String>) -> Self {
		self.config.mount_id = id.into();
		self
	}

	/// Sets the render mode.
	pub fn mode(mut self, mode: RenderMode) -> Self {
		self.config.mode = mode;
		self
	}

	/// Enables or disables client bundle minification.
	pub fn minify(mut self, minify: bool) -> Self {
		self.config.minify = minify;
		self
	}

	/// Replaces the handled extensions.
	pub fn extensions<I, S>(mut self, extensions: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.config.extensions = extensions.into_iter().map(Into::into).collect();
		self
	}

	/// Sets the working directory.
	pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
		self.config.working_dir = Some(dir.into());
		self
	}

	/// Sets the scratch directory.
	pub fn scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
		self.config.scratch_dir = Some(dir.into());
		self
	}

	/// Sets where bundler output is kept.
	pub fn artifact_storage(mut self, storage: ArtifactStorage) -> Self {
		self.config.artifact_storage = storage;
		self
	}

	/// Enables the per-file server bundle cache.
	pub fn bundle_cache(mut self, enabled: bool) -> Self {
		self.config.bundle_cache = enabled;
		self
	}

	/// Sets the client API.
	pub fn client_api(mut self, api: ClientApi) -> Self {
		self.config.client_api = api;
		self
	}

	/// Replaces the server bundle externals.
	pub fn server_externals<I, S>(mut self, externals: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.config.server_externals = externals.into_iter().map(Into::into).collect();
		self
	}

	/// Sets the sanitize policy.
	pub fn sanitize(mut self, policy: SanitizePolicy) -> Self {
		self.config.sanitize = policy;
		self
	}

	/// Sets the esbuild executable.
	pub fn esbuild_binary(mut self, binary: impl Into<PathBuf>) -> Self {
		self.config.bundler.binary = binary.into();
		self
	}

	/// Validates and returns the configuration.
	pub fn build(self) -> ConfigResult<KilnConfig> {
		self.config.validate()?;
		Ok(self.config)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	#[rstest]
	fn test_defaults() {
		let config = KilnConfig::default();

		assert_eq!(config.mount_id, "root");
		assert_eq!(config.mode, RenderMode::Hydrate);
		assert!(config.minify);
		assert_eq!(config.extensions, vec!["jsx", "tsx"]);
		assert_eq!(config.artifact_storage, ArtifactStorage::Memory);
		assert!(!config.bundle_cache);
		assert_eq!(config.client_api, ClientApi::Legacy);
		assert_eq!(config.server_externals, vec!["react", "react-dom"]);
		assert!(config.validate().is_ok());
	}

	#[rstest]
	#[case("static", RenderMode::Static)]
	#[case("DYNAMIC", RenderMode::Dynamic)]
	#[case(" hydrate ", RenderMode::Hydrate)]
	fn test_render_mode_parse(#[case] input: &str, #[case] expected: RenderMode) {
		assert_eq!(input.parse::<RenderMode>().unwrap(), expected);
	}

	#[rstest]
	fn test_render_mode_parse_unknown() {
		let err = "ssr".parse::<RenderMode>().unwrap_err();
		assert!(matches!(err, ConfigError::InvalidRenderMode(ref s) if s == "ssr"));
	}

	#[rstest]
	fn test_render_mode_capabilities() {
		assert!(!RenderMode::Static.needs_client_bundle());
		assert!(RenderMode::Static.renders_on_server());
		assert!(RenderMode::Dynamic.needs_client_bundle());
		assert!(!RenderMode::Dynamic.renders_on_server());
		assert!(RenderMode::Hydrate.needs_client_bundle());
		assert!(RenderMode::Hydrate.renders_on_server());
	}

	#[rstest]
	fn test_from_toml() {
		let config = KilnConfig::from_toml_str(
			r#"
			mount_id = "app"
			mode = "static"
			minify = false
			extensions = ["jsx"]
			client_api = "root"
			artifact_storage = "disk"

			[sanitize]
			denied_keys = ["templateContent", "collections"]

			[bundler]
			binary = "npx"
			args = ["esbuild"]
			"#,
		)
		.unwrap();

		assert_eq!(config.mount_id, "app");
		assert_eq!(config.mode, RenderMode::Static);
		assert!(!config.minify);
		assert_eq!(config.extensions, vec!["jsx"]);
		assert_eq!(config.client_api, ClientApi::Root);
		assert_eq!(config.artifact_storage, ArtifactStorage::Disk);
		assert!(config.sanitize.denied_keys.contains("collections"));
		// Unset nested fields keep their defaults.
		assert_eq!(config.sanitize.private_prefix.as_deref(), Some("_"));
		assert_eq!(config.bundler.binary, PathBuf::from("npx"));
		assert_eq!(config.bundler.args, vec!["esbuild"]);
	}

	#[rstest]
	fn test_from_toml_rejects_unknown_mode() {
		let err = KilnConfig::from_toml_str(r#"mode = "server""#).unwrap_err();
		assert!(matches!(err, ConfigError::Toml(ref msg) if msg.contains("server")));
	}

	#[rstest]
	fn test_from_toml_validates() {
		let err = KilnConfig::from_toml_str("extensions = []").unwrap_err();
		assert!(matches!(err, ConfigError::NoExtensions));
	}

	#[rstest]
	fn test_from_file_and_discover() {
		let dir = tempfile::tempdir().unwrap();
		assert_eq!(KilnConfig::discover(dir.path()).unwrap(), KilnConfig::default());

		std::fs::write(dir.path().join(CONFIG_FILENAME), "mount_id = \"app\"\n").unwrap();
		let config = KilnConfig::discover(dir.path()).unwrap();
		assert_eq!(config.mount_id, "app");
	}

	#[rstest]
	fn test_from_file_missing() {
		let err = KilnConfig::from_file("/nonexistent/kiln.toml").unwrap_err();
		assert!(matches!(err, ConfigError::Io { .. }));
	}

	#[rstest]
	#[case("")]
	#[case("my root")]
	#[case("a\"b")]
	#[case("<root>")]
	fn test_invalid_mount_id(#[case] id: &str) {
		let err = KilnConfig::builder().mount_id(id).build().unwrap_err();
		assert!(matches!(err, ConfigError::InvalidMountId { .. }));
	}

	#[rstest]
	#[case(vec![""])]
	#[case(vec![".jsx"])]
	#[case(vec!["j-sx"])]
	fn test_invalid_extension(#[case] extensions: Vec<&str>) {
		let err = KilnConfig::builder()
			.extensions(extensions)
			.build()
			.unwrap_err();
		assert!(matches!(err, ConfigError::InvalidExtension { .. }));
	}

	#[rstest]
	fn test_duplicate_extension() {
		let err = KilnConfig::builder()
			.extensions(["jsx", "tsx", "jsx"])
			.build()
			.unwrap_err();
		assert!(matches!(err, ConfigError::DuplicateExtension(ref e) if e == "jsx"));
	}

	#[rstest]
	fn test_apply_env() {
		let mut config = KilnConfig::default();
		config
			.apply_env([
				("KILN_MODE", "dynamic"),
				("KILN_MINIFY", "off"),
				("KILN_MOUNT_ID", "app"),
				("KILN_ESBUILD", "/usr/local/bin/esbuild"),
				("PATH", "/usr/bin"),
			])
			.unwrap();

		assert_eq!(config.mode, RenderMode::Dynamic);
		assert!(!config.minify);
		assert_eq!(config.mount_id, "app");
		assert_eq!(config.bundler.binary, PathBuf::from("/usr/local/bin/esbuild"));
	}

	#[rstest]
	fn test_apply_env_invalid_bool() {
		let mut config = KilnConfig::default();
		let err = config.apply_env([("KILN_MINIFY", "maybe")]).unwrap_err();
		assert!(matches!(err, ConfigError::InvalidEnv { ref key, .. } if key == "KILN_MINIFY"));
	}

	#[rstest]
	fn test_matches_extension() {
		let config = KilnConfig::default();

		assert!(config.matches_extension(Path::new("pages/index.jsx")));
		assert!(config.matches_extension(Path::new("pages/about.tsx")));
		assert!(!config.matches_extension(Path::new("pages/index.md")));
		assert!(!config.matches_extension(Path::new("pages/jsx")));
	}

	#[rstest]
	fn test_resolved_dirs() {
		let config = KilnConfig::builder()
			.working_dir("/site")
			.scratch_dir("/tmp/kiln-test")
			.build()
			.unwrap();

		assert_eq!(config.resolved_working_dir(), PathBuf::from("/site"));
		assert_eq!(config.resolved_scratch_dir(), PathBuf::from("/tmp/kiln-test"));
		assert!(
			KilnConfig::default()
				.resolved_scratch_dir()
				.ends_with("kiln")
		);
	}
}
