//! Bundle inputs, options and artifacts, and the [`Bundler`] seam.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{BundleError, BundleResult};
use crate::scratch::ScratchDir;

/// What to bundle.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BundleEntry {
	/// A module on disk. Relative paths are resolved against the bundler's
	/// working directory.
	File(PathBuf),
	/// Module source text.
	Source {
		/// Source code.
		contents: String,
		/// Directory imports are resolved from.
		resolve_dir: PathBuf,
		/// Name reported in diagnostics.
		sourcefile: Option<String>,
		/// Syntax of `contents`. Inferred from `sourcefile` when unset.
		loader: Option<Loader>,
	},
}

/// Source syntax of a [`BundleEntry::Source`].
///
/// esbuild cannot see a file name for input read from stdin, so the syntax
/// has to be passed explicitly for anything other than plain JavaScript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Loader {
	/// JavaScript.
	Js,
	/// JavaScript with JSX.
	Jsx,
	/// TypeScript.
	Ts,
	/// TypeScript with JSX.
	Tsx,
}

impl Loader {
	/// esbuild `--loader` value.
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Js => "js",
			Self::Jsx => "jsx",
			Self::Ts => "ts",
			Self::Tsx => "tsx",
		}
	}

	/// Loader for a file extension, without the dot.
	pub fn from_extension(extension: &str) -> Option<Self> {
		match extension.to_ascii_lowercase().as_str() {
			"js" | "cjs" | "mjs" => Some(Self::Js),
			"jsx" => Some(Self::Jsx),
			"ts" | "cts" | "mts" => Some(Self::Ts),
			"tsx" => Some(Self::Tsx),
			_ => None,
		}
	}

	/// Loader for the extension of `path`.
	pub fn from_path(path: &Path) -> Option<Self> {
		path.extension()
			.and_then(|ext| ext.to_str())
			.and_then(Self::from_extension)
	}
}

impl BundleEntry {
	/// Creates a file entry.
	pub fn file(path: impl Into<PathBuf>) -> Self {
		Self::File(path.into())
	}

	/// Creates a source entry resolved from `resolve_dir`.
	pub fn source(contents: impl Into<String>, resolve_dir: impl Into<PathBuf>) -> Self {
		Self::Source {
			contents: contents.into(),
			resolve_dir: resolve_dir.into(),
			sourcefile: None,
			loader: None,
		}
	}

	/// Sets the diagnostic name of a source entry. No effect on file entries.
	pub fn with_sourcefile(mut self, name: impl Into<String>) -> Self {
		if let Self::Source { sourcefile, .. } = &mut self {
			*sourcefile = Some(name.into());
		}
		self
	}

	/// Sets the syntax of a source entry. No effect on file entries.
	pub fn with_loader(mut self, syntax: Loader) -> Self {
		if let Self::Source { loader, .. } = &mut self {
			*loader = Some(syntax);
		}
		self
	}

	/// Syntax of a source entry: the explicit loader, else the one implied by
	/// the `sourcefile` extension. `None` for file entries, whose syntax the
	/// bundler reads from the path.
	pub fn loader(&self) -> Option<Loader> {
		match self {
			Self::File(_) => None,
			Self::Source {
				loader: Some(loader),
				..
			} => Some(*loader),
			Self::Source { sourcefile, .. } => sourcefile
				.as_deref()
				.and_then(|name| Loader::from_path(Path::new(name))),
		}
	}

	/// Name used in diagnostics and logs.
	pub fn display_name(&self) -> String {
		match self {
			Self::File(path) => path.display().to_string(),
			Self::Source {
				sourcefile: Some(name),
				..
			} => name.clone(),
			Self::Source { .. } => "<stdin>".to_string(),
		}
	}

	/// Short name used for artifact files.
	pub fn stem(&self) -> String {
		let from_path = |path: &Path| {
			path.file_stem()
				.and_then(|stem| stem.to_str())
				.map(str::to_string)
		};
		let stem = match self {
			Self::File(path) => from_path(path),
			Self::Source {
				sourcefile: Some(name),
				..
			} => from_path(Path::new(name)),
			Self::Source { .. } => None,
		};
		stem.unwrap_or_else(|| "inline".to_string())
	}
}

/// Execution environment of the bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BundleTarget {
	/// Node platform, CommonJS output.
	Server,
	/// Browser platform, self-executing output.
	Browser,
}

impl BundleTarget {
	/// esbuild `--platform` value.
	pub fn platform(&self) -> &'static str {
		match self {
			Self::Server => "node",
			Self::Browser => "browser",
		}
	}

	/// esbuild `--format` value.
	pub fn format(&self) -> &'static str {
		match self {
			Self::Server => "cjs",
			Self::Browser => "iife",
		}
	}
}

/// Where the bundle is written.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BundleOutput {
	/// Returned as text.
	Memory,
	/// Written to a unique file in the scratch directory.
	Disk(ScratchDir),
}

/// Options for a single bundle call.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BundleOptions {
	/// Execution environment.
	pub target: BundleTarget,
	/// Module names left unresolved.
	pub externals: BTreeSet<String>,
	/// Minify the output.
	pub minify: bool,
	/// Output location.
	pub output: BundleOutput,
	/// Compile-time replacements, `name -> expression`.
	pub defines: BTreeMap<String, String>,
}

impl BundleOptions {
	/// Options for a server bundle: node platform, CommonJS, in memory.
	pub fn server() -> Self {
		Self::new(BundleTarget::Server)
	}

	/// Options for a browser bundle: self-executing, in memory.
	pub fn browser() -> Self {
		Self::new(BundleTarget::Browser)
	}

	fn new(target: BundleTarget) -> Self {
		Self {
			target,
			externals: BTreeSet::new(),
			minify: false,
			output: BundleOutput::Memory,
			defines: BTreeMap::new(),
		}
	}

	/// Adds externals.
	pub fn externals<I, S>(mut self, externals: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.externals.extend(externals.into_iter().map(Into::into));
		self
	}

	/// Sets minification.
	pub fn minify(mut self, minify: bool) -> Self {
		self.minify = minify;
		self
	}

	/// Sets the output location.
	pub fn output(mut self, output: BundleOutput) -> Self {
		self.output = output;
		self
	}

	/// Adds a compile-time replacement.
	pub fn define(mut self, name: impl Into<String>, expression: impl Into<String>) -> Self {
		self.defines.insert(name.into(), expression.into());
		self
	}
}

/// A finished bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Artifact {
	/// Bundle text.
	InMemory {
		/// Generated code.
		code: String,
	},
	/// Bundle written to disk.
	OnDisk {
		/// File holding the generated code.
		path: PathBuf,
	},
}

impl Artifact {
	/// Creates an in-memory artifact.
	pub fn in_memory(code: impl Into<String>) -> Self {
		Self::InMemory { code: code.into() }
	}

	/// Creates an on-disk artifact.
	pub fn on_disk(path: impl Into<PathBuf>) -> Self {
		Self::OnDisk { path: path.into() }
	}

	/// Code of an in-memory artifact.
	pub fn code(&self) -> Option<&str> {
		match self {
			Self::InMemory { code } => Some(code),
			Self::OnDisk { .. } => None,
		}
	}

	/// Path of an on-disk artifact.
	pub fn path(&self) -> Option<&Path> {
		match self {
			Self::InMemory { .. } => None,
			Self::OnDisk { path } => Some(path),
		}
	}

	/// Returns the bundle text, reading it from disk if needed.
	pub async fn read_to_string(&self) -> BundleResult<String> {
		match self {
			Self::InMemory { code } => Ok(code.clone()),
			Self::OnDisk { path } => tokio::fs::read_to_string(path)
				.await
				.map_err(|source| BundleError::io(path, source)),
		}
	}
}

/// Turns a module and its imports into a single artifact.
///
/// A call either returns a complete artifact or an error, never a partial
/// result.
#[async_trait]
pub trait Bundler: Send + Sync {
	/// Bundles `entry` with `options`.
	async fn bundle(&self, entry: &BundleEntry, options: &BundleOptions) -> BundleResult<Artifact>;
}

#[async_trait]
impl<B: Bundler + ?Sized> Bundler for Arc<B> {
	async fn bundle(&self, entry: &BundleEntry, options: &BundleOptions) -> BundleResult<Artifact> {
		(**self).bundle(entry, options).await
	}
}

#[async_trait]
impl<B: Bundler + ?Sized> Bundler for Box<B> {
	async fn bundle(&self, entry: &BundleEntry, options: &BundleOptions) -> BundleResult<Artifact> {
		(**self).bundle(entry, options).await
	}
}
