//! Component entries.

use std::path::{Path, PathBuf};

use kiln_bundler::BundleEntry;

/// Where a component's source lives.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ComponentSource {
	/// A module file. Relative paths are resolved against the working
	/// directory.
	File(PathBuf),
	/// Module source text.
	Inline {
		/// Source code.
		source: String,
		/// Directory imports are resolved from.
		resolve_dir: PathBuf,
		/// File name used in diagnostics, e.g. `card.jsx`.
		name: String,
	},
}

impl ComponentSource {
	/// Creates a file source.
	pub fn file(path: impl Into<PathBuf>) -> Self {
		Self::File(path.into())
	}

	/// Creates an inline source.
	pub fn inline(source: impl Into<String>, resolve_dir: impl Into<PathBuf>, name: impl Into<String>) -> Self {
		Self::Inline {
			source: source.into(),
			resolve_dir: resolve_dir.into(),
			name: name.into(),
		}
	}

	/// Path reported in errors: the resolved file path, or the inline name
	/// inside its resolve directory.
	pub fn origin(&self, working_dir: &Path) -> PathBuf {
		match self {
			Self::File(path) if path.is_absolute() => path.clone(),
			Self::File(path) => working_dir.join(path),
			Self::Inline {
				resolve_dir, name, ..
			} => resolve_dir.join(name),
		}
	}

	/// Short name used for generated files.
	pub fn stem(&self) -> String {
		let path = match self {
			Self::File(path) => path.as_path(),
			Self::Inline { name, .. } => Path::new(name),
		};
		path.file_stem()
			.and_then(|stem| stem.to_str())
			.unwrap_or("component")
			.to_string()
	}

	/// Bundler entry for this source.
	pub fn to_bundle_entry(&self, working_dir: &Path) -> BundleEntry {
		match self {
			Self::File(_) => BundleEntry::File(self.origin(working_dir)),
			Self::Inline {
				source,
				resolve_dir,
				name,
			} => BundleEntry::source(source.clone(), resolve_dir.clone()).with_sourcefile(name.clone()),
		}
	}
}

/// A component to render and the DOM id its client code attaches to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ComponentEntry {
	/// Component source.
	pub source: ComponentSource,
	/// DOM id of the mount container.
	pub mount_id: String,
}

impl ComponentEntry {
	/// Creates an entry.
	pub fn new(source: ComponentSource, mount_id: impl Into<String>) -> Self {
		Self {
			source,
			mount_id: mount_id.into(),
		}
	}

	/// Creates an entry for a component file.
	pub fn file(path: impl Into<PathBuf>, mount_id: impl Into<String>) -> Self {
		Self::new(ComponentSource::file(path), mount_id)
	}
}
