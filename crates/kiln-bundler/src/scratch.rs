//! Scratch directory for transient build artifacts.
//!
//! Every artifact gets a UUID v4 suffix so concurrent renders never share a
//! file. Nothing here is deleted automatically; call [`ScratchDir::purge`]
//! once the build is done.

use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::error::{BundleError, BundleResult};

/// Directory holding bundler outputs and generated sources.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScratchDir {
	root: PathBuf,
}

impl ScratchDir {
	/// Creates a handle for `root`. The directory is created lazily.
	pub fn new(root: impl Into<PathBuf>) -> Self {
		Self { root: root.into() }
	}

	/// Root directory.
	pub fn path(&self) -> &Path {
		&self.root
	}

	/// Returns a fresh `<root>/<stem>-<uuid>.js` path.
	pub fn artifact_path(&self, stem: &str) -> PathBuf {
		self.unique_path(stem, "js")
	}

	/// Returns a fresh `<root>/<stem>-<uuid>.<extension>` path.
	pub fn unique_path(&self, stem: &str, extension: &str) -> PathBuf {
		let stem = sanitize_stem(stem);
		self.root
			.join(format!("{}-{}.{}", stem, Uuid::new_v4(), extension))
	}

	/// Creates the directory if needed.
	pub async fn ensure(&self) -> BundleResult<()> {
		tokio::fs::create_dir_all(&self.root)
			.await
			.map_err(|source| BundleError::io(&self.root, source))
	}

	/// Writes `contents` to a fresh file and returns its path.
	pub async fn write(&self, stem: &str, extension: &str, contents: &str) -> BundleResult<PathBuf> {
		self.ensure().await?;
		let path = self.unique_path(stem, extension);
		tokio::fs::write(&path, contents)
			.await
			.map_err(|source| BundleError::io(&path, source))?;
		Ok(path)
	}

	/// Removes the directory and everything in it. A missing directory is not
	/// an error.
	pub async fn purge(&self) -> BundleResult<()> {
		match tokio::fs::remove_dir_all(&self.root).await {
			Ok(()) => {
				tracing::debug!(path = %self.root.display(), "purged scratch directory");
				Ok(())
			}
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(source) => Err(BundleError::io(&self.root, source)),
		}
	}
}

// Keeps generated names to a single path component.
fn sanitize_stem(stem: &str) -> String {
	let cleaned: String = stem
		.chars()
		.map(|c| {
			if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
				c
			} else {
				'_'
			}
		})
		.collect();
	if cleaned.is_empty() {
		"artifact".to_string()
	} else {
		cleaned
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	#[rstest]
	fn test_artifact_paths_are_unique() {
		let scratch = ScratchDir::new("/tmp/kiln");

		let first = scratch.artifact_path("index");
		let second = scratch.artifact_path("index");

		assert_ne!(first, second);
		assert_eq!(first.parent(), Some(Path::new("/tmp/kiln")));
		let name = first.file_name().unwrap().to_str().unwrap();
		assert!(name.starts_with("index-"));
		assert!(name.ends_with(".js"));
	}

	#[rstest]
	#[case("index", "index")]
	#[case("../../etc/passwd", "______etc_passwd")]
	#[case("my page", "my_page")]
	#[case("", "artifact")]
	fn test_sanitize_stem(#[case] input: &str, #[case] expected: &str) {
		assert_eq!(sanitize_stem(input), expected);
	}

	#[tokio::test]
	async fn test_write_and_purge() {
		// Arrange
		let dir = tempfile::tempdir().unwrap();
		let scratch = ScratchDir::new(dir.path().join("scratch"));

		// Act
		let path = scratch.write("entry", "jsx", "export default 1;").await.unwrap();

		// Assert
		assert_eq!(std::fs::read_to_string(&path).unwrap(), "export default 1;");
		assert_eq!(path.extension().unwrap(), "jsx");

		scratch.purge().await.unwrap();
		assert!(!scratch.path().exists());
		// Purging twice is fine.
		scratch.purge().await.unwrap();
	}
}
