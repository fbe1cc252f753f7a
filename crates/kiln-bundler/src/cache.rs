//! Per-file bundle cache.
//!
//! [`CachingBundler`] remembers in-memory artifacts of file entries. An entry
//! is reused only while the file's modification time and length match the
//! values observed before it was built. Disk outputs and source entries
//! always go to the inner bundler.
//!
//! Only the entry file is stamped. Modules it imports are not, so an edit to
//! a shared component leaves dependent bundles stale. The cache is therefore
//! scoped to a single build run: call [`CachingBundler::clear`] (or
//! `ComponentTemplates::begin_build`) before every run.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::bundle::{Artifact, BundleEntry, BundleOptions, BundleOutput, Bundler};
use crate::error::BundleResult;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
	path: PathBuf,
	options: BundleOptions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStamp {
	modified: SystemTime,
	len: u64,
}

impl FileStamp {
	async fn read(path: &Path) -> Option<Self> {
		let meta = tokio::fs::metadata(path).await.ok()?;
		Some(Self {
			modified: meta.modified().ok()?,
			len: meta.len(),
		})
	}
}

#[derive(Debug, Clone)]
struct CachedArtifact {
	stamp: FileStamp,
	code: String,
}

/// Bundler decorator caching server bundles per file, for the duration of
/// one build run.
#[derive(Debug)]
pub struct CachingBundler<B> {
	inner: B,
	entries: RwLock<HashMap<CacheKey, CachedArtifact>>,
}

impl<B: Bundler> CachingBundler<B> {
	/// Wraps `inner`.
	pub fn new(inner: B) -> Self {
		Self {
			inner,
			entries: RwLock::new(HashMap::new()),
		}
	}

	/// Wrapped bundler.
	pub fn inner(&self) -> &B {
		&self.inner
	}

	/// Number of cached artifacts.
	pub fn len(&self) -> usize {
		self.entries.read().len()
	}

	/// Returns `true` if nothing is cached.
	pub fn is_empty(&self) -> bool {
		self.entries.read().is_empty()
	}

	/// Drops every cached artifact. Call at the start of each build run.
	pub fn clear(&self) {
		let dropped = {
			let mut entries = self.entries.write();
			let dropped = entries.len();
			entries.clear();
			dropped
		};
		tracing::debug!(dropped, "bundle cache cleared");
	}

	/// Drops the cached artifacts of `path`, for any options.
	pub fn invalidate(&self, path: &Path) {
		self.entries.write().retain(|key, _| key.path != path);
	}

	fn lookup(&self, key: &CacheKey, stamp: FileStamp) -> Option<String> {
		let entries = self.entries.read();
		entries
			.get(key)
			.filter(|cached| cached.stamp == stamp)
			.map(|cached| cached.code.clone())
	}
}

#[async_trait]
impl<B: Bundler> Bundler for CachingBundler<B> {
	async fn bundle(&self, entry: &BundleEntry, options: &BundleOptions) -> BundleResult<Artifact> {
		let path = match (entry, &options.output) {
			(BundleEntry::File(path), BundleOutput::Memory) => path,
			_ => return self.inner.bundle(entry, options).await,
		};

		let Some(stamp) = FileStamp::read(path).await else {
			return self.inner.bundle(entry, options).await;
		};

		let key = CacheKey {
			path: path.clone(),
			options: options.clone(),
		};

		if let Some(code) = self.lookup(&key, stamp) {
			tracing::debug!(path = %path.display(), "bundle cache hit");
			return Ok(Artifact::InMemory { code });
		}

		tracing::debug!(path = %path.display(), "bundle cache miss");
		let artifact = self.inner.bundle(entry, options).await?;
		if let Artifact::InMemory { code } = &artifact {
			self.entries.write().insert(
				key,
				CachedArtifact {
					stamp,
					code: code.clone(),
				},
			);
		}
		Ok(artifact)
	}
}
