//! [`Bundler`] backed by the `esbuild` executable.
//!
//! File entries are passed as a path argument. Source entries are piped
//! through stdin with the process running in `resolve_dir`, so relative
//! imports resolve the same way they would from a file in that directory.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};

use async_trait::async_trait;
use kiln_core::KilnConfig;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::bundle::{Artifact, BundleEntry, BundleOptions, BundleOutput, Bundler};
use crate::error::{BundleError, BundleResult};

/// Runs `esbuild` as a child process for every bundle call.
#[derive(Debug, Clone)]
pub struct EsbuildBundler {
	binary: PathBuf,
	prefix_args: Vec<String>,
	working_dir: PathBuf,
}

impl EsbuildBundler {
	/// Creates a bundler invoking `binary` from the process working directory.
	pub fn new(binary: impl Into<PathBuf>) -> Self {
		Self {
			binary: binary.into(),
			prefix_args: Vec::new(),
			working_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
		}
	}

	/// Creates a bundler from the `[bundler]` settings and working directory
	/// of `config`.
	pub fn from_config(config: &KilnConfig) -> Self {
		Self {
			binary: config.bundler.binary.clone(),
			prefix_args: config.bundler.args.clone(),
			working_dir: config.resolved_working_dir(),
		}
	}

	/// Sets arguments placed before the generated flags.
	pub fn with_args<I, S>(mut self, args: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.prefix_args = args.into_iter().map(Into::into).collect();
		self
	}

	/// Sets the directory file entries are resolved against.
	pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
		self.working_dir = dir.into();
		self
	}

	/// Executable that is invoked.
	pub fn binary(&self) -> &Path {
		&self.binary
	}

	/// Directory file entries are resolved against.
	pub fn working_dir(&self) -> &Path {
		&self.working_dir
	}

	/// Builds the argument list for one invocation.
	pub fn command_args(
		&self,
		entry: &BundleEntry,
		options: &BundleOptions,
		outfile: Option<&Path>,
	) -> Vec<OsString> {
		let mut args: Vec<OsString> = self.prefix_args.iter().map(OsString::from).collect();

		if let BundleEntry::File(path) = entry {
			args.push(self.resolve(path).into_os_string());
		}

		args.push("--bundle".into());
		args.push(format!("--platform={}", options.target.platform()).into());
		args.push(format!("--format={}", options.target.format()).into());
		for external in &options.externals {
			args.push(format!("--external:{}", external).into());
		}
		if options.minify {
			args.push("--minify".into());
		}
		for (name, expression) in &options.defines {
			args.push(format!("--define:{}={}", name, expression).into());
		}
		args.push("--log-level=error".into());

		if let BundleEntry::Source {
			sourcefile: Some(name),
			..
		} = entry
		{
			args.push(format!("--sourcefile={}", name).into());
		}
		if let Some(loader) = entry.loader() {
			args.push(format!("--loader={}", loader.as_str()).into());
		}

		if let Some(outfile) = outfile {
			let mut arg = OsString::from("--outfile=");
			arg.push(outfile);
			args.push(arg);
		}

		args
	}

	fn resolve(&self, path: &Path) -> PathBuf {
		if path.is_absolute() {
			path.to_path_buf()
		} else {
			self.working_dir.join(path)
		}
	}

	async fn run(&self, args: Vec<OsString>, current_dir: &Path, stdin: Option<&str>) -> BundleResult<Output> {
		let mut command = Command::new(&self.binary);
		command
			.args(&args)
			.current_dir(current_dir)
			.stdin(if stdin.is_some() {
				Stdio::piped()
			} else {
				Stdio::null()
			})
			.stdout(Stdio::piped())
			.stderr(Stdio::piped())
			.kill_on_drop(true);

		let mut child = command.spawn().map_err(|source| BundleError::Spawn {
			binary: self.binary.clone(),
			source,
		})?;

		let pipe = child.stdin.take();
		let feed = async move {
			if let (Some(mut pipe), Some(contents)) = (pipe, stdin) {
				pipe.write_all(contents.as_bytes()).await?;
				pipe.shutdown().await?;
			}
			Ok::<(), std::io::Error>(())
		};

		let (fed, output) = tokio::join!(feed, child.wait_with_output());
		let output = output.map_err(|source| BundleError::io(current_dir, source))?;

		match fed {
			// The process exited without reading its input; the exit status
			// tells the rest.
			Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
			Err(source) => return Err(BundleError::io(current_dir, source)),
			Ok(()) => {}
		}

		Ok(output)
	}
}

#[async_trait]
impl Bundler for EsbuildBundler {
	async fn bundle(&self, entry: &BundleEntry, options: &BundleOptions) -> BundleResult<Artifact> {
		let outfile = match &options.output {
			BundleOutput::Memory => None,
			BundleOutput::Disk(scratch) => {
				scratch.ensure().await?;
				Some(scratch.artifact_path(&entry.stem()))
			}
		};

		let (current_dir, stdin) = match entry {
			BundleEntry::File(_) => (self.working_dir.as_path(), None),
			BundleEntry::Source {
				contents,
				resolve_dir,
				..
			} => (resolve_dir.as_path(), Some(contents.as_str())),
		};

		let args = self.command_args(entry, options, outfile.as_deref());
		tracing::debug!(
			entry = %entry.display_name(),
			target = ?options.target,
			minify = options.minify,
			"invoking esbuild"
		);

		let output = self.run(args, current_dir, stdin).await?;

		if !output.status.success() {
			if let Some(path) = &outfile {
				remove_partial(path).await;
			}
			return Err(BundleError::Build {
				entry: entry.display_name(),
				diagnostic: diagnostic(&output),
			});
		}

		match outfile {
			None => {
				let code = String::from_utf8_lossy(&output.stdout).into_owned();
				if code.trim().is_empty() {
					return Err(BundleError::EmptyOutput {
						entry: entry.display_name(),
					});
				}
				Ok(Artifact::InMemory { code })
			}
			Some(path) => match tokio::fs::metadata(&path).await {
				Ok(meta) if meta.len() > 0 => Ok(Artifact::OnDisk { path }),
				Ok(_) => {
					remove_partial(&path).await;
					Err(BundleError::EmptyOutput {
						entry: entry.display_name(),
					})
				}
				Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(BundleError::EmptyOutput {
					entry: entry.display_name(),
				}),
				Err(source) => Err(BundleError::io(path, source)),
			},
		}
	}
}

fn diagnostic(output: &Output) -> String {
	let stderr = String::from_utf8_lossy(&output.stderr);
	let stderr = stderr.trim();
	if stderr.is_empty() {
		format!("esbuild exited with {}", output.status)
	} else {
		stderr.to_string()
	}
}

async fn remove_partial(path: &Path) {
	if let Err(e) = tokio::fs::remove_file(path).await
		&& e.kind() != std::io::ErrorKind::NotFound
	{
		tracing::warn!(path = %path.display(), error = %e, "failed to remove partial artifact");
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::bundle::Loader;
	use crate::scratch::ScratchDir;
	use rstest::rstest;

	fn args_of(args: Vec<OsString>) -> Vec<String> {
		args.into_iter()
			.map(|arg| arg.to_string_lossy().into_owned())
			.collect()
	}

	// Runs `script` through `sh -c`; the generated flags become `$1..`.
	fn fake(script: &str) -> EsbuildBundler {
		EsbuildBundler::new("sh").with_args(["-c", script, "esbuild"])
	}

	#[rstest]
	fn test_server_file_args() {
		let bundler = EsbuildBundler::new("esbuild").with_working_dir("/site");
		let options = BundleOptions::server().externals(["react", "react-dom"]);

		let args = args_of(bundler.command_args(&BundleEntry::file("pages/index.jsx"), &options, None));

		assert_eq!(
			args,
			vec![
				"/site/pages/index.jsx",
				"--bundle",
				"--platform=node",
				"--format=cjs",
				"--external:react",
				"--external:react-dom",
				"--log-level=error",
			]
		);
	}

	#[rstest]
	fn test_browser_source_args() {
		let bundler = EsbuildBundler::new("npx").with_args(["esbuild"]);
		let entry = BundleEntry::source("import App from './a';", "/site").with_sourcefile("client.jsx");
		let options = BundleOptions::browser()
			.minify(true)
			.define("process.env.NODE_ENV", "\"production\"");

		let args = args_of(bundler.command_args(&entry, &options, Some(Path::new("/tmp/out.js"))));

		assert_eq!(
			args,
			vec![
				"esbuild",
				"--bundle",
				"--platform=browser",
				"--format=iife",
				"--minify",
				"--define:process.env.NODE_ENV=\"production\"",
				"--log-level=error",
				"--sourcefile=client.jsx",
				"--loader=jsx",
				"--outfile=/tmp/out.js",
			]
		);
	}

	#[rstest]
	#[case("card.jsx", "--loader=jsx")]
	#[case("card.tsx", "--loader=tsx")]
	fn test_inline_component_args_carry_loader(#[case] sourcefile: &str, #[case] loader: &str) {
		let bundler = EsbuildBundler::new("esbuild");
		let entry = BundleEntry::source("export default () => <p/>;", "/site").with_sourcefile(sourcefile);

		let sourcefile_arg = format!("--sourcefile={}", sourcefile);

		let args = args_of(bundler.command_args(&entry, &BundleOptions::server(), None));

		assert_eq!(
			args,
			vec![
				"--bundle",
				"--platform=node",
				"--format=cjs",
				"--log-level=error",
				sourcefile_arg.as_str(),
				loader,
			]
		);
	}

	#[rstest]
	fn test_explicit_loader_without_sourcefile() {
		let bundler = EsbuildBundler::new("esbuild");
		let entry = BundleEntry::source("export default () => <p/>;", "/site").with_loader(Loader::Jsx);

		let args = args_of(bundler.command_args(&entry, &BundleOptions::server(), None));

		assert_eq!(args.last().map(String::as_str), Some("--loader=jsx"));
		assert!(!args.iter().any(|arg| arg.starts_with("--sourcefile=")));
	}

	#[rstest]
	fn test_from_config() {
		let config = KilnConfig::builder()
			.working_dir("/site")
			.esbuild_binary("/opt/esbuild")
			.build()
			.unwrap();

		let bundler = EsbuildBundler::from_config(&config);

		assert_eq!(bundler.binary(), Path::new("/opt/esbuild"));
		assert_eq!(bundler.working_dir(), Path::new("/site"));
	}

	#[tokio::test]
	async fn test_missing_binary() {
		let bundler = EsbuildBundler::new("/nonexistent/esbuild");

		let err = bundler
			.bundle(&BundleEntry::file("index.jsx"), &BundleOptions::server())
			.await
			.unwrap_err();

		assert!(err.is_missing_binary());
	}

	#[cfg(unix)]
	#[tokio::test]
	async fn test_memory_output_from_file_entry() {
		let bundler = fake(r#"printf 'module.exports = "%s";' "$1""#).with_working_dir("/site");

		let artifact = bundler
			.bundle(&BundleEntry::file("index.jsx"), &BundleOptions::server())
			.await
			.unwrap();

		assert_eq!(artifact, Artifact::in_memory("module.exports = \"/site/index.jsx\";"));
	}

	#[cfg(unix)]
	#[tokio::test]
	async fn test_source_entry_is_piped_through_stdin() {
		let dir = tempfile::tempdir().unwrap();
		let bundler = fake("pwd; cat");
		let entry = BundleEntry::source("export default 1;", dir.path());

		let artifact = bundler.bundle(&entry, &BundleOptions::browser()).await.unwrap();

		let code = artifact.code().unwrap();
		let (cwd, body) = code.split_once('\n').unwrap();
		assert_eq!(
			Path::new(cwd).canonicalize().unwrap(),
			dir.path().canonicalize().unwrap()
		);
		assert_eq!(body, "export default 1;");
	}

	#[cfg(unix)]
	#[tokio::test]
	async fn test_build_failure_carries_diagnostic() {
		let bundler = fake(r#"echo 'ERROR: Could not resolve "missing"' >&2; exit 1"#);
		let entry = BundleEntry::source("import 'missing';", "/").with_sourcefile("page.jsx");

		let err = bundler.bundle(&entry, &BundleOptions::server()).await.unwrap_err();

		match err {
			BundleError::Build { entry, diagnostic } => {
				assert_eq!(entry, "page.jsx");
				assert_eq!(diagnostic, "ERROR: Could not resolve \"missing\"");
			}
			other => panic!("expected build error, got {other:?}"),
		}
	}

	#[cfg(unix)]
	#[tokio::test]
	async fn test_empty_output() {
		let bundler = fake("exit 0");

		let err = bundler
			.bundle(&BundleEntry::file("/site/index.jsx"), &BundleOptions::server())
			.await
			.unwrap_err();

		assert!(matches!(err, BundleError::EmptyOutput { ref entry } if entry == "/site/index.jsx"));
	}

	#[cfg(unix)]
	#[tokio::test]
	async fn test_disk_output() {
		// Arrange
		let dir = tempfile::tempdir().unwrap();
		let scratch = ScratchDir::new(dir.path().join("scratch"));
		let bundler = fake(
			r#"for a in "$@"; do case "$a" in --outfile=*) printf 'module.exports = 1;' > "${a#--outfile=}";; esac; done"#,
		);
		let options = BundleOptions::server().output(BundleOutput::Disk(scratch.clone()));

		// Act
		let artifact = bundler
			.bundle(&BundleEntry::file("/site/about.jsx"), &options)
			.await
			.unwrap();

		// Assert
		let path = artifact.path().unwrap();
		assert!(path.starts_with(scratch.path()));
		assert!(
			path.file_name()
				.unwrap()
				.to_string_lossy()
				.starts_with("about-")
		);
		assert_eq!(artifact.read_to_string().await.unwrap(), "module.exports = 1;");
	}

	#[cfg(unix)]
	#[tokio::test]
	async fn test_failed_disk_output_leaves_no_artifact() {
		let dir = tempfile::tempdir().unwrap();
		let scratch = ScratchDir::new(dir.path());
		let bundler = fake(
			r#"for a in "$@"; do case "$a" in --outfile=*) printf 'partial' > "${a#--outfile=}";; esac; done; exit 1"#,
		);
		let options = BundleOptions::server().output(BundleOutput::Disk(scratch));

		let err = bundler
			.bundle(&BundleEntry::file("/site/index.jsx"), &options)
			.await
			.unwrap_err();

		assert!(matches!(err, BundleError::Build { .. }));
		assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
	}
}
