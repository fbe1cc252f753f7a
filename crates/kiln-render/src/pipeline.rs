//! Render pipeline.
//!
//! Orchestrates the loader, the runtime and the client code generator for
//! one page according to the configured [`RenderMode`]:
//!
//! | Mode    | Server markup                  | Client bundle  |
//! |---------|--------------------------------|----------------|
//! | Static  | `render_to_static_markup`      | none           |
//! | Dynamic | none, empty mount container    | fresh render   |
//! | Hydrate | `render_to_string`             | reconcile      |
//!
//! Every mode loads the server bundle and requires a default export.

use std::path::Path;
use std::sync::Arc;

use kiln_bundler::Bundler;
use kiln_core::{KilnConfig, PageValue, RenderMode, sanitize_with};
use serde_json::Value;

use crate::client::{AttachMethod, ClientCodeGenerator};
use crate::entry::ComponentEntry;
use crate::error::{PageError, PageResult, RuntimeResult};
use crate::loader::{ComponentLoader, LoadedComponent};
use crate::runtime::{ComponentHandle, ComponentRuntime};

/// Renders component entries to page output.
#[derive(Clone)]
pub struct RenderPipeline {
	config: Arc<KilnConfig>,
	loader: ComponentLoader,
	client: ClientCodeGenerator,
}

impl RenderPipeline {
	/// Creates a pipeline.
	pub fn new(config: Arc<KilnConfig>, bundler: Arc<dyn Bundler>, runtime: Arc<dyn ComponentRuntime>) -> Self {
		let loader = ComponentLoader::new(config.clone(), bundler.clone(), runtime);
		let client = ClientCodeGenerator::new(config.clone(), bundler);
		Self {
			config,
			loader,
			client,
		}
	}

	/// Active configuration.
	pub fn config(&self) -> &KilnConfig {
		&self.config
	}

	/// Component loader.
	pub fn loader(&self) -> &ComponentLoader {
		&self.loader
	}

	/// Client code generator.
	pub fn client(&self) -> &ClientCodeGenerator {
		&self.client
	}

	/// Renders `entry` with `data`.
	pub async fn render(&self, entry: &ComponentEntry, data: &PageValue) -> PageResult<String> {
		let props = sanitize_with(data, &self.config.sanitize);
		let mode = self.config.mode;

		let loaded = self.loader.load(&entry.source).await?;
		let component = loaded.require_component()?;

		let result = self.render_loaded(entry, &loaded, component, &props, mode).await;
		self.loader.runtime().release(component).await;
		result
	}

	async fn render_loaded(
		&self,
		entry: &ComponentEntry,
		loaded: &LoadedComponent,
		component: ComponentHandle,
		props: &Value,
		mode: RenderMode,
	) -> PageResult<String> {
		match mode {
			RenderMode::Static => self.server_markup(component, props, mode, &loaded.origin).await,
			RenderMode::Dynamic => {
				let bundle = self
					.client
					.generate(entry, props, AttachMethod::FreshRender)
					.await?;
				Ok(assemble_fragment(&entry.mount_id, "", &bundle))
			}
			RenderMode::Hydrate => {
				let markup = self.server_markup(component, props, mode, &loaded.origin).await?;
				let bundle = self
					.client
					.generate(entry, props, AttachMethod::Reconcile)
					.await?;
				Ok(assemble_fragment(&entry.mount_id, &markup, &bundle))
			}
		}
	}

	async fn server_markup(
		&self,
		component: ComponentHandle,
		props: &Value,
		mode: RenderMode,
		origin: &Path,
	) -> PageResult<String> {
		let runtime = self.loader.runtime();
		let markup: RuntimeResult<String> = async {
			let element = runtime.create_element(&component, props).await?;
			if mode == RenderMode::Static {
				runtime.render_to_static_markup(element).await
			} else {
				runtime.render_to_string(element).await
			}
		}
		.await;

		markup.map_err(|e| {
			tracing::error!(
				path = %origin.display(),
				mode = %mode,
				error = %e,
				"error rendering component"
			);
			PageError::RenderFailure {
				path: origin.to_path_buf(),
			}
		})
	}
}

/// Wraps server markup and a client bundle into the page fragment.
///
/// The mount id is attribute-escaped and any `</script` sequence in the
/// bundle is broken up so it cannot close the script element.
pub fn assemble_fragment(mount_id: &str, markup: &str, bundle: &str) -> String {
	format!(
		"<div>\n<div id=\"{}\">{}</div>\n<script>\nprocess = {{ env: {{ NODE_ENV: \"production\" }} }};\n{}\n</script>\n</div>",
		html_escape(mount_id),
		markup,
		escape_script_close(bundle)
	)
}

fn html_escape(s: &str) -> String {
	s.replace('&', "&amp;")
		.replace('<', "&lt;")
		.replace('>', "&gt;")
		.replace('"', "&quot;")
		.replace('\'', "&#x27;")
}

// Case-insensitive: the HTML tokenizer treats `</SCRIPT` the same way.
fn escape_script_close(code: &str) -> String {
	const TAG: &str = "</script";
	let mut out = String::with_capacity(code.len());
	let mut rest = code;
	while let Some(pos) = find_ascii_case_insensitive(rest, TAG) {
		out.push_str(&rest[..pos]);
		out.push_str("<\\/");
		out.push_str(&rest[pos + 2..pos + TAG.len()]);
		rest = &rest[pos + TAG.len()..];
	}
	out.push_str(rest);
	out
}

fn find_ascii_case_insensitive(haystack: &str, needle: &str) -> Option<usize> {
	let needle = needle.as_bytes();
	haystack
		.as_bytes()
		.windows(needle.len())
		.position(|window| window.eq_ignore_ascii_case(needle))
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	#[rstest]
	fn test_assemble_fragment() {
		let fragment = assemble_fragment("root", "<span>A</span>", "console.log(1);");

		assert_eq!(
			fragment,
			"<div>\n\
			 <div id=\"root\"><span>A</span></div>\n\
			 <script>\n\
			 process = { env: { NODE_ENV: \"production\" } };\n\
			 console.log(1);\n\
			 </script>\n\
			 </div>"
		);
	}

	#[rstest]
	fn test_mount_id_is_escaped() {
		let fragment = assemble_fragment("a\"><script>", "", "");
		assert!(fragment.contains("<div id=\"a&quot;&gt;&lt;script&gt;\"></div>"));
	}

	#[rstest]
	#[case("var s = \"</script>\";", "var s = \"<\\/script>\";")]
	#[case("x = '</SCRIPT >'", "x = '<\\/SCRIPT >'")]
	#[case("a</scrip", "a</scrip")]
	#[case("</script></Script>", "<\\/script><\\/Script>")]
	#[case("\u{e9}</script", "\u{e9}<\\/script")]
	fn test_escape_script_close(#[case] input: &str, #[case] expected: &str) {
		assert_eq!(escape_script_close(input), expected);
	}
}
