//! In-process [`ComponentRuntime`] backed by `boa_engine`.
//!
//! `boa_engine::Context` is `!Send`, so it lives on a dedicated thread that
//! receives commands over a `std::sync::mpsc` channel and answers through
//! `tokio::sync::oneshot` channels. Async callers never block a worker.
//!
//! The runtime does not ship a UI library. The caller supplies its source,
//! which must define the globals `React` (with `createElement`) and
//! `ReactDOMServer` (with `renderToString` and `renderToStaticMarkup`).
//! Server bundles are evaluated as CommonJS modules; `require` resolves the
//! configured externals to expressions over those globals.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;

use async_trait::async_trait;
use boa_engine::{Context, JsError, JsValue, Source};
use kiln_bundler::Artifact;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::oneshot;

use crate::error::{RuntimeError, RuntimeResult};
use crate::runtime::{ComponentHandle, ComponentRuntime, ElementHandle, ModuleExports};

const PRELUDE: &str = r#"
var __kiln = { components: {}, elements: {}, externals: {} };
if (typeof process === "undefined") {
	var process = { env: { NODE_ENV: "production" } };
}
if (typeof console === "undefined") {
	var console = (function () {
		var noop = function () {};
		return { log: noop, info: noop, warn: noop, error: noop, debug: noop };
	})();
}
__kiln.require = function (name) {
	if (Object.prototype.hasOwnProperty.call(__kiln.externals, name)) {
		return __kiln.externals[name]();
	}
	throw new Error("Cannot find module '" + name + "'");
};
"#;

const LIBRARY_CHECK: &str = r#"
typeof React === "object" && React !== null
	&& typeof React.createElement === "function"
	&& typeof ReactDOMServer === "object" && ReactDOMServer !== null
	&& typeof ReactDOMServer.renderToString === "function"
	&& typeof ReactDOMServer.renderToStaticMarkup === "function"
"#;

const JSX_RUNTIME: &str = r#"(function () {
	function jsx(type, props, key) {
		return React.createElement(type, key === undefined ? props : Object.assign({ key: key }, props));
	}
	return { jsx: jsx, jsxs: jsx, Fragment: React.Fragment };
})()"#;

fn default_externals() -> BTreeMap<String, String> {
	[
		("react", "React"),
		("react-dom", "ReactDOM"),
		("react-dom/server", "ReactDOMServer"),
		("react/jsx-runtime", JSX_RUNTIME),
	]
	.into_iter()
	.map(|(name, expression)| (name.to_string(), expression.to_string()))
	.collect()
}

enum Command {
	Load {
		code: String,
		origin: String,
		reply: oneshot::Sender<RuntimeResult<ModuleExports>>,
	},
	CreateElement {
		component: u64,
		props: String,
		reply: oneshot::Sender<RuntimeResult<ElementHandle>>,
	},
	Render {
		element: u64,
		static_markup: bool,
		reply: oneshot::Sender<RuntimeResult<String>>,
	},
	Release {
		component: u64,
	},
}

/// Builder for [`BoaRuntime`].
#[derive(Debug, Clone)]
pub struct BoaRuntimeBuilder {
	library: String,
	externals: BTreeMap<String, String>,
}

impl BoaRuntimeBuilder {
	/// Maps `require(name)` to the JavaScript `expression`, evaluated on
	/// each call.
	pub fn external(mut self, name: impl Into<String>, expression: impl Into<String>) -> Self {
		self.externals.insert(name.into(), expression.into());
		self
	}

	/// Starts the runtime thread and loads the library.
	///
	/// # Errors
	///
	/// See [`BoaRuntime::new`].
	pub fn build(self) -> RuntimeResult<BoaRuntime> {
		let (commands, command_rx) = mpsc::channel::<Command>();
		let (init_tx, init_rx) = mpsc::channel::<RuntimeResult<()>>();

		thread::Builder::new()
			.name("kiln-boa".to_string())
			.spawn(move || runtime_thread_main(self.library, self.externals, command_rx, init_tx))
			.map_err(|e| RuntimeError::Unavailable(format!("failed to start runtime thread: {}", e)))?;

		init_rx.recv().map_err(|_| {
			RuntimeError::Unavailable("runtime thread terminated during initialization".to_string())
		})??;

		Ok(BoaRuntime { commands })
	}
}

/// [`ComponentRuntime`] evaluating server bundles with `boa_engine`.
///
/// All work is serialized on one thread. Share a single instance across
/// templates with `Arc`.
#[derive(Debug)]
pub struct BoaRuntime {
	commands: Sender<Command>,
}

impl std::fmt::Debug for Command {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::Load { origin, .. } => write!(f, "Load({})", origin),
			Self::CreateElement { component, .. } => write!(f, "CreateElement({})", component),
			Self::Render { element, .. } => write!(f, "Render({})", element),
			Self::Release { component } => write!(f, "Release({})", component),
		}
	}
}

impl BoaRuntime {
	/// Starts a runtime with `library` and the default externals.
	///
	/// # Errors
	///
	/// Returns [`RuntimeError::Unavailable`] if:
	/// - the runtime thread cannot be spawned
	/// - `library` throws while evaluating
	/// - `library` does not define `React.createElement`,
	///   `ReactDOMServer.renderToString` and `ReactDOMServer.renderToStaticMarkup`
	pub fn new(library: impl Into<String>) -> RuntimeResult<Self> {
		Self::builder(library).build()
	}

	/// Starts building a runtime around `library`.
	///
	/// The default externals map `react`, `react-dom`, `react-dom/server` and
	/// `react/jsx-runtime` to the library globals.
	pub fn builder(library: impl Into<String>) -> BoaRuntimeBuilder {
		BoaRuntimeBuilder {
			library: library.into(),
			externals: default_externals(),
		}
	}

	async fn request<T>(&self, command: Command, reply: oneshot::Receiver<RuntimeResult<T>>) -> RuntimeResult<T> {
		self.commands
			.send(command)
			.map_err(|_| RuntimeError::Unavailable("runtime thread is not running".to_string()))?;
		reply
			.await
			.map_err(|_| RuntimeError::Unavailable("runtime thread terminated".to_string()))?
	}

	async fn render(&self, element: ElementHandle, static_markup: bool) -> RuntimeResult<String> {
		let (reply, rx) = oneshot::channel();
		self.request(
			Command::Render {
				element: element.id(),
				static_markup,
				reply,
			},
			rx,
		)
		.await
	}
}

#[async_trait]
impl ComponentRuntime for BoaRuntime {
	async fn load_module(&self, artifact: &Artifact, origin: &Path) -> RuntimeResult<ModuleExports> {
		let code = match artifact {
			Artifact::InMemory { code } => code.clone(),
			Artifact::OnDisk { path } => tokio::fs::read_to_string(path)
				.await
				.map_err(|source| RuntimeError::Io {
					path: path.clone(),
					source,
				})?,
		};

		let (reply, rx) = oneshot::channel();
		self.request(
			Command::Load {
				code,
				origin: origin.display().to_string(),
				reply,
			},
			rx,
		)
		.await
	}

	async fn create_element(&self, component: &ComponentHandle, props: &Value) -> RuntimeResult<ElementHandle> {
		let props = serde_json::to_string(props).map_err(|e| RuntimeError::Render(e.to_string()))?;
		let (reply, rx) = oneshot::channel();
		self.request(
			Command::CreateElement {
				component: component.id(),
				props,
				reply,
			},
			rx,
		)
		.await
	}

	async fn render_to_string(&self, element: ElementHandle) -> RuntimeResult<String> {
		self.render(element, false).await
	}

	async fn render_to_static_markup(&self, element: ElementHandle) -> RuntimeResult<String> {
		self.render(element, true).await
	}

	async fn release(&self, component: ComponentHandle) {
		// A stopped thread has nothing left to release.
		let _ = self.commands.send(Command::Release {
			component: component.id(),
		});
	}
}

#[derive(Deserialize)]
struct LoadReply {
	component: bool,
	data: Value,
	#[serde(rename = "hasData")]
	has_data: bool,
}

struct Engine {
	context: Context,
	components: HashSet<u64>,
	elements: HashSet<u64>,
	next_id: u64,
}

fn runtime_thread_main(
	library: String,
	externals: BTreeMap<String, String>,
	command_rx: Receiver<Command>,
	init_tx: mpsc::Sender<RuntimeResult<()>>,
) {
	let mut engine = Engine {
		context: Context::default(),
		components: HashSet::new(),
		elements: HashSet::new(),
		next_id: 0,
	};

	let init = engine.init(&library, &externals);
	let init_ok = init.is_ok();
	if init_tx.send(init).is_err() || !init_ok {
		return;
	}

	while let Ok(command) = command_rx.recv() {
		match command {
			Command::Load {
				code,
				origin,
				reply,
			} => {
				let _ = reply.send(engine.load(&code, &origin));
			}
			Command::CreateElement {
				component,
				props,
				reply,
			} => {
				let _ = reply.send(engine.create_element(component, &props));
			}
			Command::Render {
				element,
				static_markup,
				reply,
			} => {
				let _ = reply.send(engine.render(element, static_markup));
			}
			Command::Release { component } => engine.release(component),
		}
	}
}

impl Engine {
	fn init(&mut self, library: &str, externals: &BTreeMap<String, String>) -> RuntimeResult<()> {
		let unavailable = |message: String| RuntimeError::Unavailable(format!("failed to load UI library: {}", message));

		self.eval(library).map_err(unavailable)?;
		self.eval(PRELUDE).map_err(unavailable)?;

		let mut bindings = String::new();
		for (name, expression) in externals {
			bindings.push_str(&format!(
				"__kiln.externals[{}] = function () {{ return {}; }};\n",
				js_string(name),
				expression
			));
		}
		self.eval(&bindings).map_err(unavailable)?;

		if self.eval(LIBRARY_CHECK).map_err(unavailable)? != "true" {
			return Err(unavailable(
				"expected globals React.createElement, ReactDOMServer.renderToString and ReactDOMServer.renderToStaticMarkup"
					.to_string(),
			));
		}
		Ok(())
	}

	fn allocate(&mut self) -> u64 {
		self.next_id += 1;
		self.next_id
	}

	fn load(&mut self, code: &str, origin: &str) -> RuntimeResult<ModuleExports> {
		let id = self.allocate();
		let script = format!(
			r#"(function () {{
	var module = {{ exports: {{}} }};
	(function (module, exports, require) {{
{code}
	}})(module, module.exports, __kiln.require);
	var ns = module.exports;
	var component;
	if (ns != null && typeof ns === "object" && "default" in ns) {{
		component = ns.default;
	}} else if (typeof ns === "function") {{
		component = ns;
	}}
	var valid = typeof component === "function"
		|| (component != null && typeof component === "object" && component.$$typeof !== undefined);
	if (valid) {{
		__kiln.components[{id}] = component;
	}}
	var data = ns != null && (typeof ns === "object" || typeof ns === "function") ? ns.data : undefined;
	return JSON.stringify({{ component: valid, data: data === undefined ? null : data, hasData: data !== undefined }});
}})()"#
		);

		let reply = self
			.eval(&script)
			.map_err(|message| RuntimeError::Evaluation(format!("{}: {}", origin, message)))?;
		let reply: LoadReply = serde_json::from_str(&reply)
			.map_err(|e| RuntimeError::Evaluation(format!("{}: unreadable module exports: {}", origin, e)))?;

		let default = if reply.component {
			self.components.insert(id);
			Some(ComponentHandle::new(id))
		} else {
			None
		};

		Ok(ModuleExports {
			default,
			data: reply.has_data.then_some(reply.data),
		})
	}

	fn create_element(&mut self, component: u64, props: &str) -> RuntimeResult<ElementHandle> {
		if !self.components.contains(&component) {
			return Err(RuntimeError::UnknownHandle(component));
		}
		let id = self.allocate();
		let script = format!(
			"(function () {{ __kiln.elements[{id}] = React.createElement(__kiln.components[{component}], {props}); return \"ok\"; }})()"
		);
		self.eval(&script).map_err(RuntimeError::Render)?;
		self.elements.insert(id);
		Ok(ElementHandle::new(id))
	}

	fn render(&mut self, element: u64, static_markup: bool) -> RuntimeResult<String> {
		if !self.elements.remove(&element) {
			return Err(RuntimeError::UnknownHandle(element));
		}
		let function = if static_markup {
			"renderToStaticMarkup"
		} else {
			"renderToString"
		};
		let script = format!(
			"(function () {{ var element = __kiln.elements[{element}]; delete __kiln.elements[{element}]; return ReactDOMServer.{function}(element); }})()"
		);
		self.eval(&script).map_err(RuntimeError::Render)
	}

	fn release(&mut self, component: u64) {
		if self.components.remove(&component) {
			let script = format!("delete __kiln.components[{component}];");
			if let Err(message) = self.eval(&script) {
				tracing::warn!(component, error = %message, "failed to release component");
			}
		}
	}

	fn eval(&mut self, code: &str) -> Result<String, String> {
		let context = &mut self.context;
		let value = context
			.eval(Source::from_bytes(code))
			.map_err(|e| js_error_to_string(&e, context))?;
		js_value_to_string(&value, context)
	}
}

fn js_value_to_string(value: &JsValue, context: &mut Context) -> Result<String, String> {
	value
		.to_string(context)
		.map(|s| s.to_std_string_escaped())
		.map_err(|e| js_error_to_string(&e, context))
}

fn js_error_to_string(error: &JsError, context: &mut Context) -> String {
	error
		.to_opaque(context)
		.to_string(context)
		.map(|s| s.to_std_string_escaped())
		.unwrap_or_else(|_| "unknown JavaScript error".to_string())
}

fn js_string(s: &str) -> String {
	serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}
