//! Template Extension Integration Tests
//!
//! Exercises the surface the host engine talks to: registration, data
//! collection, compilation of literal and function bodies, and the bundle
//! storage options.

use std::path::Path;
use std::sync::Arc;

use kiln_bundler::{BundleEntry, BundleOutput, Loader};
use kiln_core::{ArtifactStorage, ConfigError, KilnConfig, PageObject, PageValue, RenderMode};
use kiln_render::testing::{MockBundler, MockComponent, MockRuntime};
use kiln_render::{
	ComponentEntry, ComponentSource, ComponentTemplates, DeriveFn, TemplateBody, TemplateExtension,
	TemplateKind,
};
use rstest::rstest;
use serde_json::json;

fn templates(config: KilnConfig) -> (Arc<MockBundler>, Arc<MockRuntime>, ComponentTemplates) {
	let bundler = Arc::new(MockBundler::new());
	let runtime = Arc::new(MockRuntime::new());
	let templates = ComponentTemplates::new(config, bundler.clone(), runtime.clone()).unwrap();
	(bundler, runtime, templates)
}

fn site(mode: RenderMode) -> KilnConfig {
	KilnConfig::builder()
		.working_dir("/site")
		.mode(mode)
		.build()
		.unwrap()
}

fn title_component() -> MockComponent {
	MockComponent::new(|props| format!("<h1>{}</h1>", props["title"].as_str().unwrap_or("")))
}

// ============================================================================
// Registration
// ============================================================================

#[rstest]
fn test_extensions_and_handles() {
	let (_, _, templates) = templates(site(RenderMode::Hydrate));

	assert_eq!(templates.extensions(), ["jsx", "tsx"]);
	assert!(templates.handles(Path::new("src/pages/index.jsx")));
	assert!(templates.handles(Path::new("about.tsx")));
	assert!(!templates.handles(Path::new("README.md")));
}

#[rstest]
#[case::empty_mount(KilnConfig { mount_id: String::new(), ..KilnConfig::default() })]
#[case::spaced_mount(KilnConfig { mount_id: "my root".to_string(), ..KilnConfig::default() })]
#[case::no_extensions(KilnConfig { extensions: Vec::new(), ..KilnConfig::default() })]
#[case::dotted_extension(KilnConfig { extensions: vec![".jsx".to_string()], ..KilnConfig::default() })]
fn test_invalid_config_is_rejected_at_registration(#[case] config: KilnConfig) {
	let result = ComponentTemplates::new(
		config,
		Arc::new(MockBundler::new()),
		Arc::new(MockRuntime::new()),
	);

	assert!(result.is_err());
}

#[rstest]
fn test_invalid_mode_string_is_rejected() {
	let err = KilnConfig::from_toml_str(r#"mode = "isomorphic""#).unwrap_err();
	assert!(matches!(err, ConfigError::Toml(_)));

	let err = "isomorphic".parse::<RenderMode>().unwrap_err();
	assert!(matches!(err, ConfigError::InvalidRenderMode(_)));
}

// ============================================================================
// Data Collection
// ============================================================================

#[tokio::test]
async fn test_get_data_returns_data_export() {
	let (bundler, runtime, templates) = templates(site(RenderMode::Hydrate));
	bundler.register("/site/index.jsx", "// index");
	runtime.register(
		"// index",
		title_component().with_data(json!({"layout": "base.njk", "tags": ["post"]})),
	);

	let data = templates.get_data(Path::new("index.jsx")).await.unwrap();

	assert_eq!(data, json!({"layout": "base.njk", "tags": ["post"]}));
}

#[tokio::test]
async fn test_get_data_without_data_export() {
	let (bundler, runtime, templates) = templates(site(RenderMode::Hydrate));
	bundler.register("/site/index.jsx", "// index");
	runtime.register("// index", title_component());

	let data = templates.get_data(Path::new("index.jsx")).await.unwrap();

	assert_eq!(data, json!({}));
}

#[tokio::test]
async fn test_get_data_does_not_require_default_export() {
	let (bundler, runtime, templates) = templates(site(RenderMode::Static));
	bundler.register("/site/empty.jsx", "// empty");
	runtime.register("// empty", MockComponent::empty());

	let data = templates.get_data(Path::new("empty.jsx")).await.unwrap();

	assert_eq!(data, json!({}));
}

// ============================================================================
// Pass-through Bodies
// ============================================================================

#[rstest]
#[case(RenderMode::Static)]
#[case(RenderMode::Dynamic)]
#[case(RenderMode::Hydrate)]
#[tokio::test]
async fn test_literal_body_passes_through(#[case] mode: RenderMode) {
	let (bundler, _, templates) = templates(site(mode));

	let template = templates.compile(Some("Hello".into()), Path::new("index.jsx"));
	let output = template.render(&PageValue::Undefined).await.unwrap();

	assert_eq!(output, "Hello");
	assert!(bundler.calls().is_empty());
}

#[tokio::test]
async fn test_sync_function_body() {
	let (bundler, _, templates) = templates(site(RenderMode::Hydrate));
	let permalink = DeriveFn::sync(|data| {
		let slug = data
			.get("slug")
			.and_then(|slug| slug.as_str().map(str::to_string))
			.unwrap_or_default();
		format!("/posts/{}/", slug)
	});

	let template = templates.compile(Some(permalink.into()), Path::new("post.jsx"));
	let output = template
		.render(&PageObject::new().with("slug", "hello-world").into())
		.await
		.unwrap();

	assert_eq!(output, "/posts/hello-world/");
	assert!(bundler.calls().is_empty());
}

#[tokio::test]
async fn test_async_function_body_is_awaited() {
	let (_, _, templates) = templates(site(RenderMode::Static));
	let body = DeriveFn::future(|data: PageValue| async move {
		tokio::task::yield_now().await;
		if data.is_nullish() {
			"nothing".to_string()
		} else {
			"something".to_string()
		}
	});

	let template = templates.compile(Some(TemplateBody::Function(body)), Path::new("index.jsx"));

	assert_eq!(template.render(&PageValue::Null).await.unwrap(), "nothing");
	assert_eq!(
		template.render(&PageValue::from("x")).await.unwrap(),
		"something"
	);
}

#[tokio::test]
async fn test_empty_body_renders_component() {
	let (bundler, runtime, templates) = templates(site(RenderMode::Static));
	bundler.register("/site/index.jsx", "// index");
	runtime.register("// index", title_component());

	let template = templates.compile(Some("".into()), Path::new("index.jsx"));
	let output = template
		.render(&PageObject::new().with("title", "Home").into())
		.await
		.unwrap();

	assert!(matches!(template.kind(), TemplateKind::Component));
	assert_eq!(output, "<h1>Home</h1>");
}

// ============================================================================
// Inline Components
// ============================================================================

#[tokio::test]
async fn test_render_inline_entry() {
	// Arrange
	let components = tempfile::tempdir().unwrap();
	let config = KilnConfig::builder().working_dir("/site").build().unwrap();
	let (bundler, runtime, templates) = templates(config);
	let source = "export default function Card(props) { return <h1>{props.title}</h1>; }";
	runtime.register(source, title_component());
	let entry = ComponentEntry::new(ComponentSource::inline(source, components.path(), "card.jsx"), "card");

	// Act
	let output = templates
		.render_entry(&entry, &PageObject::new().with("title", "Inline").into())
		.await
		.unwrap();

	// Assert
	assert!(output.contains("<div id=\"card\"><!--$--><h1>Inline</h1><!--/$--></div>"));
	let calls = bundler.calls();
	let (server_entry, _) = &calls[0];
	assert_eq!(server_entry.loader(), Some(Loader::Jsx));
	assert!(matches!(
		server_entry,
		BundleEntry::Source { resolve_dir, .. } if resolve_dir == components.path()
	));
	// The client bootstrap required a module next to the inline source.
	let (client_entry, _) = &calls[1];
	let BundleEntry::Source { contents, .. } = client_entry else {
		panic!("client bundle must be built from source");
	};
	assert!(contents.contains(&components.path().join("kiln-inline-card-").to_string_lossy().into_owned()));
	// That module only exists while the client bundle is built.
	assert_eq!(std::fs::read_dir(components.path()).unwrap().count(), 0);
}

// ============================================================================
// Bundle Storage
// ============================================================================

#[tokio::test]
async fn test_disk_artifacts() {
	// Arrange
	let scratch = tempfile::tempdir().unwrap();
	let config = KilnConfig::builder()
		.working_dir("/site")
		.mode(RenderMode::Static)
		.artifact_storage(ArtifactStorage::Disk)
		.scratch_dir(scratch.path())
		.build()
		.unwrap();
	let (bundler, runtime, templates) = templates(config);
	bundler.register("/site/index.jsx", "// index");
	runtime.register("// index", title_component());

	// Act
	let first = templates
		.compile(None, Path::new("index.jsx"))
		.render(&PageObject::new().with("title", "Disk").into())
		.await
		.unwrap();
	let second = templates
		.compile(None, Path::new("index.jsx"))
		.render(&PageObject::new().with("title", "Disk").into())
		.await
		.unwrap();

	// Assert
	assert_eq!(first, "<h1>Disk</h1>");
	assert_eq!(first, second);
	assert!(matches!(bundler.calls()[0].1.output, BundleOutput::Disk(_)));
	// Each render writes its own uniquely named artifact.
	assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 2);
}

#[tokio::test]
async fn test_bundle_cache_reuses_unchanged_files() {
	let site = tempfile::tempdir().unwrap();
	let path = site.path().join("index.jsx");
	std::fs::write(&path, "export default () => <h1/>;").unwrap();
	let config = KilnConfig::builder()
		.working_dir(site.path())
		.mode(RenderMode::Static)
		.bundle_cache(true)
		.build()
		.unwrap();
	let (bundler, runtime, templates) = templates(config);
	bundler.register(&path, "// index");
	runtime.register("// index", title_component());

	templates.get_data(Path::new("index.jsx")).await.unwrap();
	let template = templates.compile(None, Path::new("index.jsx"));
	template.render(&PageValue::Undefined).await.unwrap();
	template.render(&PageValue::Undefined).await.unwrap();

	assert_eq!(bundler.file_calls(&path), 1);
	assert_eq!(templates.bundle_cache().map(|cache| cache.len()), Some(1));
}

#[tokio::test]
async fn test_begin_build_picks_up_changed_imports() {
	// Arrange
	let site = tempfile::tempdir().unwrap();
	let page = site.path().join("index.jsx");
	let button = site.path().join("Button.jsx");
	std::fs::write(&page, "import Button from './Button';").unwrap();
	std::fs::write(&button, "export default () => 'v1';").unwrap();
	let config = KilnConfig::builder()
		.working_dir(site.path())
		.mode(RenderMode::Static)
		.bundle_cache(true)
		.build()
		.unwrap();
	let (bundler, runtime, templates) = templates(config);
	bundler.register(&page, "// index");
	runtime.register("// index", title_component());
	let template = templates.compile(None, Path::new("index.jsx"));

	// Act
	templates.begin_build();
	template.render(&PageValue::Undefined).await.unwrap();
	std::fs::write(&button, "export default () => 'version two';").unwrap();
	template.render(&PageValue::Undefined).await.unwrap();
	let within_run = bundler.file_calls(&page);
	templates.begin_build();
	template.render(&PageValue::Undefined).await.unwrap();

	// Assert
	assert_eq!(within_run, 1);
	assert_eq!(bundler.file_calls(&page), 2);
	assert_eq!(templates.bundle_cache().map(|cache| cache.len()), Some(1));
}

#[rstest]
fn test_begin_build_without_cache() {
	let (_, _, templates) = templates(site(RenderMode::Static));
	templates.begin_build();
	assert!(templates.bundle_cache().is_none());
}

#[rstest]
fn test_bundle_cache_disabled_by_default() {
	let (_, _, templates) = templates(site(RenderMode::Hydrate));
	assert!(templates.bundle_cache().is_none());
}
