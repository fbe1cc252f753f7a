//! Facade Integration Tests
//!
//! Drives a full render through the `kiln` facade and its prelude with the
//! in-memory test doubles.

use kiln::prelude::*;
use kiln_render::testing::{MockBundler, MockComponent, MockRuntime};
use rstest::rstest;
use serde_json::json;

fn templates(mode: RenderMode) -> (Arc<MockRuntime>, ComponentTemplates) {
	let bundler = Arc::new(MockBundler::new());
	let runtime = Arc::new(MockRuntime::new());
	bundler.register("/site/about.jsx", "// about");
	runtime.register(
		"// about",
		MockComponent::new(|props| format!("<p>{}</p>", props["name"].as_str().unwrap_or("")))
			.with_data(json!({"title": "About"})),
	);
	let config = KilnConfig::builder()
		.working_dir("/site")
		.mode(mode)
		.build()
		.unwrap();
	let templates = ComponentTemplates::new(config, bundler, runtime.clone()).unwrap();
	(runtime, templates)
}

#[rstest]
#[case(RenderMode::Static, false)]
#[case(RenderMode::Dynamic, true)]
#[case(RenderMode::Hydrate, true)]
#[tokio::test]
async fn test_render_through_prelude(#[case] mode: RenderMode, #[case] has_script: bool) {
	// Arrange
	let (runtime, templates) = templates(mode);
	let path = Path::new("about.jsx");

	// Act
	let declared = templates.get_data(path).await.unwrap();
	let html = templates
		.compile(None, path)
		.render(&PageObject::new().with("name", "Kiln").into())
		.await
		.unwrap();

	// Assert
	assert_eq!(declared, json!({"title": "About"}));
	assert_eq!(html.contains("<script>"), has_script);
	assert_eq!(html.contains("<p>Kiln</p>"), mode.renders_on_server());
	assert_eq!(runtime.live_components(), 0);
}

#[rstest]
fn test_sanitize_reexport() {
	let page = PageObject::new().with("title", "Home").with("_draft", true);

	let data = kiln::sanitize(&page.into());

	assert_eq!(data, json!({"title": "Home"}));
}
