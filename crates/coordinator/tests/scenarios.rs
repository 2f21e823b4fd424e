//! End-to-end scenarios against real formatters.
//!
//! Need `deno` on `PATH` and network access to the plugin host, so they are ignored by default:
//! `cargo test -p fmtbridge -- --ignored`.

use fmtbridge::{
	BackendConfig, ContentType, Coordinator, CoordinatorConfig, Mode, OptionsOverride, Output, Request,
};
use fmtbridge_backend::plugin::PluginConfig;
use fmtbridge_backend::process::ProcessConfig;
use pretty_assertions::assert_eq;

fn process_coordinator() -> Coordinator {
	Coordinator::from_config(&CoordinatorConfig {
		backends: vec![BackendConfig::Process(ProcessConfig::default())],
		..CoordinatorConfig::default()
	})
	.unwrap()
}

fn plugin_coordinator(dir: &std::path::Path) -> Coordinator {
	Coordinator::from_config(&CoordinatorConfig {
		backends: vec![BackendConfig::Plugin(PluginConfig {
			dir: dir.to_path_buf(),
			..PluginConfig::default()
		})],
		..CoordinatorConfig::default()
	})
	.unwrap()
}

#[tokio::test]
#[ignore = "requires deno on PATH"]
async fn formats_json() {
	let coordinator = process_coordinator();
	let out = coordinator
		.format(&Request::new(r#"{"foo":"bar"}"#, ContentType::Json))
		.await
		.unwrap();
	assert_eq!(out, "{ \"foo\": \"bar\" }\n");
}

#[tokio::test]
#[ignore = "requires deno on PATH"]
async fn drops_semicolons_when_asked() {
	let coordinator = process_coordinator();
	let request = Request::new(r#"const foo = "bar";"#, ContentType::TypeScript)
		.overrides(OptionsOverride::new().semicolons(false));
	assert_eq!(coordinator.format(&request).await.unwrap(), "const foo = \"bar\"\n");
}

#[tokio::test]
#[ignore = "requires deno on PATH"]
async fn checks_formatted_and_unformatted_input() {
	let coordinator = process_coordinator();
	let clean = Request::new("const foo = \"bar\";\n", ContentType::TypeScript);
	let dirty = Request::new("const foo = \"bar\";   \n", ContentType::TypeScript);

	assert_eq!(coordinator.run(Mode::Check, &clean).await.unwrap(), Output::Checked(true));
	assert_eq!(coordinator.run(Mode::Check, &dirty).await.unwrap(), Output::Checked(false));
	assert!(!coordinator.check_blocking(&dirty).unwrap());
}

#[tokio::test]
#[ignore = "requires deno on PATH"]
async fn formatting_is_idempotent() {
	let coordinator = process_coordinator();
	let once = coordinator
		.format(&Request::new("let   x={a:1,b:[1,2]}", ContentType::JavaScript))
		.await
		.unwrap();
	let twice = coordinator
		.format(&Request::new(&once, ContentType::JavaScript))
		.await
		.unwrap();
	assert_eq!(once, twice);
	assert!(coordinator.check(&Request::new(&once, ContentType::JavaScript)).await.unwrap());
}

#[test]
#[ignore = "requires deno on PATH"]
fn blocking_path_matches_the_async_path() {
	let coordinator = process_coordinator();
	let source = "# Title\n\n* one\n* two\n";
	let blocking = coordinator
		.format_blocking(&Request::new(source, ContentType::Markdown))
		.unwrap();
	let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
	let fresh = process_coordinator();
	let streamed = runtime
		.block_on(fresh.format(&Request::new(source, ContentType::Markdown)))
		.unwrap();
	assert_eq!(blocking, streamed);
}

#[tokio::test]
#[ignore = "requires deno on PATH and network access to plugins.dprint.dev"]
async fn backends_agree() {
	let dir = tempfile::tempdir().unwrap();
	let process = process_coordinator();
	let plugin = plugin_coordinator(dir.path());

	for (text, content_type) in [
		(r#"{"foo":"bar"}"#, ContentType::Json),
		(r#"const foo = "bar";"#, ContentType::TypeScript),
		("# Title\n\nSome   text.\n", ContentType::Markdown),
		(
			"const total = firstOperandValue + secondOperandValue + thirdOperandValue + fourthOperandValue;\n",
			ContentType::TypeScript,
		),
		("// deno-fmt-ignore\nconst  spaced   =  [1,2,3];\n", ContentType::TypeScript),
		(
			"# Code\n\n```ts\nconst x={a:1}\n```\n\n```json\n{\"a\":[1,2]}\n```\n",
			ContentType::Markdown,
		),
	] {
		let request = Request::new(text, content_type);
		assert_eq!(
			process.format(&request).await.unwrap(),
			plugin.format(&request).await.unwrap(),
			"{content_type}"
		);
	}
}
