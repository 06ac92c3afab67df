//! Rendering templates from directories on disk

use std::fs;
use std::path::{Path, PathBuf};

use dyninclude::{Context, Engine, EngineConfig, FileSystemLoader};
use pretty_assertions::assert_eq;

fn fixtures() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

#[test]
fn test_render_fixture_page() {
    let engine = Engine::new(FileSystemLoader::new([fixtures().join("templates")]));
    let mut ctx = Context::from_file(&fixtures().join("context.toml")).expect("Should load context");

    let out = engine.render("page.html", &mut ctx).unwrap();
    assert_eq!(
        out,
        "<h1>Front Page</h1>\n\
         <article class=\"news\">Rust &amp; templates</article>\n\n\
         <article>Video</article>\n\n\
         <footer>end</footer>\n\n"
    );
}

#[test]
fn test_engine_from_config_file() {
    let mut config = EngineConfig::from_file(&fixtures().join("engine.toml")).unwrap();
    assert_eq!(config.max_include_depth, 8);
    // Directories in the file are relative to the fixtures directory
    config.dirs = config.dirs.iter().map(|d| fixtures().join(d)).collect();

    let engine = Engine::from_config(config);
    let mut ctx = Context::from_toml_str("[item]\nkind = \"photo\"").unwrap();
    let out = engine.render("cards/default.html", &mut ctx).unwrap();
    assert_eq!(out, "<article>Photo</article>\n");
}

#[test]
fn test_earlier_directory_overrides_later() {
    let overrides = tempfile::tempdir().unwrap();
    fs::create_dir_all(overrides.path().join("cards")).unwrap();
    fs::write(overrides.path().join("cards/news.html"), "override: {{ item.headline }}").unwrap();

    let engine = Engine::new(FileSystemLoader::new([
        overrides.path().to_path_buf(),
        fixtures().join("templates"),
    ]));
    let mut ctx = Context::from_file(&fixtures().join("context.toml")).unwrap();
    let out = engine.render("page.html", &mut ctx).unwrap();
    assert!(out.contains("override: Rust &amp; templates"), "got {}", out);
    assert!(out.contains("<article>Video</article>"));
}

#[test]
fn test_dynamic_name_cannot_escape_directories() {
    let root = tempfile::tempdir().unwrap();
    let templates = root.path().join("templates");
    fs::create_dir_all(&templates).unwrap();
    fs::write(root.path().join("secret.html"), "secret").unwrap();
    fs::write(templates.join("safe.html"), "safe").unwrap();
    fs::write(
        templates.join("page.html"),
        r#"{% include_ "{{ name }}.html" fallback "safe.html" %}"#,
    )
    .unwrap();

    let engine = Engine::new(FileSystemLoader::new([templates]));
    let mut ctx = Context::new().with("name", "../secret");
    assert_eq!(engine.render("page.html", &mut ctx).unwrap(), "safe");
}
