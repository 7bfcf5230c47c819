//! Registry loading, merging and rendering against real files.

use std::fs;
use std::path::{Path, PathBuf};

use cms_config::{ConfigError, Registry, Value};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

#[test]
fn test_from_file_uses_the_extension() {
    for name in ["test.yaml", "test.json", "test.php", "test.xml"] {
        let registry = Registry::from_file(fixture(name)).unwrap();
        assert_eq!(registry.count(), 2, "{name}");
        assert_eq!(registry.get_int("app.list_limit"), Some(25), "{name}");
        assert_eq!(registry.get_str("app.editor"), Some("ckeditor"), "{name}");
        assert_eq!(registry.get_int("seo.sef"), Some(1), "{name}");
    }

    let registry = Registry::from_file(fixture("test.ini")).unwrap();
    assert_eq!(registry.get_str("app.list_limit"), Some("25"));
    assert_eq!(
        registry.get_str("app.helpurl"),
        Some("English (GB) - HUBzero help")
    );
}

#[test]
fn test_all_fixtures_hold_the_same_leaves() {
    let reference: Vec<(String, String)> = Registry::from_file(fixture("test.ini"))
        .unwrap()
        .flatten()
        .into_iter()
        .map(|(path, value)| (path, value.to_text()))
        .collect();

    for name in ["test.yaml", "test.json", "test.php", "test.xml"] {
        let flat: Vec<(String, String)> = Registry::from_file(fixture(name))
            .unwrap()
            .flatten()
            .into_iter()
            .map(|(path, value)| (path, value.to_text()))
            .collect();
        assert_eq!(flat, reference, "{name}");
    }
}

#[test]
fn test_read_detects_content_without_known_extension() {
    // site.conf holds JSON
    let registry = Registry::from_file(fixture("site.conf")).unwrap();
    assert_eq!(registry.get_int("app.debug"), Some(1));
}

#[test]
fn test_read_with_explicit_format() {
    let mut registry = Registry::new();
    registry.read(fixture("site.conf"), Some("json")).unwrap();
    assert_eq!(registry.get_str("app.feed_email"), Some("author"));

    let err = registry.read(fixture("site.conf"), Some("yaml")).unwrap_err();
    assert!(err.is_parse());

    let err = registry.read(fixture("site.conf"), Some("toml")).unwrap_err();
    assert!(matches!(err, ConfigError::UnknownProcessor(_)));
}

#[test]
fn test_read_errors() {
    let dir = TempDir::new().unwrap();

    let err = Registry::from_file(dir.path().join("missing.yaml")).unwrap_err();
    assert!(matches!(err, ConfigError::FileRead { .. }));

    let unknown = dir.path().join("notes.txt");
    fs::write(&unknown, "just some words\n").unwrap();
    let err = Registry::from_file(&unknown).unwrap_err();
    assert!(matches!(err, ConfigError::UndetectedFormat(_)));
    assert!(err.to_string().contains("notes.txt"));

    let broken = dir.path().join("broken.php");
    fs::write(&broken, "<?php\nreturn array(\n    'a' => foo(),\n);\n").unwrap();
    let err = Registry::from_file(&broken).unwrap_err();
    assert!(err.to_string().contains("broken.php"));
    assert_eq!(err.location().map(|l| l.line), Some(3));
}

#[test]
fn test_reads_merge_into_the_root() {
    let dir = TempDir::new().unwrap();
    let local = dir.path().join("local.ini");
    fs::write(&local, "[mail]\nhost = smtp.example.org\n").unwrap();

    let mut registry = Registry::from_file(fixture("test.yaml")).unwrap();
    registry.read(&local, None).unwrap();

    assert_eq!(registry.count(), 3);
    assert_eq!(registry.get_str("mail.host"), Some("smtp.example.org"));
    assert_eq!(registry.get_int("app.debug"), Some(1));
}

#[test]
fn test_recursive_merge_of_files() {
    let dir = TempDir::new().unwrap();
    let local = dir.path().join("local.json");
    fs::write(&local, r#"{"app": {"debug": 0, "editor": "none"}}"#).unwrap();

    let mut shallow = Registry::from_file(fixture("test.php")).unwrap();
    shallow.merge(Registry::from_file(&local).unwrap(), false).unwrap();
    assert_eq!(shallow.get_int("app.debug"), Some(0));
    assert!(!shallow.has("app.list_limit"));

    let mut deep = Registry::from_file(fixture("test.php")).unwrap();
    deep.merge(Registry::from_file(&local).unwrap(), true).unwrap();
    assert_eq!(deep.get_int("app.debug"), Some(0));
    assert_eq!(deep.get_str("app.editor"), Some("none"));
    assert_eq!(deep.get_int("app.list_limit"), Some(25));
    assert_eq!(deep.get_int("seo.sef"), Some(1));
}

#[test]
fn test_extract_section() {
    let registry = Registry::from_file(fixture("test.xml")).unwrap();
    let seo = registry.extract("seo").unwrap();
    assert_eq!(seo.count(), 6);
    assert_eq!(seo["unicodeslugs"], Value::Int(0));
    assert!(registry.extract("app.debug").is_none());
}

#[test]
fn test_render_and_reload() {
    let dir = TempDir::new().unwrap();
    let registry = Registry::from_file(fixture("test.json")).unwrap();

    for name in ["yaml", "php", "xml", "json"] {
        let path = dir.path().join(format!("out.{name}"));
        fs::write(&path, registry.to_format(name).unwrap()).unwrap();
        assert_eq!(Registry::from_file(&path).unwrap(), registry, "{name}");
    }
}

#[test]
fn test_yaml_rendering_is_stable() {
    let registry = Registry::from_file(fixture("test.php")).unwrap();
    let expected = fs::read_to_string(fixture("test.yaml")).unwrap();
    assert_eq!(registry.to_format("yaml").unwrap(), expected);
}
