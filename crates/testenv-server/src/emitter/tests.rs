//! Unit tests for config writers and the format registry.

use std::fs;
use std::path::Path;

use rstest::{fixture, rstest};
use serde_json::{Value, json};
use tempfile::TempDir;

use super::formats::render_ini;
use super::*;

#[fixture]
fn dir() -> TempDir {
    TempDir::new().expect("temp dir")
}

fn tree(value: Value) -> ConfigTree {
    match value {
        Value::Object(map) => map,
        other => panic!("expected object, got {other}"),
    }
}

#[rstest]
fn yaml_writer_round_trips_simple_mapping(dir: TempDir) {
    let path = dir.path().join("x.yaml");
    write_yaml(&path, &tree(json!({"a": 1}))).expect("write yaml");
    let content = fs::read_to_string(&path).expect("read yaml");
    let parsed: Value = serde_saphyr::from_str(&content).expect("parse yaml");
    assert_eq!(parsed, json!({"a": 1}));
}

#[rstest]
fn json_writer_round_trips_nested_tree(dir: TempDir) {
    let source = json!({"server": {"port": 6379, "tags": ["a", "b"]}, "debug": true});
    let path = dir.path().join("settings.json");
    write_json(&path, &tree(source.clone())).expect("write json");
    let content = fs::read_to_string(&path).expect("read json");
    assert!(content.ends_with('\n'));
    let parsed: Value = serde_json::from_str(&content).expect("parse json");
    assert_eq!(parsed, source);
}

#[test]
fn ini_places_globals_before_sections() {
    let rendered = render_ini(
        Path::new("db.ini"),
        &tree(json!({
            "mysqld": {"port": 3306, "skip-networking": false},
            "user": "tester",
            "client": {"socket": "/tmp/mysql.sock"},
            "workers": 4
        })),
    )
    .expect("render ini");
    assert_eq!(
        rendered,
        "user = tester\nworkers = 4\n\n[client]\nsocket = /tmp/mysql.sock\n\n\
         [mysqld]\nport = 3306\nskip-networking = false\n"
    );
}

#[test]
fn ini_without_globals_starts_with_section() {
    let rendered = render_ini(Path::new("a.ini"), &tree(json!({"main": {"k": "v"}})))
        .expect("render ini");
    assert_eq!(rendered, "[main]\nk = v\n");
}

#[rstest]
#[case::nested_section(json!({"a": {"b": {"c": 1}}}), "a.b")]
#[case::array_in_section(json!({"a": {"list": [1, 2]}}), "a.list")]
#[case::global_null(json!({"missing": null}), "missing")]
#[case::multiline(json!({"motd": "one\ntwo"}), "motd")]
fn ini_rejects_unrepresentable_values(#[case] value: Value, #[case] expected_key: &str) {
    let error = render_ini(Path::new("bad.ini"), &tree(value)).expect_err("render must fail");
    match error {
        ConfigWriteError::Unsupported { key, .. } => assert_eq!(key, expected_key),
        other => panic!("unexpected error: {other}"),
    }
}

#[rstest]
fn ini_writer_does_not_create_file_on_failure(dir: TempDir) {
    let path = dir.path().join("bad.ini");
    assert!(write_ini(&path, &tree(json!({"a": [1]}))).is_err());
    assert!(!path.exists());
}

#[rstest]
fn writers_replace_existing_files_without_leftovers(dir: TempDir) {
    let path = dir.path().join("app.ini");
    fs::write(&path, "stale = true\n").expect("seed file");
    write_ini(&path, &tree(json!({"fresh": 1}))).expect("write ini");
    assert_eq!(fs::read_to_string(&path).expect("read"), "fresh = 1\n");
    let entries = fs::read_dir(dir.path()).expect("list dir").count();
    assert_eq!(entries, 1, "temporary file left behind");
}

#[rstest]
fn missing_directory_is_reported_with_path(dir: TempDir) {
    let path = dir.path().join("absent").join("x.json");
    let error = write_json(&path, &tree(json!({}))).expect_err("write must fail");
    match error {
        ConfigWriteError::Io { path: reported, .. } => assert_eq!(reported, path),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn registry_exposes_builtin_formats() {
    let registry = EmitterRegistry::new();
    assert_eq!(registry.formats().collect::<Vec<_>>(), ["ini", "json", "yaml"]);
    assert!(registry.contains("yaml"));
    assert!(registry.get("toml").is_none());
    assert_eq!(EmitterRegistry::empty().formats().count(), 0);
}

#[rstest]
fn registered_writers_are_invoked(dir: TempDir) {
    let mut registry = EmitterRegistry::empty();
    registry
        .register(
            "keys",
            ConfigWriter::new(|path, tree| {
                let keys: Vec<&str> = tree.keys().map(String::as_str).collect();
                fs::write(path, keys.join(",")).map_err(|source| ConfigWriteError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }),
        )
        .expect("register keys writer");
    let path = dir.path().join("out.txt");
    let writer = registry.get("keys").expect("writer registered");
    writer
        .write(&path, &tree(json!({"b": 1, "a": 2})))
        .expect("custom write");
    assert_eq!(fs::read_to_string(&path).expect("read"), "a,b");
}

#[test]
fn duplicate_registration_keeps_existing_writer() {
    let mut registry = EmitterRegistry::new();
    let error = registry
        .register("yaml", ConfigWriter::new(|_, _| Ok(())))
        .expect_err("duplicate must fail");
    assert!(matches!(
        error,
        RegistrationError::DuplicateFormat { ref format } if format == "yaml"
    ));
}
