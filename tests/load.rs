use std::collections::BTreeMap;
use std::path::Path;

use strictenv::{
    EnvLoader, EnvMap, Error, KeyValidators, ParseError, ResolutionMode, Rule, TargetEnv,
    ValidationError,
};
use tempfile::TempDir;

#[test]
fn load_applies_entries_to_memory_target() {
    let dir = TempDir::new().expect("failed to create temp dir");
    let file = dir.path().join(".env");
    write_file(&file, "HOST=localhost\nURL=http://${HOST}\nOPT= # $optional\n");

    let mut loader = EnvLoader::new().path(&file).target(TargetEnv::memory());
    let loaded = loader.load().expect("load should succeed");

    assert_eq!(loaded.report.files_read, 1);
    assert_eq!(loaded.report.loaded, 2);
    assert_eq!(loaded.report.skipped_absent, 1);
    assert_eq!(loaded.files, vec![file.clone()]);
    assert_eq!(loaded.env.get_str("URL"), Some("http://localhost"));
    assert_eq!(
        loaded.env.entry("URL").and_then(|entry| entry.source.clone()),
        Some(file)
    );

    let map = loader.target_env().as_memory().expect("memory target");
    assert_eq!(map.get("URL").map(String::as_str), Some("http://localhost"));
    assert!(!map.contains_key("OPT"), "absent values must not be written");
}

#[test]
fn override_existing_false_skips_existing_values() {
    let dir = TempDir::new().expect("failed to create temp dir");
    let file = dir.path().join(".env");
    write_file(&file, "A=from_file\nB=2\n");

    let mut initial = BTreeMap::new();
    initial.insert("A".to_string(), "existing".to_string());

    let mut loader = EnvLoader::new()
        .path(&file)
        .target(TargetEnv::from_memory(initial))
        .override_existing(false);

    let loaded = loader.load().expect("load should succeed");
    assert_eq!(loaded.report.loaded, 1);
    assert_eq!(loaded.report.skipped_existing, 1);

    let map = loader.target_env().as_memory().expect("memory target");
    assert_eq!(map.get("A").expect("A should exist"), "existing");
    assert_eq!(map.get("B").expect("B should exist"), "2");
}

#[test]
fn override_existing_defaults_to_file_values() {
    let dir = TempDir::new().expect("failed to create temp dir");
    let file = dir.path().join(".env");
    write_file(&file, "A=from_file\n");

    let mut initial = BTreeMap::new();
    initial.insert("A".to_string(), "existing".to_string());

    let mut loader = EnvLoader::new()
        .path(&file)
        .target(TargetEnv::from_memory(initial));
    loader.load().expect("load should succeed");

    let map = loader.target_env().as_memory().expect("memory target");
    assert_eq!(map.get("A").expect("A should exist"), "from_file");
}

#[test]
fn multi_file_load_uses_last_file_precedence() {
    let dir = TempDir::new().expect("failed to create temp dir");
    let first = dir.path().join(".env.base");
    let second = dir.path().join(".env.local");
    write_file(&first, "A=base\nB=base\n");
    write_file(&second, "B=local\nC=local\n");

    let mut loader = EnvLoader::new().paths([&first, &second]);
    let loaded = loader.load().expect("load should succeed");

    assert_eq!(loaded.report.files_read, 2);
    assert_eq!(loaded.report.loaded, 3);

    let map = loader.target_env().as_memory().expect("memory target");
    assert_eq!(map.get("A").expect("A should exist"), "base");
    assert_eq!(map.get("B").expect("B should exist"), "local");
    assert_eq!(map.get("C").expect("C should exist"), "local");
    assert_eq!(
        loaded.env.entry("B").and_then(|entry| entry.source.clone()),
        Some(second)
    );
}

#[test]
fn later_files_win_in_both_resolution_modes() {
    let dir = TempDir::new().expect("failed to create temp dir");
    let first = dir.path().join(".env.base");
    let second = dir.path().join(".env.local");
    write_file(&first, "A=base\nB=${A}-b\n");
    write_file(&second, "A=local\nC=${A}-c\n");

    for mode in [ResolutionMode::Graph, ResolutionMode::Deferred] {
        let mut loader = EnvLoader::new()
            .paths([&first, &second])
            .resolution_mode(mode);
        loader.load().expect("load should succeed");

        // References resolve within their own file before files are merged.
        let map = loader.target_env().as_memory().expect("memory target");
        assert_eq!(map.get("A").map(String::as_str), Some("local"), "{mode:?}");
        assert_eq!(map.get("B").map(String::as_str), Some("base-b"), "{mode:?}");
        assert_eq!(map.get("C").map(String::as_str), Some("local-c"), "{mode:?}");
    }
}

#[test]
fn failing_file_leaves_target_untouched() {
    let dir = TempDir::new().expect("failed to create temp dir");
    let good = dir.path().join(".env.good");
    let bad = dir.path().join(".env.bad");
    write_file(&good, "A=1\n");
    write_file(&bad, "B=${MISSING}\n");

    let mut loader = EnvLoader::new().paths([&good, &bad]);
    let err = loader.load().expect_err("expected parse error");

    match &err {
        Error::ParseFile { path, source } => {
            assert_eq!(path, &bad);
            assert_eq!(
                source,
                &ParseError::InvalidReference {
                    reference: "MISSING".to_owned(),
                    line: 1
                }
            );
        }
        other => panic!("unexpected error: {other:?}"),
    }
    let map = loader.target_env().as_memory().expect("memory target");
    assert!(map.is_empty(), "nothing should be applied: {map:?}");
}

#[test]
fn missing_file_returns_io_error() {
    let dir = TempDir::new().expect("failed to create temp dir");

    let mut loader = EnvLoader::new().path(dir.path().join("missing.env"));
    let err = loader.load().expect_err("expected I/O error");

    match err {
        Error::Io(_) => {}
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn missing_file_is_skipped_when_not_required() {
    let dir = TempDir::new().expect("failed to create temp dir");
    let real = dir.path().join(".env.real");
    write_file(&real, "A=1\n");

    let mut loader = EnvLoader::new()
        .paths([dir.path().join("missing.env"), real])
        .required(false);
    let loaded = loader.load().expect("load should succeed");

    assert_eq!(loaded.report.files_read, 1);
    assert_eq!(loaded.env.get_str("A"), Some("1"));
}

#[test]
fn discovery_picks_first_accepted_file() {
    let dir = TempDir::new().expect("failed to create temp dir");
    write_file(&dir.path().join(".env"), "SOURCE=default\n");
    write_file(&dir.path().join(".env.test"), "SOURCE=test\n");

    let env = EnvLoader::new()
        .dir(dir.path())
        .parse_only()
        .expect("parse should succeed");
    assert_eq!(env.get_str("SOURCE"), Some("test"));
}

#[test]
fn discovery_without_files_is_fatal() {
    let dir = TempDir::new().expect("failed to create temp dir");

    let err = EnvLoader::new()
        .dir(dir.path())
        .parse_only()
        .expect_err("expected missing file error");
    match err {
        Error::NoEnvFile { dir: searched, tried } => {
            assert_eq!(searched, dir.path());
            assert_eq!(tried.last().map(String::as_str), Some(".env"));
        }
        other => panic!("unexpected error: {other:?}"),
    }

    let env = EnvLoader::new()
        .dir(dir.path())
        .required(false)
        .parse_only()
        .expect("optional discovery should succeed");
    assert!(env.is_empty());
}

#[test]
fn malformed_file_returns_parse_error() {
    let dir = TempDir::new().expect("failed to create temp dir");
    let file = dir.path().join(".env");
    write_file(&file, "A=ok\nBAD LINE\n");

    let mut loader = EnvLoader::new().path(&file);
    let err = loader.load().expect_err("expected parse error");

    assert_eq!(
        err.as_parse_error(),
        Some(&ParseError::MissingSeparator { line: 2 })
    );
}

#[test]
fn validation_failure_prevents_apply() {
    let dir = TempDir::new().expect("failed to create temp dir");
    let file = dir.path().join(".env");
    write_file(&file, "PORT=eighty\nMODE=dev\n");

    let mut loader = EnvLoader::new().path(&file).validator(
        KeyValidators::new()
            .with("MODE", Rule::required().one_of(["dev", "prod"]))
            .with("PORT", Rule::required().integer()),
    );
    let err = loader.load().expect_err("expected validation error");

    match err {
        Error::Validation(ValidationError::Key { key, message }) => {
            assert_eq!(key, "PORT");
            assert_eq!(message, "must be an integer");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    let map = loader.target_env().as_memory().expect("memory target");
    assert!(map.is_empty());

    // The resolved mapping is still available for diagnostics.
    let env = loader.parse_only().expect("parse should succeed");
    assert_eq!(env.get_str("PORT"), Some("eighty"));
}

#[test]
fn schema_validator_sees_merged_mapping() {
    let dir = TempDir::new().expect("failed to create temp dir");
    let first = dir.path().join(".env.base");
    let second = dir.path().join(".env.local");
    write_file(&first, "USER=app\n");
    write_file(&second, "PASSWORD=secret\n");

    let schema = |env: &EnvMap| {
        if env.contains_key("USER") && env.contains_key("PASSWORD") {
            Ok(())
        } else {
            Err(ValidationError::Rejected("credentials are incomplete".to_owned()))
        }
    };
    let mut loader = EnvLoader::new().paths([first, second]).validator(schema);
    let loaded = loader.load().expect("load should succeed");
    assert_eq!(loaded.report.loaded, 2);
}

#[test]
fn latin1_encoding_decodes_high_bytes() {
    let dir = TempDir::new().expect("failed to create temp dir");
    let file = dir.path().join(".env");
    std::fs::write(&file, b"CITY=Z\xfcrich\n").expect("failed to write test file");

    let env = EnvLoader::new()
        .path(&file)
        .encoding(strictenv::Encoding::Latin1)
        .parse_only()
        .expect("parse should succeed");
    assert_eq!(env.get_str("CITY"), Some("Zürich"));

    let err = EnvLoader::new()
        .path(&file)
        .parse_only()
        .expect_err("expected UTF-8 error");
    assert!(matches!(err, Error::InvalidEncoding(_)), "unexpected error: {err:?}");
}

fn write_file(path: &Path, content: &str) {
    std::fs::write(path, content).expect("failed to write test file");
}
