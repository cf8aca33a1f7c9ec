//! Configuration loading and environment override tests

use pretty_assertions::assert_eq;
use rstest::rstest;
use serial_test::serial;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use synthflow_config::{ConfigError, ConfigLoader, SourceRole, VariantName, CONFIG_FILE_NAME};
use tempfile::TempDir;

fn create_config_file(dir: &Path, content: &str) -> PathBuf {
    let config_path = dir.join(CONFIG_FILE_NAME);
    fs::write(&config_path, content).unwrap();
    config_path
}

const TWO_TARGETS: &str = r#"
[project]
name = "qa-platform"

[[target]]
name = "bdx"
workspace = "build/bdx"
seed = 1

[target.sources]
rtl = ["hw/top.v"]
constraints = ["hw/clocks.sdc"]

[[target]]
name = "skx"
variant = "skx"
workspace = "build/skx"
"#;

// ============================================================================
// Config Loading Tests
// ============================================================================

#[test]
#[serial]
fn test_load_from_subdirectory_finds_parent() {
    let temp_dir = TempDir::new().unwrap();
    create_config_file(temp_dir.path(), TWO_TARGETS);

    let sub = temp_dir.path().join("hw/rtl");
    fs::create_dir_all(&sub).unwrap();

    let config = ConfigLoader::new()
        .without_env()
        .load_from_directory(&sub)
        .unwrap();

    assert_eq!(config.project.project.name, "qa-platform");
    assert_eq!(config.project_root, temp_dir.path());
    assert_eq!(config.project.target_names(), vec!["bdx", "skx"]);
    assert_eq!(config.project.targets[1].variant, VariantName::Skx);
}

#[test]
fn test_load_without_config_is_not_found() {
    let temp_dir = TempDir::new().unwrap();
    let result = ConfigLoader::new()
        .without_env()
        .load_from_directory(temp_dir.path());
    assert!(matches!(result, Err(ConfigError::NotFound(_))));
}

#[test]
fn test_invalid_toml_reports_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = create_config_file(temp_dir.path(), "[project\nname = 1");

    let err = ConfigLoader::new().without_env().load_from_file(&path).unwrap_err();
    match err {
        ConfigError::TomlParseError { file, .. } => assert_eq!(file, path),
        other => panic!("expected TomlParseError, got {:?}", other),
    }
}

#[rstest]
#[case("rtl", 1)]
#[case("constraints", 1)]
#[case("vhdl", 0)]
fn test_source_lists_by_role(#[case] key: &str, #[case] expected: usize) {
    let temp_dir = TempDir::new().unwrap();
    let path = create_config_file(temp_dir.path(), TWO_TARGETS);
    let config = ConfigLoader::new().without_env().load_from_file(&path).unwrap();

    let role: SourceRole = *SourceRole::ALL.iter().find(|r| r.key() == key).unwrap();
    let target = config.project.target("bdx").unwrap();
    assert_eq!(target.sources.paths(role).len(), expected);
}

// ============================================================================
// Environment Override Tests
// ============================================================================

#[test]
#[serial]
fn test_env_overrides_seed_and_flash_tool() {
    let temp_dir = TempDir::new().unwrap();
    let path = create_config_file(temp_dir.path(), TWO_TARGETS);

    env::set_var("SYNTHFLOW_SEED", "42");
    env::set_var("SYNTHFLOW_FLASH_TOOL", "quartus_pgm");
    let result = ConfigLoader::new().load_from_file(&path);
    env::remove_var("SYNTHFLOW_SEED");
    env::remove_var("SYNTHFLOW_FLASH_TOOL");

    let config = result.unwrap();
    for target in &config.project.targets {
        assert_eq!(target.seed, Some(42));
        assert_eq!(target.flash_tool(), "quartus_pgm");
    }
}

#[test]
#[serial]
fn test_env_override_rejects_bad_seed() {
    let temp_dir = TempDir::new().unwrap();
    let path = create_config_file(temp_dir.path(), TWO_TARGETS);

    env::set_var("SYNTHFLOW_SEED", "not-a-number");
    let result = ConfigLoader::new().load_from_file(&path);
    env::remove_var("SYNTHFLOW_SEED");

    assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
}

#[test]
#[serial]
fn test_without_env_ignores_overrides() {
    let temp_dir = TempDir::new().unwrap();
    let path = create_config_file(temp_dir.path(), TWO_TARGETS);

    env::set_var("SYNTHFLOW_SEED", "42");
    let result = ConfigLoader::new().without_env().load_from_file(&path);
    env::remove_var("SYNTHFLOW_SEED");

    let config = result.unwrap();
    assert_eq!(config.project.target("bdx").unwrap().seed, Some(1));
    assert_eq!(config.project.target("skx").unwrap().seed, None);
}
