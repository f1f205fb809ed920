#![allow(missing_docs)]

use std::fs;

use penumbra::config::DEFAULT_CONFIG_FILE;
use penumbra::query::plan_cache::PlanCache;
use penumbra::{ExecError, ExecOptions, Result};
use tempfile::TempDir;

#[test]
fn options_load_from_a_file() -> Result<()> {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join(DEFAULT_CONFIG_FILE);
    fs::write(
        &path,
        "enable_optimizer = false\nparallel_traversal_threads = 4\nnull_marker = \"NULL\"\nplan_cache_capacity = 2\n",
    )
    .expect("write config");
    let options = ExecOptions::load(&path)?;
    assert!(!options.enable_optimizer);
    assert_eq!(options.parallel_traversal_threads, 4);
    assert_eq!(options.null_marker, "NULL");
    assert!(options.path_unique);
    assert_eq!(PlanCache::<String>::from_options(&options).capacity(), 2);
    Ok(())
}

#[test]
fn options_survive_a_toml_round_trip() -> Result<()> {
    let options = ExecOptions {
        profile: true,
        custom_function_prefix: "ext.".to_string(),
        ..ExecOptions::default()
    };
    let text = options.to_toml_string()?;
    assert_eq!(ExecOptions::from_toml_str(&text)?, options);
    Ok(())
}

#[test]
fn missing_file_names_the_path() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("absent.toml");
    match ExecOptions::load(&path) {
        Err(ExecError::Config { path: reported, .. }) => assert_eq!(reported, path),
        other => panic!("expected a config error, got {other:?}"),
    }
}

#[test]
fn wrong_types_are_config_errors() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("exec.toml");
    fs::write(&path, "enable_optimizer = \"sometimes\"\n").expect("write config");
    let err = ExecOptions::load(&path).err();
    assert_eq!(err.map(|e| e.code()), Some("CONFIG_ERROR"));
    assert!(ExecOptions::from_toml_str("plan_cache_capacity = -1").is_err());
}
