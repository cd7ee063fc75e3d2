//! Tests for root folder resolution
//!
//! Env-var tests are serialized because they mutate process state.

use awm_common::config::{prepare_root_folder, resolve_root_folder, DATABASE_FILE};
use serial_test::serial;
use std::path::PathBuf;

const TEST_ENV_VAR: &str = "AWM_TEST_ROOT_FOLDER";

#[test]
#[serial]
fn test_cli_arg_takes_priority() {
    std::env::set_var(TEST_ENV_VAR, "/from/env");

    let resolved = resolve_root_folder(Some("/from/cli"), TEST_ENV_VAR);
    assert_eq!(resolved, PathBuf::from("/from/cli"));

    std::env::remove_var(TEST_ENV_VAR);
}

#[test]
#[serial]
fn test_env_var_used_without_cli_arg() {
    std::env::set_var(TEST_ENV_VAR, "/from/env");

    let resolved = resolve_root_folder(None, TEST_ENV_VAR);
    assert_eq!(resolved, PathBuf::from("/from/env"));

    std::env::remove_var(TEST_ENV_VAR);
}

#[test]
#[serial]
fn test_fallback_when_nothing_configured() {
    std::env::remove_var(TEST_ENV_VAR);

    // Falls through to the config file or OS default; either way a
    // non-empty path comes back.
    let resolved = resolve_root_folder(None, TEST_ENV_VAR);
    assert!(!resolved.as_os_str().is_empty());
}

#[test]
fn test_prepare_root_folder_creates_directory() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("nested").join("awm");

    let db_path = prepare_root_folder(&root).unwrap();

    assert!(root.exists());
    assert_eq!(db_path, root.join(DATABASE_FILE));
}
