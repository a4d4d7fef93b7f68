//! Covers testable property 7: after a reload where a key was removed from
//! the env file, the process environment for that key is restored.

use hmr_runner::env_file::EnvFile;

#[test]
fn removed_key_is_unset_on_next_reload() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(".env");
    std::fs::write(&path, "PORT=8000\nDEBUG=1\n").unwrap();

    let mut env = EnvFile::new(Some(path.clone()));
    env.reload().unwrap();
    assert_eq!(std::env::var("PORT").unwrap(), "8000");
    assert_eq!(std::env::var("DEBUG").unwrap(), "1");

    std::fs::write(&path, "PORT=8001\n").unwrap();
    env.reload().unwrap();

    assert_eq!(std::env::var("PORT").unwrap(), "8001");
    assert!(std::env::var("DEBUG").is_err());
}

#[test]
fn removed_key_present_at_startup_is_restored_to_its_startup_value() {
    // SAFETY: test runs single-threaded within this process's test harness slot.
    unsafe {
        std::env::set_var("HMR_RUNNER_TEST_EXISTING_KEY", "original");
    }

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(".env");
    std::fs::write(&path, "HMR_RUNNER_TEST_EXISTING_KEY=overridden\n").unwrap();

    let mut env = EnvFile::new(Some(path.clone()));
    env.reload().unwrap();
    assert_eq!(std::env::var("HMR_RUNNER_TEST_EXISTING_KEY").unwrap(), "overridden");

    std::fs::write(&path, "").unwrap();
    env.reload().unwrap();

    assert_eq!(std::env::var("HMR_RUNNER_TEST_EXISTING_KEY").unwrap(), "original");

    // SAFETY: see above.
    unsafe {
        std::env::remove_var("HMR_RUNNER_TEST_EXISTING_KEY");
    }
}

#[test]
fn missing_env_file_is_a_missing_path_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("does-not-exist.env");
    let mut env = EnvFile::new(Some(path));
    assert!(env.reload().is_err());
}
