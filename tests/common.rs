#![allow(dead_code)]
use assert_cmd::{Command, cargo_bin_cmd};
use std::env;
use std::fs;
use std::path::PathBuf;

/// A zensession command isolated in its own configuration directory.
pub fn zs(name: &str) -> Command {
    let mut cmd = cargo_bin_cmd!("zensession");
    cmd.env("ZENSESSION_HOME", test_home(name));
    cmd.env_remove("RUST_LOG");
    cmd
}

pub fn test_home(name: &str) -> PathBuf {
    let mut path: PathBuf = env::temp_dir();
    path.push(format!("zensession_home_{name}"));
    path
}

/// Create a unique test DB path inside the system temp dir and remove any
/// existing file, plus a fresh configuration directory for `name`.
pub fn setup_test_db(name: &str) -> String {
    let mut path: PathBuf = env::temp_dir();
    path.push(format!("{name}_zensession.sqlite"));
    let db_path = path.to_string_lossy().to_string();
    fs::remove_file(&db_path).ok();
    fs::remove_dir_all(test_home(name)).ok();
    db_path
}

/// Initialize the DB and add one project owned by `alice`.
pub fn init_db_with_project(name: &str, db_path: &str) {
    zs(name)
        .args(["--db", db_path, "--test", "init"])
        .assert()
        .success();

    zs(name)
        .args(["--db", db_path, "--test", "--as", "alice", "project", "add", "Thesis"])
        .assert()
        .success();
}
