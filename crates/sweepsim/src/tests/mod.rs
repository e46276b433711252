//! End-to-end tests for sweep projects
//!
//! - `environment` - setup, run, rerun detection and failure handling
//! - `cleanup` - which artifacts survive a cleanup

mod cleanup;

use std::fs;
use std::path::{Path, PathBuf};

pub(crate) const TEMPERATURE_CONFIG: &str = r#"
[system]
name = "test"

[parameters.temperature]
start = 0.1
end = 10.0
steps = 3
log_scale = false
"#;

pub(crate) fn write_config(dir: &Path, name: &str, text: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, text).unwrap();
    path
}

pub(crate) fn files_in(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
