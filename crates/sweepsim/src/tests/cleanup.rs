use std::fs;

use sweepsim_core::{BoxError, ParameterSet};
use tempfile::{TempDir, tempdir};

use super::{TEMPERATURE_CONFIG, files_in, write_config};
use crate::{LogConfig, RunOptions, SimulationEnvironment, SweepContext, SweepState};

const STALE: &str = "20200101_000000_deadbeef";
const ARCHIVED: &str = "20200101_000000_cafebabe";

/// A project after one completed run, plus artifacts of two older sweeps:
/// one whose data is gone and one whose data is still present.
fn populated_project() -> (TempDir, SimulationEnvironment<f64>, String) {
    let dir = tempdir().unwrap();
    let config = write_config(dir.path(), "sweep.toml", TEMPERATURE_CONFIG);

    let mut env = SimulationEnvironment::new("tidy", dir.path()).unwrap();
    env.setup(&config, LogConfig::default()).unwrap();
    env.load(|p: &ParameterSet| -> Result<f64, BoxError> { Ok(p.get_f64("temperature").unwrap_or(0.0)) })
        .unwrap();
    env.run(&RunOptions::default()).unwrap();
    let stem = env.artifact_stem().unwrap();

    let dirs = env.dirs().clone();
    fs::write(dirs.config.join(format!("{STALE}.toml")), "[system]\n").unwrap();
    fs::write(dirs.logs.join(format!("{STALE}.log")), "old\n").unwrap();
    fs::write(dirs.data.join(format!("{ARCHIVED}.sweep")), b"SWEEPDAT").unwrap();
    fs::write(dirs.config.join(format!("{ARCHIVED}.toml")), "[system]\n").unwrap();
    fs::write(dirs.logs.join(format!("{ARCHIVED}.log")), "kept\n").unwrap();
    fs::write(dirs.data.join("notes.txt"), "lab notes").unwrap();
    fs::write(dirs.tmp.join("scratch.bin"), b"\x00\x01").unwrap();
    fs::create_dir_all(dirs.tmp.join("nested")).unwrap();

    (dir, env, stem)
}

fn names(stems: &[&str], ext: &str) -> Vec<String> {
    let mut names: Vec<String> = stems.iter().map(|s| format!("{s}.{ext}")).collect();
    names.sort();
    names
}

#[test]
fn test_cleanup_keeping_everything() {
    let (_dir, mut env, stem) = populated_project();
    env.cleanup(true, true).unwrap();
    let dirs = env.dirs().clone();

    assert!(files_in(&dirs.tmp).is_empty());
    let mut data = names(&[ARCHIVED, &stem], "sweep");
    data.push("notes.txt".to_string());
    data.sort();
    assert_eq!(files_in(&dirs.data), data);
    assert_eq!(files_in(&dirs.config), names(&[ARCHIVED, &stem], "toml"));
    assert_eq!(files_in(&dirs.logs), names(&[ARCHIVED, &stem], "log"));
    assert_eq!(env.state(), SweepState::Cleaned);
}

#[test]
fn test_cleanup_purging_data() {
    let (_dir, mut env, stem) = populated_project();
    env.cleanup(false, true).unwrap();
    let dirs = env.dirs().clone();

    assert!(files_in(&dirs.data).is_empty());
    assert_eq!(files_in(&dirs.config), names(&[&stem], "toml"));
    assert_eq!(files_in(&dirs.logs), names(&[&stem], "log"));
}

#[test]
fn test_cleanup_purging_logs() {
    let (_dir, mut env, stem) = populated_project();
    env.cleanup(true, false).unwrap();
    let dirs = env.dirs().clone();

    assert!(files_in(&dirs.logs).is_empty());
    assert_eq!(files_in(&dirs.config), names(&[ARCHIVED, &stem], "toml"));
}

#[test]
fn test_cleanup_purging_everything() {
    let (_dir, mut env, stem) = populated_project();
    env.cleanup(false, false).unwrap();
    let dirs = env.dirs().clone();

    assert!(files_in(&dirs.tmp).is_empty());
    assert!(files_in(&dirs.data).is_empty());
    assert!(files_in(&dirs.logs).is_empty());
    assert_eq!(files_in(&dirs.config), names(&[&stem], "toml"));
    assert!(dirs.svg.is_dir());
}

#[test]
fn test_cleanup_without_configuration() {
    let (dir, env, stem) = populated_project();
    drop(env);

    // A bare environment retains only artifacts referenced by data files
    let mut bare = SimulationEnvironment::<f64>::new("tidy", dir.path()).unwrap();
    bare.cleanup(true, true).unwrap();
    let dirs = bare.dirs().clone();

    assert_eq!(files_in(&dirs.config), names(&[ARCHIVED, &stem], "toml"));
    assert_eq!(files_in(&dirs.logs), names(&[ARCHIVED, &stem], "log"));
}
