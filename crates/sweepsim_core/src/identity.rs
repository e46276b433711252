//! Configuration identity
//!
//! A sweep is identified by a short digest of its canonicalized configuration
//! plus the project name. The digest names every artifact of the sweep and lets
//! a later run detect that the same sweep has already been persisted.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Number of hex characters kept from the digest
pub const HASH_LEN: usize = 8;

/// Fixed-width hex fingerprint of a sweep configuration
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigHash(String);

impl ConfigHash {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConfigHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ConfigHash {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Serialize `value` as compact JSON with object keys sorted at every level.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (key, value)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(value, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Digest of the canonical configuration followed by the project name.
pub fn compute_hash(config: &Value, project_name: &str) -> ConfigHash {
    let mut hasher = Sha256::new();
    hasher.update(canonical_json(config).as_bytes());
    hasher.update(project_name.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    ConfigHash(digest[..HASH_LEN].to_string())
}

/// Whether `path` names an artifact of the sweep identified by `hash`.
///
/// Artifacts are named `<timestamp>_<hash>.<ext>`; only the last `_`-separated
/// token of the stem is compared, and it must match exactly.
pub fn carries_hash(path: &Path, hash: &ConfigHash) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    let stem = name.split('.').next().unwrap_or(name);
    stem.rsplit('_').next() == Some(hash.as_str())
}

/// Whether `data_dir` already holds a data file for `hash`.
///
/// A missing directory counts as "no artifact".
pub fn exists(data_dir: &Path, hash: &ConfigHash, extensions: &[&str]) -> io::Result<bool> {
    Ok(find_existing(data_dir, hash, extensions)?.is_some())
}

/// First file in `data_dir` carrying `hash` with one of `extensions`
///
/// Files with any other extension, such as staging leftovers, are ignored.
pub fn find_existing(
    data_dir: &Path,
    hash: &ConfigHash,
    extensions: &[&str],
) -> io::Result<Option<PathBuf>> {
    if !data_dir.exists() {
        return Ok(None);
    }
    for entry in fs::read_dir(data_dir)? {
        let path = entry?.path();
        let known = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| extensions.contains(&ext));
        if known && path.is_file() && carries_hash(&path, hash) {
            return Ok(Some(path));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn test_canonical_json_sorts_keys() {
        let value = json!({"b": 1, "a": {"z": [1, {"y": 2, "x": 1}], "c": "s"}});
        assert_eq!(
            canonical_json(&value),
            r#"{"a":{"c":"s","z":[1,{"x":1,"y":2}]},"b":1}"#
        );
    }

    #[test]
    fn test_hash_is_fixed_width_hex() {
        let hash = compute_hash(&json!({"system": {}}), "proj");
        assert_eq!(hash.as_str().len(), HASH_LEN);
        assert!(hash.as_str().chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_hash_ignores_insertion_order() {
        let mut first = serde_json::Map::new();
        first.insert("system".to_string(), json!({"name": "test", "seed": 1}));
        first.insert("parameters".to_string(), json!({"t": {"start": 0.1, "end": 1.0, "steps": 3}}));

        let mut second = serde_json::Map::new();
        second.insert("parameters".to_string(), json!({"t": {"steps": 3, "end": 1.0, "start": 0.1}}));
        second.insert("system".to_string(), json!({"seed": 1, "name": "test"}));

        assert_eq!(
            compute_hash(&Value::Object(first), "proj"),
            compute_hash(&Value::Object(second), "proj")
        );
    }

    #[test]
    fn test_hash_changes_with_content_and_project() {
        let base = compute_hash(&json!({"system": {"name": "test"}}), "proj");
        assert_ne!(base, compute_hash(&json!({"system": {"name": "other"}}), "proj"));
        assert_ne!(base, compute_hash(&json!({"system": {"name": "test"}}), "proj2"));
    }

    #[test]
    fn test_hash_is_stable() {
        let a = compute_hash(&json!({"system": {}}), "p");
        let b = compute_hash(&json!({"system": {}}), "p");
        assert_eq!(a, b);
    }

    #[test]
    fn test_carries_hash_exact_token() {
        let hash = compute_hash(&json!({"system": {}}), "p");
        let name = format!("20250101_120000_{hash}.sweep");
        assert!(carries_hash(Path::new(&name), &hash));

        let longer = format!("20250101_120000_{hash}ff.sweep");
        assert!(!carries_hash(Path::new(&longer), &hash));

        let prefixed = format!("20250101_120000_x{hash}.sweep");
        assert!(!carries_hash(Path::new(&prefixed), &hash));

        let rotated = format!("20250101_120000_{hash}.log.1");
        assert!(carries_hash(Path::new(&rotated), &hash));
    }

    const EXTS: &[&str] = &["sweep", "json"];

    #[test]
    fn test_exists() {
        let dir = tempdir().unwrap();
        let hash = compute_hash(&json!({"system": {}}), "p");

        assert!(!exists(&dir.path().join("missing"), &hash, EXTS).unwrap());
        assert!(!exists(dir.path(), &hash, EXTS).unwrap());

        fs::write(dir.path().join(format!("20250101_000000_{hash}.sweep")), b"x").unwrap();
        assert!(exists(dir.path(), &hash, EXTS).unwrap());

        let staged = compute_hash(&json!({"system": {"b": 2}}), "p");
        for leftover in [".sweep.partial", ".tmp"] {
            let name = format!("20250101_000000_{staged}{leftover}");
            fs::write(dir.path().join(name), b"x").unwrap();
        }
        assert!(!exists(dir.path(), &staged, EXTS).unwrap());

        let other = compute_hash(&json!({"system": {"a": 1}}), "p");
        assert!(!exists(dir.path(), &other, EXTS).unwrap());
    }
}
