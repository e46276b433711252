//! Persisted result containers
//!
//! Binary layout of a `.sweep` file:
//!
//! ```text
//! b"SWEEPDAT" | version: u8 | compressed: u8 | payload
//! ```
//!
//! The payload is the bincode encoding of `{ attrs, data }`, zstd-compressed
//! when the compressed flag is set. Every attribute is the JSON encoding of one
//! top-level metadata value. A `.json` file holds the same container as JSON.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sweepsim_core::BoxError;
use tracing::debug;

use super::fs::atomic_write_bytes;
use crate::error::{EnvironmentError, Result};

pub const MAGIC: &[u8; 8] = b"SWEEPDAT";
pub const FORMAT_VERSION: u8 = 1;
const HEADER_LEN: usize = MAGIC.len() + 2;

/// Metadata attached to a result container
pub type Metadata = Map<String, Value>;

/// Compression applied to large payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataCompression {
    None,
    Zstd { level: i32 },
}

impl Default for DataCompression {
    fn default() -> Self {
        DataCompression::Zstd { level: 3 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataOptions {
    pub compression: DataCompression,
    /// Payloads above this many bytes are compressed
    pub compress_threshold: usize,
    /// Compress regardless of payload size
    pub force_compression: bool,
}

impl Default for DataOptions {
    fn default() -> Self {
        Self {
            compression: DataCompression::default(),
            compress_threshold: 1_000_000,
            force_compression: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataFormat {
    Sweep,
    Json,
}

impl DataFormat {
    /// Extensions of every container format
    pub const EXTENSIONS: [&'static str; 2] = ["sweep", "json"];

    pub fn from_path(path: &Path) -> Result<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("sweep") => Ok(DataFormat::Sweep),
            Some("json") => Ok(DataFormat::Json),
            other => Err(EnvironmentError::UnsupportedFormat {
                format: other.unwrap_or_default().to_string(),
                supported: "sweep, json".to_string(),
            }),
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            DataFormat::Sweep => "sweep",
            DataFormat::Json => "json",
        }
    }
}

#[derive(Serialize, Deserialize)]
struct Container<R> {
    attrs: BTreeMap<String, String>,
    data: Vec<R>,
}

/// Attributes and record count, readable without knowing the record type
#[derive(Deserialize)]
struct ContainerHead {
    attrs: BTreeMap<String, String>,
    len: u64,
}

/// Shape and metadata of a stored container
#[derive(Debug, Clone, PartialEq)]
pub struct DataSummary {
    pub format: DataFormat,
    pub compressed: bool,
    pub records: usize,
    pub metadata: Metadata,
}

/// Persist `data` with `metadata` to `path`; the format follows the extension.
///
/// `metadata` must carry a `system` entry.
pub fn save_data<R: Serialize>(
    data: &[R],
    path: &Path,
    metadata: &Metadata,
    options: &DataOptions,
) -> Result<()> {
    let save_err = |source: BoxError| EnvironmentError::DataSave {
        path: path.to_path_buf(),
        source,
    };

    if !metadata.contains_key("system") {
        return Err(save_err("metadata must contain the 'system' entry".into()));
    }

    let attrs = encode_attrs(metadata);
    let bytes = match DataFormat::from_path(path)? {
        DataFormat::Json => {
            let container = ContainerRef { attrs: &attrs, data };
            serde_json::to_vec_pretty(&container).map_err(|e| save_err(e.into()))?
        }
        DataFormat::Sweep => {
            let container = ContainerRef { attrs: &attrs, data };
            let payload = bincode::serialize(&container).map_err(|e| save_err(e))?;
            encode_sweep(payload, options).map_err(|e| save_err(e.into()))?
        }
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(EnvironmentError::io(parent))?;
    }
    atomic_write_bytes(path, &bytes).map_err(|e| save_err(e.into()))?;

    debug!(
        path = %path.display(),
        records = data.len(),
        bytes = bytes.len(),
        "Saved result container"
    );
    Ok(())
}

/// Read a container written by [`save_data`].
pub fn load_data<R: DeserializeOwned>(path: &Path) -> Result<(Vec<R>, Metadata)> {
    let load_err = |source: BoxError| EnvironmentError::DataLoad {
        path: path.to_path_buf(),
        source,
    };

    if !path.exists() {
        return Err(EnvironmentError::DataFileNotFound(path.to_path_buf()));
    }
    let bytes = fs::read(path).map_err(EnvironmentError::io(path))?;

    let container: Container<R> = match DataFormat::from_path(path)? {
        DataFormat::Json => serde_json::from_slice(&bytes).map_err(|e| load_err(e.into()))?,
        DataFormat::Sweep => {
            let (_, payload) = decode_sweep(&bytes).map_err(load_err)?;
            bincode::deserialize(&payload).map_err(|e| load_err(e))?
        }
    };

    let metadata = decode_attrs(&container.attrs);
    if !metadata.contains_key("system") {
        return Err(load_err("container has no 'system' attribute".into()));
    }
    Ok((container.data, metadata))
}

/// Summarize a container without decoding its records.
pub fn inspect_data(path: &Path) -> Result<DataSummary> {
    let load_err = |source: BoxError| EnvironmentError::DataLoad {
        path: path.to_path_buf(),
        source,
    };

    if !path.exists() {
        return Err(EnvironmentError::DataFileNotFound(path.to_path_buf()));
    }
    let bytes = fs::read(path).map_err(EnvironmentError::io(path))?;
    let format = DataFormat::from_path(path)?;

    let (compressed, attrs, records) = match format {
        DataFormat::Json => {
            let container: Container<Value> =
                serde_json::from_slice(&bytes).map_err(|e| load_err(e.into()))?;
            (false, container.attrs, container.data.len())
        }
        DataFormat::Sweep => {
            let (compressed, payload) = decode_sweep(&bytes).map_err(load_err)?;
            // Trailing record bytes are ignored by the legacy bincode config
            let head: ContainerHead = bincode::deserialize(&payload).map_err(|e| load_err(e))?;
            (compressed, head.attrs, head.len as usize)
        }
    };

    Ok(DataSummary {
        format,
        compressed,
        records,
        metadata: decode_attrs(&attrs),
    })
}

#[derive(Serialize)]
struct ContainerRef<'a, R> {
    attrs: &'a BTreeMap<String, String>,
    data: &'a [R],
}

fn encode_attrs(metadata: &Metadata) -> BTreeMap<String, String> {
    metadata
        .iter()
        .map(|(key, value)| {
            let encoded = serde_json::to_string(value).unwrap_or_else(|_| value.to_string());
            (key.clone(), encoded)
        })
        .collect()
}

fn decode_attrs(attrs: &BTreeMap<String, String>) -> Metadata {
    attrs
        .iter()
        .map(|(key, raw)| {
            let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.clone()));
            (key.clone(), value)
        })
        .collect()
}

fn encode_sweep(payload: Vec<u8>, options: &DataOptions) -> std::io::Result<Vec<u8>> {
    let level = match options.compression {
        DataCompression::Zstd { level }
            if options.force_compression || payload.len() > options.compress_threshold =>
        {
            Some(level)
        }
        _ => None,
    };

    let body = match level {
        Some(level) => zstd::encode_all(&payload[..], level)?,
        None => payload,
    };

    let mut out = Vec::with_capacity(HEADER_LEN + body.len());
    out.extend_from_slice(MAGIC);
    out.push(FORMAT_VERSION);
    out.push(u8::from(level.is_some()));
    out.extend_from_slice(&body);
    Ok(out)
}

/// Validate the header and return `(compressed, payload)`.
fn decode_sweep(bytes: &[u8]) -> std::result::Result<(bool, Vec<u8>), BoxError> {
    if bytes.len() < HEADER_LEN || &bytes[..MAGIC.len()] != MAGIC {
        return Err("not a sweep result container".into());
    }
    let version = bytes[MAGIC.len()];
    if version != FORMAT_VERSION {
        return Err(format!("unsupported container version {version}").into());
    }

    let body = &bytes[HEADER_LEN..];
    match bytes[MAGIC.len() + 1] {
        0 => Ok((false, body.to_vec())),
        1 => Ok((true, zstd::decode_all(body)?)),
        flag => Err(format!("unknown compression flag {flag}").into()),
    }
}
