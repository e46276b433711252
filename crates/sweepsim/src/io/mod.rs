//! File formats used by a sweep project
//!
//! - `config` - configuration documents (TOML, JSON, YAML)
//! - `data` - persisted result containers
//! - `fs` - write-then-rename and directory helpers

pub mod config;
pub mod data;
pub mod fs;

pub use config::{ConfigFormat, load_config, read_config_value, save_config};
pub use data::{
    DataCompression, DataFormat, DataOptions, DataSummary, Metadata, inspect_data, load_data,
    save_data,
};
