use std::io;
use std::path::PathBuf;

use sweepsim_core::{BoxError, ConfigError, EstimateError, GridError, SchedulerError};

use crate::environment::SweepState;

/// Errors raised while preparing, running or cleaning up a sweep
#[derive(Debug, thiserror::Error)]
pub enum EnvironmentError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("unsupported format '{format}' (supported: {supported})")]
    UnsupportedFormat { format: String, supported: String },

    #[error("data file not found: {}", .0.display())]
    DataFileNotFound(PathBuf),

    #[error("failed to save data to {}", .path.display())]
    DataSave {
        path: PathBuf,
        #[source]
        source: BoxError,
    },

    #[error("failed to load data from {}", .path.display())]
    DataLoad {
        path: PathBuf,
        #[source]
        source: BoxError,
    },

    #[error("missing required parameters: {}", .0.join(", "))]
    MissingRequiredParameters(Vec<String>),

    #[error("I/O error at {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot {action} while the environment is {state}")]
    InvalidState { action: &'static str, state: SweepState },

    #[error("no simulation function loaded")]
    FunctionNotLoaded,

    #[error("logging setup failed: {0}")]
    Logging(String),

    #[error(transparent)]
    Grid(#[from] GridError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error(transparent)]
    Estimate(#[from] EstimateError),
}

impl EnvironmentError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> Self {
        let path = path.into();
        move |source| EnvironmentError::Io { path, source }
    }
}

impl From<ConfigError> for EnvironmentError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Configuration(msg) => EnvironmentError::Configuration(msg),
            ConfigError::MissingRequiredParameters(names) => {
                EnvironmentError::MissingRequiredParameters(names)
            }
            ConfigError::Grid(e) => EnvironmentError::Grid(e),
        }
    }
}

pub type Result<T> = std::result::Result<T, EnvironmentError>;
