//! Parameter-sweep orchestration
//!
//! Wraps the `sweepsim_core` engine with everything a sweep needs on disk:
//! a per-project directory layout, configuration files, result containers,
//! per-sweep log files and rerun detection.
//!
//! ```ignore
//! use sweepsim::{LogConfig, RunOptions, SimulationEnvironment};
//!
//! let mut env = SimulationEnvironment::new("ising", "./output")?;
//! env.setup("ising.toml", LogConfig::default())?;
//! env.load(|params| Ok(params.get_f64("temperature").unwrap_or_default()))?;
//! let outcome = env.run(&RunOptions::default())?;
//! env.cleanup(true, true)?;
//! ```

#![warn(clippy::all)]

pub mod environment;
pub mod error;
pub mod io;
pub mod logging;
pub mod progress;

#[cfg(test)]
mod tests;

pub use environment::{
    ProjectDirs, RunOptions, RunOutcome, SimulationEnvironment, SweepContext, SweepFn, SweepState,
};
pub use error::EnvironmentError;
pub use io::{ConfigFormat, DataCompression, DataOptions, Metadata, load_data, save_data};
pub use logging::{LogConfig, LogFormat, LogLevel, LogSink, LoggingHandle, init_console};
pub use progress::ProgressBarObserver;

pub use sweepsim_core::{
    BoxError, ConfigHash, ExecutionOptions, ParameterSet, ParameterSpec, SweepConfig,
};
