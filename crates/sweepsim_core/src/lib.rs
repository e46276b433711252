//! Parameter-sweep simulation engine
//!
//! This crate holds the pure parts of a sweep run:
//! - Validated sweep configurations with a required `system` section
//! - Cartesian grid generation over linear and log-scaled axes
//! - Content hashing of configurations for rerun detection
//! - Batched, optionally parallel execution of a user function
//! - Single-run memory and timing estimation
//!
//! # Example
//!
//! ```ignore
//! use sweepsim_core::{ExecutionScheduler, NoopObserver, ParameterSpec, SweepConfig};
//!
//! let config = SweepConfig::new(serde_json::Map::new())
//!     .with_parameter("temperature", ParameterSpec::linear(0.1, 10.0, 3));
//! let grid = sweepsim_core::generate_grid(&config.parameters, 10.0)?;
//! let sets = sweepsim_core::expand_parameter_sets(&config.system, &grid);
//! let results = ExecutionScheduler::default().run(&sets, &model, &NoopObserver)?;
//! ```

#![warn(clippy::all)]

// ============================================================================
// Core modules
// ============================================================================

pub mod error;
pub mod estimate;
pub mod grid;
pub mod identity;
pub mod scheduler;

// ============================================================================
// Type definition modules
// ============================================================================

pub mod config;

// ============================================================================
// Test modules
// ============================================================================

#[cfg(test)]
mod tests;

// ============================================================================
// Public re-exports for convenience
// ============================================================================

pub use config::{ParameterSpec, SweepConfig};
pub use error::{BoxError, ConfigError, EstimateError, GridError, SchedulerError};
pub use estimate::{MemoryProfileOptions, MemoryReport, PerformanceEstimator, TimeReport};
pub use grid::{
    DEFAULT_LOG_BASE, ParameterGrid, ParameterSet, expand_parameter_sets, generate_grid,
};
pub use identity::{ConfigHash, carries_hash, compute_hash};
pub use scheduler::{
    BatchObserver, ExecutionOptions, ExecutionScheduler, NoopObserver, ObserverSet, SweepProgress,
};
