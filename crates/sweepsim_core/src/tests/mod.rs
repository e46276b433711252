//! Scenario tests for the sweep engine
//!
//! - `sweep` - configuration through grid expansion and execution
//! - `hashing` - hash stability across equivalent configurations
