//! Sweep configuration types
//!
//! A configuration decodes to a mapping with a required `system` section
//! (fixed, non-swept values) and an optional `parameters` section describing
//! the swept axes. Any other top-level section is carried along untouched so
//! that it still takes part in the configuration hash.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ConfigError;

const SYSTEM_KEY: &str = "system";
const PARAMETERS_KEY: &str = "parameters";
const SPEC_FIELDS: [&str; 4] = ["start", "end", "steps", "log_scale"];

/// One swept axis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub start: f64,
    pub end: f64,
    /// Number of points including both endpoints
    pub steps: usize,
    #[serde(default)]
    pub log_scale: bool,
}

impl ParameterSpec {
    pub fn linear(start: f64, end: f64, steps: usize) -> Self {
        Self {
            start,
            end,
            steps,
            log_scale: false,
        }
    }

    pub fn log(start: f64, end: f64, steps: usize) -> Self {
        Self {
            start,
            end,
            steps,
            log_scale: true,
        }
    }

    fn from_value(name: &str, value: &Value, missing: &mut Vec<String>) -> Result<Option<Self>, ConfigError> {
        let Some(table) = value.as_object() else {
            return Err(ConfigError::Configuration(format!(
                "parameter '{name}' must be a table with start, end and steps"
            )));
        };

        if let Some(unknown) = table.keys().find(|k| !SPEC_FIELDS.contains(&k.as_str())) {
            return Err(ConfigError::Configuration(format!(
                "parameter '{name}' has unknown field '{unknown}'"
            )));
        }

        let before = missing.len();
        for field in ["start", "end", "steps"] {
            if !table.contains_key(field) {
                missing.push(format!("{name}.{field}"));
            }
        }
        if missing.len() > before {
            return Ok(None);
        }

        let number = |field: &str| {
            table[field].as_f64().ok_or_else(|| {
                ConfigError::Configuration(format!("parameter '{name}.{field}' must be a number"))
            })
        };
        let start = number("start")?;
        let end = number("end")?;

        let steps = table["steps"].as_u64().ok_or_else(|| {
            ConfigError::Configuration(format!(
                "parameter '{name}.steps' must be a non-negative integer"
            ))
        })? as usize;
        if steps == 0 {
            return Err(ConfigError::Configuration(format!(
                "parameter '{name}.steps' must be at least 1"
            )));
        }

        let log_scale = match table.get("log_scale") {
            None => false,
            Some(v) => v.as_bool().ok_or_else(|| {
                ConfigError::Configuration(format!("parameter '{name}.log_scale' must be a boolean"))
            })?,
        };

        Ok(Some(Self {
            start,
            end,
            steps,
            log_scale,
        }))
    }
}

/// A validated sweep configuration
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SweepConfig {
    /// Fixed values copied into every parameter set
    pub system: Map<String, Value>,
    /// Swept axes in declaration order
    pub parameters: IndexMap<String, ParameterSpec>,
    /// Remaining top-level sections
    pub extra: Map<String, Value>,
}

impl SweepConfig {
    #[must_use]
    pub fn new(system: Map<String, Value>) -> Self {
        Self {
            system,
            ..Default::default()
        }
    }

    /// Add a swept axis; later axes vary faster in the expanded grid.
    #[must_use]
    pub fn with_parameter(mut self, name: impl Into<String>, spec: ParameterSpec) -> Self {
        self.parameters.insert(name.into(), spec);
        self
    }

    /// Validate a decoded configuration document.
    pub fn from_value(value: Value) -> Result<Self, ConfigError> {
        let Value::Object(mut root) = value else {
            return Err(ConfigError::Configuration(
                "configuration must be a table at the top level".to_string(),
            ));
        };

        let system = match root.shift_remove(SYSTEM_KEY) {
            Some(Value::Object(system)) => system,
            Some(_) => {
                return Err(ConfigError::Configuration(
                    "the 'system' section must be a table".to_string(),
                ));
            }
            None => {
                return Err(ConfigError::Configuration(
                    "configuration must contain the 'system' field".to_string(),
                ));
            }
        };

        let mut parameters = IndexMap::new();
        match root.shift_remove(PARAMETERS_KEY) {
            None => {}
            Some(Value::Object(raw)) => {
                let mut missing = Vec::new();
                for (name, spec) in &raw {
                    if let Some(spec) = ParameterSpec::from_value(name, spec, &mut missing)? {
                        parameters.insert(name.clone(), spec);
                    }
                }
                if !missing.is_empty() {
                    return Err(ConfigError::MissingRequiredParameters(missing));
                }
            }
            Some(_) => {
                return Err(ConfigError::Configuration(
                    "the 'parameters' section must be a table".to_string(),
                ));
            }
        }

        Ok(Self {
            system,
            parameters,
            extra: root,
        })
    }

    /// Normalized document form: defaults filled in, empty `parameters` omitted.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut root = Map::new();
        root.insert(SYSTEM_KEY.to_string(), Value::Object(self.system.clone()));
        if !self.parameters.is_empty() {
            let params = self
                .parameters
                .iter()
                .map(|(name, spec)| {
                    let spec = serde_json::json!({
                        "start": spec.start,
                        "end": spec.end,
                        "steps": spec.steps,
                        "log_scale": spec.log_scale,
                    });
                    (name.clone(), spec)
                })
                .collect();
            root.insert(PARAMETERS_KEY.to_string(), Value::Object(params));
        }
        for (key, value) in &self.extra {
            root.insert(key.clone(), value.clone());
        }
        Value::Object(root)
    }

    /// Whether any axis is swept
    #[must_use]
    pub fn has_sweep(&self) -> bool {
        !self.parameters.is_empty()
    }
}
