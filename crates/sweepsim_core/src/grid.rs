//! Parameter grid generation and Cartesian expansion
//!
//! Each swept axis becomes an ordered sequence of values. The grid is then
//! expanded in row-major order (the last declared axis varies fastest) into a
//! flat list of parameter sets. That ordering fixes the layout of the result
//! array, so it must stay stable for identical configurations.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::ParameterSpec;
use crate::error::GridError;

/// Default base for log-scaled axes
pub const DEFAULT_LOG_BASE: f64 = 10.0;

/// One concrete combination of values handed to the sweep function
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterSet(Map<String, Value>);

impl ParameterSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Numeric value of `name`, if present and numeric
    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.0.get(name).and_then(Value::as_f64)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for ParameterSet {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Ordered mapping from parameter name to its value sequence
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ParameterGrid {
    axes: IndexMap<String, Vec<f64>>,
}

impl ParameterGrid {
    /// Values for one axis
    pub fn get(&self, name: &str) -> Option<&[f64]> {
        self.axes.get(name).map(Vec::as_slice)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.axes.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[f64])> {
        self.axes.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Number of axes
    pub fn ndim(&self) -> usize {
        self.axes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.axes.is_empty()
    }

    /// Step count of each axis
    pub fn shape(&self) -> Vec<usize> {
        self.axes.values().map(Vec::len).collect()
    }

    /// Number of parameter sets the grid expands to (1 for an empty grid)
    pub fn total_points(&self) -> usize {
        self.axes.values().map(Vec::len).product()
    }

    /// Iterate over all index tuples in row-major order
    pub fn indices(&self) -> GridIndices {
        let shape = self.shape();
        let done = shape.contains(&0);
        GridIndices {
            current: vec![0; shape.len()],
            shape,
            done,
        }
    }
}

/// Iterator over all indices in a grid
pub struct GridIndices {
    shape: Vec<usize>,
    current: Vec<usize>,
    done: bool,
}

impl Iterator for GridIndices {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let result = self.current.clone();

        // A zero-dimensional grid has exactly one (empty) index
        if self.shape.is_empty() {
            self.done = true;
        }

        // Row-major: last dimension varies fastest
        for i in (0..self.shape.len()).rev() {
            self.current[i] += 1;
            if self.current[i] < self.shape[i] {
                break;
            }
            self.current[i] = 0;
            if i == 0 {
                self.done = true;
            }
        }

        Some(result)
    }
}

/// Build the value sequence for every declared parameter.
///
/// Log-scaled axes are evenly spaced in exponent between `log_base(start)` and
/// `log_base(end)` and re-exponentiated with `base`.
pub fn generate_grid(
    parameters: &IndexMap<String, ParameterSpec>,
    base: f64,
) -> Result<ParameterGrid, GridError> {
    if base.is_nan() || base <= 0.0 || base == 1.0 || base.is_infinite() {
        return Err(GridError::InvalidBase(base));
    }

    let mut axes = IndexMap::with_capacity(parameters.len());
    for (name, spec) in parameters {
        if spec.steps == 0 {
            return Err(GridError::ZeroSteps { name: name.clone() });
        }

        let values = if spec.log_scale {
            if spec.start <= 0.0 || spec.end <= 0.0 {
                return Err(GridError::NonPositiveLogBound {
                    name: name.clone(),
                    start: spec.start,
                    end: spec.end,
                });
            }
            logspace(spec.start, spec.end, spec.steps, base)
        } else {
            linspace(spec.start, spec.end, spec.steps)
        };
        axes.insert(name.clone(), values);
    }

    Ok(ParameterGrid { axes })
}

/// Overlay every grid combination onto the fixed `system` values.
///
/// An empty grid yields a single set containing only the system values.
pub fn expand_parameter_sets(system: &Map<String, Value>, grid: &ParameterGrid) -> Vec<ParameterSet> {
    let names: Vec<&str> = grid.names().collect();
    let axes: Vec<&[f64]> = grid.axes.values().map(Vec::as_slice).collect();

    let mut sets = Vec::with_capacity(grid.total_points());
    for indices in grid.indices() {
        let mut set = ParameterSet::from(system.clone());
        for (dim, &idx) in indices.iter().enumerate() {
            set.insert(names[dim], axes[dim][idx]);
        }
        sets.push(set);
    }
    sets
}

fn linspace(start: f64, end: f64, steps: usize) -> Vec<f64> {
    if steps <= 1 {
        return vec![start];
    }
    let step_size = (end - start) / (steps - 1) as f64;
    let mut values: Vec<f64> = (0..steps).map(|i| start + step_size * i as f64).collect();
    values[steps - 1] = end;
    values
}

fn logspace(start: f64, end: f64, steps: usize, base: f64) -> Vec<f64> {
    if steps <= 1 {
        return vec![start];
    }
    let exponents = linspace(start.log(base), end.log(base), steps);
    let mut values: Vec<f64> = exponents.into_iter().map(|e| base.powf(e)).collect();
    values[0] = start;
    values[steps - 1] = end;
    values
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(entries: &[(&str, ParameterSpec)]) -> IndexMap<String, ParameterSpec> {
        entries
            .iter()
            .map(|(name, spec)| (name.to_string(), spec.clone()))
            .collect()
    }

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-9 * b.abs().max(1.0), "{a} != {b}");
    }

    #[test]
    fn test_linear_axis() {
        let grid = generate_grid(&params(&[("t", ParameterSpec::linear(0.1, 10.0, 3))]), 10.0)
            .unwrap();
        let values = grid.get("t").unwrap();
        assert_eq!(values.len(), 3);
        assert_eq!(values[0], 0.1);
        assert_close(values[1], 5.05);
        assert_eq!(values[2], 10.0);
    }

    #[test]
    fn test_linear_axis_properties() {
        for &(start, end, steps) in &[(0.0, 1.0, 11), (5.0, -5.0, 7), (-3.5, 2.25, 2), (1e-3, 1e3, 50)] {
            let grid = generate_grid(&params(&[("x", ParameterSpec::linear(start, end, steps))]), 10.0)
                .unwrap();
            let values = grid.get("x").unwrap();
            assert_eq!(values.len(), steps);
            assert_eq!(values[0], start);
            assert_close(values[steps - 1], end);

            let increasing = end > start;
            for pair in values.windows(2) {
                if increasing {
                    assert!(pair[1] > pair[0]);
                } else {
                    assert!(pair[1] < pair[0]);
                }
            }
        }
    }

    #[test]
    fn test_log_axis() {
        let grid = generate_grid(&params(&[("p", ParameterSpec::log(1.0, 1000.0, 4))]), 10.0)
            .unwrap();
        let values = grid.get("p").unwrap();
        assert_eq!(values.len(), 4);
        assert_close(values[0], 1.0);
        assert_close(values[1], 10.0);
        assert_close(values[2], 100.0);
        assert_close(values[3], 1000.0);
    }

    #[test]
    fn test_log_axis_other_base() {
        let grid = generate_grid(&params(&[("p", ParameterSpec::log(1.0, 16.0, 5))]), 2.0)
            .unwrap();
        let values = grid.get("p").unwrap();
        for (value, expected) in values.iter().zip([1.0, 2.0, 4.0, 8.0, 16.0]) {
            assert_close(*value, expected);
        }
    }

    #[test]
    fn test_log_axis_rejects_non_positive_bounds() {
        for (start, end) in [(0.0, 10.0), (-1.0, 10.0), (1.0, 0.0), (1.0, -2.0)] {
            let err = generate_grid(&params(&[("p", ParameterSpec::log(start, end, 3))]), 10.0)
                .unwrap_err();
            assert!(matches!(err, GridError::NonPositiveLogBound { .. }));
            assert!(err.to_string().starts_with("configuration error"));
        }
    }

    #[test]
    fn test_single_step_axis() {
        let grid = generate_grid(
            &params(&[
                ("lin", ParameterSpec::linear(2.0, 8.0, 1)),
                ("log", ParameterSpec::log(3.0, 300.0, 1)),
            ]),
            10.0,
        )
        .unwrap();
        assert_eq!(grid.get("lin").unwrap(), &[2.0]);
        assert_eq!(grid.get("log").unwrap(), &[3.0]);
    }

    #[test]
    fn test_zero_steps_and_bad_base() {
        let err = generate_grid(&params(&[("x", ParameterSpec::linear(0.0, 1.0, 0))]), 10.0)
            .unwrap_err();
        assert_eq!(err, GridError::ZeroSteps { name: "x".to_string() });

        for base in [0.0, 1.0, -2.0, f64::NAN] {
            assert!(matches!(
                generate_grid(&IndexMap::new(), base),
                Err(GridError::InvalidBase(_))
            ));
        }
    }

    #[test]
    fn test_cartesian_product_2x3() {
        let grid = generate_grid(
            &params(&[
                ("a", ParameterSpec::linear(0.0, 1.0, 2)),
                ("b", ParameterSpec::linear(10.0, 30.0, 3)),
            ]),
            10.0,
        )
        .unwrap();
        assert_eq!(grid.shape(), vec![2, 3]);
        assert_eq!(grid.total_points(), 6);

        let mut system = Map::new();
        system.insert("name".to_string(), json!("test"));
        let sets = expand_parameter_sets(&system, &grid);
        assert_eq!(sets.len(), 6);

        let pairs: Vec<(f64, f64)> = sets
            .iter()
            .map(|s| (s.get_f64("a").unwrap(), s.get_f64("b").unwrap()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                (0.0, 10.0),
                (0.0, 20.0),
                (0.0, 30.0),
                (1.0, 10.0),
                (1.0, 20.0),
                (1.0, 30.0),
            ]
        );
        assert!(sets.iter().all(|s| s.get("name") == Some(&json!("test"))));
    }

    #[test]
    fn test_empty_grid_expands_to_system_only() {
        let mut system = Map::new();
        system.insert("seed".to_string(), json!(7));
        let grid = generate_grid(&IndexMap::new(), DEFAULT_LOG_BASE).unwrap();
        assert_eq!(grid.total_points(), 1);

        let sets = expand_parameter_sets(&system, &grid);
        assert_eq!(sets.len(), 1);
        assert_eq!(sets[0].as_map(), &system);
    }

    #[test]
    fn test_swept_value_overrides_system_value() {
        let mut system = Map::new();
        system.insert("t".to_string(), json!(-1.0));
        let grid = generate_grid(&params(&[("t", ParameterSpec::linear(1.0, 2.0, 2))]), 10.0)
            .unwrap();
        let sets = expand_parameter_sets(&system, &grid);
        assert_eq!(sets[0].get_f64("t"), Some(1.0));
        assert_eq!(sets[1].get_f64("t"), Some(2.0));
    }

    #[test]
    fn test_grid_indices_row_major() {
        let grid = generate_grid(
            &params(&[
                ("a", ParameterSpec::linear(0.0, 1.0, 2)),
                ("b", ParameterSpec::linear(0.0, 1.0, 2)),
            ]),
            10.0,
        )
        .unwrap();
        let indices: Vec<Vec<usize>> = grid.indices().collect();
        assert_eq!(indices, vec![vec![0, 0], vec![0, 1], vec![1, 0], vec![1, 1]]);
    }
}
