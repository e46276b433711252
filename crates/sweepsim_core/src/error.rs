use std::fmt;

/// Boxed error returned by user sweep functions.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised while turning parameter specs into a grid
#[derive(Debug, Clone, PartialEq)]
pub enum GridError {
    ZeroSteps {
        name: String,
    },
    NonPositiveLogBound {
        name: String,
        start: f64,
        end: f64,
    },
    InvalidBase(f64),
}

impl fmt::Display for GridError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GridError::ZeroSteps { name } => {
                write!(f, "configuration error: parameter '{name}' needs at least one step")
            }
            GridError::NonPositiveLogBound { name, start, end } => write!(
                f,
                "configuration error: log-scaled parameter '{name}' needs positive bounds (start={start}, end={end})"
            ),
            GridError::InvalidBase(base) => {
                write!(f, "configuration error: invalid logarithm base {base}")
            }
        }
    }
}

impl std::error::Error for GridError {}

/// Errors related to the structure of a sweep configuration
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Malformed or missing required section
    Configuration(String),
    /// Parameter entries without `start`, `end` or `steps`, as `name.field`
    MissingRequiredParameters(Vec<String>),
    Grid(GridError),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Configuration(msg) => write!(f, "configuration error: {msg}"),
            ConfigError::MissingRequiredParameters(missing) => {
                write!(f, "missing required parameters: {}", missing.join(", "))
            }
            ConfigError::Grid(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Grid(e) => Some(e),
            _ => None,
        }
    }
}

impl From<GridError> for ConfigError {
    fn from(e: GridError) -> Self {
        ConfigError::Grid(e)
    }
}

/// Errors raised by the execution scheduler
#[derive(Debug)]
pub enum SchedulerError {
    ThreadPool(String),
    /// The sweep function failed for the parameter set at `index`
    Invocation { index: usize, source: BoxError },
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulerError::ThreadPool(msg) => write!(f, "failed to build worker pool: {msg}"),
            SchedulerError::Invocation { index, source } => {
                write!(f, "sweep function failed on parameter set {index}: {source}")
            }
        }
    }
}

impl std::error::Error for SchedulerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SchedulerError::Invocation { source, .. } => Some(source.as_ref()),
            SchedulerError::ThreadPool(_) => None,
        }
    }
}

/// Errors raised while profiling a single run
#[derive(Debug)]
pub enum EstimateError {
    Invocation(BoxError),
    /// The memory sampler could not read process statistics
    Sampler(String),
}

impl fmt::Display for EstimateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EstimateError::Invocation(e) => write!(f, "sweep function failed during profiling: {e}"),
            EstimateError::Sampler(msg) => write!(f, "memory sampler error: {msg}"),
        }
    }
}

impl std::error::Error for EstimateError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EstimateError::Invocation(e) => Some(e.as_ref()),
            EstimateError::Sampler(_) => None,
        }
    }
}
