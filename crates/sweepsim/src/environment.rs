//! Sweep project lifecycle
//!
//! A [`SimulationEnvironment`] owns one project directory and drives a sweep
//! through `setup → load → run → cleanup`:
//!
//! ```text
//! <output>/simulations/<project>/
//!   data/       <timestamp>_<hash>.sweep
//!   config/     <timestamp>_<hash>.toml
//!   logs/       <timestamp>_<hash>.log (+ rotated archives)
//!   analysis/   memory_<timestamp>_<hash>.log, time_<timestamp>_<hash>.log
//!   figures/    svg/ video/ html/
//!   tmp/
//! ```

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::{Map, Value};
use sweepsim_core::identity;
use sweepsim_core::{
    BoxError, ConfigHash, DEFAULT_LOG_BASE, ExecutionOptions, ExecutionScheduler, NoopObserver,
    ParameterSet, PerformanceEstimator, SweepConfig, compute_hash, expand_parameter_sets,
    generate_grid,
};
use tracing::{debug, error, info, warn};

use crate::error::{EnvironmentError, Result};
use crate::io::fs::{artifact_stem, atomic_write, clear_dir};
use crate::io::{
    ConfigFormat, DataFormat, DataOptions, Metadata, load_config, save_config, save_data,
};
use crate::logging::{LogConfig, LogLevel, LogSink, LoggingHandle};
use crate::progress::ProgressBarObserver;

const PERMISSION_PROBE: &str = ".permission_test";
const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Boxed sweep function stored by the environment
pub type SweepFn<R> = Box<dyn Fn(&ParameterSet) -> std::result::Result<R, BoxError> + Send + Sync>;

/// Directory layout of one project
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectDirs {
    pub root: PathBuf,
    pub data: PathBuf,
    pub logs: PathBuf,
    pub figures: PathBuf,
    pub svg: PathBuf,
    pub video: PathBuf,
    pub html: PathBuf,
    pub tmp: PathBuf,
    pub config: PathBuf,
    pub analysis: PathBuf,
}

impl ProjectDirs {
    /// Layout rooted at `<output>/simulations/<project>`; nothing is created.
    pub fn new(output: &Path, project_name: &str) -> Self {
        let root = output.join("simulations").join(project_name);
        let figures = root.join("figures");
        Self {
            data: root.join("data"),
            logs: root.join("logs"),
            svg: figures.join("svg"),
            video: figures.join("video"),
            html: figures.join("html"),
            figures,
            tmp: root.join("tmp"),
            config: root.join("config"),
            analysis: root.join("analysis"),
            root,
        }
    }

    pub fn all(&self) -> [&Path; 10] {
        [
            &self.root,
            &self.data,
            &self.logs,
            &self.figures,
            &self.svg,
            &self.video,
            &self.html,
            &self.tmp,
            &self.config,
            &self.analysis,
        ]
    }

    /// Create every directory, after checking the root is writable.
    pub fn create(&self) -> Result<()> {
        fs::create_dir_all(&self.root).map_err(EnvironmentError::io(&self.root))?;

        let probe = self.root.join(PERMISSION_PROBE);
        fs::write(&probe, b"").map_err(EnvironmentError::io(&probe))?;
        fs::remove_file(&probe).map_err(EnvironmentError::io(&probe))?;

        for dir in self.all() {
            fs::create_dir_all(dir).map_err(EnvironmentError::io(dir))?;
        }
        Ok(())
    }
}

/// Read-only view of the sweep identity, shared with the logging sink
pub trait SweepContext {
    fn project_name(&self) -> &str;
    fn dirs(&self) -> &ProjectDirs;
    /// Start timestamp, set by setup
    fn timestamp(&self) -> Option<&str>;
    /// Configuration hash, set by setup
    fn config_hash(&self) -> Option<&ConfigHash>;
}

/// Lifecycle position of an environment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepState {
    Created,
    Configured,
    Estimated,
    Executed,
    Cleaned,
}

impl fmt::Display for SweepState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SweepState::Created => "created",
            SweepState::Configured => "configured",
            SweepState::Estimated => "estimated",
            SweepState::Executed => "executed",
            SweepState::Cleaned => "cleaned",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunOptions {
    /// Run even if data for this configuration already exists
    pub force: bool,
    /// Profile memory and time on the first parameter set before the sweep
    pub estimate_performance: bool,
    pub execution: ExecutionOptions,
    /// Base for log-scaled axes
    pub base: f64,
    /// Draw a progress bar per batch
    pub progress: bool,
    pub data: DataOptions,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            force: false,
            estimate_performance: false,
            execution: ExecutionOptions::default(),
            base: DEFAULT_LOG_BASE,
            progress: false,
            data: DataOptions::default(),
        }
    }
}

/// What a call to [`SimulationEnvironment::run`] did
#[derive(Debug)]
pub enum RunOutcome<R> {
    /// Data for this configuration hash was already on disk
    Skipped { existing: PathBuf },
    Completed(Vec<R>),
}

impl<R> RunOutcome<R> {
    pub fn is_skipped(&self) -> bool {
        matches!(self, RunOutcome::Skipped { .. })
    }

    pub fn results(&self) -> Option<&[R]> {
        match self {
            RunOutcome::Completed(results) => Some(results),
            RunOutcome::Skipped { .. } => None,
        }
    }

    pub fn into_results(self) -> Option<Vec<R>> {
        match self {
            RunOutcome::Completed(results) => Some(results),
            RunOutcome::Skipped { .. } => None,
        }
    }
}

/// Orchestrates one project's sweep
///
/// Holds the thread-local logging sink once configured, so it is used from
/// the thread that created it.
pub struct SimulationEnvironment<R> {
    project_name: String,
    dirs: ProjectDirs,
    config: Option<SweepConfig>,
    config_hash: Option<ConfigHash>,
    timestamp: Option<String>,
    func: Option<SweepFn<R>>,
    function_name: Option<String>,
    logging: Option<LoggingHandle>,
    state: SweepState,
}

impl<R> SweepContext for SimulationEnvironment<R> {
    fn project_name(&self) -> &str {
        &self.project_name
    }

    fn dirs(&self) -> &ProjectDirs {
        &self.dirs
    }

    fn timestamp(&self) -> Option<&str> {
        self.timestamp.as_deref()
    }

    fn config_hash(&self) -> Option<&ConfigHash> {
        self.config_hash.as_ref()
    }
}

/// Identity of a sweep being configured, before it is committed
struct PendingIdentity<'a> {
    project_name: &'a str,
    dirs: &'a ProjectDirs,
    timestamp: &'a str,
    config_hash: &'a ConfigHash,
}

impl SweepContext for PendingIdentity<'_> {
    fn project_name(&self) -> &str {
        self.project_name
    }

    fn dirs(&self) -> &ProjectDirs {
        self.dirs
    }

    fn timestamp(&self) -> Option<&str> {
        Some(self.timestamp)
    }

    fn config_hash(&self) -> Option<&ConfigHash> {
        Some(self.config_hash)
    }
}

impl<R> fmt::Display for SimulationEnvironment<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SimulationEnvironment(project_name={}, save_path={})",
            self.project_name,
            self.dirs.root.display()
        )
    }
}

impl<R> fmt::Debug for SimulationEnvironment<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimulationEnvironment")
            .field("project_name", &self.project_name)
            .field("root", &self.dirs.root)
            .field("config_hash", &self.config_hash)
            .field("timestamp", &self.timestamp)
            .field("function_name", &self.function_name)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl<R> SimulationEnvironment<R> {
    /// Scaffold `<output>/simulations/<project_name>/`.
    ///
    /// Existing directories and their contents are left alone.
    pub fn new(project_name: impl Into<String>, output: impl AsRef<Path>) -> Result<Self> {
        let project_name = project_name.into();
        if project_name.is_empty() || project_name.contains(['/', '\\']) {
            return Err(EnvironmentError::Configuration(format!(
                "invalid project name '{project_name}'"
            )));
        }

        let dirs = ProjectDirs::new(output.as_ref(), &project_name);
        dirs.create()?;
        debug!(root = %dirs.root.display(), "Project directories ready");

        Ok(Self {
            project_name,
            dirs,
            config: None,
            config_hash: None,
            timestamp: None,
            func: None,
            function_name: None,
            logging: None,
            state: SweepState::Created,
        })
    }

    pub fn state(&self) -> SweepState {
        self.state
    }

    pub fn config(&self) -> Option<&SweepConfig> {
        self.config.as_ref()
    }

    /// Root of the project directory
    pub fn save_path(&self) -> &Path {
        &self.dirs.root
    }

    pub fn log_path(&self) -> Option<&Path> {
        self.logging.as_ref().map(LoggingHandle::path)
    }

    /// Name recorded for the loaded function
    pub fn function_name(&self) -> Option<&str> {
        self.function_name.as_deref()
    }

    /// `<timestamp>_<hash>`, the stem shared by this sweep's artifacts
    pub fn artifact_stem(&self) -> Option<String> {
        Some(format!("{}_{}", self.timestamp.as_deref()?, self.config_hash.as_ref()?))
    }

    /// Load the configuration file at `config_path` and start logging.
    pub fn setup(&mut self, config_path: impl AsRef<Path>, log_config: LogConfig) -> Result<()> {
        let config_path = config_path.as_ref();
        let config = load_config(config_path).inspect_err(|e| {
            error!(path = %config_path.display(), error = %e, "Failed to load configuration");
        })?;
        self.setup_with_config(config, log_config)?;
        info!(path = %config_path.display(), "Configuration file loaded");
        Ok(())
    }

    /// Configure from an in-memory configuration.
    pub fn setup_with_config(&mut self, config: SweepConfig, log_config: LogConfig) -> Result<()> {
        let hash = compute_hash(&config.to_value(), &self.project_name);
        let timestamp = jiff::Zoned::now().strftime(TIMESTAMP_FORMAT).to_string();
        let next = PendingIdentity {
            project_name: &self.project_name,
            dirs: &self.dirs,
            timestamp: &timestamp,
            config_hash: &hash,
        };
        // Nothing changes until the new log file is open
        let sink = LogSink::open(&next, &log_config)?;
        // Release the previous sink before installing the new one
        self.logging = None;
        let handle = LoggingHandle::attach(sink, &log_config);
        self.logging = Some(handle);
        self.config_hash = Some(hash);
        self.timestamp = Some(timestamp);

        info!(
            project = %self.project_name,
            config_hash = ?self.config_hash.as_ref().map(ConfigHash::as_str),
            timestamp = ?self.timestamp,
            parameters = ?config.parameters.keys().collect::<Vec<_>>(),
            root = %self.dirs.root.display(),
            "Simulation environment configured"
        );

        self.config = Some(config);
        self.state = SweepState::Configured;
        Ok(())
    }

    /// Attach the sweep function.
    pub fn load<F>(&mut self, func: F) -> Result<()>
    where
        F: Fn(&ParameterSet) -> std::result::Result<R, BoxError> + Send + Sync + 'static,
    {
        if self.state == SweepState::Created {
            return Err(EnvironmentError::InvalidState {
                action: "load a function",
                state: self.state,
            });
        }
        let name = std::any::type_name::<F>().to_string();
        info!(function = %name, "Simulation function loaded");
        self.function_name = Some(name);
        self.func = Some(Box::new(func));
        Ok(())
    }

    /// Change the level of the sweep's log file.
    pub fn change_log_level(&mut self, level: LogLevel) -> Result<()> {
        match self.logging.as_mut() {
            Some(handle) => handle.change_level(level),
            None => Err(EnvironmentError::InvalidState {
                action: "change the log level",
                state: self.state,
            }),
        }
    }

    /// Remove temporary files and stale artifacts.
    ///
    /// `tmp` is always emptied; `data` and `logs` are emptied unless kept.
    /// Files in `config` and `logs` survive only if their stem matches a data
    /// file still present or they carry the current configuration hash.
    pub fn cleanup(&mut self, keep_data: bool, keep_logs: bool) -> Result<()> {
        let result = self.cleanup_inner(keep_data, keep_logs);
        match &result {
            Ok(()) => {
                info!(keep_data, keep_logs, "Cleanup finished");
                self.state = SweepState::Cleaned;
            }
            Err(e) => error!(error = %e, "Cleanup failed"),
        }
        result
    }

    fn cleanup_inner(&self, keep_data: bool, keep_logs: bool) -> Result<()> {
        clear_dir(&self.dirs.tmp).map_err(EnvironmentError::io(&self.dirs.tmp))?;
        if !keep_data {
            clear_dir(&self.dirs.data).map_err(EnvironmentError::io(&self.dirs.data))?;
        }
        if !keep_logs {
            clear_dir(&self.dirs.logs).map_err(EnvironmentError::io(&self.dirs.logs))?;
        }

        let data_stems = self.data_stems()?;
        for dir in [&self.dirs.config, &self.dirs.logs] {
            self.clean_unused(dir, &data_stems)?;
        }
        Ok(())
    }

    fn data_stems(&self) -> Result<Vec<String>> {
        let mut stems = Vec::new();
        if !self.dirs.data.exists() {
            return Ok(stems);
        }
        let entries = fs::read_dir(&self.dirs.data).map_err(EnvironmentError::io(&self.dirs.data))?;
        for entry in entries {
            let path = entry.map_err(EnvironmentError::io(&self.dirs.data))?.path();
            if !path.is_file() || DataFormat::from_path(&path).is_err() {
                continue;
            }
            if let Some(stem) = artifact_stem(&path) {
                stems.push(stem.to_string());
            }
        }
        Ok(stems)
    }

    fn clean_unused(&self, dir: &Path, data_stems: &[String]) -> Result<()> {
        if !dir.exists() {
            return Ok(());
        }
        let entries = fs::read_dir(dir).map_err(EnvironmentError::io(dir))?;
        for entry in entries {
            let path = entry.map_err(EnvironmentError::io(dir))?.path();
            if !path.is_file() {
                continue;
            }
            let referenced = artifact_stem(&path)
                .is_some_and(|stem| data_stems.iter().any(|s| s == stem));
            let current = self
                .config_hash
                .as_ref()
                .is_some_and(|hash| identity::carries_hash(&path, hash));
            if !referenced && !current {
                fs::remove_file(&path).map_err(EnvironmentError::io(&path))?;
                debug!(path = %path.display(), "Removed unused file");
            }
        }
        Ok(())
    }

    fn configured(&self, action: &'static str) -> Result<(&SweepConfig, &ConfigHash, &str)> {
        match (&self.config, &self.config_hash, &self.timestamp) {
            (Some(config), Some(hash), Some(timestamp)) => Ok((config, hash, timestamp)),
            _ => Err(EnvironmentError::InvalidState {
                action,
                state: self.state,
            }),
        }
    }
}

impl<R: Serialize + Send> SimulationEnvironment<R> {
    /// Run the sweep unless its data already exists.
    ///
    /// Results are persisted only after every parameter set has succeeded.
    pub fn run(&mut self, options: &RunOptions) -> Result<RunOutcome<R>> {
        let result = self.run_inner(options);
        if let Err(e) = &result {
            error!(error = %e, "Simulation run failed");
        }
        result
    }

    fn run_inner(&mut self, options: &RunOptions) -> Result<RunOutcome<R>> {
        let (config, hash, timestamp) = self.configured("run")?;
        let func = self.func.as_ref().ok_or(EnvironmentError::FunctionNotLoaded)?;

        if !options.force {
            let existing =
                identity::find_existing(&self.dirs.data, hash, &DataFormat::EXTENSIONS)
                    .map_err(EnvironmentError::io(&self.dirs.data))?;
            if let Some(existing) = existing {
                info!(
                    existing = %existing.display(),
                    "Data for this configuration already exists, skipping run"
                );
                return Ok(RunOutcome::Skipped { existing });
            }
        }

        let grid = generate_grid(&config.parameters, options.base)?;
        let param_sets = expand_parameter_sets(&config.system, &grid);
        info!(
            total = param_sets.len(),
            shape = ?grid.shape(),
            "Generated parameter sets"
        );

        let call = |params: &ParameterSet| func(params);
        let stem = format!("{timestamp}_{hash}");

        if options.estimate_performance {
            match param_sets.first() {
                Some(first) => {
                    let label = self.function_name.as_deref().unwrap_or("sweep_function");
                    self.write_estimates(label, &call, first, &stem)?;
                    self.state = SweepState::Estimated;
                }
                None => warn!("No parameter sets to profile"),
            }
        }

        let (config, _, _) = self.configured("run")?;
        let scheduler = ExecutionScheduler::new(&options.execution);
        let results = if options.progress {
            scheduler.run(&param_sets, &call, &ProgressBarObserver::new())?
        } else {
            scheduler.run(&param_sets, &call, &NoopObserver)?
        };
        info!(results = results.len(), "Simulation completed");

        let config_value = config.to_value();
        let metadata = self.metadata(config, &config_value, &grid.shape());
        let data_path = self.persist(&results, &config_value, &metadata, &stem, &options.data)?;
        info!(path = %data_path.display(), "Results saved");

        self.state = SweepState::Executed;
        Ok(RunOutcome::Completed(results))
    }

    /// Write the configuration snapshot, then the data file.
    ///
    /// The data file marks a configuration as done, so it is written last and
    /// the snapshot is removed again if it cannot be written.
    fn persist(
        &self,
        results: &[R],
        config_value: &Value,
        metadata: &Metadata,
        stem: &str,
        data_options: &DataOptions,
    ) -> Result<PathBuf> {
        let config_path = self
            .dirs
            .config
            .join(format!("{stem}.{}", ConfigFormat::Toml.extension()));
        save_config(config_value, &config_path, ConfigFormat::Toml)?;

        let data_path = self
            .dirs
            .data
            .join(format!("{stem}.{}", DataFormat::Sweep.extension()));
        if let Err(e) = save_data(results, &data_path, metadata, data_options) {
            if let Err(remove) = fs::remove_file(&config_path) {
                warn!(path = %config_path.display(), error = %remove, "Failed to remove snapshot");
            }
            return Err(e);
        }
        Ok(data_path)
    }

    fn write_estimates<F>(
        &self,
        label: &str,
        func: &F,
        params: &ParameterSet,
        stem: &str,
    ) -> Result<()>
    where
        F: Fn(&ParameterSet) -> std::result::Result<R, BoxError>,
    {
        info!(function = %label, "Estimating performance on the first parameter set");
        let estimator = PerformanceEstimator::new(label);

        let memory = estimator.analyze_memory(func, params)?;
        let memory_path = self.dirs.analysis.join(format!("memory_{stem}.log"));
        atomic_write(&memory_path, &memory.to_string())
            .map_err(EnvironmentError::io(&memory_path))?;
        info!(
            peak_mib = memory.peak_memory,
            path = %memory_path.display(),
            "Memory estimate written"
        );

        let time = estimator.analyze_time(func, params)?;
        let time_path = self.dirs.analysis.join(format!("time_{stem}.log"));
        atomic_write(&time_path, &time.to_string()).map_err(EnvironmentError::io(&time_path))?;
        info!(
            seconds = time.cumulative_time,
            path = %time_path.display(),
            "Time estimate written"
        );
        Ok(())
    }

    fn metadata(&self, config: &SweepConfig, config_value: &Value, shape: &[usize]) -> Metadata {
        let mut metadata = Metadata::new();
        metadata.insert("system".to_string(), Value::Object(config.system.clone()));
        metadata.insert(
            "parameters".to_string(),
            config_value
                .get("parameters")
                .cloned()
                .unwrap_or_else(|| Value::Object(Map::new())),
        );
        metadata.insert("project_name".to_string(), Value::from(self.project_name.clone()));
        if let Some(hash) = &self.config_hash {
            metadata.insert("config_hash".to_string(), Value::from(hash.as_str()));
        }
        if let Some(timestamp) = &self.timestamp {
            metadata.insert("timestamp".to_string(), Value::from(timestamp.as_str()));
        }
        metadata.insert("grid_shape".to_string(), Value::from(shape.to_vec()));
        metadata
    }
}
