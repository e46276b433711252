//! Per-sweep file logging
//!
//! Each configured sweep writes to its own file under the project's `logs`
//! directory. The subscriber is installed as the thread default for as long as
//! the returned [`LoggingHandle`] lives, and the scheduler forwards it to its
//! worker threads.

use std::ffi::OsString;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::subscriber::DefaultGuard;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Registry, fmt as tfmt, layer::SubscriberExt, reload};

use crate::environment::SweepContext;
use crate::error::{EnvironmentError, Result};

/// Default rotation threshold (1 MB)
pub const DEFAULT_ROTATION_SIZE: u64 = 1024 * 1024;
pub const DEFAULT_RETENTION: usize = 5;
pub const DEFAULT_FILENAME_TEMPLATE: &str = "{timestamp}_{hash}.log";

/// Log severity accepted in configuration
///
/// `Success` logs at info level and `Critical` at error level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Success,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    /// Filter directive understood by `EnvFilter`
    pub fn as_directive(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info | LogLevel::Success => "info",
            LogLevel::Warning => "warn",
            LogLevel::Error | LogLevel::Critical => "error",
        }
    }
}

impl FromStr for LogLevel {
    type Err = EnvironmentError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "DEBUG" | "TRACE" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "SUCCESS" => Ok(LogLevel::Success),
            "WARNING" | "WARN" => Ok(LogLevel::Warning),
            "ERROR" => Ok(LogLevel::Error),
            "CRITICAL" => Ok(LogLevel::Critical),
            other => Err(EnvironmentError::Logging(format!("unknown log level '{other}'"))),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Success => "SUCCESS",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
            LogLevel::Critical => "CRITICAL",
        };
        f.write_str(name)
    }
}

/// Line layout of the log file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Full,
    Compact,
    Json,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogConfig {
    pub level: LogLevel,
    /// Rotate once the file grows past this many bytes
    pub rotation_size: u64,
    /// Number of rotated archives kept next to the live file
    pub retention_count: usize,
    /// zstd-compress rotated archives
    pub compression: bool,
    pub format: LogFormat,
    /// File name with `{timestamp}`, `{project}` and `{hash}` placeholders
    pub filename_template: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            rotation_size: DEFAULT_ROTATION_SIZE,
            retention_count: DEFAULT_RETENTION,
            compression: true,
            format: LogFormat::Full,
            filename_template: None,
        }
    }
}

impl LogConfig {
    /// Resolve the log file name for the sweep described by `ctx`.
    pub fn file_name(&self, ctx: &dyn SweepContext) -> String {
        let template = self
            .filename_template
            .as_deref()
            .unwrap_or(DEFAULT_FILENAME_TEMPLATE);
        template
            .replace("{timestamp}", ctx.timestamp().unwrap_or("unstamped"))
            .replace("{project}", ctx.project_name())
            .replace("{hash}", ctx.config_hash().map(|h| h.as_str()).unwrap_or("nohash"))
    }
}

/// Log file opened for a sweep but not yet receiving events
///
/// Opening is the fallible half of installing a sink, so a caller can check
/// it before releasing the sink it replaces.
pub struct LogSink {
    path: PathBuf,
    file: RotatingFile,
}

impl LogSink {
    pub fn open(ctx: &dyn SweepContext, config: &LogConfig) -> Result<Self> {
        let logs_dir = &ctx.dirs().logs;
        fs::create_dir_all(logs_dir).map_err(EnvironmentError::io(logs_dir))?;
        let path = logs_dir.join(config.file_name(ctx));

        let file = RotatingFile::open(
            &path,
            config.rotation_size,
            config.retention_count,
            config.compression,
        )
        .map_err(EnvironmentError::io(&path))?;
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl fmt::Debug for LogSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogSink").field("path", &self.path).finish_non_exhaustive()
    }
}

/// Keeps the sweep's log sink installed; dropping it flushes and detaches.
pub struct LoggingHandle {
    path: PathBuf,
    level: LogLevel,
    filter: reload::Handle<EnvFilter, Registry>,
    // Dropped in declaration order: detach first, then flush
    _default: DefaultGuard,
    _worker: WorkerGuard,
}

impl fmt::Debug for LoggingHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoggingHandle")
            .field("path", &self.path)
            .field("level", &self.level)
            .finish_non_exhaustive()
    }
}

impl LoggingHandle {
    /// Open the log file for `ctx` and install the subscriber on this thread.
    ///
    /// `RUST_LOG` overrides the configured level.
    pub fn install(ctx: &dyn SweepContext, config: &LogConfig) -> Result<Self> {
        Ok(Self::attach(LogSink::open(ctx, config)?, config))
    }

    /// Install an already opened sink as this thread's subscriber.
    pub fn attach(sink: LogSink, config: &LogConfig) -> Self {
        let LogSink { path, file } = sink;
        let (writer, worker) = tracing_appender::non_blocking(file);

        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.level.as_directive()));
        let (filter_layer, filter) = reload::Layer::new(env_filter);

        let full = (config.format == LogFormat::Full).then(|| {
            tfmt::layer()
                .with_writer(writer.clone())
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(true)
        });
        let compact = (config.format == LogFormat::Compact).then(|| {
            tfmt::layer()
                .compact()
                .with_writer(writer.clone())
                .with_ansi(false)
        });
        let json = (config.format == LogFormat::Json).then(|| {
            tfmt::layer()
                .json()
                .with_writer(writer.clone())
                .with_current_span(true)
        });

        let subscriber = tracing_subscriber::registry()
            .with(filter_layer)
            .with(full)
            .with(compact)
            .with(json);
        let default = tracing::subscriber::set_default(subscriber);

        tracing::info!(
            log_path = %path.display(),
            level = %config.level,
            "Sweep logging initialized"
        );

        Self {
            path,
            level: config.level,
            filter,
            _default: default,
            _worker: worker,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn level(&self) -> LogLevel {
        self.level
    }

    /// Swap the active level without reopening the file.
    pub fn change_level(&mut self, level: LogLevel) -> Result<()> {
        self.filter
            .reload(EnvFilter::new(level.as_directive()))
            .map_err(|e| EnvironmentError::Logging(e.to_string()))?;
        self.level = level;
        tracing::info!(level = %level, "Log level changed");
        Ok(())
    }
}

/// Install a stderr subscriber for command-line use.
pub fn init_console(level: &str) -> Result<()> {
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tfmt::layer().with_writer(io::stderr).with_target(false))
        .try_init()
        .map_err(|e| EnvironmentError::Logging(e.to_string()))
}

/// Append-only log file with size-based rotation into numbered archives
struct RotatingFile {
    path: PathBuf,
    file: File,
    written: u64,
    max_size: u64,
    retention: usize,
    compress: bool,
}

impl RotatingFile {
    fn open(path: &Path, max_size: u64, retention: usize, compress: bool) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let written = file.metadata()?.len();
        let mut rotating = Self {
            path: path.to_path_buf(),
            file,
            written,
            max_size,
            retention,
            compress,
        };
        if rotating.written > rotating.max_size {
            rotating.rotate()?;
        }
        Ok(rotating)
    }

    fn archive_path(&self, index: usize, compressed: bool) -> PathBuf {
        let mut name = OsString::from(self.path.as_os_str());
        name.push(format!(".{index}"));
        if compressed {
            name.push(".zst");
        }
        PathBuf::from(name)
    }

    /// Shift archives up by one and move the live file to `.1`.
    fn rotate(&mut self) -> io::Result<()> {
        self.file.flush()?;

        if self.retention == 0 {
            self.file = File::create(&self.path)?;
            self.written = 0;
            return Ok(());
        }

        for compressed in [false, true] {
            remove_if_exists(&self.archive_path(self.retention, compressed))?;
        }
        for index in (1..self.retention).rev() {
            for compressed in [false, true] {
                let from = self.archive_path(index, compressed);
                if from.exists() {
                    fs::rename(&from, self.archive_path(index + 1, compressed))?;
                }
            }
        }

        let first = self.archive_path(1, false);
        fs::rename(&self.path, &first)?;
        if self.compress {
            let raw = fs::read(&first)?;
            let packed = zstd::encode_all(&raw[..], 3)?;
            fs::write(self.archive_path(1, true), packed)?;
            fs::remove_file(&first)?;
        }

        self.file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        self.written = 0;
        Ok(())
    }
}

fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

impl Write for RotatingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.written > 0 && self.written + buf.len() as u64 > self.max_size {
            if let Err(e) = self.rotate() {
                eprintln!("Warning: Failed to rotate log file: {}", e);
            }
        }
        let n = self.file.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::ProjectDirs;
    use sweepsim_core::{ConfigHash, compute_hash};
    use tempfile::tempdir;

    struct FixedContext {
        dirs: ProjectDirs,
        hash: ConfigHash,
    }

    impl FixedContext {
        fn new(root: &Path) -> Self {
            Self {
                dirs: ProjectDirs::new(root, "demo"),
                hash: compute_hash(&serde_json::json!({"system": {}}), "demo"),
            }
        }
    }

    impl SweepContext for FixedContext {
        fn project_name(&self) -> &str {
            "demo"
        }

        fn dirs(&self) -> &ProjectDirs {
            &self.dirs
        }

        fn timestamp(&self) -> Option<&str> {
            Some("20250101_120000")
        }

        fn config_hash(&self) -> Option<&ConfigHash> {
            Some(&self.hash)
        }
    }

    #[test]
    fn test_log_level_parsing() {
        assert_eq!("info".parse::<LogLevel>().unwrap(), LogLevel::Info);
        assert_eq!("WARNING".parse::<LogLevel>().unwrap(), LogLevel::Warning);
        assert_eq!("Success".parse::<LogLevel>().unwrap(), LogLevel::Success);
        assert!("verbose".parse::<LogLevel>().is_err());

        assert_eq!(LogLevel::Success.as_directive(), "info");
        assert_eq!(LogLevel::Critical.as_directive(), "error");
        assert_eq!(LogLevel::Warning.to_string(), "WARNING");
    }

    #[test]
    fn test_file_name_template() {
        let dir = tempdir().unwrap();
        let ctx = FixedContext::new(dir.path());

        let default = LogConfig::default();
        assert_eq!(default.file_name(&ctx), format!("20250101_120000_{}.log", ctx.hash));

        let custom = LogConfig {
            filename_template: Some("{project}-{timestamp}_{hash}.log".to_string()),
            ..LogConfig::default()
        };
        assert_eq!(
            custom.file_name(&ctx),
            format!("demo-20250101_120000_{}.log", ctx.hash)
        );
    }

    #[test]
    fn test_install_writes_and_changes_level() {
        let dir = tempdir().unwrap();
        let ctx = FixedContext::new(dir.path());
        let config = LogConfig {
            compression: false,
            ..LogConfig::default()
        };

        let mut handle = LoggingHandle::install(&ctx, &config).unwrap();
        let path = handle.path().to_path_buf();
        tracing::info!("first message");
        handle.change_level(LogLevel::Warning).unwrap();
        assert_eq!(handle.level(), LogLevel::Warning);
        tracing::info!("suppressed message");
        tracing::warn!("warning message");
        drop(handle);

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("first message"));
        assert!(content.contains("warning message"));
        assert!(!content.contains("suppressed message"));
    }

    #[test]
    fn test_json_format() {
        let dir = tempdir().unwrap();
        let ctx = FixedContext::new(dir.path());
        let config = LogConfig {
            format: LogFormat::Json,
            ..LogConfig::default()
        };

        let handle = LoggingHandle::install(&ctx, &config).unwrap();
        let path = handle.path().to_path_buf();
        tracing::info!(points = 3, "json line");
        drop(handle);

        let content = fs::read_to_string(&path).unwrap();
        let line = content.lines().find(|l| l.contains("json line")).unwrap();
        let value: serde_json::Value = serde_json::from_str(line).unwrap();
        assert_eq!(value["fields"]["points"], serde_json::json!(3));
    }

    #[test]
    fn test_rotation_keeps_retention_count() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("run.log");
        let mut file = RotatingFile::open(&path, 64, 2, false).unwrap();

        for i in 0..10 {
            let line = format!("line {i:02} padding padding padding padding padding\n");
            file.write_all(line.as_bytes()).unwrap();
        }
        file.flush().unwrap();

        assert!(path.exists());
        assert!(dir.path().join("run.log.1").exists());
        assert!(dir.path().join("run.log.2").exists());
        assert!(!dir.path().join("run.log.3").exists());

        let live = fs::read_to_string(&path).unwrap();
        assert!(live.contains("line 09"));
    }

    #[test]
    fn test_rotation_compresses_archives() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("run.log");
        let mut file = RotatingFile::open(&path, 32, 3, true).unwrap();

        file.write_all(b"first line that is long enough to fill\n").unwrap();
        file.write_all(b"second line\n").unwrap();
        file.flush().unwrap();

        let archive = dir.path().join("run.log.1.zst");
        assert!(archive.exists());
        assert!(!dir.path().join("run.log.1").exists());

        let raw = zstd::decode_all(&fs::read(&archive).unwrap()[..]).unwrap();
        assert!(String::from_utf8(raw).unwrap().contains("first line"));
    }

    #[test]
    fn test_oversized_file_rotates_on_open() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("run.log");
        fs::write(&path, vec![b'x'; 200]).unwrap();

        let file = RotatingFile::open(&path, 100, 1, false).unwrap();
        assert_eq!(file.written, 0);
        assert_eq!(fs::metadata(dir.path().join("run.log.1")).unwrap().len(), 200);
    }
}
