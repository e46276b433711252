//! Single-run performance estimation
//!
//! Before a full sweep starts, the sweep function is run once while the
//! process resident memory is sampled, and once more under a span-timing
//! subscriber that records every span opened during the call. Both reports are
//! diagnostic only; a failing call propagates.

use std::fmt;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};
use tracing::span::{Attributes, Id};
use tracing::{Dispatch, Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;

use crate::error::{BoxError, EstimateError};
use crate::grid::ParameterSet;

const MIB: f64 = 1024.0 * 1024.0;

/// Name of the span wrapping the profiled call
const ROOT_SPAN: &str = "sweep_function";

/// Sampling parameters for memory profiling
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemoryProfileOptions {
    pub interval: Duration,
    pub max_samples: usize,
}

impl Default for MemoryProfileOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(100),
            max_samples: 100,
        }
    }
}

/// Resident memory observed while running the sweep function once
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryReport {
    /// Peak resident memory in MiB
    pub peak_memory: f64,
    /// Average resident memory in MiB
    pub average_memory: f64,
    /// First sample, taken before the call, in MiB
    pub base_memory: f64,
    pub total_samples: usize,
    pub raw_measurements: Vec<f64>,
}

impl MemoryReport {
    fn from_samples(samples: Vec<f64>) -> Option<Self> {
        let base_memory = *samples.first()?;
        let peak_memory = samples.iter().copied().fold(f64::MIN, f64::max);
        let average_memory = samples.iter().sum::<f64>() / samples.len() as f64;
        Some(Self {
            peak_memory,
            average_memory,
            base_memory,
            total_samples: samples.len(),
            raw_measurements: samples,
        })
    }
}

impl fmt::Display for MemoryReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Memory Usage Report:")?;
        writeln!(f, "Peak Memory Usage: {:.2} MiB", self.peak_memory)?;
        writeln!(f, "Average Memory Usage: {:.2} MiB", self.average_memory)?;
        writeln!(f, "Base Memory Usage: {:.2} MiB", self.base_memory)?;
        writeln!(f, "Total Samples: {}", self.total_samples)
    }
}

/// Timing of one call of the sweep function
#[derive(Debug, Clone, PartialEq)]
pub struct TimeReport {
    /// Time spent in the function itself, excluding child spans, in seconds
    pub total_time: f64,
    pub calls: u64,
    /// `total_time / calls`, or 0 without calls
    pub time_per_call: f64,
    /// Time including child spans, in seconds
    pub cumulative_time: f64,
    pub function_name: String,
    /// Per-span table sorted by self time
    pub detailed_stats: String,
}

impl fmt::Display for TimeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Time Performance Report:")?;
        writeln!(f, "Function Name: {}", self.function_name)?;
        writeln!(f, "Total Execution Time: {:.4} seconds", self.total_time)?;
        writeln!(f, "Number of Calls: {}", self.calls)?;
        writeln!(f, "Average Time per Call: {:.4} seconds", self.time_per_call)?;
        writeln!(f, "Cumulative Time: {:.4} seconds", self.cumulative_time)?;
        writeln!(f)?;
        writeln!(f, "Detailed Statistics:")?;
        write!(f, "{}", self.detailed_stats)
    }
}

/// Profiles one representative invocation of a sweep function
#[derive(Debug, Clone)]
pub struct PerformanceEstimator {
    label: String,
    memory: MemoryProfileOptions,
}

impl PerformanceEstimator {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            memory: MemoryProfileOptions::default(),
        }
    }

    #[must_use]
    pub fn with_memory_options(mut self, options: MemoryProfileOptions) -> Self {
        self.memory = options;
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Run `func` once while sampling resident memory from a helper thread.
    pub fn analyze_memory<R, F>(
        &self,
        func: &F,
        params: &ParameterSet,
    ) -> Result<MemoryReport, EstimateError>
    where
        F: Fn(&ParameterSet) -> Result<R, BoxError>,
    {
        let max_samples = self.memory.max_samples.max(2);
        let interval = self.memory.interval;

        let mut sampler = MemorySampler::new()?;
        let base = sampler.sample()?;

        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let (result, samples) = std::thread::scope(|scope| {
            let handle = scope.spawn(move || -> Result<Vec<f64>, EstimateError> {
                let mut sampler = MemorySampler::new()?;
                let mut samples = vec![base];
                // Keep one slot for the sample taken after the call
                while samples.len() < max_samples - 1 {
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => samples.push(sampler.sample()?),
                        _ => break,
                    }
                }
                Ok(samples)
            });

            let result = func(params);
            // The sampler may already have exited after filling its slots
            let _ = stop_tx.send(());
            let samples = handle
                .join()
                .map_err(|_| EstimateError::Sampler("sampler thread panicked".to_string()));
            (result, samples)
        });

        result.map_err(EstimateError::Invocation)?;
        let mut samples = samples??;
        samples.push(sampler.sample()?);

        MemoryReport::from_samples(samples)
            .ok_or_else(|| EstimateError::Sampler("no memory samples recorded".to_string()))
    }

    /// Run `func` once under a span-timing subscriber.
    ///
    /// Events emitted during the call still reach the caller's subscriber.
    pub fn analyze_time<R, F>(
        &self,
        func: &F,
        params: &ParameterSet,
    ) -> Result<TimeReport, EstimateError>
    where
        F: Fn(&ParameterSet) -> Result<R, BoxError>,
    {
        let profiler = SpanProfiler::default();
        let outer = tracing::dispatcher::get_default(Dispatch::clone);
        let subscriber = tracing_subscriber::registry()
            .with(profiler.clone())
            .with(ForwardEvents(outer));

        let result = tracing::subscriber::with_default(subscriber, || {
            let span = tracing::info_span!(ROOT_SPAN, function = %self.label);
            span.in_scope(|| func(params))
        });
        result.map_err(EstimateError::Invocation)?;

        Ok(profiler.report(&self.label))
    }

    /// Memory pass followed by timing pass
    pub fn estimate<R, F>(
        &self,
        func: &F,
        params: &ParameterSet,
    ) -> Result<(MemoryReport, TimeReport), EstimateError>
    where
        F: Fn(&ParameterSet) -> Result<R, BoxError>,
    {
        let memory = self.analyze_memory(func, params)?;
        let time = self.analyze_time(func, params)?;
        Ok((memory, time))
    }
}

struct MemorySampler {
    system: System,
    pid: Pid,
}

impl MemorySampler {
    fn new() -> Result<Self, EstimateError> {
        let pid = sysinfo::get_current_pid().map_err(|e| EstimateError::Sampler(e.to_string()))?;
        Ok(Self {
            system: System::new(),
            pid,
        })
    }

    /// Resident memory of this process in MiB
    fn sample(&mut self) -> Result<f64, EstimateError> {
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[self.pid]),
            true,
            ProcessRefreshKind::nothing().with_memory(),
        );
        self.system
            .process(self.pid)
            .map(|p| p.memory() as f64 / MIB)
            .ok_or_else(|| EstimateError::Sampler(format!("process {} not found", self.pid)))
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct SpanStats {
    calls: u64,
    self_time: Duration,
    cumulative: Duration,
}

/// Per-span bookkeeping stored in the span's extensions
#[derive(Default)]
struct Timing {
    entered_at: Option<Instant>,
    busy: Duration,
    children: Duration,
}

/// Call-graph profiler built on span enter/exit notifications
#[derive(Clone, Default)]
struct SpanProfiler {
    stats: Arc<Mutex<IndexMap<String, SpanStats>>>,
}

impl SpanProfiler {
    fn report(&self, label: &str) -> TimeReport {
        let stats = match self.stats.lock() {
            Ok(stats) => stats.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };

        let root = stats.get(ROOT_SPAN).copied().unwrap_or_default();
        let total_time = root.self_time.as_secs_f64();
        let time_per_call = if root.calls > 0 {
            total_time / root.calls as f64
        } else {
            0.0
        };

        TimeReport {
            total_time,
            calls: root.calls,
            time_per_call,
            cumulative_time: root.cumulative.as_secs_f64(),
            function_name: label.to_string(),
            detailed_stats: render_table(&stats, label),
        }
    }
}

fn render_table(stats: &IndexMap<String, SpanStats>, label: &str) -> String {
    let mut rows: Vec<(&String, &SpanStats)> = stats.iter().collect();
    rows.sort_by(|a, b| b.1.self_time.cmp(&a.1.self_time));

    let mut out = format!(
        "{:>8} {:>12} {:>12} {:>12}  {}\n",
        "calls", "self (s)", "percall (s)", "cumul (s)", "span"
    );
    for (name, s) in rows {
        let self_secs = s.self_time.as_secs_f64();
        let per_call = if s.calls > 0 {
            self_secs / s.calls as f64
        } else {
            0.0
        };
        let name = if name == ROOT_SPAN { label } else { name.as_str() };
        out.push_str(&format!(
            "{:>8} {:>12.6} {:>12.6} {:>12.6}  {}\n",
            s.calls,
            self_secs,
            per_call,
            s.cumulative.as_secs_f64(),
            name
        ));
    }
    out
}

impl<S> Layer<S> for SpanProfiler
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, _attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        if let Some(span) = ctx.span(id) {
            span.extensions_mut().insert(Timing::default());
        }
    }

    fn on_enter(&self, id: &Id, ctx: Context<'_, S>) {
        if let Some(span) = ctx.span(id)
            && let Some(timing) = span.extensions_mut().get_mut::<Timing>()
        {
            timing.entered_at = Some(Instant::now());
        }
    }

    fn on_exit(&self, id: &Id, ctx: Context<'_, S>) {
        if let Some(span) = ctx.span(id)
            && let Some(timing) = span.extensions_mut().get_mut::<Timing>()
            && let Some(entered_at) = timing.entered_at.take()
        {
            timing.busy += entered_at.elapsed();
        }
    }

    fn on_close(&self, id: Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(&id) else {
            return;
        };

        let (busy, children) = match span.extensions().get::<Timing>() {
            Some(timing) => (timing.busy, timing.children),
            None => return,
        };

        if let Some(parent) = span.parent()
            && let Some(timing) = parent.extensions_mut().get_mut::<Timing>()
        {
            timing.children += busy;
        }

        let mut stats = match self.stats.lock() {
            Ok(stats) => stats,
            Err(poisoned) => poisoned.into_inner(),
        };
        let entry = stats.entry(span.name().to_string()).or_default();
        entry.calls += 1;
        entry.cumulative += busy;
        entry.self_time += busy.saturating_sub(children);
    }
}

/// Hands events to the dispatcher that was active before profiling began
///
/// Spans stay with the profiling registry; only events are forwarded.
struct ForwardEvents(Dispatch);

impl<S: Subscriber> Layer<S> for ForwardEvents {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if self.0.enabled(event.metadata()) {
            self.0.event(event);
        }
    }
}
