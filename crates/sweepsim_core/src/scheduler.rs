//! Batched execution of the sweep function
//!
//! Parameter sets are cut into contiguous batches. With more than one worker
//! available, each batch is dispatched on a freshly built rayon pool; otherwise
//! batches run in-process one after another. Either way `output[i]` is the
//! result for `param_sets[i]`, and the first failing invocation aborts the
//! sweep before any further batch starts.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

#[cfg(feature = "parallel")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{BoxError, SchedulerError};
use crate::grid::ParameterSet;

/// Default number of in-flight parameter sets per worker and batch
pub const BATCH_SIZE_PER_WORKER: usize = 100;

/// Execution knobs for one sweep
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionOptions {
    /// Parameter sets per batch (default: `workers * 100`)
    #[serde(default)]
    pub batch_size: Option<usize>,
    /// Worker threads (default: available parallelism)
    #[serde(default)]
    pub workers: Option<usize>,
}

/// Number of hardware threads, at least 1
#[must_use]
pub fn available_parallelism() -> usize {
    std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
}

/// Receives per-batch progress notifications.
///
/// Observers are informational only and are called from worker threads.
pub trait BatchObserver: Sync {
    fn batch_started(&self, _index: usize, _total_batches: usize, _len: usize) {}
    fn item_completed(&self, _batch_index: usize) {}
    fn batch_finished(&self, _index: usize) {}
}

/// Observer that ignores every notification
pub struct NoopObserver;

impl BatchObserver for NoopObserver {}

/// Progress tracking shared between the scheduler and whoever watches it
#[derive(Debug, Clone, Default)]
pub struct SweepProgress {
    /// Current batch (1-based, 0 before the first batch)
    batch: Arc<AtomicUsize>,
    total_batches: Arc<AtomicUsize>,
    /// Completed items in the current batch
    completed: Arc<AtomicUsize>,
    /// Items in the current batch
    batch_len: Arc<AtomicUsize>,
    /// Completed items across all batches
    overall: Arc<AtomicUsize>,
}

impl SweepProgress {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn batch(&self) -> usize {
        self.batch.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn total_batches(&self) -> usize {
        self.total_batches.load(Ordering::Relaxed)
    }

    /// Completed items in the current batch
    #[must_use]
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Relaxed)
    }

    /// Size of the current batch
    #[must_use]
    pub fn batch_len(&self) -> usize {
        self.batch_len.load(Ordering::Relaxed)
    }

    /// Completed items across all batches
    #[must_use]
    pub fn overall_completed(&self) -> usize {
        self.overall.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.batch.store(0, Ordering::Relaxed);
        self.total_batches.store(0, Ordering::Relaxed);
        self.completed.store(0, Ordering::Relaxed);
        self.batch_len.store(0, Ordering::Relaxed);
        self.overall.store(0, Ordering::Relaxed);
    }
}

impl BatchObserver for SweepProgress {
    fn batch_started(&self, index: usize, total_batches: usize, len: usize) {
        self.batch.store(index + 1, Ordering::Relaxed);
        self.total_batches.store(total_batches, Ordering::Relaxed);
        self.completed.store(0, Ordering::Relaxed);
        self.batch_len.store(len, Ordering::Relaxed);
    }

    fn item_completed(&self, _batch_index: usize) {
        self.completed.fetch_add(1, Ordering::Relaxed);
        self.overall.fetch_add(1, Ordering::Relaxed);
    }
}

/// Fans several observers out from one
pub struct ObserverSet<'a>(pub Vec<&'a dyn BatchObserver>);

impl BatchObserver for ObserverSet<'_> {
    fn batch_started(&self, index: usize, total_batches: usize, len: usize) {
        for o in &self.0 {
            o.batch_started(index, total_batches, len);
        }
    }

    fn item_completed(&self, batch_index: usize) {
        for o in &self.0 {
            o.item_completed(batch_index);
        }
    }

    fn batch_finished(&self, index: usize) {
        for o in &self.0 {
            o.batch_finished(index);
        }
    }
}

/// Runs a sweep function over an ordered list of parameter sets
#[derive(Debug, Clone)]
pub struct ExecutionScheduler {
    workers: usize,
    batch_size: Option<usize>,
}

impl Default for ExecutionScheduler {
    fn default() -> Self {
        Self::new(&ExecutionOptions::default())
    }
}

impl ExecutionScheduler {
    #[must_use]
    pub fn new(options: &ExecutionOptions) -> Self {
        Self {
            workers: options.workers.unwrap_or_else(available_parallelism).max(1),
            batch_size: options.batch_size,
        }
    }

    #[must_use]
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Whether batches are dispatched to a worker pool
    #[must_use]
    pub fn is_parallel(&self) -> bool {
        cfg!(feature = "parallel") && self.workers > 1
    }

    /// Effective batch size for `total` parameter sets.
    #[must_use]
    pub fn resolve_batch_size(&self, total: usize) -> usize {
        let requested = self
            .batch_size
            .unwrap_or(self.workers * BATCH_SIZE_PER_WORKER)
            .max(1);
        requested.min(total).max(1)
    }

    /// Execute `func` once per parameter set, preserving input order.
    pub fn run<R, F>(
        &self,
        param_sets: &[ParameterSet],
        func: &F,
        observer: &dyn BatchObserver,
    ) -> Result<Vec<R>, SchedulerError>
    where
        R: Send,
        F: Fn(&ParameterSet) -> Result<R, BoxError> + Sync,
    {
        if param_sets.is_empty() {
            return Ok(Vec::new());
        }

        let batch_size = self.resolve_batch_size(param_sets.len());
        let total_batches = param_sets.len().div_ceil(batch_size);

        if self.is_parallel() {
            info!(
                workers = self.workers,
                batch_size, "Dispatching parameter sets to worker pool"
            );
        } else {
            info!(batch_size, "Running parameter sets on a single worker");
        }

        let mut results = Vec::with_capacity(param_sets.len());
        for (batch_index, batch) in param_sets.chunks(batch_size).enumerate() {
            let offset = batch_index * batch_size;
            observer.batch_started(batch_index, total_batches, batch.len());
            debug!(
                batch = batch_index + 1,
                total_batches,
                len = batch.len(),
                "Starting batch"
            );

            let batch_results = if self.is_parallel() {
                self.run_parallel(batch, offset, batch_index, func, observer)?
            } else {
                run_sequential(batch, offset, batch_index, func, observer)?
            };
            results.extend(batch_results);

            observer.batch_finished(batch_index);
        }

        Ok(results)
    }

    #[cfg(feature = "parallel")]
    fn run_parallel<R, F>(
        &self,
        batch: &[ParameterSet],
        offset: usize,
        batch_index: usize,
        func: &F,
        observer: &dyn BatchObserver,
    ) -> Result<Vec<R>, SchedulerError>
    where
        R: Send,
        F: Fn(&ParameterSet) -> Result<R, BoxError> + Sync,
    {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .build()
            .map_err(|e| SchedulerError::ThreadPool(e.to_string()))?;

        // Worker threads log into the caller's subscriber
        let dispatch = tracing::dispatcher::get_default(Clone::clone);

        pool.install(|| {
            batch
                .par_iter()
                .enumerate()
                .map(|(i, params)| {
                    let result = tracing::dispatcher::with_default(&dispatch, || func(params));
                    observer.item_completed(batch_index);
                    result.map_err(|source| SchedulerError::Invocation {
                        index: offset + i,
                        source,
                    })
                })
                .collect()
        })
    }

    #[cfg(not(feature = "parallel"))]
    fn run_parallel<R, F>(
        &self,
        batch: &[ParameterSet],
        offset: usize,
        batch_index: usize,
        func: &F,
        observer: &dyn BatchObserver,
    ) -> Result<Vec<R>, SchedulerError>
    where
        R: Send,
        F: Fn(&ParameterSet) -> Result<R, BoxError> + Sync,
    {
        run_sequential(batch, offset, batch_index, func, observer)
    }
}

fn run_sequential<R, F>(
    batch: &[ParameterSet],
    offset: usize,
    batch_index: usize,
    func: &F,
    observer: &dyn BatchObserver,
) -> Result<Vec<R>, SchedulerError>
where
    F: Fn(&ParameterSet) -> Result<R, BoxError>,
{
    let mut results = Vec::with_capacity(batch.len());
    for (i, params) in batch.iter().enumerate() {
        let result = func(params).map_err(|source| SchedulerError::Invocation {
            index: offset + i,
            source,
        })?;
        observer.item_completed(batch_index);
        results.push(result);
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    fn indexed_sets(n: usize) -> Vec<ParameterSet> {
        (0..n)
            .map(|i| {
                let mut set = ParameterSet::new();
                set.insert("index", i as u64);
                set
            })
            .collect()
    }

    fn echo_index(params: &ParameterSet) -> Result<u64, BoxError> {
        params
            .get("index")
            .and_then(serde_json::Value::as_u64)
            .ok_or_else(|| "missing index".into())
    }

    fn scheduler(workers: usize, batch_size: Option<usize>) -> ExecutionScheduler {
        ExecutionScheduler::new(&ExecutionOptions {
            batch_size,
            workers: Some(workers),
        })
    }

    #[test]
    fn test_resolve_batch_size() {
        assert_eq!(scheduler(4, None).resolve_batch_size(10_000), 400);
        assert_eq!(scheduler(4, None).resolve_batch_size(25), 25);
        assert_eq!(scheduler(1, Some(0)).resolve_batch_size(25), 1);
        assert_eq!(scheduler(2, Some(7)).resolve_batch_size(25), 7);
        assert_eq!(scheduler(2, Some(7)).resolve_batch_size(0), 1);
    }

    #[test]
    fn test_sequential_preserves_order_across_batches() {
        let sets = indexed_sets(23);
        let sched = scheduler(1, Some(5));
        assert!(!sched.is_parallel());

        let results = sched.run(&sets, &echo_index, &NoopObserver).unwrap();
        assert_eq!(results, (0..23).collect::<Vec<u64>>());
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn test_parallel_preserves_order_across_batches() {
        let sets = indexed_sets(97);
        let sched = scheduler(4, Some(10));
        assert!(sched.is_parallel());

        // Uneven work so completion order differs from input order
        let func = |params: &ParameterSet| -> Result<u64, BoxError> {
            let index = echo_index(params)?;
            std::thread::sleep(std::time::Duration::from_micros((97 - index) * 20));
            Ok(index)
        };

        let results = sched.run(&sets, &func, &NoopObserver).unwrap();
        assert_eq!(results, (0..97).collect::<Vec<u64>>());
    }

    #[test]
    fn test_empty_input() {
        let results: Vec<u64> = scheduler(4, None)
            .run(&[], &echo_index, &NoopObserver)
            .unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_failure_aborts_sequential() {
        let sets = indexed_sets(5);
        let calls = AtomicUsize::new(0);
        let func = |params: &ParameterSet| -> Result<u64, BoxError> {
            calls.fetch_add(1, Ordering::SeqCst);
            let index = echo_index(params)?;
            if index == 2 {
                return Err("boom".into());
            }
            Ok(index)
        };

        let err = scheduler(1, Some(1)).run(&sets, &func, &NoopObserver).unwrap_err();
        match err {
            SchedulerError::Invocation { index, source } => {
                assert_eq!(index, 2);
                assert_eq!(source.to_string(), "boom");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn test_failure_aborts_remaining_batches() {
        let sets = indexed_sets(5);
        let calls = AtomicUsize::new(0);
        let func = |params: &ParameterSet| -> Result<u64, BoxError> {
            calls.fetch_add(1, Ordering::SeqCst);
            let index = echo_index(params)?;
            if index == 2 {
                return Err("boom".into());
            }
            Ok(index)
        };

        // Batches of two: [0,1] [2,3] [4]; the third batch never starts
        let err = scheduler(2, Some(2)).run(&sets, &func, &NoopObserver).unwrap_err();
        assert!(matches!(err, SchedulerError::Invocation { index: 2, .. }));
        assert!(calls.load(Ordering::SeqCst) <= 4);
    }

    #[test]
    fn test_progress_observer() {
        #[derive(Default)]
        struct Recorder {
            events: Mutex<Vec<(usize, usize, usize)>>,
        }

        impl BatchObserver for Recorder {
            fn batch_started(&self, index: usize, total: usize, len: usize) {
                self.events.lock().unwrap().push((index, total, len));
            }
        }

        let sets = indexed_sets(7);
        let progress = SweepProgress::new();
        let recorder = Recorder::default();
        let observers = ObserverSet(vec![&progress as &dyn BatchObserver, &recorder]);

        scheduler(1, Some(3)).run(&sets, &echo_index, &observers).unwrap();

        assert_eq!(
            *recorder.events.lock().unwrap(),
            vec![(0, 3, 3), (1, 3, 3), (2, 3, 1)]
        );
        assert_eq!(progress.batch(), 3);
        assert_eq!(progress.total_batches(), 3);
        assert_eq!(progress.completed(), 1);
        assert_eq!(progress.batch_len(), 1);
        assert_eq!(progress.overall_completed(), 7);
    }
}
