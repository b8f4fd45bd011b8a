//! Order-preserving work splitting over a bounded worker pool.
//!
//! [`parallelize`] cuts a collection into `min(n_jobs, len)` contiguous chunks
//! of near-equal size, hands each chunk to its own worker and returns the
//! per-chunk results in the original chunk order, whatever order the workers
//! finish in. The pool never has more threads than there are chunks. When
//! several chunks fail, the error of the lowest-index chunk is returned.
//!
//! ```
//! use cellfate_core::{parallelize_with, concatenate, ParallelConfig};
//!
//! let values: Vec<u32> = (0..10).collect();
//! let config = ParallelConfig { n_jobs: 3, ..Default::default() };
//! let doubled = parallelize_with(
//!     |chunk| Ok(chunk.data.iter().map(|v| v * 2).collect::<Vec<_>>()),
//!     &values,
//!     &config,
//!     |parts| Ok(concatenate(parts)),
//! ).unwrap();
//! assert_eq!(doubled, (0..10).map(|v| v * 2).collect::<Vec<_>>());
//! ```

use std::any::Any;
use std::fmt;
use std::ops::Range;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::{CellfateError, Result};

/// A collection that can be cut into contiguous, independently owned pieces.
pub trait Splittable {
    /// Number of items (rows for matrix-like collections).
    fn n_items(&self) -> usize;

    /// Owned copy of the items in `range`.
    fn split(&self, range: Range<usize>) -> Self
    where
        Self: Sized;
}

impl<T: Clone> Splittable for Vec<T> {
    fn n_items(&self) -> usize {
        self.len()
    }

    fn split(&self, range: Range<usize>) -> Self {
        self[range].to_vec()
    }
}

/// One piece of work handed to a worker.
#[derive(Debug, Clone)]
pub struct Chunk<C> {
    /// Position of the chunk in the original order.
    pub index: usize,
    /// Index of the chunk's first item in the original collection.
    pub offset: usize,
    /// The chunk's own copy of the data.
    pub data: C,
}

/// Progress sink invoked with `(finished_chunks, total_chunks)`.
///
/// Failures are logged and otherwise ignored.
pub type ProgressFn = Arc<dyn Fn(usize, usize) -> Result<()> + Send + Sync>;

/// Configuration for [`parallelize`].
#[derive(Clone)]
pub struct ParallelConfig {
    /// Upper bound on the number of chunks and workers.
    pub n_jobs: usize,
    /// Optional best-effort progress reporting.
    pub progress: Option<ProgressFn>,
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self {
            n_jobs: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            progress: None,
        }
    }
}

impl fmt::Debug for ParallelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParallelConfig")
            .field("n_jobs", &self.n_jobs)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

/// Split `n_items` into `min(n_jobs, n_items)` contiguous ranges.
///
/// The first `n_items % n_chunks` ranges are one item longer than the rest.
pub fn chunk_ranges(n_items: usize, n_jobs: usize) -> Vec<Range<usize>> {
    if n_items == 0 || n_jobs == 0 {
        return Vec::new();
    }
    let n_chunks = n_jobs.min(n_items);
    let base = n_items / n_chunks;
    let extra = n_items % n_chunks;

    let mut ranges = Vec::with_capacity(n_chunks);
    let mut start = 0;
    for i in 0..n_chunks {
        let len = base + usize::from(i < extra);
        ranges.push(start..start + len);
        start += len;
    }
    ranges
}

/// Run `callback` on every chunk of `collection` and return the per-chunk
/// results in chunk order.
///
/// # Errors
///
/// Returns an error if `n_jobs` is zero, if the worker pool cannot be built,
/// or if any worker fails or panics. If several fail, the error of the first
/// failing chunk in chunk order wins. Results of other chunks are discarded.
pub fn parallelize<C, R, F>(callback: F, collection: &C, config: &ParallelConfig) -> Result<Vec<R>>
where
    C: Splittable + Send,
    R: Send,
    F: Fn(Chunk<C>) -> Result<R> + Send + Sync,
{
    if config.n_jobs == 0 {
        return Err(CellfateError::InvalidInput(
            "n_jobs must be at least 1".into(),
        ));
    }

    let n_items = collection.n_items();
    let ranges = chunk_ranges(n_items, config.n_jobs);
    let n_chunks = ranges.len();
    if n_chunks == 0 {
        return Ok(Vec::new());
    }

    let chunks: Vec<Chunk<C>> = ranges
        .into_iter()
        .enumerate()
        .map(|(index, range)| Chunk {
            index,
            offset: range.start,
            data: collection.split(range),
        })
        .collect();

    tracing::debug!(n_items, n_chunks, n_jobs = config.n_jobs, "dispatching chunks");

    let finished = AtomicUsize::new(0);
    let run = |chunk: Chunk<C>| -> Result<R> {
        let index = chunk.index;
        let result = catch_unwind(AssertUnwindSafe(|| callback(chunk))).map_err(|payload| {
            CellfateError::Worker(format!(
                "chunk {index} panicked: {}",
                panic_message(payload.as_ref())
            ))
        })?;
        let done = finished.fetch_add(1, Ordering::Relaxed) + 1;
        report_progress(config.progress.as_ref(), done, n_chunks);
        result
    };

    execute(chunks, run)
}

/// Like [`parallelize`], but hands the ordered per-chunk results to
/// `extractor` to build the final value.
pub fn parallelize_with<C, R, O, F, E>(
    callback: F,
    collection: &C,
    config: &ParallelConfig,
    extractor: E,
) -> Result<O>
where
    C: Splittable + Send,
    R: Send,
    F: Fn(Chunk<C>) -> Result<R> + Send + Sync,
    E: FnOnce(Vec<R>) -> Result<O>,
{
    let parts = parallelize(callback, collection, config)?;
    extractor(parts)
}

/// Default extractor: concatenate per-chunk vectors in order.
pub fn concatenate<T>(parts: Vec<Vec<T>>) -> Vec<T> {
    let total = parts.iter().map(Vec::len).sum();
    let mut out = Vec::with_capacity(total);
    for part in parts {
        out.extend(part);
    }
    out
}

#[cfg(feature = "parallel")]
fn execute<C, R, G>(chunks: Vec<Chunk<C>>, run: G) -> Result<Vec<R>>
where
    C: Send,
    R: Send,
    G: Fn(Chunk<C>) -> Result<R> + Send + Sync,
{
    use rayon::prelude::*;

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(chunks.len())
        .thread_name(|i| format!("cellfate-worker-{i}"))
        .build()
        .map_err(|e| CellfateError::Worker(format!("failed to build worker pool: {e}")))?;

    let results: Vec<Result<R>> = pool.install(|| chunks.into_par_iter().map(&run).collect());
    results.into_iter().collect()
}

#[cfg(not(feature = "parallel"))]
fn execute<C, R, G>(chunks: Vec<Chunk<C>>, run: G) -> Result<Vec<R>>
where
    G: Fn(Chunk<C>) -> Result<R>,
{
    chunks.into_iter().map(run).collect()
}

fn report_progress(progress: Option<&ProgressFn>, done: usize, total: usize) {
    tracing::debug!(done, total, "chunk finished");
    let Some(progress) = progress else {
        return;
    };
    match catch_unwind(AssertUnwindSafe(|| progress(done, total))) {
        Ok(Ok(())) => {}
        Ok(Err(err)) => tracing::warn!(error = %err, "progress reporting failed"),
        Err(payload) => tracing::warn!(
            error = %panic_message(payload.as_ref()),
            "progress reporting panicked"
        ),
    }
}

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::thread;
    use std::time::Duration;

    fn config(n_jobs: usize) -> ParallelConfig {
        ParallelConfig {
            n_jobs,
            progress: None,
        }
    }

    #[test]
    fn chunk_ranges_near_equal() {
        let ranges = chunk_ranges(10, 3);
        assert_eq!(ranges, vec![0..4, 4..7, 7..10]);
    }

    #[test]
    fn chunk_ranges_more_jobs_than_items() {
        let ranges = chunk_ranges(3, 8);
        assert_eq!(ranges, vec![0..1, 1..2, 2..3]);
    }

    #[test]
    fn chunk_ranges_empty() {
        assert!(chunk_ranges(0, 4).is_empty());
        assert!(chunk_ranges(5, 0).is_empty());
    }

    #[test]
    fn zero_jobs_rejected() {
        let data = vec![1, 2, 3];
        let result = parallelize(|c| Ok(c.data.len()), &data, &config(0));
        assert!(result.is_err());
    }

    #[test]
    fn empty_collection_yields_no_chunks() {
        let data: Vec<u8> = Vec::new();
        let parts = parallelize(|c| Ok(c.data.len()), &data, &config(4)).unwrap();
        assert!(parts.is_empty());
    }

    #[test]
    fn order_preserved_despite_completion_order() {
        let data: Vec<usize> = (0..12).collect();
        // Earlier chunks sleep longer so they finish last.
        let out = parallelize_with(
            |chunk| {
                thread::sleep(Duration::from_millis(10 * (4 - chunk.index as u64)));
                Ok(chunk.data)
            },
            &data,
            &config(4),
            |parts| Ok(concatenate(parts)),
        )
        .unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn offsets_match_chunk_starts() {
        let data: Vec<usize> = (0..7).collect();
        let offsets = parallelize(|c| Ok((c.offset, c.data[0])), &data, &config(3)).unwrap();
        for (offset, first) in offsets {
            assert_eq!(offset, first);
        }
    }

    #[test]
    fn never_more_workers_than_chunks() {
        let data = vec![0u8; 3];
        for n_jobs in [1, 3, 4, 16] {
            let threads = Mutex::new(HashSet::new());
            let parts = parallelize(
                |chunk| {
                    threads.lock().unwrap().insert(thread::current().id());
                    thread::sleep(Duration::from_millis(5));
                    Ok(vec![42; chunk.data.len()])
                },
                &data,
                &config(n_jobs),
            )
            .unwrap();
            let n_chunks = n_jobs.min(3);
            assert_eq!(parts.len(), n_chunks);
            assert!(threads.lock().unwrap().len() <= n_chunks);
            assert_eq!(concatenate(parts), vec![42; 3]);
        }
    }

    #[test]
    fn worker_error_propagates() {
        let data: Vec<usize> = (0..6).collect();
        let result = parallelize(
            |chunk| {
                if chunk.index == 1 {
                    Err(CellfateError::Other("boom".into()))
                } else {
                    Ok(chunk.data.len())
                }
            },
            &data,
            &config(3),
        );
        match result {
            Err(CellfateError::Other(msg)) => assert_eq!(msg, "boom"),
            other => panic!("expected worker error, got {other:?}"),
        }
    }

    #[test]
    fn first_error_in_chunk_order_wins() {
        let data: Vec<usize> = (0..4).collect();
        // chunk 1 fails first in wall-clock time, chunk 0 later
        let result = parallelize(
            |chunk| -> Result<usize> {
                match chunk.index {
                    0 => {
                        thread::sleep(Duration::from_millis(100));
                        Err(CellfateError::Other("chunk 0".into()))
                    }
                    1 => Err(CellfateError::Other("chunk 1".into())),
                    _ => Ok(chunk.data.len()),
                }
            },
            &data,
            &config(4),
        );
        match result {
            Err(CellfateError::Other(msg)) => assert_eq!(msg, "chunk 0"),
            other => panic!("expected chunk 0 error, got {other:?}"),
        }
    }

    #[test]
    fn worker_panic_becomes_error() {
        let data: Vec<usize> = (0..4).collect();
        let result = parallelize(
            |chunk| -> Result<usize> {
                if chunk.index == 0 {
                    panic!("worker exploded");
                }
                Ok(chunk.data.len())
            },
            &data,
            &config(2),
        );
        match result {
            Err(CellfateError::Worker(msg)) => assert!(msg.contains("worker exploded")),
            other => panic!("expected worker error, got {other:?}"),
        }
    }

    #[test]
    fn failing_progress_does_not_affect_result() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let config = ParallelConfig {
            n_jobs: 2,
            progress: Some(Arc::new(move |_done: usize, _total: usize| {
                seen.fetch_add(1, Ordering::SeqCst);
                Err(CellfateError::Other("progress sink closed".into()))
            })),
        };
        let data: Vec<usize> = (0..5).collect();
        let out = parallelize_with(|c| Ok(c.data), &data, &config, |p| Ok(concatenate(p))).unwrap();
        assert_eq!(out, data);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
