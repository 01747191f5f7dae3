//! Parallel Shader Compilation
//!
//! Compiles the cached source records, optionally on a pool of scoped worker
//! threads spawned for the duration of the call.
//!
//! # Work distribution
//!
//! Workers share an atomic cursor and repeatedly `fetch_add` it to claim the
//! next record index until it runs past the end. There is no per-worker
//! queue, so load balances itself regardless of how long each record takes.
//!
//! # Failure
//!
//! The first failing worker stores its error in a mutex-guarded slot and
//! pushes the cursor to the end so no further records are claimed. Records
//! already being compiled on other workers finish normally; their errors, if
//! any, are dropped. After all workers have joined the live shader cache is
//! cleared and the stored error returned.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use parking_lot::Mutex;

use crate::errors::{CacheError, Result};
use crate::material::{CompileResult, MaterialSystem, ShaderCodeCache};

use super::snapshot::SourceCodeRecord;

/// State shared by all compile workers of one [`compile`] call.
struct CompileJob<'a, S: ?Sized> {
    live: &'a S,
    records: &'a [SourceCodeRecord],
    templates_out_of_date: bool,
    cursor: AtomicUsize,
    first_error: Mutex<Option<CacheError>>,
}

impl<'a, S: MaterialSystem + ?Sized> CompileJob<'a, S> {
    fn new(live: &'a S, records: &'a [SourceCodeRecord], templates_out_of_date: bool) -> Self {
        Self {
            live,
            records,
            templates_out_of_date,
            cursor: AtomicUsize::new(0),
            first_error: Mutex::new(None),
        }
    }

    /// Worker loop; identical on every thread.
    fn run(&self, thread_idx: Option<usize>) {
        let num_records = self.records.len();

        loop {
            let index = self.cursor.fetch_add(1, Ordering::Relaxed);
            if index >= num_records {
                break;
            }

            if let Err(source) = self.compile_record(index, thread_idx) {
                self.record_failure(CacheError::Compile { index, source });
            }
        }
    }

    fn compile_record(&self, index: usize, thread_idx: Option<usize>) -> CompileResult {
        let record = &self.records[index];

        if self.templates_out_of_date {
            let mut code = ShaderCodeCache::from_pieces(record.merged.pieces.clone());
            code.merged.properties = record.merged.properties.clone();
            self.live.compile_shader_code(&code, index, thread_idx)
        } else {
            self.live.compile_from_preprocessed_source(
                &record.merged,
                &record.sources,
                index,
                thread_idx,
            )
        }
    }

    /// Keeps the first error and stops further records from being claimed.
    fn record_failure(&self, error: CacheError) {
        let mut slot = self.first_error.lock();
        if slot.is_none() {
            self.cursor.store(self.records.len(), Ordering::Relaxed);
            log::error!("{error}. Aborting shader cache compilation.");
            *slot = Some(error);
        } else {
            log::debug!("Discarding additional shader cache failure: {error}");
        }
    }

    fn into_error(self) -> Option<CacheError> {
        self.first_error.into_inner()
    }
}

/// Compiles every record, returning the number of shaders generated.
///
/// Runs on the calling thread when `num_threads <= 1` or the backend cannot
/// compile concurrently; otherwise spawns exactly `num_threads` workers and
/// blocks until all of them have finished. On failure the live shader cache
/// is cleared and the first error is returned.
pub fn compile<S: MaterialSystem + ?Sized>(
    records: &[SourceCodeRecord],
    templates_out_of_date: bool,
    live: &mut S,
    num_threads: usize,
) -> Result<usize> {
    let threaded = live.supports_multithreaded_compilation() && num_threads > 1;
    if threaded {
        live.set_num_threads(num_threads);
    }

    let error = {
        let job = CompileJob::new(&*live, records, templates_out_of_date);

        if threaded {
            if let Err(e) = run_workers(&job, num_threads) {
                job.record_failure(e);
            }
        } else {
            job.run(None);
        }

        job.into_error()
    };

    if let Some(error) = error {
        live.clear_shader_cache();
        return Err(error);
    }

    live.set_shaders_generated(records.len());
    Ok(records.len())
}

/// Runs `job` on `num_threads` scoped workers and joins them.
fn run_workers<S: MaterialSystem + ?Sized>(
    job: &CompileJob<'_, S>,
    num_threads: usize,
) -> Result<()> {
    log::debug!(
        "Compiling {} cached shaders on {num_threads} threads",
        job.records.len()
    );

    thread::scope(|scope| {
        let mut workers = Vec::with_capacity(num_threads);

        for thread_idx in 0..num_threads {
            let spawned = thread::Builder::new()
                .name(format!("ShCmplr#{thread_idx}"))
                .spawn_scoped(scope, move || job.run(Some(thread_idx)));

            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    // Workers already running drain the remaining records.
                    log::warn!("Failed to spawn shader compiler thread {thread_idx}: {e}");
                    if workers.is_empty() {
                        return Err(CacheError::ThreadSpawn(e));
                    }
                    break;
                }
            }
        }

        let mut panicked = None;
        for handle in workers {
            if let Err(payload) = handle.join() {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_owned())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_owned());
                panicked.get_or_insert(message);
            }
        }

        match panicked {
            Some(message) => Err(CacheError::WorkerPanicked(message)),
            None => Ok(()),
        }
    })
}
