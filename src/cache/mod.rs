//! Shader Disk Cache
//!
//! [`DiskCache`] persists the generated shaders and PSOs of a
//! [`MaterialSystem`] so a later run can skip template preprocessing and,
//! when nothing relevant changed, shader generation altogether.
//!
//! # Lifecycle
//!
//! ```text
//! save:  copy_from(live) ──► save_to(writer)
//! load:  load_from(reader) ──► apply_to(live, workers)
//!                                 ├─ validity checks (may skip)
//!                                 ├─ parallel compilation (may fail)
//!                                 └─ pass cache replay
//! ```
//!
//! # Submodules
//!
//! - [`snapshot`]: the persisted data model
//! - [`capture`]: live system → snapshot
//! - [`validity`]: snapshot vs. live environment checks
//! - [`dispatch`]: parallel compilation with first-error-wins semantics
//! - [`format`]: binary layout and header gate

pub mod capture;
pub mod dispatch;
pub mod format;
pub mod snapshot;
pub mod validity;

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::codec::{BinaryReader, BinaryWriter};
use crate::errors::Result;
use crate::material::{MaterialSystem, PassCache, StateBlockInterner};
use crate::settings::DiskCacheSettings;

pub use format::{DEBUG_STR_SIZE, FORMAT_VERSION, FormatMismatch, HASH_BITS};
pub use snapshot::{
    CacheSnapshot, CustomPieceFileRecord, EnvironmentFingerprint, NO_SYSTEM_TYPE, PsoRecord,
    SourceCodeRecord,
};
pub use validity::{AbortReason, ApplyDecision};

/// Result of [`DiskCache::load_from`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadStatus {
    /// The snapshot was replaced by the stream's contents.
    Loaded,
    /// The stream was written by an incompatible build; the snapshot is empty.
    Rejected(FormatMismatch),
}

/// Result of [`DiskCache::apply_to`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Every cached shader was compiled and the pass caches replayed.
    Applied {
        /// Number of shaders compiled.
        shaders: usize,
        /// `true` when the templates were preprocessed again.
        reprocessed: bool,
    },
    /// The cache does not fit the live system and was not applied.
    Skipped(AbortReason),
}

/// A persistable snapshot of a material system's shader and PSO caches.
#[derive(Debug, Clone, Default)]
pub struct DiskCache {
    snapshot: CacheSnapshot,
    templates_out_of_date: bool,
}

impl DiskCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Empties the snapshot and resets the out-of-date flag.
    pub fn clear(&mut self) {
        self.snapshot.clear();
        self.templates_out_of_date = false;
    }

    #[inline]
    #[must_use]
    pub fn snapshot(&self) -> &CacheSnapshot {
        &self.snapshot
    }

    /// Whether the last [`apply_to`](Self::apply_to) found the templates stale.
    #[inline]
    #[must_use]
    pub fn templates_out_of_date(&self) -> bool {
        self.templates_out_of_date
    }

    /// Replaces the snapshot with the current state of `live`.
    pub fn copy_from<S: MaterialSystem + ?Sized>(&mut self, live: &S) {
        self.clear();
        self.snapshot = capture::capture(live);
    }

    /// Recreates the cached shaders and pass caches in `live`.
    ///
    /// `num_threads <= 1` compiles on the calling thread. Returns
    /// [`ApplyOutcome::Skipped`] when the cache does not fit `live`, and an
    /// error when a shader fails to compile (the live shader cache is then
    /// left empty).
    pub fn apply_to<S: MaterialSystem + ?Sized>(
        &mut self,
        live: &mut S,
        num_threads: usize,
    ) -> Result<ApplyOutcome> {
        log::info!(
            "Applying shader disk cache: {} shaders, {} PSOs",
            self.snapshot.source_code.len(),
            self.snapshot.psos.len()
        );

        let reprocessed = match validity::check_and_prepare(
            &self.snapshot,
            live,
            &mut self.templates_out_of_date,
        ) {
            ApplyDecision::Abort(reason) => return Ok(ApplyOutcome::Skipped(reason)),
            ApplyDecision::ProceedFull => false,
            ApplyDecision::ProceedWithReprocessing => true,
        };

        let shaders = dispatch::compile(
            &self.snapshot.source_code,
            self.templates_out_of_date,
            live,
            num_threads,
        )?;

        for pso in &self.snapshot.psos {
            live.register_pass_cache(PassCache {
                pass: pso.pipeline.pass.clone(),
                properties: pso.pass_properties.clone(),
            });
        }

        live.mark_shader_cache_up_to_date();

        log::info!("Shader disk cache applied: {shaders} shaders compiled");
        Ok(ApplyOutcome::Applied {
            shaders,
            reprocessed,
        })
    }

    /// [`apply_to`](Self::apply_to) with the worker count from `settings`.
    pub fn apply_with_settings<S: MaterialSystem + ?Sized>(
        &mut self,
        live: &mut S,
        settings: &DiskCacheSettings,
    ) -> Result<ApplyOutcome> {
        self.apply_to(live, settings.effective_workers())
    }

    /// Serializes the snapshot to `writer` and flushes it.
    pub fn save_to<W: Write>(&self, writer: W) -> Result<()> {
        let mut writer = BinaryWriter::new(writer);
        format::encode(&self.snapshot, &mut writer)?;
        writer.flush()?;

        log::info!(
            "Saved shader disk cache: {} shaders, {} PSOs",
            self.snapshot.source_code.len(),
            self.snapshot.psos.len()
        );
        Ok(())
    }

    /// Replaces the snapshot with the contents of `reader`.
    ///
    /// PSO state blocks are interned into `interner` once the whole stream
    /// has been read, so a truncated or corrupt stream leaves it untouched.
    /// On any failure, and on an incompatible header, the snapshot is left
    /// empty.
    pub fn load_from<R: Read, I: StateBlockInterner + ?Sized>(
        &mut self,
        reader: R,
        interner: &mut I,
    ) -> Result<LoadStatus> {
        self.clear();

        let mut reader = BinaryReader::new(reader);
        match format::decode(&mut reader, interner)? {
            format::Decoded::Snapshot(snapshot) => {
                self.snapshot = *snapshot;
                log::info!(
                    "Loaded shader disk cache: {} shaders, {} PSOs",
                    self.snapshot.source_code.len(),
                    self.snapshot.psos.len()
                );
                Ok(LoadStatus::Loaded)
            }
            format::Decoded::Rejected(mismatch) => {
                log::info!("{mismatch}. Shader disk cache will be regenerated.");
                Ok(LoadStatus::Rejected(mismatch))
            }
        }
    }

    /// Writes the snapshot to a file at `path`, replacing it.
    pub fn save_to_path(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = File::create(path.as_ref())?;
        self.save_to(BufWriter::new(file))
    }

    /// Loads the snapshot from the file at `path`.
    pub fn load_from_path<I: StateBlockInterner + ?Sized>(
        &mut self,
        path: impl AsRef<Path>,
        interner: &mut I,
    ) -> Result<LoadStatus> {
        let file = File::open(path.as_ref())?;
        self.load_from(BufReader::new(file), interner)
    }
}
