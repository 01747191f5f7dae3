//! Live Material System Interface
//!
//! The disk cache does not own the material system it snapshots. Everything
//! it needs from it (environment getters, the shader/PSO tables, the two
//! compile entry points, and the bookkeeping calls made while applying a
//! cache) goes through [`MaterialSystem`]. Deduplication of the two immutable
//! state blocks goes through [`StateBlockInterner`].
//!
//! # Threading
//!
//! `MaterialSystem` requires `Sync`: while a cache is applied, worker threads
//! call the `&self` compile methods concurrently for disjoint record indices.
//! All `&mut self` methods are only ever called from the dispatching thread
//! when no worker is running.

use std::sync::Arc;

use crate::errors::{BoxedCompileError, Result};

use super::properties::{
    Pieces, PropertySet, RenderableCache, SHADER_STAGE_COUNT, StageSources,
};
use super::state::{
    BlendState, PassState, PipelineDescriptor, PrecisionMode, PrimitiveTopology, RasterizerState,
    VertexElementGroup,
};

/// Result of a single shader compilation request.
pub type CompileResult = std::result::Result<(), BoxedCompileError>;

// ─── Live Table Entries ──────────────────────────────────────────────────────

/// A datablock custom piece registered with the material system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomPieceFile {
    pub filename: String,
    pub resource_group: String,
    /// Checksum of the file contents at registration time.
    pub checksum: [u64; 2],
    /// `false` when the piece was registered from memory and cannot be
    /// re-read on a later run.
    pub from_file: bool,
}

impl CustomPieceFile {
    #[inline]
    #[must_use]
    pub fn is_cacheable(&self) -> bool {
        self.from_file
    }
}

/// Outcome of re-registering a cached custom piece file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CustomPieceFileStatus {
    /// The file exists and its checksum matches.
    Success,
    /// The file exists but its contents changed.
    OutOfDate,
    /// The file is missing or unreadable.
    CriticalError,
}

/// One generated shader variant: the inputs it was generated from plus the
/// final per-stage source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShaderCodeCache {
    pub merged: RenderableCache,
    pub sources: StageSources,
}

impl ShaderCodeCache {
    /// Fresh entry that still has to go through template preprocessing.
    #[must_use]
    pub fn from_pieces(pieces: [Pieces; SHADER_STAGE_COUNT]) -> Self {
        Self {
            merged: RenderableCache {
                properties: PropertySet::new(),
                pieces,
            },
            sources: Default::default(),
        }
    }
}

/// Pass-level inputs of a PSO.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassCache {
    pub pass: PassState,
    pub properties: PropertySet,
}

/// An entry of the live PSO table.
#[derive(Debug, Clone)]
pub struct PsoCacheEntry {
    /// Index into [`MaterialSystem::renderable_caches`].
    pub renderable_index: usize,
    /// Index into [`MaterialSystem::pass_caches`].
    pub pass_index: usize,
    pub pipeline: PipelineDescriptor,
    pub rasterizer: StateBlockRef<RasterizerState>,
    pub blend: StateBlockRef<BlendState>,
}

// ─── State Block Handles ─────────────────────────────────────────────────────

/// Long-lived handle to an interned state block.
///
/// The handle keeps the block alive even after it has been released from the
/// pool; the `lifetime_id` identifies the block's value in the pool.
#[derive(Debug)]
pub struct StateBlockRef<T> {
    lifetime_id: u16,
    block: Arc<T>,
}

impl<T> StateBlockRef<T> {
    #[must_use]
    pub fn new(lifetime_id: u16, block: Arc<T>) -> Self {
        Self { lifetime_id, block }
    }

    #[inline]
    #[must_use]
    pub fn lifetime_id(&self) -> u16 {
        self.lifetime_id
    }

    /// `true` when both handles point at the same pooled block.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.block, &other.block)
    }
}

impl<T> Clone for StateBlockRef<T> {
    fn clone(&self) -> Self {
        Self {
            lifetime_id: self.lifetime_id,
            block: Arc::clone(&self.block),
        }
    }
}

impl<T> std::ops::Deref for StateBlockRef<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.block
    }
}

// ─── Traits ──────────────────────────────────────────────────────────────────

/// Value-deduplicating registry for the immutable PSO state blocks.
pub trait StateBlockInterner {
    /// Returns the pooled block equal to `state`, creating it if needed.
    fn intern_rasterizer(
        &mut self,
        state: &RasterizerState,
    ) -> Result<StateBlockRef<RasterizerState>>;

    /// Drops one reference taken by [`Self::intern_rasterizer`]. The handle
    /// itself stays valid.
    fn release_rasterizer(&mut self, block: &StateBlockRef<RasterizerState>);

    fn intern_blend(&mut self, state: &BlendState) -> Result<StateBlockRef<BlendState>>;

    fn release_blend(&mut self, block: &StateBlockRef<BlendState>);

    /// Stable id of a vertex layout + topology combination. Fails once no
    /// id is left for a new combination.
    fn input_layout_id(
        &mut self,
        vertex_elements: &[VertexElementGroup],
        topology: PrimitiveTopology,
    ) -> Result<u16>;
}

/// The live material system a cache is captured from and applied to.
pub trait MaterialSystem: Sync {
    // ---- Environment ----

    /// Identifies which material system (PBS, unlit, …) this is.
    fn system_type(&self) -> u8;

    fn shader_profile(&self) -> &str;

    fn native_shading_language_version(&self) -> u16;

    fn supported_precision_mode(&self) -> PrecisionMode;

    fn fast_shader_build_hack(&self) -> bool;

    /// 128-bit checksum over all template sources.
    fn template_checksum(&self) -> [u64; 2];

    fn supports_multithreaded_compilation(&self) -> bool;

    // ---- Tables ----

    fn custom_piece_files(&self) -> &[CustomPieceFile];

    /// Whether the custom piece whose name hash is `name` may be cached.
    fn is_custom_piece_file_cacheable(&self, name: i32) -> bool;

    fn shader_code_cache(&self) -> &[ShaderCodeCache];

    fn renderable_caches(&self) -> &[RenderableCache];

    fn pass_caches(&self) -> &[PassCache];

    fn pso_cache(&self) -> &[PsoCacheEntry];

    // ---- Apply ----

    /// Drops every generated shader and PSO.
    fn clear_shader_cache(&mut self);

    fn add_or_refresh_custom_piece_file(
        &mut self,
        filename: &str,
        resource_group: &str,
        expected_checksum: [u64; 2],
    ) -> CustomPieceFileStatus;

    /// Called before spawning `num_threads` compile workers.
    fn set_num_threads(&mut self, _num_threads: usize) {}

    /// Compiles already preprocessed source. Must be safe to call concurrently
    /// for distinct `index` values.
    fn compile_from_preprocessed_source(
        &self,
        merged: &RenderableCache,
        sources: &StageSources,
        index: usize,
        thread_idx: Option<usize>,
    ) -> CompileResult;

    /// Runs the template preprocessor on `code` and compiles the result. Must
    /// be safe to call concurrently for distinct `index` values.
    fn compile_shader_code(
        &self,
        code: &ShaderCodeCache,
        index: usize,
        thread_idx: Option<usize>,
    ) -> CompileResult;

    fn set_shaders_generated(&mut self, count: usize);

    /// Adds `pass` to the pass table unless an equal entry exists; returns its index.
    fn register_pass_cache(&mut self, pass: PassCache) -> usize;

    fn mark_shader_cache_up_to_date(&mut self);
}
