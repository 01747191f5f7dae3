//! Cache Snapshot Model
//!
//! Everything the disk cache persists. The snapshot owns its data; nothing in
//! here refers back into the live material system except the two interned
//! state-block handles a [`PsoRecord`] receives when it is loaded.

use crate::material::{
    BlendState, MaterialSystem, PipelineDescriptor, PrecisionMode, PropertySet, RasterizerState,
    RenderableCache, StageSources, StateBlockRef,
};

/// `system_type` of a cleared snapshot; never a valid material system type.
pub const NO_SYSTEM_TYPE: u8 = 255;

/// Environment attributes a cache must match to be reused as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentFingerprint {
    pub template_hash: [u64; 2],
    pub shader_profile: String,
    pub shading_language_version: u16,
    pub precision_mode: PrecisionMode,
    pub fast_shader_build_hack: bool,
}

impl Default for EnvironmentFingerprint {
    fn default() -> Self {
        Self {
            template_hash: [0; 2],
            shader_profile: String::new(),
            shading_language_version: 0,
            precision_mode: PrecisionMode::Full32,
            fast_shader_build_hack: true,
        }
    }
}

impl EnvironmentFingerprint {
    /// Current fingerprint of a live material system.
    pub fn of<S: MaterialSystem + ?Sized>(live: &S) -> Self {
        Self {
            template_hash: live.template_checksum(),
            shader_profile: live.shader_profile().to_owned(),
            shading_language_version: live.native_shading_language_version(),
            precision_mode: live.supported_precision_mode(),
            fast_shader_build_hack: live.fast_shader_build_hack(),
        }
    }
}

/// A file-backed datablock custom piece the cached shaders depend on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CustomPieceFileRecord {
    pub filename: String,
    pub resource_group: String,
    pub checksum: [u64; 2],
}

/// One generated shader variant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceCodeRecord {
    /// Properties and pieces the variant was generated from.
    pub merged: RenderableCache,
    /// Final source per stage. An empty source is stored as absent.
    pub sources: StageSources,
}

/// One pipeline state object.
#[derive(Debug, Clone, Default)]
pub struct PsoRecord {
    pub renderable: RenderableCache,
    pub pass_properties: PropertySet,
    pub pipeline: PipelineDescriptor,
    pub rasterizer: RasterizerState,
    pub blend: BlendState,
    /// Interned handle, set when the record is loaded from a stream.
    pub rasterizer_ref: Option<StateBlockRef<RasterizerState>>,
    /// Interned handle, set when the record is loaded from a stream.
    pub blend_ref: Option<StateBlockRef<BlendState>>,
}

/// Compares by content; the interned handles are ephemeral and ignored.
impl PartialEq for PsoRecord {
    fn eq(&self, other: &Self) -> bool {
        self.renderable == other.renderable
            && self.pass_properties == other.pass_properties
            && self.pipeline == other.pipeline
            && self.rasterizer == other.rasterizer
            && self.blend == other.blend
    }
}

/// The full persisted state of a disk cache.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheSnapshot {
    /// Which material system the snapshot belongs to.
    pub system_type: u8,
    pub fingerprint: EnvironmentFingerprint,
    pub custom_pieces: Vec<CustomPieceFileRecord>,
    pub source_code: Vec<SourceCodeRecord>,
    pub psos: Vec<PsoRecord>,
}

impl Default for CacheSnapshot {
    fn default() -> Self {
        Self {
            system_type: NO_SYSTEM_TYPE,
            fingerprint: EnvironmentFingerprint::default(),
            custom_pieces: Vec::new(),
            source_code: Vec::new(),
            psos: Vec::new(),
        }
    }
}

impl CacheSnapshot {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resets every field to its empty value. Idempotent.
    pub fn clear(&mut self) {
        self.system_type = NO_SYSTEM_TYPE;
        self.fingerprint = EnvironmentFingerprint::default();
        self.custom_pieces.clear();
        self.source_code.clear();
        self.psos.clear();
    }

    /// `true` when the snapshot holds no records and no system type.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.system_type == NO_SYSTEM_TYPE
            && self.custom_pieces.is_empty()
            && self.source_code.is_empty()
            && self.psos.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clear_is_idempotent() {
        let mut snapshot = CacheSnapshot {
            system_type: 1,
            fingerprint: EnvironmentFingerprint {
                template_hash: [1, 2],
                shader_profile: "glsl".to_owned(),
                shading_language_version: 450,
                precision_mode: PrecisionMode::Midf16,
                fast_shader_build_hack: false,
            },
            source_code: vec![SourceCodeRecord::default()],
            ..CacheSnapshot::default()
        };

        snapshot.clear();
        assert_eq!(snapshot, CacheSnapshot::default());
        assert!(snapshot.is_empty());

        snapshot.clear();
        assert_eq!(snapshot, CacheSnapshot::default());
    }

    #[test]
    fn test_pso_equality_ignores_handles() {
        use std::sync::Arc;

        let plain = PsoRecord::default();
        let interned = PsoRecord {
            rasterizer_ref: Some(StateBlockRef::new(3, Arc::new(RasterizerState::default()))),
            ..PsoRecord::default()
        };
        assert_eq!(plain, interned);
    }
}
