//! Material System Types
//!
//! Data produced by the shader generation subsystem that the disk cache
//! snapshots, and the interface through which the cache talks to it:
//!
//! - [`properties`]: property keys, property sets, pieces and stages
//! - [`state`]: fixed-function pipeline state and its wire enums
//! - [`system`]: the [`MaterialSystem`] / [`StateBlockInterner`] collaborator traits
//! - [`state_blocks`]: [`StateBlockPool`], the default interner

pub mod properties;
pub mod state;
pub mod state_blocks;
pub mod system;

pub use properties::{
    Pieces, PropertyKey, PropertySet, RenderableCache, SHADER_STAGE_COUNT, ShaderStage,
    StageSources, keys,
};
pub use state::{
    AlphaToCoverage, BlendFactor, BlendOperation, BlendState, ColorWrites, CompareFunction,
    CullMode, PassState, PipelineDescriptor, PolygonMode, PrecisionMode, PrimitiveTopology,
    RasterizerState, VertexElement, VertexElementGroup, VertexFormat, VertexSemantic,
};
pub use state_blocks::{MAX_STATE_BLOCKS, StateBlockPool};
pub use system::{
    CompileResult, CustomPieceFile, CustomPieceFileStatus, MaterialSystem, PassCache,
    PsoCacheEntry, ShaderCodeCache, StateBlockInterner, StateBlockRef,
};
