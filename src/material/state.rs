//! Fixed-Function Pipeline State
//!
//! Plain-value descriptions of the pipeline state a PSO is built from. Every
//! type here is hashable and comparable by content so that equal blocks can
//! be deduplicated by the [`StateBlockPool`](super::StateBlockPool), and every
//! enum has a stable `u8` wire discriminant used by the cache format.

use std::hash::{Hash, Hasher};

use bitflags::bitflags;
use smallvec::SmallVec;

use crate::errors::{CacheError, Result};

/// Declares a `#[repr(u8)]` enum together with its wire conversions.
macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $value:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum $name {
            $( $(#[$vmeta])* $variant = $value ),+
        }

        impl $name {
            /// Stable on-disk discriminant.
            #[inline]
            #[must_use]
            pub const fn to_u8(self) -> u8 {
                self as u8
            }

            /// Parses an on-disk discriminant.
            pub fn from_u8(value: u8) -> Result<Self> {
                match value {
                    $( $value => Ok(Self::$variant), )+
                    _ => Err(CacheError::InvalidEnum {
                        kind: stringify!($name),
                        value,
                    }),
                }
            }
        }
    };
}

// ─── Enums ────────────────────────────────────────────────────────────────────

wire_enum! {
    /// Shader arithmetic precision supported by the backend.
    pub enum PrecisionMode {
        Full32 = 0,
        Midf16 = 1,
        Relaxed = 2,
    }
}

wire_enum! {
    pub enum CompareFunction {
        Never = 0,
        Less = 1,
        Equal = 2,
        LessEqual = 3,
        Greater = 4,
        NotEqual = 5,
        GreaterEqual = 6,
        Always = 7,
    }
}

wire_enum! {
    pub enum CullMode {
        None = 0,
        Front = 1,
        Back = 2,
    }
}

wire_enum! {
    pub enum PolygonMode {
        Fill = 0,
        Line = 1,
        Point = 2,
    }
}

wire_enum! {
    pub enum BlendFactor {
        Zero = 0,
        One = 1,
        Src = 2,
        OneMinusSrc = 3,
        SrcAlpha = 4,
        OneMinusSrcAlpha = 5,
        Dst = 6,
        OneMinusDst = 7,
        DstAlpha = 8,
        OneMinusDstAlpha = 9,
    }
}

wire_enum! {
    pub enum BlendOperation {
        Add = 0,
        Subtract = 1,
        ReverseSubtract = 2,
        Min = 3,
        Max = 4,
    }
}

wire_enum! {
    pub enum AlphaToCoverage {
        Disabled = 0,
        Enabled = 1,
        /// Only enabled when the pass is multisampled.
        EnabledMsaaOnly = 2,
    }
}

wire_enum! {
    pub enum PrimitiveTopology {
        PointList = 0,
        LineList = 1,
        LineStrip = 2,
        TriangleList = 3,
        TriangleStrip = 4,
    }
}

wire_enum! {
    pub enum VertexFormat {
        Float32 = 0,
        Float32x2 = 1,
        Float32x3 = 2,
        Float32x4 = 3,
        Float16x2 = 4,
        Float16x4 = 5,
        Unorm8x4 = 6,
        Snorm8x4 = 7,
        Uint16x2 = 8,
        Uint16x4 = 9,
        Uint32 = 10,
        Uint32x4 = 11,
        Sint32 = 12,
    }
}

wire_enum! {
    pub enum VertexSemantic {
        Position = 0,
        BlendWeights = 1,
        BlendIndices = 2,
        Normal = 3,
        Diffuse = 4,
        Specular = 5,
        TexCoord = 6,
        Binormal = 7,
        Tangent = 8,
    }
}

bitflags! {
    /// Color channels written by a blend state.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ColorWrites: u8 {
        const RED = 1 << 0;
        const GREEN = 1 << 1;
        const BLUE = 1 << 2;
        const ALPHA = 1 << 3;
        const COLOR = Self::RED.bits() | Self::GREEN.bits() | Self::BLUE.bits();
        const ALL = Self::COLOR.bits() | Self::ALPHA.bits();
    }
}

// ─── Rasterizer / Depth State ────────────────────────────────────────────────

/// Rasterizer and depth state block.
///
/// Depth bias values are compared and hashed by bit pattern, so `-0.0` and
/// `0.0` are distinct blocks and `NaN` equals itself.
#[derive(Debug, Clone, Copy)]
pub struct RasterizerState {
    pub scissor_test: bool,
    pub depth_clamp: bool,
    pub depth_check: bool,
    pub depth_write: bool,
    pub depth_compare: CompareFunction,
    pub depth_bias_constant: f32,
    pub depth_bias_slope_scale: f32,
    pub cull_mode: CullMode,
    pub polygon_mode: PolygonMode,
}

impl Default for RasterizerState {
    fn default() -> Self {
        Self {
            scissor_test: false,
            depth_clamp: false,
            depth_check: true,
            depth_write: true,
            depth_compare: CompareFunction::GreaterEqual,
            depth_bias_constant: 0.0,
            depth_bias_slope_scale: 0.0,
            cull_mode: CullMode::Back,
            polygon_mode: PolygonMode::Fill,
        }
    }
}

impl RasterizerState {
    fn key(&self) -> (u8, CompareFunction, u32, u32, CullMode, PolygonMode) {
        let flags = u8::from(self.scissor_test)
            | u8::from(self.depth_clamp) << 1
            | u8::from(self.depth_check) << 2
            | u8::from(self.depth_write) << 3;
        (
            flags,
            self.depth_compare,
            self.depth_bias_constant.to_bits(),
            self.depth_bias_slope_scale.to_bits(),
            self.cull_mode,
            self.polygon_mode,
        )
    }
}

impl PartialEq for RasterizerState {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for RasterizerState {}

impl Hash for RasterizerState {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

// ─── Blend State ─────────────────────────────────────────────────────────────

/// Blend state block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlendState {
    pub alpha_to_coverage: AlphaToCoverage,
    pub write_mask: ColorWrites,
    /// Combination of [`Self::TRANSPARENT_AUTO`] and [`Self::TRANSPARENT_FORCED`].
    pub transparency: u8,
    pub separate_blend: bool,
    pub src_factor: BlendFactor,
    pub dst_factor: BlendFactor,
    pub src_factor_alpha: BlendFactor,
    pub dst_factor_alpha: BlendFactor,
    pub operation: BlendOperation,
    pub operation_alpha: BlendOperation,
}

impl BlendState {
    /// Derived from the blend factors by the owner; never persisted.
    pub const TRANSPARENT_AUTO: u8 = 0x01;
    /// Set explicitly by the user; the only transparency bit that is persisted.
    pub const TRANSPARENT_FORCED: u8 = 0x02;

    /// Straight-alpha "over" blending.
    #[must_use]
    pub fn alpha_blending() -> Self {
        Self {
            transparency: Self::TRANSPARENT_AUTO,
            src_factor: BlendFactor::SrcAlpha,
            dst_factor: BlendFactor::OneMinusSrcAlpha,
            src_factor_alpha: BlendFactor::One,
            dst_factor_alpha: BlendFactor::OneMinusSrcAlpha,
            ..Self::default()
        }
    }
}

impl Default for BlendState {
    fn default() -> Self {
        Self {
            alpha_to_coverage: AlphaToCoverage::Disabled,
            write_mask: ColorWrites::ALL,
            transparency: 0,
            separate_blend: false,
            src_factor: BlendFactor::One,
            dst_factor: BlendFactor::Zero,
            src_factor_alpha: BlendFactor::One,
            dst_factor_alpha: BlendFactor::Zero,
            operation: BlendOperation::Add,
            operation_alpha: BlendOperation::Add,
        }
    }
}

// ─── Pipeline Description ────────────────────────────────────────────────────

/// One attribute of a vertex buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexElement {
    pub format: VertexFormat,
    pub semantic: VertexSemantic,
    /// 0 for per-vertex data, N to advance once every N instances.
    pub instancing_step_rate: u32,
}

impl VertexElement {
    #[must_use]
    pub const fn new(format: VertexFormat, semantic: VertexSemantic) -> Self {
        Self {
            format,
            semantic,
            instancing_step_rate: 0,
        }
    }
}

/// Elements of a single vertex buffer.
pub type VertexElementGroup = SmallVec<[VertexElement; 8]>;

/// Render-target configuration of the pass a PSO is used in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct PassState {
    pub color_formats: SmallVec<[u16; 4]>,
    pub depth_format: u16,
    pub sample_count: u8,
    pub stencil: bool,
}

/// Fixed-function part of a PSO, minus the two interned state blocks.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PipelineDescriptor {
    /// One group per vertex buffer.
    pub vertex_elements: Vec<VertexElementGroup>,
    pub topology: PrimitiveTopology,
    pub primitive_restart: bool,
    pub sample_mask: u32,
    pub pass: PassState,
}

impl Default for PipelineDescriptor {
    fn default() -> Self {
        Self {
            vertex_elements: Vec::new(),
            topology: PrimitiveTopology::TriangleList,
            primitive_restart: false,
            sample_mask: u32::MAX,
            pass: PassState::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_enum_roundtrip() {
        for value in 0..=7u8 {
            let func = CompareFunction::from_u8(value).unwrap();
            assert_eq!(func.to_u8(), value);
        }
    }

    #[test]
    fn test_wire_enum_rejects_unknown() {
        let err = CullMode::from_u8(9).unwrap_err();
        assert!(matches!(
            err,
            CacheError::InvalidEnum {
                kind: "CullMode",
                value: 9
            }
        ));
    }

    #[test]
    fn test_rasterizer_compares_bias_by_bits() {
        let a = RasterizerState::default();
        let mut b = a;
        b.depth_bias_constant = -0.0;
        assert_ne!(a, b);

        b.depth_bias_constant = 0.0;
        assert_eq!(a, b);
    }
}
