//! Cache File Format
//!
//! Serializes a [`CacheSnapshot`] with the little-endian primitives from
//! [`codec`](crate::codec). Layout:
//!
//! ```text
//! u16  format version        (FORMAT_VERSION)
//! u16  debug string capacity (DEBUG_STR_SIZE)
//! u16  hash bit width        (HASH_BITS)
//! u64  template hash [2]
//! u8   system type
//! str  shader profile
//! u16  shading language version
//! u8   precision mode
//! bool fast shader build hack
//! u32  n × custom piece file
//! u32  n × source code record
//! u32  n × PSO record
//! ```
//!
//! The three leading header fields describe how the rest of the file is laid
//! out. If any of them differs from this build the file is rejected without
//! reading further; that is not an error, the cache is simply regenerated.

use std::io::{Read, Write};

use thiserror::Error;

use crate::codec::{BinaryReader, BinaryWriter, capacity_hint};
use crate::errors::Result;
use crate::material::{
    AlphaToCoverage, BlendFactor, BlendOperation, BlendState, ColorWrites, CompareFunction,
    CullMode, PassState, PipelineDescriptor, PolygonMode, PrecisionMode, PrimitiveTopology,
    PropertyKey, PropertySet, RasterizerState, RenderableCache, SHADER_STAGE_COUNT,
    StageSources, StateBlockInterner, VertexElement, VertexElementGroup, VertexFormat,
    VertexSemantic, keys,
};

use super::snapshot::{
    CacheSnapshot, CustomPieceFileRecord, EnvironmentFingerprint, PsoRecord, SourceCodeRecord,
};

/// Bumped whenever the layout changes.
pub const FORMAT_VERSION: u16 = 6;

/// Width of a [`PropertyKey`] hash.
pub const HASH_BITS: u16 = 64;

/// Bytes reserved per property debug name, including a terminator slot.
/// Zero when debug names are compiled out.
pub const DEBUG_STR_SIZE: u16 = if cfg!(feature = "debug-names") { 32 } else { 0 };

/// Longest debug name stored on disk.
const DEBUG_NAME_MAX_LEN: usize = (DEBUG_STR_SIZE as usize).saturating_sub(1);

/// Header field that made a cache file unusable for this build.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatMismatch {
    /// The file uses a different layout revision.
    #[error("cache format version is {found}, expected {expected}")]
    Version { found: u16, expected: u16 },

    /// The file was written with debug names compiled differently.
    #[error("cache was written with debug string size {found}, expected {expected}")]
    DebugStringSize { found: u16, expected: u16 },

    /// The file's property keys use a different hash width.
    #[error("cache was written with {found}-bit property hashes, expected {expected}")]
    HashBits { found: u16, expected: u16 },
}

/// Result of decoding a cache stream.
#[derive(Debug)]
pub enum Decoded {
    /// The full snapshot, with PSO state blocks interned.
    Snapshot(Box<CacheSnapshot>),
    /// The header did not match; nothing past it was read.
    Rejected(FormatMismatch),
}

// ─── Encoding ────────────────────────────────────────────────────────────────

/// Writes `snapshot` to `writer`. Does not flush.
pub fn encode<W: Write>(snapshot: &CacheSnapshot, writer: &mut BinaryWriter<W>) -> Result<()> {
    writer.write_u16(FORMAT_VERSION)?;
    writer.write_u16(DEBUG_STR_SIZE)?;
    writer.write_u16(HASH_BITS)?;

    let fingerprint = &snapshot.fingerprint;
    writer.write_u64(fingerprint.template_hash[0])?;
    writer.write_u64(fingerprint.template_hash[1])?;
    writer.write_u8(snapshot.system_type)?;
    writer.write_str(&fingerprint.shader_profile)?;
    writer.write_u16(fingerprint.shading_language_version)?;
    writer.write_u8(fingerprint.precision_mode.to_u8())?;
    writer.write_bool(fingerprint.fast_shader_build_hack)?;

    writer.write_len(snapshot.custom_pieces.len())?;
    for piece in &snapshot.custom_pieces {
        writer.write_u64(piece.checksum[0])?;
        writer.write_u64(piece.checksum[1])?;
        writer.write_str(&piece.filename)?;
        writer.write_str(&piece.resource_group)?;
    }

    writer.write_len(snapshot.source_code.len())?;
    for record in &snapshot.source_code {
        write_renderable(writer, &record.merged)?;
        for source in &record.sources {
            writer.write_str(source.as_deref().unwrap_or_default())?;
        }
    }

    writer.write_len(snapshot.psos.len())?;
    for record in &snapshot.psos {
        write_pso(writer, record)?;
    }

    Ok(())
}

fn write_key<W: Write>(writer: &mut BinaryWriter<W>, key: PropertyKey) -> Result<()> {
    writer.write_u64(key.id())?;

    if DEBUG_STR_SIZE > 0 {
        let name = key.debug_name().unwrap_or_default();
        let name = truncate_at_char_boundary(name, DEBUG_NAME_MAX_LEN);
        // Bounded by DEBUG_STR_SIZE, always fits.
        writer.write_u16(name.len() as u16)?;
        writer.write_bytes(name.as_bytes())?;
    }

    Ok(())
}

fn truncate_at_char_boundary(s: &str, max_len: usize) -> &str {
    if s.len() <= max_len {
        return s;
    }
    let mut end = max_len;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

fn write_property_set<W: Write>(writer: &mut BinaryWriter<W>, set: &PropertySet) -> Result<()> {
    writer.write_len(set.len())?;
    for &(key, value) in set.iter() {
        write_key(writer, key)?;
        writer.write_i32(value)?;
    }
    Ok(())
}

fn write_renderable<W: Write>(
    writer: &mut BinaryWriter<W>,
    renderable: &RenderableCache,
) -> Result<()> {
    write_property_set(writer, &renderable.properties)?;
    for pieces in &renderable.pieces {
        writer.write_len(pieces.len())?;
        for (&key, value) in pieces {
            write_key(writer, key)?;
            writer.write_str(value)?;
        }
    }
    Ok(())
}

fn write_pass<W: Write>(writer: &mut BinaryWriter<W>, pass: &PassState) -> Result<()> {
    writer.write_len(pass.color_formats.len())?;
    for &format in &pass.color_formats {
        writer.write_u16(format)?;
    }
    writer.write_u16(pass.depth_format)?;
    writer.write_u8(pass.sample_count)?;
    writer.write_bool(pass.stencil)
}

fn write_pso<W: Write>(writer: &mut BinaryWriter<W>, record: &PsoRecord) -> Result<()> {
    write_renderable(writer, &record.renderable)?;
    write_property_set(writer, &record.pass_properties)?;

    let pipeline = &record.pipeline;
    writer.write_len(pipeline.vertex_elements.len())?;
    for group in &pipeline.vertex_elements {
        writer.write_len(group.len())?;
        for element in group {
            writer.write_u8(element.format.to_u8())?;
            writer.write_u8(element.semantic.to_u8())?;
            writer.write_u32(element.instancing_step_rate)?;
        }
    }
    writer.write_u8(pipeline.topology.to_u8())?;
    writer.write_bool(pipeline.primitive_restart)?;
    writer.write_u32(pipeline.sample_mask)?;
    write_pass(writer, &pipeline.pass)?;

    let rs = &record.rasterizer;
    writer.write_bool(rs.scissor_test)?;
    writer.write_bool(rs.depth_clamp)?;
    writer.write_bool(rs.depth_check)?;
    writer.write_bool(rs.depth_write)?;
    writer.write_u8(rs.depth_compare.to_u8())?;
    writer.write_f32(rs.depth_bias_constant)?;
    writer.write_f32(rs.depth_bias_slope_scale)?;
    writer.write_u8(rs.cull_mode.to_u8())?;
    writer.write_u8(rs.polygon_mode.to_u8())?;

    let blend = &record.blend;
    writer.write_u8(blend.alpha_to_coverage.to_u8())?;
    writer.write_u8(blend.write_mask.bits())?;
    // The auto bit is recomputed by the owner of the block.
    writer.write_u8(blend.transparency & BlendState::TRANSPARENT_FORCED)?;
    writer.write_bool(blend.separate_blend)?;
    writer.write_u8(blend.src_factor.to_u8())?;
    writer.write_u8(blend.dst_factor.to_u8())?;
    writer.write_u8(blend.src_factor_alpha.to_u8())?;
    writer.write_u8(blend.dst_factor_alpha.to_u8())?;
    writer.write_u8(blend.operation.to_u8())?;
    writer.write_u8(blend.operation_alpha.to_u8())
}

// ─── Decoding ────────────────────────────────────────────────────────────────

/// Reads a snapshot from `reader`, interning PSO state blocks into `interner`.
///
/// A header mismatch yields [`Decoded::Rejected`] after reading only the
/// header. Any other failure is returned as an error.
pub fn decode<R: Read, I: StateBlockInterner + ?Sized>(
    reader: &mut BinaryReader<R>,
    interner: &mut I,
) -> Result<Decoded> {
    if let Some(mismatch) = read_header(reader)? {
        return Ok(Decoded::Rejected(mismatch));
    }

    let template_hash = [reader.read_u64()?, reader.read_u64()?];
    let system_type = reader.read_u8()?;
    let fingerprint = EnvironmentFingerprint {
        template_hash,
        shader_profile: reader.read_string()?,
        shading_language_version: reader.read_u16()?,
        precision_mode: PrecisionMode::from_u8(reader.read_u8()?)?,
        fast_shader_build_hack: reader.read_bool()?,
    };

    let count = reader.read_len()?;
    let mut custom_pieces = Vec::with_capacity(capacity_hint(count));
    for _ in 0..count {
        let checksum = [reader.read_u64()?, reader.read_u64()?];
        custom_pieces.push(CustomPieceFileRecord {
            checksum,
            filename: reader.read_string()?,
            resource_group: reader.read_string()?,
        });
    }

    let count = reader.read_len()?;
    let mut source_code = Vec::with_capacity(capacity_hint(count));
    for _ in 0..count {
        let merged = read_renderable(reader)?;
        let mut sources = StageSources::default();
        for source in &mut sources {
            let text = reader.read_string()?;
            *source = (!text.is_empty()).then_some(text);
        }
        source_code.push(SourceCodeRecord { merged, sources });
    }

    let count = reader.read_len()?;
    let mut psos = Vec::with_capacity(capacity_hint(count));
    for _ in 0..count {
        psos.push(read_pso(reader)?);
    }

    // The interner is only touched once the whole body has been read.
    for record in &mut psos {
        intern_state_blocks(record, interner)?;
    }

    Ok(Decoded::Snapshot(Box::new(CacheSnapshot {
        system_type,
        fingerprint,
        custom_pieces,
        source_code,
        psos,
    })))
}

fn read_header<R: Read>(reader: &mut BinaryReader<R>) -> Result<Option<FormatMismatch>> {
    let version = reader.read_u16()?;
    if version != FORMAT_VERSION {
        return Ok(Some(FormatMismatch::Version {
            found: version,
            expected: FORMAT_VERSION,
        }));
    }

    let debug_str_size = reader.read_u16()?;
    if debug_str_size != DEBUG_STR_SIZE {
        return Ok(Some(FormatMismatch::DebugStringSize {
            found: debug_str_size,
            expected: DEBUG_STR_SIZE,
        }));
    }

    let hash_bits = reader.read_u16()?;
    if hash_bits != HASH_BITS {
        return Ok(Some(FormatMismatch::HashBits {
            found: hash_bits,
            expected: HASH_BITS,
        }));
    }

    Ok(None)
}

fn read_key<R: Read>(reader: &mut BinaryReader<R>) -> Result<PropertyKey> {
    let id = reader.read_u64()?;
    if DEBUG_STR_SIZE == 0 {
        return Ok(PropertyKey::from_id(id));
    }

    let len = usize::from(reader.read_u16()?);
    let keep = len.min(DEBUG_NAME_MAX_LEN);
    let bytes = reader.read_bytes(keep)?;
    reader.skip(len - keep)?;

    Ok(PropertyKey::with_debug_name(
        id,
        &String::from_utf8_lossy(&bytes),
    ))
}

fn read_property_set<R: Read>(reader: &mut BinaryReader<R>) -> Result<PropertySet> {
    let count = reader.read_len()?;
    let mut set = PropertySet::with_capacity(capacity_hint(count));
    for _ in 0..count {
        let key = read_key(reader)?;
        set.push(key, reader.read_i32()?);
    }
    Ok(set)
}

fn read_renderable<R: Read>(reader: &mut BinaryReader<R>) -> Result<RenderableCache> {
    let mut renderable = RenderableCache::new(read_property_set(reader)?);
    for stage in 0..SHADER_STAGE_COUNT {
        let count = reader.read_len()?;
        for _ in 0..count {
            let key = read_key(reader)?;
            let value = reader.read_string()?;
            renderable.pieces[stage].insert(key, value);
        }
    }
    Ok(renderable)
}

fn read_pass<R: Read>(reader: &mut BinaryReader<R>) -> Result<PassState> {
    let count = reader.read_len()?;
    let mut color_formats = smallvec::SmallVec::with_capacity(capacity_hint(count));
    for _ in 0..count {
        color_formats.push(reader.read_u16()?);
    }
    Ok(PassState {
        color_formats,
        depth_format: reader.read_u16()?,
        sample_count: reader.read_u8()?,
        stencil: reader.read_bool()?,
    })
}

fn read_pipeline<R: Read>(reader: &mut BinaryReader<R>) -> Result<PipelineDescriptor> {
    let group_count = reader.read_len()?;
    let mut vertex_elements = Vec::with_capacity(capacity_hint(group_count));
    for _ in 0..group_count {
        let count = reader.read_len()?;
        let mut group = VertexElementGroup::with_capacity(capacity_hint(count));
        for _ in 0..count {
            group.push(VertexElement {
                format: VertexFormat::from_u8(reader.read_u8()?)?,
                semantic: VertexSemantic::from_u8(reader.read_u8()?)?,
                instancing_step_rate: reader.read_u32()?,
            });
        }
        vertex_elements.push(group);
    }

    Ok(PipelineDescriptor {
        vertex_elements,
        topology: PrimitiveTopology::from_u8(reader.read_u8()?)?,
        primitive_restart: reader.read_bool()?,
        sample_mask: reader.read_u32()?,
        pass: read_pass(reader)?,
    })
}

fn read_rasterizer<R: Read>(reader: &mut BinaryReader<R>) -> Result<RasterizerState> {
    Ok(RasterizerState {
        scissor_test: reader.read_bool()?,
        depth_clamp: reader.read_bool()?,
        depth_check: reader.read_bool()?,
        depth_write: reader.read_bool()?,
        depth_compare: CompareFunction::from_u8(reader.read_u8()?)?,
        depth_bias_constant: reader.read_f32()?,
        depth_bias_slope_scale: reader.read_f32()?,
        cull_mode: CullMode::from_u8(reader.read_u8()?)?,
        polygon_mode: PolygonMode::from_u8(reader.read_u8()?)?,
    })
}

fn read_blend<R: Read>(reader: &mut BinaryReader<R>) -> Result<BlendState> {
    Ok(BlendState {
        alpha_to_coverage: AlphaToCoverage::from_u8(reader.read_u8()?)?,
        write_mask: ColorWrites::from_bits_truncate(reader.read_u8()?),
        transparency: reader.read_u8()? & BlendState::TRANSPARENT_FORCED,
        separate_blend: reader.read_bool()?,
        src_factor: BlendFactor::from_u8(reader.read_u8()?)?,
        dst_factor: BlendFactor::from_u8(reader.read_u8()?)?,
        src_factor_alpha: BlendFactor::from_u8(reader.read_u8()?)?,
        dst_factor_alpha: BlendFactor::from_u8(reader.read_u8()?)?,
        operation: BlendOperation::from_u8(reader.read_u8()?)?,
        operation_alpha: BlendOperation::from_u8(reader.read_u8()?)?,
    })
}

fn read_pso<R: Read>(reader: &mut BinaryReader<R>) -> Result<PsoRecord> {
    Ok(PsoRecord {
        renderable: read_renderable(reader)?,
        pass_properties: read_property_set(reader)?,
        pipeline: read_pipeline(reader)?,
        rasterizer: read_rasterizer(reader)?,
        blend: read_blend(reader)?,
        rasterizer_ref: None,
        blend_ref: None,
    })
}

/// Interns the record's state blocks and stamps their ids into its
/// renderable properties.
fn intern_state_blocks<I: StateBlockInterner + ?Sized>(
    record: &mut PsoRecord,
    interner: &mut I,
) -> Result<()> {
    // Only the lifetime ids are needed here; the handles keep the blocks
    // alive while the pool is free to recycle their slots.
    let rasterizer_ref = interner.intern_rasterizer(&record.rasterizer)?;
    interner.release_rasterizer(&rasterizer_ref);
    let blend_ref = interner.intern_blend(&record.blend)?;
    interner.release_blend(&blend_ref);
    let pipeline = &record.pipeline;
    let input_layout = interner.input_layout_id(&pipeline.vertex_elements, pipeline.topology)?;

    let properties = &mut record.renderable.properties;
    properties.set(keys::pso_rasterizer(), i32::from(rasterizer_ref.lifetime_id()));
    properties.set(keys::pso_blend(), i32::from(blend_ref.lifetime_id()));
    properties.set(keys::pso_input_layout(), i32::from(input_layout));

    record.rasterizer_ref = Some(rasterizer_ref);
    record.blend_ref = Some(blend_ref);
    Ok(())
}
