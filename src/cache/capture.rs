//! Capture
//!
//! Builds a [`CacheSnapshot`] from the live material system. Capture is
//! best-effort: anything that could not be reproduced on a later run (shaders
//! built from custom pieces that were registered from memory) is silently
//! left out.

use crate::material::{MaterialSystem, RenderableCache};

use super::snapshot::{
    CacheSnapshot, CustomPieceFileRecord, EnvironmentFingerprint, PsoRecord, SourceCodeRecord,
};

/// Snapshots the live system's environment, custom pieces, shaders and PSOs.
pub fn capture<S: MaterialSystem + ?Sized>(live: &S) -> CacheSnapshot {
    let mut snapshot = CacheSnapshot {
        system_type: live.system_type(),
        fingerprint: EnvironmentFingerprint::of(live),
        ..CacheSnapshot::default()
    };

    // Pieces registered from memory cannot be validated on reload.
    snapshot.custom_pieces = live
        .custom_piece_files()
        .iter()
        .filter(|piece| piece.is_cacheable())
        .map(|piece| CustomPieceFileRecord {
            filename: piece.filename.clone(),
            resource_group: piece.resource_group.clone(),
            checksum: piece.checksum,
        })
        .collect();

    let shaders = live.shader_code_cache();
    snapshot.source_code.reserve(shaders.len());
    for entry in shaders {
        if !is_cacheable(live, &entry.merged) {
            continue;
        }
        snapshot.source_code.push(SourceCodeRecord {
            merged: entry.merged.clone(),
            sources: entry
                .sources
                .clone()
                .map(|source| source.filter(|text| !text.is_empty())),
        });
    }

    let renderables = live.renderable_caches();
    let passes = live.pass_caches();
    let psos = live.pso_cache();
    snapshot.psos.reserve(psos.len());
    for entry in psos {
        let (Some(renderable), Some(pass)) = (
            renderables.get(entry.renderable_index),
            passes.get(entry.pass_index),
        ) else {
            log::warn!(
                "PSO refers to missing renderable {} / pass {}, not caching it",
                entry.renderable_index,
                entry.pass_index
            );
            continue;
        };

        if !is_cacheable(live, renderable) {
            continue;
        }

        snapshot.psos.push(PsoRecord {
            renderable: renderable.clone(),
            pass_properties: pass.properties.clone(),
            pipeline: entry.pipeline.clone(),
            rasterizer: *entry.rasterizer,
            blend: *entry.blend,
            rasterizer_ref: None,
            blend_ref: None,
        });
    }

    log::debug!(
        "Captured {} custom pieces, {} shaders, {} PSOs (of {} / {})",
        snapshot.custom_pieces.len(),
        snapshot.source_code.len(),
        snapshot.psos.len(),
        shaders.len(),
        psos.len()
    );

    snapshot
}

/// `false` if any stage uses a custom piece the live system cannot cache.
fn is_cacheable<S: MaterialSystem + ?Sized>(live: &S, cache: &RenderableCache) -> bool {
    cache
        .custom_piece_names()
        .all(|name| live.is_custom_piece_file_cacheable(name))
}
