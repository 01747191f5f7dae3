//! Cache Validity
//!
//! Decides whether a loaded snapshot can be applied to the live material
//! system, and how:
//!
//! | Check | Mismatch effect |
//! |-------|-----------------|
//! | system type | abort |
//! | shader profile | templates out of date, abort |
//! | shading language version | templates out of date |
//! | precision mode | templates out of date |
//! | fast shader build hack | templates out of date |
//! | template checksum | templates out of date |
//! | custom piece changed | templates out of date |
//! | custom piece missing | abort (live shader cache left empty) |
//!
//! "Templates out of date" is sticky: once set it is never cleared by a later
//! check. It makes the dispatcher re-run template preprocessing for every
//! record instead of compiling the stored source directly.

use thiserror::Error;

use crate::material::{CustomPieceFileStatus, MaterialSystem};

use super::snapshot::{CacheSnapshot, CustomPieceFileRecord};

/// Why a snapshot was not applied.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    /// The cache was captured from a different kind of material system.
    #[error("cache is for material system type {cached} but is applied to type {live}")]
    TypeMismatch { cached: u8, live: u8 },

    /// The cached source targets a different shader profile.
    #[error("cache is for shader profile '{cached}' but the current one is '{live}'")]
    ProfileMismatch { cached: String, live: String },

    /// A custom piece file the cached shaders depend on could not be found.
    #[error("custom piece file '{filename}' in resource group '{resource_group}' not found")]
    MissingCustomPiece {
        filename: String,
        resource_group: String,
    },
}

/// Outcome of [`check_and_prepare`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyDecision {
    /// Do not apply the snapshot.
    Abort(AbortReason),
    /// Compile the stored, already preprocessed source.
    ProceedFull,
    /// Run every record through the template preprocessor again.
    ProceedWithReprocessing,
}

/// Validates `snapshot` against `live` and prepares `live` for compilation.
///
/// Clears the live shader cache unless the type or profile check aborts.
/// `templates_out_of_date` is only ever set, never cleared.
pub fn check_and_prepare<S: MaterialSystem + ?Sized>(
    snapshot: &CacheSnapshot,
    live: &mut S,
    templates_out_of_date: &mut bool,
) -> ApplyDecision {
    if snapshot.system_type != live.system_type() {
        let reason = AbortReason::TypeMismatch {
            cached: snapshot.system_type,
            live: live.system_type(),
        };
        log::warn!("{reason}. Shader disk cache won't be applied.");
        return ApplyDecision::Abort(reason);
    }

    let cached = &snapshot.fingerprint;

    if cached.shader_profile != live.shader_profile() {
        *templates_out_of_date = true;
        let reason = AbortReason::ProfileMismatch {
            cached: cached.shader_profile.clone(),
            live: live.shader_profile().to_owned(),
        };
        log::info!("{reason}. Shader disk cache won't be applied.");
        return ApplyDecision::Abort(reason);
    }

    if !*templates_out_of_date
        && cached.shading_language_version != live.native_shading_language_version()
    {
        *templates_out_of_date = true;
        log::info!(
            "Shading language version changed from {} to {}. This increases loading times.",
            cached.shading_language_version,
            live.native_shading_language_version()
        );
    }

    if !*templates_out_of_date && cached.precision_mode != live.supported_precision_mode() {
        *templates_out_of_date = true;
        log::info!(
            "Precision mode changed from {:?} to {:?}. This increases loading times.",
            cached.precision_mode,
            live.supported_precision_mode()
        );
    }

    if !*templates_out_of_date && cached.fast_shader_build_hack != live.fast_shader_build_hack() {
        *templates_out_of_date = true;
        log::info!(
            "Fast shader build hack changed from {} to {}. This increases loading times.",
            cached.fast_shader_build_hack,
            live.fast_shader_build_hack()
        );
    }

    if cached.template_hash != live.template_checksum() {
        *templates_out_of_date = true;
        log::warn!(
            "Shader disk cache is out of date: the templates have changed and will be parsed \
             again. If you experience crashes or shader compiler errors, delete the cache."
        );
    }

    live.clear_shader_cache();

    match refresh_custom_pieces(&snapshot.custom_pieces, live) {
        Ok(stale) => *templates_out_of_date |= stale,
        Err(reason) => {
            live.clear_shader_cache();
            return ApplyDecision::Abort(reason);
        }
    }

    if *templates_out_of_date {
        ApplyDecision::ProceedWithReprocessing
    } else {
        ApplyDecision::ProceedFull
    }
}

/// Re-registers every cached custom piece file with the live system.
///
/// Returns whether any of them changed, or the first missing file. Dropping
/// only the records that use a missing file is not attempted; a missing file
/// means the cache is too far gone.
fn refresh_custom_pieces<S: MaterialSystem + ?Sized>(
    records: &[CustomPieceFileRecord],
    live: &mut S,
) -> Result<bool, AbortReason> {
    records.iter().try_fold(false, |stale, record| {
        match live.add_or_refresh_custom_piece_file(
            &record.filename,
            &record.resource_group,
            record.checksum,
        ) {
            CustomPieceFileStatus::Success => Ok(stale),
            CustomPieceFileStatus::OutOfDate => {
                log::warn!(
                    "Custom piece file '{}' in resource group '{}' has changed. The templates \
                     will be parsed again. If you experience crashes or shader compiler errors, \
                     delete the cache.",
                    record.filename,
                    record.resource_group
                );
                Ok(true)
            }
            CustomPieceFileStatus::CriticalError => {
                let reason = AbortReason::MissingCustomPiece {
                    filename: record.filename.clone(),
                    resource_group: record.resource_group.clone(),
                };
                log::error!("{reason}! Aborting the loading of the shader disk cache.");
                Err(reason)
            }
        }
    })
}
