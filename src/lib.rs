#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

//! Persistent, versioned disk cache for generated shaders and pipeline state
//! objects.
//!
//! Capture the live material system with [`DiskCache::copy_from`], persist it
//! with [`DiskCache::save_to`], and on a later run restore it with
//! [`DiskCache::load_from`] followed by [`DiskCache::apply_to`].

pub mod cache;
pub mod codec;
pub mod errors;
pub mod material;
pub mod settings;
pub mod utils;

pub use cache::{ApplyOutcome, CacheSnapshot, DiskCache, LoadStatus};
pub use errors::{CacheError, Result};
pub use material::{MaterialSystem, StateBlockInterner, StateBlockPool};
pub use settings::DiskCacheSettings;
pub use utils::interner;
