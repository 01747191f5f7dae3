//! Disk Cache Settings
//!
//! Host-facing configuration for where the cache lives and how many compile
//! workers an apply may use. Derives `serde` so applications can embed it in
//! their own JSON/TOML configuration.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Configuration for saving, loading and applying a [`DiskCache`](crate::cache::DiskCache).
///
/// | Field          | Description                               | Default               |
/// |----------------|-------------------------------------------|-----------------------|
/// | `worker_count` | Compile threads used by an apply          | available parallelism |
/// | `file_name`    | Cache file name inside the cache folder   | `"shader_cache.bin"`  |
///
/// # Example
///
/// ```rust,ignore
/// use myth_shader_cache::DiskCacheSettings;
///
/// let settings = DiskCacheSettings {
///     worker_count: 4,
///     ..Default::default()
/// };
/// let path = settings.cache_path("cache/pbs");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiskCacheSettings {
    /// Number of compile worker threads.
    ///
    /// `0` and `1` both compile on the calling thread.
    pub worker_count: usize,

    /// File name of the cache within the folder passed to [`Self::cache_path`].
    pub file_name: String,
}

impl Default for DiskCacheSettings {
    fn default() -> Self {
        Self {
            worker_count: std::thread::available_parallelism().map_or(1, NonZeroUsize::get),
            file_name: "shader_cache.bin".to_owned(),
        }
    }
}

impl DiskCacheSettings {
    /// Worker count clamped to at least one.
    #[inline]
    #[must_use]
    pub fn effective_workers(&self) -> usize {
        self.worker_count.max(1)
    }

    /// Full path of the cache file inside `dir`.
    #[must_use]
    pub fn cache_path(&self, dir: impl AsRef<Path>) -> PathBuf {
        dir.as_ref().join(&self.file_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = DiskCacheSettings::default();
        assert!(settings.worker_count >= 1);
        assert_eq!(settings.file_name, "shader_cache.bin");
    }

    #[test]
    fn test_effective_workers_never_zero() {
        let settings = DiskCacheSettings {
            worker_count: 0,
            ..Default::default()
        };
        assert_eq!(settings.effective_workers(), 1);
    }

    #[test]
    fn test_cache_path() {
        let settings = DiskCacheSettings::default();
        assert_eq!(
            settings.cache_path("cache"),
            Path::new("cache").join("shader_cache.bin")
        );
    }
}
