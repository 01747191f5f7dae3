//! Material Property Sets
//!
//! The material system describes every shader variant with an ordered list of
//! `(key, i32)` properties plus per-stage "pieces" (named snippets of code).
//! The cache treats both as opaque data: it only needs to copy them, persist
//! them in order, and read or overwrite a handful of well-known keys.
//!
//! # Keys
//!
//! A [`PropertyKey`] is the xxh3-64 hash of the property name. With the
//! `debug-names` feature the (interned) name travels along with the hash so
//! it can be written to disk and shown in logs; comparison and ordering only
//! ever look at the hash.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use xxhash_rust::xxh3::xxh3_64;

use crate::utils::interner::{self, Symbol};

// ─── Shader Stages ───────────────────────────────────────────────────────────

/// Number of programmable stages a shader variant may use.
pub const SHADER_STAGE_COUNT: usize = 5;

/// Programmable pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShaderStage {
    Vertex,
    Pixel,
    Geometry,
    Hull,
    Domain,
}

impl ShaderStage {
    /// All stages, in on-disk order.
    pub const ALL: [ShaderStage; SHADER_STAGE_COUNT] = [
        ShaderStage::Vertex,
        ShaderStage::Pixel,
        ShaderStage::Geometry,
        ShaderStage::Hull,
        ShaderStage::Domain,
    ];

    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Short suffix used when deriving per-stage property names.
    #[must_use]
    pub fn suffix(self) -> &'static str {
        match self {
            Self::Vertex => "vs",
            Self::Pixel => "ps",
            Self::Geometry => "gs",
            Self::Hull => "hs",
            Self::Domain => "ds",
        }
    }
}

// ─── PropertyKey ─────────────────────────────────────────────────────────────

/// Hashed property name.
#[derive(Clone, Copy)]
pub struct PropertyKey {
    id: u64,
    name: Option<Symbol>,
}

impl PropertyKey {
    /// Hashes `name` into a key.
    ///
    /// The name itself is only retained when the `debug-names` feature is on.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            id: xxh3_64(name.as_bytes()),
            name: cfg!(feature = "debug-names").then(|| interner::intern(name)),
        }
    }

    /// Key from a raw hash, without a debug name.
    #[inline]
    #[must_use]
    pub const fn from_id(id: u64) -> Self {
        Self { id, name: None }
    }

    /// Key from a raw hash and a (possibly truncated) debug name read from disk.
    #[must_use]
    pub fn with_debug_name(id: u64, name: &str) -> Self {
        Self {
            id,
            name: (!name.is_empty()).then(|| interner::intern(name)),
        }
    }

    /// The 64-bit name hash.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub fn debug_name(&self) -> Option<&'static str> {
        self.name.map(interner::resolve)
    }
}

impl PartialEq for PropertyKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for PropertyKey {}

impl Hash for PropertyKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl PartialOrd for PropertyKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PropertyKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id)
    }
}

impl fmt::Debug for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.debug_name() {
            Some(name) => write!(f, "PropertyKey({name:?}, {:#018x})", self.id),
            None => write!(f, "PropertyKey({:#018x})", self.id),
        }
    }
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.debug_name() {
            Some(name) => f.write_str(name),
            None => write!(f, "{:#018x}", self.id),
        }
    }
}

/// Well-known keys the cache reads or rewrites.
pub mod keys {
    use super::{PropertyKey, ShaderStage};

    /// Property holding the name hash of the datablock custom piece file used
    /// by `stage` (0 when none).
    #[must_use]
    pub fn custom_piece_shader_name(stage: ShaderStage) -> PropertyKey {
        PropertyKey::new(&format!("hlms_custom_piece_shader_name_{}", stage.suffix()))
    }

    /// Lifetime id of the rasterizer state block a PSO was built with.
    #[must_use]
    pub fn pso_rasterizer() -> PropertyKey {
        PropertyKey::new("pso_rasterizer")
    }

    /// Lifetime id of the blend state block a PSO was built with.
    #[must_use]
    pub fn pso_blend() -> PropertyKey {
        PropertyKey::new("pso_blend")
    }

    /// Id of the input layout (vertex elements + topology) of a PSO.
    #[must_use]
    pub fn pso_input_layout() -> PropertyKey {
        PropertyKey::new("pso_input_layout")
    }
}

// ─── PropertySet ─────────────────────────────────────────────────────────────

/// Ordered collection of `(key, value)` properties.
///
/// Unlike a map, insertion order is part of the value: the material system
/// hashes the sequence as-is, so the cache must hand it back unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct PropertySet {
    entries: Vec<(PropertyKey, i32)>,
}

impl PropertySet {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Value of `key`, or 0 when unset.
    #[must_use]
    pub fn get(&self, key: PropertyKey) -> i32 {
        self.entries
            .iter()
            .find(|(k, _)| *k == key)
            .map_or(0, |&(_, v)| v)
    }

    #[must_use]
    pub fn contains(&self, key: PropertyKey) -> bool {
        self.entries.iter().any(|(k, _)| *k == key)
    }

    /// Overwrites the value of `key` in place, or appends it.
    pub fn set(&mut self, key: PropertyKey, value: i32) {
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Appends without looking for an existing entry (decoder fast path).
    #[inline]
    pub fn push(&mut self, key: PropertyKey, value: i32) {
        self.entries.push((key, value));
    }

    pub fn remove(&mut self, key: PropertyKey) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(k, _)| *k != key);
        self.entries.len() != before
    }

    #[inline]
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &(PropertyKey, i32)> {
        self.entries.iter()
    }

    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[(PropertyKey, i32)] {
        &self.entries
    }
}

impl FromIterator<(PropertyKey, i32)> for PropertySet {
    fn from_iter<T: IntoIterator<Item = (PropertyKey, i32)>>(iter: T) -> Self {
        let mut set = Self::new();
        for (key, value) in iter {
            set.set(key, value);
        }
        set
    }
}

impl From<&[(&str, i32)]> for PropertySet {
    fn from(properties: &[(&str, i32)]) -> Self {
        properties
            .iter()
            .map(|&(name, value)| (PropertyKey::new(name), value))
            .collect()
    }
}

// ─── Pieces & RenderableCache ────────────────────────────────────────────────

/// Named code snippets for one stage, ordered by key.
pub type Pieces = BTreeMap<PropertyKey, String>;

/// Per-stage source text; `None` when the variant does not use the stage.
pub type StageSources = [Option<String>; SHADER_STAGE_COUNT];

/// Properties and pieces that produced a shader variant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderableCache {
    pub properties: PropertySet,
    pub pieces: [Pieces; SHADER_STAGE_COUNT],
}

impl RenderableCache {
    #[must_use]
    pub fn new(properties: PropertySet) -> Self {
        Self {
            properties,
            pieces: Default::default(),
        }
    }

    #[must_use]
    pub fn stage_pieces(&self, stage: ShaderStage) -> &Pieces {
        &self.pieces[stage.index()]
    }

    pub fn stage_pieces_mut(&mut self, stage: ShaderStage) -> &mut Pieces {
        &mut self.pieces[stage.index()]
    }

    /// Names (as property values) of the custom pieces referenced by any stage.
    pub fn custom_piece_names(&self) -> impl Iterator<Item = i32> + '_ {
        ShaderStage::ALL
            .into_iter()
            .map(|stage| self.properties.get(keys::custom_piece_shader_name(stage)))
            .filter(|&name| name != 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_equality_ignores_name() {
        let a = PropertyKey::new("hlms_normal");
        let b = PropertyKey::from_id(a.id());
        assert_eq!(a, b);
        assert_ne!(a, PropertyKey::new("hlms_tangent"));
    }

    #[test]
    fn test_set_overwrites_in_place() {
        let mut set = PropertySet::from(&[("a", 1), ("b", 2), ("c", 3)][..]);
        set.set(PropertyKey::new("b"), 20);

        let values: Vec<i32> = set.iter().map(|&(_, v)| v).collect();
        assert_eq!(values, vec![1, 20, 3]);
    }

    #[test]
    fn test_get_missing_is_zero() {
        let set = PropertySet::from(&[("a", 7)][..]);
        assert_eq!(set.get(PropertyKey::new("a")), 7);
        assert_eq!(set.get(PropertyKey::new("missing")), 0);
        assert!(!set.contains(PropertyKey::new("missing")));
    }

    #[test]
    fn test_order_is_part_of_equality() {
        let ab = PropertySet::from(&[("a", 1), ("b", 2)][..]);
        let ba = PropertySet::from(&[("b", 2), ("a", 1)][..]);
        assert_ne!(ab, ba);
    }

    #[test]
    fn test_custom_piece_names() {
        let mut cache = RenderableCache::default();
        cache
            .properties
            .set(keys::custom_piece_shader_name(ShaderStage::Pixel), 42);
        cache.properties.set(PropertyKey::new("hlms_normal"), 1);

        let names: Vec<i32> = cache.custom_piece_names().collect();
        assert_eq!(names, vec![42]);
    }
}
