//! State Block Pool
//!
//! Default [`StateBlockInterner`] implementation. Blocks are stored in
//! contiguous slot `Vec`s and addressed by their `u16` lifetime id; an
//! `FxHashMap` keyed by the block value provides O(1) deduplication.
//!
//! # Lifetime ids
//!
//! A block keeps its lifetime id for as long as the pool holds it, even when
//! its reference count drops to zero ("inactive"). Interning an equal value
//! again revives the same id. Inactive slots are only recycled once the pool
//! is full, at which point their ids may be handed to different values.

use std::hash::Hash;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::errors::{CacheError, Result};

use super::state::{BlendState, PrimitiveTopology, RasterizerState, VertexElementGroup};
use super::system::{StateBlockInterner, StateBlockRef};

/// Maximum number of distinct blocks per pool.
pub const MAX_STATE_BLOCKS: usize = 4096;

struct Slot<T> {
    block: Arc<T>,
    refs: u32,
}

/// Deduplicating table for one kind of state block.
struct InternTable<T> {
    kind: &'static str,
    capacity: usize,
    slots: Vec<Option<Slot<T>>>,
    lookup: FxHashMap<T, u16>,
    free: Vec<u16>,
}

impl<T: Clone + Eq + Hash> InternTable<T> {
    fn new(kind: &'static str, capacity: usize) -> Self {
        Self {
            kind,
            capacity,
            slots: Vec::new(),
            lookup: FxHashMap::default(),
            free: Vec::new(),
        }
    }

    fn intern(&mut self, value: &T) -> Result<StateBlockRef<T>> {
        if let Some(&id) = self.lookup.get(value)
            && let Some(slot) = self.slots.get_mut(usize::from(id)).and_then(Option::as_mut)
        {
            slot.refs += 1;
            return Ok(StateBlockRef::new(id, Arc::clone(&slot.block)));
        }

        let id = self.allocate_id()?;
        let block = Arc::new(value.clone());
        self.slots[usize::from(id)] = Some(Slot {
            block: Arc::clone(&block),
            refs: 1,
        });
        self.lookup.insert(value.clone(), id);
        Ok(StateBlockRef::new(id, block))
    }

    fn release(&mut self, block: &StateBlockRef<T>) {
        if let Some(slot) = self
            .slots
            .get_mut(usize::from(block.lifetime_id()))
            .and_then(Option::as_mut)
            && std::ptr::eq(Arc::as_ptr(&slot.block), &**block)
        {
            slot.refs = slot.refs.saturating_sub(1);
        }
    }

    fn allocate_id(&mut self) -> Result<u16> {
        if self.free.is_empty() && self.slots.len() >= self.capacity {
            self.purge_inactive();
        }

        if let Some(id) = self.free.pop() {
            return Ok(id);
        }

        if self.slots.len() >= self.capacity {
            return Err(CacheError::StateBlockPoolExhausted {
                kind: self.kind,
                capacity: self.capacity,
            });
        }

        let id = self.slots.len() as u16;
        self.slots.push(None);
        Ok(id)
    }

    /// Evicts every block with no outstanding reference.
    fn purge_inactive(&mut self) {
        for (index, entry) in self.slots.iter_mut().enumerate() {
            if entry.as_ref().is_some_and(|slot| slot.refs == 0)
                && let Some(slot) = entry.take()
            {
                self.lookup.remove(slot.block.as_ref());
                self.free.push(index as u16);
            }
        }
        if !self.free.is_empty() {
            log::debug!("Recycled {} inactive {} blocks", self.free.len(), self.kind);
        }
    }

    fn active_count(&self) -> usize {
        self.slots
            .iter()
            .flatten()
            .filter(|slot| slot.refs > 0)
            .count()
    }

    fn len(&self) -> usize {
        self.lookup.len()
    }
}

/// Key of the input layout table.
type InputLayoutKey = (Vec<VertexElementGroup>, PrimitiveTopology);

/// Pool of rasterizer and blend blocks plus the input-layout id table.
pub struct StateBlockPool {
    rasterizers: InternTable<RasterizerState>,
    blends: InternTable<BlendState>,
    input_layouts: FxHashMap<InputLayoutKey, u16>,
    input_layout_capacity: usize,
}

impl Default for StateBlockPool {
    fn default() -> Self {
        Self::new()
    }
}

impl StateBlockPool {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(MAX_STATE_BLOCKS)
    }

    /// Pool holding at most `capacity` blocks of each kind and `capacity`
    /// input layouts.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.min(usize::from(u16::MAX) + 1);
        Self {
            rasterizers: InternTable::new("rasterizer", capacity),
            blends: InternTable::new("blend", capacity),
            input_layouts: FxHashMap::default(),
            input_layout_capacity: capacity,
        }
    }

    /// Number of distinct rasterizer blocks held (active or not).
    #[must_use]
    pub fn rasterizer_count(&self) -> usize {
        self.rasterizers.len()
    }

    /// Number of distinct blend blocks held (active or not).
    #[must_use]
    pub fn blend_count(&self) -> usize {
        self.blends.len()
    }

    /// Number of rasterizer blocks with outstanding references.
    #[must_use]
    pub fn active_rasterizer_count(&self) -> usize {
        self.rasterizers.active_count()
    }

    /// Number of blend blocks with outstanding references.
    #[must_use]
    pub fn active_blend_count(&self) -> usize {
        self.blends.active_count()
    }

    #[must_use]
    pub fn input_layout_count(&self) -> usize {
        self.input_layouts.len()
    }
}

impl StateBlockInterner for StateBlockPool {
    fn intern_rasterizer(
        &mut self,
        state: &RasterizerState,
    ) -> Result<StateBlockRef<RasterizerState>> {
        self.rasterizers.intern(state)
    }

    fn release_rasterizer(&mut self, block: &StateBlockRef<RasterizerState>) {
        self.rasterizers.release(block);
    }

    fn intern_blend(&mut self, state: &BlendState) -> Result<StateBlockRef<BlendState>> {
        self.blends.intern(state)
    }

    fn release_blend(&mut self, block: &StateBlockRef<BlendState>) {
        self.blends.release(block);
    }

    fn input_layout_id(
        &mut self,
        vertex_elements: &[VertexElementGroup],
        topology: PrimitiveTopology,
    ) -> Result<u16> {
        let key = (vertex_elements.to_vec(), topology);
        if let Some(&id) = self.input_layouts.get(&key) {
            return Ok(id);
        }

        // Layout ids are never recycled.
        let next_id = self.input_layouts.len();
        if next_id >= self.input_layout_capacity {
            return Err(CacheError::StateBlockPoolExhausted {
                kind: "input layout",
                capacity: self.input_layout_capacity,
            });
        }

        let id = next_id as u16;
        self.input_layouts.insert(key, id);
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::state::CullMode;

    fn culled(mode: CullMode) -> RasterizerState {
        RasterizerState {
            cull_mode: mode,
            ..RasterizerState::default()
        }
    }

    #[test]
    fn test_equal_values_share_block() {
        let mut pool = StateBlockPool::new();
        let a = pool.intern_rasterizer(&culled(CullMode::Back)).unwrap();
        let b = pool.intern_rasterizer(&culled(CullMode::Back)).unwrap();
        let c = pool.intern_rasterizer(&culled(CullMode::Front)).unwrap();

        assert_eq!(a.lifetime_id(), b.lifetime_id());
        assert!(a.ptr_eq(&b));
        assert_ne!(a.lifetime_id(), c.lifetime_id());
        assert_eq!(pool.rasterizer_count(), 2);
    }

    #[test]
    fn test_released_block_keeps_id_and_value() {
        let mut pool = StateBlockPool::new();
        let blend = BlendState::alpha_blending();

        let first = pool.intern_blend(&blend).unwrap();
        pool.release_blend(&first);
        assert_eq!(pool.active_blend_count(), 0);
        assert_eq!(*first, blend);

        let second = pool.intern_blend(&blend).unwrap();
        assert_eq!(first.lifetime_id(), second.lifetime_id());
        assert_eq!(pool.active_blend_count(), 1);
    }

    #[test]
    fn test_full_pool_recycles_inactive_slots() {
        let mut pool = StateBlockPool::with_capacity(2);
        let back = pool.intern_rasterizer(&culled(CullMode::Back)).unwrap();
        let front = pool.intern_rasterizer(&culled(CullMode::Front)).unwrap();

        assert!(matches!(
            pool.intern_rasterizer(&culled(CullMode::None)),
            Err(CacheError::StateBlockPoolExhausted { .. })
        ));

        pool.release_rasterizer(&front);
        let none = pool.intern_rasterizer(&culled(CullMode::None)).unwrap();
        assert_eq!(none.lifetime_id(), front.lifetime_id());
        assert_eq!(*front, culled(CullMode::Front));
        assert_eq!(pool.active_rasterizer_count(), 2);
        drop(back);
    }

    #[test]
    fn test_input_layout_ids_are_stable() {
        use crate::material::state::{VertexElement, VertexFormat, VertexSemantic};
        use smallvec::smallvec;

        let mut pool = StateBlockPool::new();
        let layout: Vec<VertexElementGroup> = vec![smallvec![VertexElement::new(
            VertexFormat::Float32x3,
            VertexSemantic::Position
        )]];

        let a = pool.input_layout_id(&layout, PrimitiveTopology::TriangleList).unwrap();
        let b = pool.input_layout_id(&layout, PrimitiveTopology::LineList).unwrap();
        let c = pool.input_layout_id(&layout, PrimitiveTopology::TriangleList).unwrap();

        assert_eq!(a, c);
        assert_ne!(a, b);
        assert_eq!(pool.input_layout_count(), 2);
    }

    #[test]
    fn test_input_layouts_exhaust_instead_of_aliasing() {
        let mut pool = StateBlockPool::with_capacity(2);

        let a = pool.input_layout_id(&[], PrimitiveTopology::TriangleList).unwrap();
        let b = pool.input_layout_id(&[], PrimitiveTopology::LineList).unwrap();
        assert_ne!(a, b);

        let err = pool
            .input_layout_id(&[], PrimitiveTopology::PointList)
            .unwrap_err();
        assert!(matches!(
            err,
            CacheError::StateBlockPoolExhausted {
                kind: "input layout",
                capacity: 2
            }
        ));

        // Known layouts still resolve at capacity.
        assert_eq!(
            pool.input_layout_id(&[], PrimitiveTopology::TriangleList).unwrap(),
            a
        );
        assert_eq!(pool.input_layout_count(), 2);
    }
}
