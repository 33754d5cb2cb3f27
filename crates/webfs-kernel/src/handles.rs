//! Generational handle table.
//!
//! Slots are recycled, generations are not: removing a value bumps its
//! slot's generation, so an [`OpId`] that outlived its handle misses instead
//! of landing on whatever reused the slot.

use parking_lot::Mutex;
use webfs_types::OpId;

struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

struct Inner<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    live: usize,
}

/// Thread-safe slot map keyed by [`OpId`].
///
/// The lock covers insert, remove and lookup only; callers clone what they
/// need out of a slot.
pub struct HandleTable<T> {
    inner: Mutex<Inner<T>>,
}

impl<T> Default for HandleTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> HandleTable<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                slots: Vec::new(),
                free: Vec::new(),
                live: 0,
            }),
        }
    }

    /// Store `value` and return its token.
    pub fn insert(&self, value: T) -> OpId {
        let mut inner = self.inner.lock();
        inner.live += 1;
        if let Some(index) = inner.free.pop() {
            let slot = &mut inner.slots[index as usize];
            slot.value = Some(value);
            return OpId::new(index, slot.generation);
        }
        let index = inner.slots.len() as u32;
        // Generation 0 is reserved for OpId::DETACHED.
        inner.slots.push(Slot {
            generation: 1,
            value: Some(value),
        });
        OpId::new(index, 1)
    }

    /// Remove and return the value for `id`, retiring the token.
    pub fn remove(&self, id: OpId) -> Option<T> {
        let mut inner = self.inner.lock();
        let slot = inner.slots.get_mut(id.index() as usize)?;
        if slot.generation != id.generation() || slot.value.is_none() {
            return None;
        }
        let value = slot.value.take();
        slot.generation = match slot.generation.wrapping_add(1) {
            0 => 1,
            g => g,
        };
        inner.free.push(id.index());
        inner.live -= 1;
        value
    }

    pub fn contains(&self, id: OpId) -> bool {
        self.with(id, |_| ()).is_some()
    }

    /// Run `f` against the value for `id`, if live.
    pub fn with<R>(&self, id: OpId, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let mut inner = self.inner.lock();
        let slot = inner.slots.get_mut(id.index() as usize)?;
        if slot.generation != id.generation() {
            return None;
        }
        slot.value.as_mut().map(f)
    }

    /// Number of live handles.
    pub fn len(&self) -> usize {
        self.inner.lock().live
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
