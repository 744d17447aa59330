//! Index-based arena backing the graph's nodes and edges.
//!
//! Slots freed by `remove` are recycled by later `insert`s, and `clear` keeps
//! the allocated capacity, so rebuilding the graph every frame settles into a
//! steady state that touches the allocator only when the graph grows.

pub(crate) struct Arena<T> {
    slots: Vec<Option<T>>,
    free: Vec<u32>,
    len: usize,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Arena {
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
        }
    }
}

impl<T> Arena<T> {
    pub(crate) fn insert(&mut self, value: T) -> u32 {
        self.len += 1;
        if let Some(index) = self.free.pop() {
            debug_assert!(self.slots[index as usize].is_none());
            self.slots[index as usize] = Some(value);
            index
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Some(value));
            index
        }
    }

    /// Frees a slot, returning its value. Returns `None` if the slot was
    /// already freed (removal of culled nodes may race teardown sweeps).
    pub(crate) fn remove(&mut self, index: u32) -> Option<T> {
        let value = self.slots.get_mut(index as usize)?.take()?;
        self.free.push(index);
        self.len -= 1;
        Some(value)
    }

    pub(crate) fn get(&self, index: u32) -> Option<&T> {
        self.slots.get(index as usize)?.as_ref()
    }

    pub(crate) fn get_mut(&mut self, index: u32) -> Option<&mut T> {
        self.slots.get_mut(index as usize)?.as_mut()
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Drops every live value and invalidates all indices issued so far.
    /// Capacity is retained for the next cycle.
    pub(crate) fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.len = 0;
    }
}
