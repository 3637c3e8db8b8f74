use std::cell::RefCell;
use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::rc::Rc;

use crate::lang::value::Value;

#[derive(Debug, Default)]
struct PoolInner {
    /// Free buffers keyed by slot count.
    free: HashMap<usize, Vec<Box<[Value]>>>,
    outstanding: usize,
}

/// Shared pool of local-slot buffers.
///
/// Buffers leave the pool as a [`SlotLease`] and come back when the lease is
/// dropped, which happens once the owning frame is gone. Cloning the pool
/// clones the handle, not the buffers.
#[derive(Debug, Clone, Default)]
pub struct SlotPool {
    inner: Rc<RefCell<PoolInner>>,
}

impl SlotPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check out a buffer of `size` slots, all `Null`.
    pub fn rent(&self, size: usize) -> SlotLease {
        let mut inner = self.inner.borrow_mut();
        inner.outstanding += 1;
        let slots = inner
            .free
            .get_mut(&size)
            .and_then(Vec::pop)
            .unwrap_or_else(|| vec![Value::Null; size].into_boxed_slice());
        SlotLease {
            slots,
            pool: self.clone(),
        }
    }

    /// Leases currently checked out.
    pub fn outstanding(&self) -> usize {
        self.inner.borrow().outstanding
    }

    /// Buffers sitting in the free lists.
    pub fn pooled(&self) -> usize {
        self.inner.borrow().free.values().map(Vec::len).sum()
    }

    fn give_back(&self, mut slots: Box<[Value]>) {
        slots.fill(Value::Null);
        let mut inner = self.inner.borrow_mut();
        inner.outstanding -= 1;
        inner.free.entry(slots.len()).or_default().push(slots);
    }
}

/// Ownership token for one rented buffer.
///
/// Not `Clone`: the buffer goes back to the pool exactly once, when the
/// lease drops.
#[derive(Debug)]
pub struct SlotLease {
    slots: Box<[Value]>,
    pool: SlotPool,
}

impl SlotLease {
    /// Rent a second buffer of the same size holding a copy of this one.
    pub fn duplicate(&self) -> SlotLease {
        let mut copy = self.pool.rent(self.slots.len());
        copy.clone_from_slice(&self.slots);
        copy
    }
}

impl Deref for SlotLease {
    type Target = [Value];

    fn deref(&self) -> &[Value] {
        &self.slots
    }
}

impl DerefMut for SlotLease {
    fn deref_mut(&mut self) -> &mut [Value] {
        &mut self.slots
    }
}

impl Drop for SlotLease {
    fn drop(&mut self) {
        let slots = std::mem::take(&mut self.slots);
        self.pool.give_back(slots);
    }
}
