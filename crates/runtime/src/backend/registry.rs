//! Handle registry shared by both adapters.
//!
//! Maps [`NativeKey`]s to native references. The same native object always
//! gets the same key, so handles compare equal across queries. Entries are
//! forgotten when the native side reports the object gone, when an adapter
//! destroys a subtree, and by a sweep once the table has doubled since the
//! last one.

use headgear_common::{Handle, NativeKey};
use slotmap::SlotMap;
use std::collections::HashMap;
use std::hash::Hash;

/// Smallest table size that triggers a sweep.
const SWEEP_FLOOR: usize = 64;

#[derive(Debug)]
pub struct HandleRegistry<N> {
    slots: SlotMap<NativeKey, N>,
    index: HashMap<N, NativeKey>,
    sweep_at: usize,
}

impl<N: Copy + Eq + Hash> Default for HandleRegistry<N> {
    fn default() -> Self {
        Self {
            slots: SlotMap::with_key(),
            index: HashMap::new(),
            sweep_at: SWEEP_FLOOR,
        }
    }
}

impl<N: Copy + Eq + Hash> HandleRegistry<N> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Key for `native`, issuing one on first sight.
    pub fn key_for(&mut self, native: N) -> NativeKey {
        if let Some(key) = self.index.get(&native) {
            return *key;
        }
        let key = self.slots.insert(native);
        self.index.insert(native, key);
        key
    }

    pub fn handle<K>(&mut self, native: N) -> Handle<K> {
        Handle::from_key(self.key_for(native))
    }

    pub fn resolve(&self, key: NativeKey) -> Option<N> {
        self.slots.get(key).copied()
    }

    /// Drop a stale entry. Later lookups of `key` fail.
    pub fn forget(&mut self, key: NativeKey) {
        if let Some(native) = self.slots.remove(key) {
            self.index.remove(&native);
        }
    }

    /// Drop the entry for `native`, if one was issued.
    pub fn forget_native(&mut self, native: N) {
        if let Some(key) = self.index.remove(&native) {
            self.slots.remove(key);
        }
    }

    pub fn needs_sweep(&self) -> bool {
        self.slots.len() >= self.sweep_at
    }

    /// Forget every entry whose native object `alive` rejects. Returns how
    /// many were dropped.
    pub fn sweep(&mut self, mut alive: impl FnMut(N) -> bool) -> usize {
        let before = self.slots.len();
        let index = &mut self.index;
        self.slots.retain(|_, native| {
            let keep = alive(*native);
            if !keep {
                index.remove(&*native);
            }
            keep
        });
        self.sweep_at = (self.slots.len() * 2).max(SWEEP_FLOOR);
        before - self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
