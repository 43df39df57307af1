#![allow(dead_code)]
//! Identifiers and simple allocators for engine entities.

use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct ControllerId(pub u32);

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct InstId(pub u32);

/// Monotonic allocator for ControllerId and InstId.
/// IDs are opaque externally and never reused within one engine.
#[derive(Default, Debug)]
pub struct IdAllocator {
    next_controller: u32,
    next_inst: u32,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn alloc_controller(&mut self) -> ControllerId {
        let id = ControllerId(self.next_controller);
        self.next_controller = self.next_controller.wrapping_add(1);
        id
    }

    #[inline]
    pub fn alloc_inst(&mut self) -> InstId {
        let id = InstId(self.next_inst);
        self.next_inst = self.next_inst.wrapping_add(1);
        id
    }

    #[inline]
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
