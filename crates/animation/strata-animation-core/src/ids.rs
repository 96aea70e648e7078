//! Identifiers and simple allocators for core entities.

use serde::{Deserialize, Serialize};

/// Handle to a layer owned by an [`crate::AnimationManager`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct LayerId(pub u32);

/// Index of a steady state within its layer (dense, insertion order).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct StateId(pub u32);

impl StateId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Monotonic allocator for LayerId. Removed layers never give their id back.
#[derive(Default, Debug)]
pub struct IdAllocator {
    next_layer: u32,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn alloc_layer(&mut self) -> LayerId {
        let id = LayerId(self.next_layer);
        self.next_layer = self.next_layer.wrapping_add(1);
        id
    }
}
