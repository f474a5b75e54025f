//! The retained-buffer ledger: engine-side allocations on loan to the bridge.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use arrow_buffer::Buffer;
use arrowbridge_core::{BufferDescriptor, BufferOwnerId};

/// Keeps every handed-out buffer alive until the bridge releases it.
#[derive(Default)]
pub struct BufferLedger {
    slots: Mutex<HashMap<u64, Buffer>>,
    next_id: AtomicU64,
}

impl BufferLedger {
    pub fn new() -> Self {
        BufferLedger::default()
    }

    /// Pin `buffer` and describe it for the boundary.
    pub fn register(&self, buffer: Buffer) -> BufferDescriptor {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let descriptor = BufferDescriptor {
            owner: BufferOwnerId::new(id),
            address: buffer.as_ptr() as u64,
            size: buffer.len() as u64,
        };
        self.slots.lock().unwrap().insert(id, buffer);
        descriptor
    }

    /// Drop the allocation behind `owner`. Unknown ids are a logged no-op.
    pub fn release(&self, owner: BufferOwnerId) {
        if self.slots.lock().unwrap().remove(&owner.raw()).is_none() {
            log::debug!("release of unknown buffer id {}", owner.raw());
        }
    }

    /// Number of allocations currently pinned.
    pub fn len(&self) -> usize {
        self.slots.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
