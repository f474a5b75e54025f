//! Native memory regions and the retain/release contract that guards them.

use std::fmt;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use arrow_buffer::Buffer as ArrowBuffer;

use crate::engine::NativeEngine;

/// Opaque token identifying one native-side allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferOwnerId(u64);

impl BufferOwnerId {
    pub fn new(raw: u64) -> Self {
        BufferOwnerId(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Description of one native memory region.
///
/// A descriptor alone confers no ownership. The address and size are only
/// valid while the owning allocation is alive, which is exactly what an
/// attached [`ReferenceManager`] asserts.
#[derive(Debug, Clone)]
pub struct BufferDescriptor {
    pub owner: BufferOwnerId,
    pub address: u64,
    pub size: u64,
}

/// Retain/release bookkeeping for one native allocation.
///
/// The count starts at 1, for the implicit reference created when the buffer
/// crossed the boundary. The native release call happens exactly once, on
/// the release that brings the count to zero.
pub struct ReferenceManager {
    descriptor: BufferDescriptor,
    engine: Arc<dyn NativeEngine>,
    count: AtomicUsize,
}

impl ReferenceManager {
    pub fn new(descriptor: BufferDescriptor, engine: Arc<dyn NativeEngine>) -> Arc<Self> {
        Arc::new(ReferenceManager {
            descriptor,
            engine,
            count: AtomicUsize::new(1),
        })
    }

    pub fn descriptor(&self) -> &BufferDescriptor {
        &self.descriptor
    }

    /// Current reference count.
    pub fn retain_count(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    /// Add one reference.
    ///
    /// Panics if the allocation was already released. Retaining dead memory
    /// means the boundary contract was broken, and continuing would hand out
    /// a view over freed native memory.
    pub fn retain(&self) {
        let mut current = self.count.load(Ordering::Relaxed);
        loop {
            if current == 0 {
                panic!(
                    "use after release: retain on released native buffer {:?}",
                    self.descriptor.owner
                );
            }
            match self.count.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }

    /// Drop one reference, performing the native release on the last one.
    ///
    /// Panics on a release past zero: letting that through would double-free
    /// inside the engine.
    pub fn release(&self) {
        let mut current = self.count.load(Ordering::Relaxed);
        loop {
            if current == 0 {
                panic!(
                    "double release of native buffer {:?}",
                    self.descriptor.owner
                );
            }
            match self.count.compare_exchange_weak(
                current,
                current - 1,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
        if current == 1 {
            self.engine.release_buffer(self.descriptor.owner);
        }
    }
}

impl fmt::Debug for ReferenceManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReferenceManager")
            .field("descriptor", &self.descriptor)
            .field("count", &self.retain_count())
            .finish()
    }
}

/// Zero-copy view over one native buffer, dropping its reference on drop.
///
/// There is no `Clone` impl: [`NativeBuffer::retain`] is the only way to
/// create another owner, so every added reference is visible at a call site.
#[derive(Debug)]
pub struct NativeBuffer {
    refs: Arc<ReferenceManager>,
}

impl NativeBuffer {
    /// Wrap a descriptor handed across the boundary, taking over the
    /// implicit reference created at hand-off.
    pub fn wrap(descriptor: BufferDescriptor, engine: Arc<dyn NativeEngine>) -> Self {
        NativeBuffer {
            refs: ReferenceManager::new(descriptor, engine),
        }
    }

    pub fn owner(&self) -> BufferOwnerId {
        self.refs.descriptor.owner
    }

    pub fn address(&self) -> u64 {
        self.refs.descriptor.address
    }

    pub fn len(&self) -> usize {
        self.refs.descriptor.size as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bookkeeping handle shared by every owner of this buffer.
    pub fn reference_manager(&self) -> &Arc<ReferenceManager> {
        &self.refs
    }

    /// Explicitly add a reference and return the new owning handle.
    pub fn retain(&self) -> NativeBuffer {
        self.refs.retain();
        NativeBuffer {
            refs: Arc::clone(&self.refs),
        }
    }

    /// View the native region.
    pub fn as_slice(&self) -> &[u8] {
        if self.len() == 0 {
            return &[];
        }
        // The reference held by self keeps the native allocation alive for
        // the lifetime of the returned slice.
        unsafe { std::slice::from_raw_parts(self.address() as *const u8, self.len()) }
    }

    /// Mutable view of the native region. Only sound under the protocol's
    /// single-consumer-per-batch rule.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        if self.len() == 0 {
            return &mut [];
        }
        unsafe { std::slice::from_raw_parts_mut(self.address() as *mut u8, self.len()) }
    }

    /// Move this handle into an arrow buffer without copying.
    ///
    /// The reference rides along inside the arrow allocation, so the native
    /// release still happens when the last arrow clone drops.
    pub fn into_arrow(self) -> ArrowBuffer {
        let len = self.len();
        if len == 0 {
            return ArrowBuffer::from_vec(Vec::<u8>::new());
        }
        let ptr = NonNull::new(self.address() as *mut u8)
            .expect("non-empty native buffer with null address");
        unsafe { ArrowBuffer::from_custom_allocation(ptr, len, Arc::new(ReleaseOnDrop(self))) }
    }
}

impl Drop for NativeBuffer {
    fn drop(&mut self) {
        self.refs.release();
    }
}

/// Holds a native reference for as long as arrow holds the allocation.
struct ReleaseOnDrop(NativeBuffer);

// The wrapped handle is a raw region plus an atomic count; nothing in it can
// be left in a torn state across an unwind.
impl std::panic::RefUnwindSafe for ReleaseOnDrop {}
