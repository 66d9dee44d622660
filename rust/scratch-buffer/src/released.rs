//! The record produced when a buffer's allocation is handed off.

use std::mem;

use bytemuck::{AnyBitPattern, NoUninit};

use crate::storage::Storage;

/// A buffer handed off by [`GrowableBuffer::release`].
///
/// The record owns the allocation it reports: dropping it, or calling
/// [`free`](ReleasedBuffer::free), returns the memory to its allocator.
/// A record either owns an allocation together with a non-zero length, or
/// is empty and owns nothing; it never reports an owned pointer with zero
/// length.
///
/// [`GrowableBuffer::release`]: crate::GrowableBuffer::release
pub struct ReleasedBuffer<T> {
    /// Start of the owned allocation, null for the empty record.
    ptr: *mut T,
    /// Number of valid elements at the time of release.
    length: usize,
    /// Always `length * size_of::<T>()`.
    byte_length: usize,
    /// Provenance of the allocation, used to free it.
    storage: Storage,
}

impl<T> ReleasedBuffer<T> {
    /// The empty record: no allocation, zero length.
    pub fn empty() -> ReleasedBuffer<T> {
        ReleasedBuffer {
            ptr: std::ptr::null_mut(),
            length: 0,
            byte_length: 0,
            storage: Storage::None,
        }
    }

    pub(crate) fn from_raw_parts(
        ptr: *mut T,
        length: usize,
        byte_length: usize,
        storage: Storage,
    ) -> ReleasedBuffer<T> {
        debug_assert!(!ptr.is_null());
        debug_assert!(length > 0);
        ReleasedBuffer {
            ptr,
            length,
            byte_length,
            storage,
        }
    }

    /// Returns the number of elements that were released.
    #[inline]
    pub fn len(&self) -> usize {
        self.length
    }

    /// Returns `true` if the record owns nothing.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Returns the released size in bytes.
    #[inline]
    pub fn byte_len(&self) -> usize {
        self.byte_length
    }

    /// Returns a raw pointer to the owned allocation, or null for the
    /// empty record.
    #[inline]
    pub fn as_ptr(&self) -> *const T {
        self.ptr
    }

    /// Frees the owned allocation and resets the record to the empty
    /// state.
    ///
    /// Calling this again, or calling it on an already-empty record, is a
    /// no-op. Dropping the record calls it implicitly, so the memory is
    /// returned exactly once either way.
    pub fn free(&mut self) {
        if !self.ptr.is_null() {
            let storage = mem::replace(&mut self.storage, Storage::None);
            // SAFETY: `ptr` is the live allocation obtained with
            // `storage`; it is nulled right below, so it cannot be freed
            // again.
            unsafe { storage.free(self.ptr.cast()) };
            self.ptr = std::ptr::null_mut();
        }
        self.length = 0;
        self.byte_length = 0;
    }
}

impl<T: AnyBitPattern + NoUninit> ReleasedBuffer<T> {
    /// Returns the released contents as a typed slice of
    /// [`len`](ReleasedBuffer::len) elements.
    #[inline]
    pub fn as_slice(&self) -> &[T] {
        if self.ptr.is_null() {
            return &[];
        }
        // SAFETY: `ptr` points at an allocation of at least `length`
        // initialized elements, and `T` accepts any bit pattern.
        unsafe { std::slice::from_raw_parts(self.ptr, self.length) }
    }

    /// Returns the released contents reinterpreted as raw bytes.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(self.as_slice())
    }
}

impl<T> Drop for ReleasedBuffer<T> {
    fn drop(&mut self) {
        self.free();
    }
}

// SAFETY: the record exclusively owns its allocation and frees it exactly
// once, so moving it between threads is sound for sendable elements.
unsafe impl<T: Send> Send for ReleasedBuffer<T> {}

// SAFETY: shared references only permit reads of the element region.
unsafe impl<T: Sync> Sync for ReleasedBuffer<T> {}

impl<T> std::fmt::Debug for ReleasedBuffer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReleasedBuffer")
            .field("ptr", &self.ptr)
            .field("length", &self.length)
            .field("byte_length", &self.byte_length)
            .finish()
    }
}
