//! The growable buffer itself.

use std::alloc::Layout;
use std::marker::PhantomData;
use std::mem;

use bytemuck::{AnyBitPattern, NoUninit};
use scratch_page_alloc::pages;

use crate::released::ReleasedBuffer;
use crate::storage::Storage;

/// A growable, contiguous buffer of `length` elements of type `T`.
///
/// The buffer tracks a logical length separately from the capacity of its
/// backing allocation. Resizing within the current capacity only moves the
/// logical length: the allocation and its bytes are left untouched, so
/// shrinking and growing back within capacity re-exposes the previous
/// contents verbatim. Growing beyond the capacity discards the old
/// allocation and produces a fresh, zero-initialized one of exactly the
/// requested element count.
///
/// Allocations of at least one page are page-aligned; smaller ones come
/// from the general heap with the natural alignment of `T`. The page size
/// is captured at construction and serves as the alignment unit for the
/// lifetime of the buffer.
///
/// The backing allocation can be handed off to a caller with
/// [`release`](GrowableBuffer::release), after which the buffer is empty
/// and ready for reuse.
///
/// Element types are restricted to plain, bitwise-copyable data
/// (`bytemuck::AnyBitPattern + NoUninit`); zero-sized types are rejected
/// at construction.
pub struct GrowableBuffer<T> {
    /// Start of the current allocation, null when none exists.
    ptr: *mut T,
    /// Number of valid elements currently exposed.
    length: usize,
    /// Element capacity of the current allocation. Never shrunk by a
    /// resize, only grown or reset on release.
    capacity: usize,
    /// Always `length * size_of::<T>()`.
    byte_length: usize,
    /// The alignment unit: platform page size, fixed at construction.
    page_size: usize,
    /// Provenance of the current allocation, used to free it.
    storage: Storage,
    _marker: PhantomData<T>,
}

impl<T: AnyBitPattern + NoUninit> GrowableBuffer<T> {
    /// Creates an empty buffer with no allocation.
    ///
    /// # Panics
    ///
    /// Panics if `T` is zero-sized.
    pub fn new() -> GrowableBuffer<T> {
        assert!(
            mem::size_of::<T>() != 0,
            "zero-sized element types are not supported"
        );
        GrowableBuffer {
            ptr: std::ptr::null_mut(),
            length: 0,
            capacity: 0,
            byte_length: 0,
            page_size: pages::page_size(),
            storage: Storage::None,
            _marker: PhantomData,
        }
    }

    /// Creates a buffer holding `initial_length` zero-initialized
    /// elements.
    ///
    /// Equivalent to [`new`](GrowableBuffer::new) followed by
    /// [`resize`](GrowableBuffer::resize).
    pub fn with_length(initial_length: usize) -> GrowableBuffer<T> {
        let mut buffer = GrowableBuffer::new();
        buffer.resize(initial_length);
        buffer
    }

    /// Returns the number of valid elements currently exposed.
    #[inline]
    pub fn len(&self) -> usize {
        self.length
    }

    /// Returns `true` if the buffer exposes no elements.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Returns the exposed size in bytes, always
    /// `len() * size_of::<T>()`.
    #[inline]
    pub fn byte_len(&self) -> usize {
        self.byte_length
    }

    /// Returns the element capacity of the current allocation.
    ///
    /// The capacity is never reduced by [`resize`](GrowableBuffer::resize);
    /// it only grows, or resets to zero when the allocation leaves the
    /// buffer through [`release`](GrowableBuffer::release).
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the alignment unit: the platform page size captured when
    /// the buffer was created.
    ///
    /// Buffers whose byte length reaches this value are allocated
    /// page-aligned.
    #[inline]
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Resizes the buffer to `new_length` elements.
    ///
    /// Within the current capacity this only moves the logical length.
    /// The allocation and its bytes are untouched: shrinking leaves the
    /// now-out-of-range bytes allocated with their old values, and a
    /// later grow back within capacity re-exposes them verbatim. No
    /// allocation, deallocation, or zeroing happens on this path.
    ///
    /// Growing beyond the capacity frees any existing allocation without
    /// copying its contents, then allocates exactly `new_length`
    /// zero-initialized elements; the capacity becomes `new_length`.
    /// Byte lengths below one page come from the general heap, larger
    /// ones are page-aligned.
    ///
    /// Any previously obtained raw pointer is invalidated when the buffer
    /// reallocates.
    ///
    /// Allocation failure aborts the process; see
    /// [`try_resize`](GrowableBuffer::try_resize) for the recoverable
    /// variant.
    pub fn resize(&mut self, new_length: usize) {
        if self.resize_in_place(new_length) {
            return;
        }
        if self.grow(new_length).is_err() {
            std::alloc::handle_alloc_error(Self::array_layout(new_length));
        }
    }

    /// Fallible variant of [`resize`](GrowableBuffer::resize).
    ///
    /// The shrink/reuse path cannot fail. If growth fails, the error is
    /// returned and the buffer is left in the empty state (no allocation,
    /// zero length), ready for another attempt.
    pub fn try_resize(&mut self, new_length: usize) -> std::io::Result<()> {
        if self.resize_in_place(new_length) {
            return Ok(());
        }
        self.grow(new_length)
    }

    /// Hands the current allocation off to the caller.
    ///
    /// For a non-empty buffer, the returned record owns the allocation
    /// together with the current length and byte length, and this buffer
    /// resets to the empty state (zero length, zero capacity, no
    /// allocation), remaining fully usable.
    ///
    /// For a zero-length buffer, the record is empty and the buffer is
    /// left untouched; in particular, spare capacity left behind by an
    /// earlier shrink to zero stays with the buffer for reuse and is
    /// never reported as owned by the record.
    pub fn release(&mut self) -> ReleasedBuffer<T> {
        if self.length == 0 {
            return ReleasedBuffer::empty();
        }
        let storage = mem::replace(&mut self.storage, Storage::None);
        let released =
            ReleasedBuffer::from_raw_parts(self.ptr, self.length, self.byte_length, storage);
        self.ptr = std::ptr::null_mut();
        self.length = 0;
        self.capacity = 0;
        self.byte_length = 0;
        released
    }

    /// Returns the buffer contents as a typed slice of
    /// [`len`](GrowableBuffer::len) elements.
    #[inline]
    pub fn as_slice(&self) -> &[T] {
        if self.ptr.is_null() {
            return &[];
        }
        // SAFETY: `ptr` points at an allocation of at least `capacity >=
        // length` elements, all of which carry initialized bytes, and `T`
        // accepts any bit pattern.
        unsafe { std::slice::from_raw_parts(self.ptr, self.length) }
    }

    /// Returns the buffer contents as a mutable typed slice of
    /// [`len`](GrowableBuffer::len) elements.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        if self.ptr.is_null() {
            return &mut [];
        }
        // SAFETY: as for `as_slice`; the exclusive borrow of `self` makes
        // the mutable view unique.
        unsafe { std::slice::from_raw_parts_mut(self.ptr, self.length) }
    }

    /// Returns the buffer contents reinterpreted as raw bytes
    /// ([`byte_len`](GrowableBuffer::byte_len) of them).
    ///
    /// No copy is involved; the view shares the lifetime of the typed
    /// slice.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(self.as_slice())
    }

    /// Returns the buffer contents reinterpreted as mutable raw bytes.
    #[inline]
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        bytemuck::cast_slice_mut(self.as_mut_slice())
    }

    /// Returns the buffer contents reinterpreted as signed bytes.
    #[inline]
    pub fn as_signed_bytes(&self) -> &[i8] {
        bytemuck::cast_slice(self.as_slice())
    }

    /// Returns the buffer contents reinterpreted as mutable signed bytes.
    #[inline]
    pub fn as_signed_bytes_mut(&mut self) -> &mut [i8] {
        bytemuck::cast_slice_mut(self.as_mut_slice())
    }

    /// Returns a raw pointer to the start of the allocation, or null for
    /// a buffer without one.
    ///
    /// The pointer is invalidated by any reallocating resize and by
    /// [`release`](GrowableBuffer::release).
    #[inline]
    pub fn as_ptr(&self) -> *const T {
        self.ptr
    }

    /// Returns a mutable raw pointer to the start of the allocation, or
    /// null for a buffer without one.
    #[inline]
    pub fn as_mut_ptr(&mut self) -> *mut T {
        self.ptr
    }

    /// Handles the no-op and shrink/reuse cases; returns `false` when the
    /// request needs a fresh allocation.
    fn resize_in_place(&mut self, new_length: usize) -> bool {
        if new_length == self.length {
            true
        } else if new_length <= self.capacity {
            self.length = new_length;
            self.byte_length = new_length * mem::size_of::<T>();
            true
        } else {
            false
        }
    }

    /// Replaces the current allocation with a fresh zero-initialized one
    /// of exactly `new_length` elements.
    ///
    /// On failure the buffer has already been reset to the empty state.
    fn grow(&mut self, new_length: usize) -> std::io::Result<()> {
        let layout = Self::array_layout(new_length);
        let byte_length = layout.size();

        // Old contents are discarded, not carried over.
        self.free_storage();

        let (ptr, storage) = if byte_length >= self.page_size && layout.align() <= self.page_size {
            let (ptr, reserved) = pages::allocate(byte_length)?;
            (ptr.cast::<T>(), Storage::Pages { reserved })
        } else {
            // SAFETY: `new_length > capacity` implies a non-zero element
            // count, and `T` is not zero-sized, so the layout size is
            // non-zero.
            let ptr = unsafe { std::alloc::alloc_zeroed(layout) };
            if ptr.is_null() {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::OutOfMemory,
                    "failed to allocate memory",
                ));
            }
            (ptr.cast::<T>(), Storage::Heap { layout })
        };

        self.ptr = ptr;
        self.length = new_length;
        self.capacity = new_length;
        self.byte_length = byte_length;
        self.storage = storage;
        Ok(())
    }

    fn array_layout(len: usize) -> Layout {
        Layout::array::<T>(len).expect("buffer layout")
    }
}

impl<T> GrowableBuffer<T> {
    /// Frees the current allocation, if any, and resets the buffer to the
    /// empty state.
    fn free_storage(&mut self) {
        if !self.ptr.is_null() {
            let storage = mem::replace(&mut self.storage, Storage::None);
            // SAFETY: `ptr` is the live allocation obtained with
            // `storage`, and the buffer state is reset right below.
            unsafe { storage.free(self.ptr.cast()) };
        }
        self.ptr = std::ptr::null_mut();
        self.length = 0;
        self.capacity = 0;
        self.byte_length = 0;
    }
}

impl<T> Drop for GrowableBuffer<T> {
    fn drop(&mut self) {
        self.free_storage();
    }
}

impl<T: AnyBitPattern + NoUninit> Default for GrowableBuffer<T> {
    fn default() -> Self {
        Self::new()
    }
}

// SAFETY: the buffer exclusively owns its allocation and frees it exactly
// once, so moving it between threads is sound for sendable elements.
unsafe impl<T: Send> Send for GrowableBuffer<T> {}

// SAFETY: shared references only permit reads of the element region.
unsafe impl<T: Sync> Sync for GrowableBuffer<T> {}

impl<T> std::fmt::Debug for GrowableBuffer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrowableBuffer")
            .field("ptr", &self.ptr)
            .field("length", &self.length)
            .field("capacity", &self.capacity)
            .field("byte_length", &self.byte_length)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_is_empty() {
        let buffer = GrowableBuffer::<i32>::new();
        assert_eq!(buffer.len(), 0);
        assert_eq!(buffer.byte_len(), 0);
        assert_eq!(buffer.capacity(), 0);
        assert!(buffer.is_empty());
        assert!(buffer.as_ptr().is_null());
        assert!(buffer.as_slice().is_empty());
        assert!(buffer.as_bytes().is_empty());
    }

    #[test]
    fn test_with_length_zero() {
        let mut buffer = GrowableBuffer::<i32>::with_length(0);
        assert_eq!(buffer.len(), 0);
        assert_eq!(buffer.byte_len(), 0);
        assert!(buffer.as_ptr().is_null());

        let released = buffer.release();
        assert_eq!(released.len(), 0);
        assert_eq!(released.byte_len(), 0);
        assert!(released.as_ptr().is_null());
        assert_eq!(buffer.len(), 0);
        assert_eq!(buffer.byte_len(), 0);
        assert!(buffer.as_ptr().is_null());
    }

    #[test]
    fn test_with_length_bytes() {
        let mut buffer = GrowableBuffer::<u8>::with_length(10);
        assert_eq!(buffer.len(), 10);
        assert_eq!(buffer.byte_len(), 10);
        assert!(!buffer.as_ptr().is_null());
        assert!(buffer.as_slice().iter().all(|&b| b == 0));

        buffer.as_mut_slice()[..9].copy_from_slice(b"hellotest");
        assert_eq!(&buffer.as_slice()[..9], b"hellotest");
    }

    #[test]
    fn test_with_length_ints() {
        let mut buffer = GrowableBuffer::<i32>::with_length(10);
        assert_eq!(buffer.len(), 10);
        assert_eq!(buffer.byte_len(), 10 * std::mem::size_of::<i32>());
        assert!(!buffer.as_ptr().is_null());
        assert!(buffer.as_slice().iter().all(|&v| v == 0));

        for (j, v) in buffer.as_mut_slice().iter_mut().rev().enumerate() {
            *v = j as i32;
        }
        let expected: Vec<i32> = (0..10).rev().collect();
        assert_eq!(buffer.as_slice(), &expected[..]);
        assert_eq!(buffer.as_bytes(), bytemuck::cast_slice::<i32, u8>(&expected));
    }

    #[test]
    fn test_resize_smaller_keeps_prefix_and_pointer() {
        let mut buffer = GrowableBuffer::<u8>::with_length(10);
        buffer.as_mut_slice()[..9].copy_from_slice(b"hellotest");
        let ptr = buffer.as_ptr();

        buffer.resize(5);
        assert_eq!(buffer.as_ptr(), ptr);
        assert_eq!(buffer.len(), 5);
        assert_eq!(buffer.byte_len(), 5);
        assert_eq!(buffer.capacity(), 10);
        assert_eq!(buffer.as_slice(), b"hello");
    }

    #[test]
    fn test_resize_same_length_is_noop() {
        let mut buffer = GrowableBuffer::<u8>::with_length(10);
        buffer.as_mut_slice()[..9].copy_from_slice(b"hellotest");
        let ptr = buffer.as_ptr();

        buffer.resize(10);
        assert_eq!(buffer.as_ptr(), ptr);
        assert_eq!(buffer.len(), 10);
        assert_eq!(&buffer.as_slice()[..9], b"hellotest");
    }

    #[test]
    fn test_resize_is_idempotent() {
        let mut buffer = GrowableBuffer::<u32>::with_length(10);
        buffer.resize(7);
        let ptr = buffer.as_ptr();
        let len = buffer.len();
        let byte_len = buffer.byte_len();

        buffer.resize(7);
        assert_eq!(buffer.as_ptr(), ptr);
        assert_eq!(buffer.len(), len);
        assert_eq!(buffer.byte_len(), byte_len);
    }

    #[test]
    fn test_resize_larger_discards_and_zero_fills() {
        let mut buffer = GrowableBuffer::<u8>::with_length(10);
        buffer.as_mut_slice()[..9].copy_from_slice(b"hellotest");

        let new_len = buffer.page_size() * 2;
        buffer.resize(new_len);
        assert_eq!(buffer.len(), new_len);
        assert_eq!(buffer.byte_len(), new_len);
        assert_eq!(buffer.capacity(), new_len);
        assert!(buffer.as_slice().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_regrow_within_capacity_exposes_old_bytes() {
        let mut buffer = GrowableBuffer::<u8>::with_length(10);
        buffer.as_mut_slice()[..9].copy_from_slice(b"hellotest");

        buffer.resize(5);
        buffer.resize(10);
        // The shrink/grow pair stayed within capacity: no zeroing
        // happened and the old tail is visible again.
        assert_eq!(&buffer.as_slice()[..9], b"hellotest");
    }

    #[test]
    fn test_large_buffer_is_page_aligned() {
        let mut buffer = GrowableBuffer::<u8>::new();
        buffer.resize(buffer.page_size() * 2);
        assert!((buffer.as_ptr() as usize).is_multiple_of(buffer.page_size()));

        // Exactly one page of u64 elements is also page-aligned.
        let mut buffer = GrowableBuffer::<u64>::new();
        let elements = buffer.page_size() / std::mem::size_of::<u64>();
        buffer.resize(elements);
        assert!((buffer.as_ptr() as usize).is_multiple_of(buffer.page_size()));
    }

    #[test]
    fn test_release_transfers_ownership() {
        let mut buffer = GrowableBuffer::<u8>::with_length(10);
        buffer.as_mut_slice()[..9].copy_from_slice(b"hellotest");
        let ptr = buffer.as_ptr();

        let mut released = buffer.release();
        assert_eq!(released.len(), 10);
        assert_eq!(released.byte_len(), 10);
        assert_eq!(released.as_ptr(), ptr);
        assert_eq!(&released.as_slice()[..9], b"hellotest");

        assert_eq!(buffer.len(), 0);
        assert_eq!(buffer.byte_len(), 0);
        assert_eq!(buffer.capacity(), 0);
        assert!(buffer.as_ptr().is_null());

        released.free();
        let second = buffer.release();
        assert_eq!(second.len(), 0);
        assert_eq!(second.byte_len(), 0);
        assert!(second.as_ptr().is_null());
    }

    #[test]
    fn test_release_after_shrink() {
        let mut buffer = GrowableBuffer::<u8>::with_length(10);
        buffer.as_mut_slice()[..9].copy_from_slice(b"hellotest");
        let ptr = buffer.as_ptr();
        buffer.resize(5);

        let released = buffer.release();
        assert_eq!(released.len(), 5);
        assert_eq!(released.byte_len(), 5);
        assert_eq!(released.as_ptr(), ptr);
        assert_eq!(released.as_slice(), b"hello");

        assert_eq!(buffer.len(), 0);
        assert_eq!(buffer.capacity(), 0);
        assert!(buffer.as_ptr().is_null());
    }

    #[test]
    fn test_release_empty_keeps_spare_capacity() {
        let mut buffer = GrowableBuffer::<u8>::with_length(10);
        buffer.as_mut_slice()[..9].copy_from_slice(b"hellotest");
        let ptr = buffer.as_ptr();
        buffer.resize(0);

        // A zero-length release reports nothing owned and leaves the
        // spare allocation with the buffer.
        let released = buffer.release();
        assert!(released.as_ptr().is_null());
        assert_eq!(released.len(), 0);
        assert_eq!(buffer.capacity(), 10);

        buffer.resize(8);
        assert_eq!(buffer.as_ptr(), ptr);
        assert_eq!(buffer.as_slice(), b"hellotes");
    }

    #[test]
    fn test_reuse_after_release() {
        let mut buffer = GrowableBuffer::<u32>::with_length(10);
        buffer.as_mut_slice().fill(0xABCD);
        let released = buffer.release();
        assert_eq!(released.len(), 10);

        buffer.resize(4);
        assert_eq!(buffer.len(), 4);
        assert_eq!(buffer.capacity(), 4);
        assert!(buffer.as_slice().iter().all(|&v| v == 0));
    }

    #[test]
    fn test_try_resize() {
        let mut buffer = GrowableBuffer::<u16>::new();
        buffer.try_resize(12).expect("try_resize");
        assert_eq!(buffer.len(), 12);
        assert_eq!(buffer.byte_len(), 24);
        assert!(buffer.as_slice().iter().all(|&v| v == 0));

        // The shrink path cannot fail and reuses the allocation.
        let ptr = buffer.as_ptr();
        buffer.try_resize(3).expect("try_resize");
        assert_eq!(buffer.as_ptr(), ptr);
        assert_eq!(buffer.len(), 3);
    }

    #[test]
    fn test_byte_views_match_typed_view() {
        let mut buffer = GrowableBuffer::<u32>::with_length(6);
        for (i, v) in buffer.as_mut_slice().iter_mut().enumerate() {
            *v = (i as u32) * 0x0101_0101;
        }

        assert_eq!(buffer.as_bytes().len(), buffer.len() * std::mem::size_of::<u32>());
        assert_eq!(buffer.as_bytes().len(), buffer.byte_len());
        assert_eq!(buffer.as_signed_bytes().len(), buffer.byte_len());

        // Reinterpreting the byte view back yields the same elements.
        let roundtrip: &[u32] = bytemuck::cast_slice(buffer.as_bytes());
        assert_eq!(roundtrip, buffer.as_slice());

        let signed: &[i8] = buffer.as_signed_bytes();
        let unsigned: &[u8] = buffer.as_bytes();
        assert!(signed.iter().zip(unsigned).all(|(&s, &u)| s as u8 == u));
    }

    #[test]
    fn test_byte_view_mut() {
        let mut buffer = GrowableBuffer::<u32>::with_length(2);
        buffer.as_bytes_mut().fill(0xFF);
        assert!(buffer.as_slice().iter().all(|&v| v == u32::MAX));

        buffer.as_signed_bytes_mut().fill(0);
        assert!(buffer.as_slice().iter().all(|&v| v == 0));
    }

    #[test]
    #[should_panic(expected = "zero-sized")]
    fn test_zero_sized_elements_rejected() {
        let _ = GrowableBuffer::<()>::new();
    }

    #[test]
    fn test_default_is_empty() {
        let buffer = GrowableBuffer::<u8>::default();
        assert!(buffer.is_empty());
        assert!(buffer.as_ptr().is_null());
    }

    #[test]
    fn test_debug_format() {
        let buffer = GrowableBuffer::<u8>::with_length(4);
        let debug_str = format!("{buffer:?}");
        assert!(debug_str.contains("GrowableBuffer"));
        assert!(debug_str.contains("length"));
        assert!(debug_str.contains("capacity"));
        assert!(debug_str.contains("byte_length"));
    }

    #[test]
    fn test_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<GrowableBuffer<u32>>();
    }
}
