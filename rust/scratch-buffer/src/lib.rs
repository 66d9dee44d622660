//! Growable typed scratch buffers with page-aligned backing storage for
//! large allocations and one-shot ownership transfer.
//!
//! The central type is [`GrowableBuffer<T>`]: a contiguous region of
//! `length` elements whose logical length can move freely within the
//! retained capacity without touching memory, and whose growth beyond the
//! capacity discards the old allocation in favor of a fresh,
//! zero-initialized one. Buffers of at least one page are page-aligned.
//!
//! [`GrowableBuffer::release`] hands the backing allocation off to the
//! caller as a [`ReleasedBuffer<T>`], leaving the source buffer empty and
//! ready for reuse. The released record frees the memory exactly once, on
//! drop or through its idempotent [`free`](ReleasedBuffer::free).
//!
//! ```
//! use scratch_buffer::GrowableBuffer;
//!
//! let mut buf = GrowableBuffer::<u32>::with_length(8);
//! assert!(buf.as_slice().iter().all(|&v| v == 0));
//!
//! buf.as_mut_slice()[0] = 7;
//! buf.resize(4);
//! assert_eq!(buf.as_slice()[0], 7);
//!
//! let released = buf.release();
//! assert_eq!(released.len(), 4);
//! assert_eq!(buf.len(), 0);
//! ```

pub mod buffer;
pub mod released;

mod storage;

pub use buffer::GrowableBuffer;
pub use released::ReleasedBuffer;
