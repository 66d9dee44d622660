//! Page-granular memory allocation.
//!
//! This crate exposes the platform page size and page-aligned,
//! zero-initialized allocations to the buffer crates sitting on top of it.
//! The implementation is chosen per platform: anonymous `mmap` on unix,
//! `VirtualAlloc` on windows, and a `std::alloc` emulation elsewhere.

#[cfg_attr(unix, path = "pages_unix.rs")]
#[cfg_attr(windows, path = "pages_win.rs")]
#[cfg_attr(not(any(unix, windows)), path = "pages_fallback.rs")]
pub mod pages;
