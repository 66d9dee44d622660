//! Bookkeeping for how a buffer's allocation was obtained, and therefore
//! how it must be returned.

use std::alloc::Layout;

use scratch_page_alloc::pages;

/// The provenance of a live allocation.
///
/// A buffer and the record it releases both carry this value alongside the
/// pointer, so whichever of them ends up freeing the memory routes the
/// pointer back to the allocator it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Storage {
    /// No allocation.
    None,
    /// General-purpose heap allocation with the given layout.
    Heap { layout: Layout },
    /// Page allocation; `reserved` is the page-rounded byte capacity
    /// returned by the allocator and required to free the region.
    Pages { reserved: usize },
}

impl Storage {
    /// Frees `ptr` according to the allocation provenance.
    ///
    /// Errors from the page allocator are discarded; there is no caller
    /// that could act on a failed unmap.
    ///
    /// # Safety
    ///
    /// `ptr` must be the start of the live allocation this `Storage` value
    /// was produced for, and must not be used or freed again afterwards.
    /// For `Storage::None` the pointer is ignored.
    pub(crate) unsafe fn free(self, ptr: *mut u8) {
        match self {
            Storage::None => {}
            Storage::Heap { layout } => unsafe { std::alloc::dealloc(ptr, layout) },
            Storage::Pages { reserved } => {
                let _ = unsafe { pages::free(ptr.cast(), reserved) };
            }
        }
    }
}
