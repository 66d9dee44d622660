use std::alloc::{Layout, alloc_zeroed, dealloc};

/// Allocates `size` bytes of page-aligned, zero-initialized memory
/// (emulated through `std::alloc`).
pub fn allocate(size: usize) -> std::io::Result<(*mut std::ffi::c_void, usize)> {
    let page_size = page_size();
    assert!(page_size.is_power_of_two());
    let capacity = (size.max(1) + page_size - 1) & !(page_size - 1);

    let layout = Layout::from_size_align(capacity, page_size)
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidInput, "invalid layout"))?;

    let ptr = unsafe { alloc_zeroed(layout) };
    if ptr.is_null() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::OutOfMemory,
            "failed to allocate memory",
        ));
    }

    Ok((ptr as *mut std::ffi::c_void, capacity))
}

/// Releases a region obtained from [`allocate`].
///
/// # Safety
///
/// `ptr` must have been returned by a previous call to [`allocate`],
/// `capacity` must be the capacity returned alongside it, and the region
/// must not have been freed already.
pub unsafe fn free(ptr: *mut std::ffi::c_void, capacity: usize) -> std::io::Result<()> {
    let page_size = page_size();
    assert!(capacity.is_multiple_of(page_size));

    let layout = Layout::from_size_align(capacity, page_size)
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidInput, "invalid layout"))?;

    unsafe {
        dealloc(ptr as *mut u8, layout);
    }
    Ok(())
}

/// Returns the assumed page size in bytes.
pub fn page_size() -> usize {
    4 * 1024
}
