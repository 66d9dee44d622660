use std::sync::OnceLock;

/// Allocates `size` bytes of page-aligned, zero-initialized memory through
/// an anonymous private `mmap`.
///
/// The actual reservation is `size` rounded up to the next page boundary,
/// and always at least one page. Returns the pointer together with the
/// reserved capacity in bytes; the capacity must be passed back to [`free`]
/// when the region is released.
///
/// # Errors
///
/// Returns the OS error if the mapping cannot be established.
pub fn allocate(size: usize) -> std::io::Result<(*mut std::ffi::c_void, usize)> {
    let page_size = page_size();
    assert!(page_size.is_power_of_two());
    let capacity = (size.max(1) + page_size - 1) & !(page_size - 1);
    let ptr = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            capacity,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
            -1,
            0,
        )
    };
    if ptr.is_null() || ptr == libc::MAP_FAILED {
        return Err(std::io::Error::last_os_error());
    }
    Ok((ptr, capacity))
}

/// Releases a region obtained from [`allocate`].
///
/// # Safety
///
/// `ptr` must have been returned by a previous call to [`allocate`],
/// `capacity` must be the capacity returned alongside it, and the region
/// must not have been freed already.
pub unsafe fn free(ptr: *mut std::ffi::c_void, capacity: usize) -> std::io::Result<()> {
    let res = unsafe { libc::munmap(ptr, capacity) };
    if res < 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

/// Returns the platform page size in bytes.
///
/// The value is queried once per process through `sysconf(_SC_PAGESIZE)`
/// and cached; if the query fails, a default of 4 KiB is used.
pub fn page_size() -> usize {
    static SIZE: OnceLock<usize> = OnceLock::new();
    *SIZE.get_or_init(|| read_page_size().unwrap_or(4 * 1024))
}

fn read_page_size() -> std::io::Result<usize> {
    let res = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if res < 0 {
        return Err(std::io::Error::last_os_error());
    }
    assert!(res < i32::MAX as _);
    Ok(res as usize)
}
