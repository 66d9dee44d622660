use std::sync::OnceLock;
use windows_sys::Win32::{
    Foundation::GetLastError,
    System::{
        Memory::{MEM_COMMIT, MEM_RELEASE, MEM_RESERVE, PAGE_READWRITE, VirtualAlloc, VirtualFree},
        SystemInformation::{GetSystemInfo, SYSTEM_INFO},
    },
};

/// Allocates `size` bytes of page-aligned, zero-initialized memory through
/// `VirtualAlloc`.
///
/// The actual reservation is `size` rounded up to the next page boundary,
/// and always at least one page. Committed pages are zero-filled by the
/// OS. Returns the pointer together with the reserved capacity in bytes;
/// the capacity must be passed back to [`free`] when the region is
/// released.
///
/// # Errors
///
/// Returns the OS error if the allocation fails.
pub fn allocate(size: usize) -> std::io::Result<(*mut std::ffi::c_void, usize)> {
    let page_size = page_size();
    assert!(page_size.is_power_of_two());
    let capacity = (size.max(1) + page_size - 1) & !(page_size - 1);

    unsafe {
        let ptr = VirtualAlloc(
            std::ptr::null_mut(),
            capacity,
            MEM_COMMIT | MEM_RESERVE,
            PAGE_READWRITE,
        );
        if ptr.is_null() {
            let error = GetLastError();
            return Err(std::io::Error::from_raw_os_error(error as i32));
        }
        Ok((ptr, capacity))
    }
}

/// Releases a region obtained from [`allocate`].
///
/// # Safety
///
/// `ptr` must have been returned by a previous call to [`allocate`],
/// `capacity` must be the capacity returned alongside it, and the region
/// must not have been freed already.
pub unsafe fn free(ptr: *mut std::ffi::c_void, capacity: usize) -> std::io::Result<()> {
    assert!(capacity.is_multiple_of(page_size()));
    unsafe {
        let result = VirtualFree(ptr, 0, MEM_RELEASE);
        if result == 0 {
            let error = GetLastError();
            return Err(std::io::Error::from_raw_os_error(error as i32));
        }
    }
    Ok(())
}

/// Returns the platform page size in bytes.
///
/// The value is queried once per process through `GetSystemInfo` and
/// cached.
pub fn page_size() -> usize {
    static SIZE: OnceLock<usize> = OnceLock::new();

    *SIZE.get_or_init(|| unsafe {
        let mut system_info: SYSTEM_INFO = std::mem::zeroed();
        GetSystemInfo(&mut system_info);
        system_info.dwPageSize as usize
    })
}
