//! Huge-page-backed anonymous memory for the pirate workers' shared array.
//!
//! One `HugePageBuffer` is allocated once at bootstrap and handed to every
//! pirate worker thread; each worker touches a different slice of it to
//! evict the entity under test's share of the last-level cache. The kernel
//! rejects any request for huge pages this process doesn't have reserved
//! (see `/proc/sys/vm/nr_hugepages`), which surfaces as a plain `mmap`
//! failure here.

use std::io;
use std::os::raw::c_void;
use std::ptr::NonNull;

/// 2 MiB, the huge page size on every architecture this tool targets.
pub const HUGE_PAGE_SIZE: usize = 1 << 21;

/// Round `size` up to a multiple of [`HUGE_PAGE_SIZE`]. A size that is
/// already a multiple is rounded up to the *next* one, not left alone —
/// this matches the allocator this is grounded on, which always reserves at
/// least one full spare huge page.
pub fn round_up_huge_page(size: usize) -> usize {
    (size + HUGE_PAGE_SIZE) & !(HUGE_PAGE_SIZE - 1)
}

/// An anonymous, huge-page-backed mapping, shared read/write across every
/// pirate worker thread for the lifetime of the process.
pub struct HugePageBuffer {
    ptr: NonNull<u8>,
    mapped_len: usize,
}

// Every pirate worker touches this buffer concurrently by design: the whole
// point is many threads reading (and, once, writing to fault pages in) the
// same memory at once. No synchronization is needed because no worker
// relies on the values read being in any particular state.
unsafe impl Send for HugePageBuffer {}
unsafe impl Sync for HugePageBuffer {}

impl HugePageBuffer {
    /// Map `requested_len` bytes, rounded up to a whole number of huge
    /// pages, as `PROT_READ | PROT_WRITE`, `MAP_PRIVATE | MAP_ANONYMOUS |
    /// MAP_HUGETLB`.
    pub fn allocate(requested_len: usize) -> io::Result<Self> {
        let mapped_len = round_up_huge_page(requested_len);
        let addr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                mapped_len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_HUGETLB,
                -1,
                0,
            )
        };

        if addr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }

        Ok(HugePageBuffer {
            ptr: NonNull::new(addr as *mut u8).expect("mmap returned a null non-MAP_FAILED address"),
            mapped_len,
        })
    }

    /// The mapped length, in bytes (rounded up from what was requested).
    pub fn len(&self) -> usize {
        self.mapped_len
    }

    pub fn is_empty(&self) -> bool {
        self.mapped_len == 0
    }

    /// A raw view usable from any thread. The returned pointer is valid for
    /// `len()` bytes for as long as this buffer is alive.
    pub fn view(&self) -> BufferView {
        BufferView {
            ptr: self.ptr,
            len: self.mapped_len,
        }
    }
}

impl Drop for HugePageBuffer {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.ptr.as_ptr() as *mut c_void, self.mapped_len);
        }
    }
}

/// A `Copy`able, thread-shareable view over a [`HugePageBuffer`]'s backing
/// memory, for passing into worker thread closures without lifetime fights.
/// Callers are responsible for keeping the owning `HugePageBuffer` alive for
/// as long as any `BufferView` derived from it is in use.
#[derive(Clone, Copy)]
pub struct BufferView {
    ptr: NonNull<u8>,
    len: usize,
}

unsafe impl Send for BufferView {}
unsafe impl Sync for BufferView {}

impl BufferView {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Volatile byte-at-a-time read, matching the `volatile char *` access
    /// the touching loops are built around: the compiler must not hoist,
    /// reorder, or eliminate this read, since its only effect is forcing the
    /// cache line to be resident.
    #[inline(always)]
    pub unsafe fn read_volatile(&self, index: usize) -> u8 {
        debug_assert!(index < self.len);
        std::ptr::read_volatile(self.ptr.as_ptr().add(index))
    }

    /// Volatile byte-at-a-time write, used once per worker at startup to
    /// fault every page of its slice in before any timed measurement runs.
    #[inline(always)]
    pub unsafe fn write_volatile(&self, index: usize, value: u8) {
        debug_assert!(index < self.len);
        std::ptr::write_volatile(self.ptr.as_ptr().add(index), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_up_to_next_multiple_even_when_already_aligned() {
        assert_eq!(round_up_huge_page(0), HUGE_PAGE_SIZE);
        assert_eq!(round_up_huge_page(1), HUGE_PAGE_SIZE);
        assert_eq!(round_up_huge_page(HUGE_PAGE_SIZE), 2 * HUGE_PAGE_SIZE);
        assert_eq!(round_up_huge_page(HUGE_PAGE_SIZE + 1), 2 * HUGE_PAGE_SIZE);
    }
}
