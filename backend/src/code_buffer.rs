use std::io;
use std::ptr;

/// JIT code buffer backed by mmap'd memory.
///
/// Manages a region of host memory that generated code is written into
/// and later executed from. The region is mapped read/write/execute for
/// its whole lifetime; the buffer is the sole bounds authority — every
/// write asserts remaining capacity, callers do not check.
pub struct CodeBuffer {
    ptr: *mut u8,
    size: usize,
    cursor: usize,
}

// SAFETY: CodeBuffer owns its mmap'd memory exclusively.
unsafe impl Send for CodeBuffer {}

impl CodeBuffer {
    /// Allocate a new code buffer of the given size (rounded up to page
    /// size).
    pub fn new(size: usize) -> io::Result<Self> {
        let page_size = page_size();
        let size = (size + page_size - 1) & !(page_size - 1);

        // SAFETY: mmap with MAP_ANONYMOUS | MAP_PRIVATE, no file backing.
        let ptr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE | libc::PROT_EXEC,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };

        if ptr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }

        Ok(Self {
            ptr: ptr as *mut u8,
            size,
            cursor: 0,
        })
    }

    /// Current write offset.
    #[inline]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Total capacity in bytes.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.size
    }

    /// Remaining writable bytes.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.size - self.cursor
    }

    /// Raw pointer to the start of the buffer.
    #[inline]
    pub fn base_ptr(&self) -> *const u8 {
        self.ptr as *const u8
    }

    /// Move the write cursor (used by the peephole rewriter to roll
    /// back over replaced instructions).
    #[inline]
    pub fn set_cursor(&mut self, cursor: usize) {
        assert!(cursor <= self.size);
        self.cursor = cursor;
    }

    /// Rewind the cursor to zero. Does not zero memory.
    #[inline]
    pub fn reset(&mut self) {
        self.cursor = 0;
    }

    // -- Write methods --

    #[inline]
    pub fn write_u8(&mut self, val: u8) {
        assert!(self.cursor < self.size, "code buffer overflow");
        unsafe { self.ptr.add(self.cursor).write(val) };
        self.cursor += 1;
    }

    #[inline]
    pub fn write_u16(&mut self, val: u16) {
        assert!(self.cursor + 2 <= self.size, "code buffer overflow");
        unsafe { (self.ptr.add(self.cursor) as *mut u16).write_unaligned(val) };
        self.cursor += 2;
    }

    #[inline]
    pub fn write_u32(&mut self, val: u32) {
        assert!(self.cursor + 4 <= self.size, "code buffer overflow");
        unsafe { (self.ptr.add(self.cursor) as *mut u32).write_unaligned(val) };
        self.cursor += 4;
    }

    #[inline]
    pub fn write_bytes(&mut self, data: &[u8]) {
        assert!(
            self.cursor + data.len() <= self.size,
            "code buffer overflow"
        );
        unsafe {
            ptr::copy_nonoverlapping(
                data.as_ptr(),
                self.ptr.add(self.cursor),
                data.len(),
            );
        }
        self.cursor += data.len();
    }

    // -- Patch / read methods --

    /// Patch a u8 at the given offset (for back-patching short jumps).
    #[inline]
    pub fn patch_u8(&mut self, offset: usize, val: u8) {
        assert!(offset < self.size);
        unsafe { self.ptr.add(offset).write(val) };
    }

    /// Patch a u32 at the given offset.
    #[inline]
    pub fn patch_u32(&mut self, offset: usize, val: u32) {
        assert!(offset + 4 <= self.size);
        unsafe { (self.ptr.add(offset) as *mut u32).write_unaligned(val) };
    }

    /// Read a u8 at the given offset.
    #[inline]
    pub fn read_u8(&self, offset: usize) -> u8 {
        assert!(offset < self.size);
        unsafe { self.ptr.add(offset).read() }
    }

    /// Read a u32 at the given offset.
    #[inline]
    pub fn read_u32(&self, offset: usize) -> u32 {
        assert!(offset + 4 <= self.size);
        unsafe { (self.ptr.add(offset) as *const u32).read_unaligned() }
    }

    /// Get the generated code as a byte slice (up to the cursor).
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: ptr..ptr+cursor has been written.
        unsafe { std::slice::from_raw_parts(self.ptr, self.cursor) }
    }
}

impl Drop for CodeBuffer {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            unsafe {
                libc::munmap(self.ptr as *mut libc::c_void, self.size);
            }
        }
    }
}

fn page_size() -> usize {
    // SAFETY: sysconf is always safe to call.
    unsafe { libc::sysconf(libc::_SC_PAGESIZE) as usize }
}
