//! # FFI Module - Native Heap Bridge
//!
//! Every buffer handed to NVRTC lives on the C heap, not the Rust heap: the
//! native library reads and writes these regions through raw addresses and
//! must never see memory that Rust may move or reallocate.
//!
//! ## Safety Requirements
//!
//! 1. **Single Owner**: a [`NativeBlock`] is the only owner of its region
//! 2. **Scoped Lifetime**: the region is freed exactly once, when the block drops
//! 3. **Thread Affinity**: blocks hold raw pointers and are therefore `!Send`;
//!    a region is allocated and freed on the same thread
//!
//! ## Accounting
//!
//! Each thread keeps a count of regions it currently owns. Sessions run on a
//! single thread, so [`outstanding_allocations`] returning to its starting
//! value after a compile means every region was released.

use std::cell::Cell;
use std::os::raw::c_void;
use std::ptr::NonNull;

use crate::error::{CompilerError, Result};

thread_local! {
    static OUTSTANDING: Cell<isize> = const { Cell::new(0) };
}

/// Number of native regions currently owned by this thread.
pub fn outstanding_allocations() -> isize {
    OUTSTANDING.with(|count| count.get())
}

/// One zero-initialised region of native memory.
#[derive(Debug)]
pub struct NativeBlock {
    ptr: NonNull<u8>,
    size: usize,
}

impl NativeBlock {
    /// Allocate `size` zeroed bytes with the C allocator.
    ///
    /// A zero-sized request still yields a distinct one-byte region so the
    /// address is always valid to hand to native code.
    pub fn allocate(size: usize) -> Result<Self> {
        let request = size.max(1);
        // SAFETY: calloc has no preconditions; a null return is handled below.
        let raw = unsafe { libc::calloc(request, 1) } as *mut u8;
        let ptr = NonNull::new(raw).ok_or(CompilerError::Allocation { size })?;

        OUTSTANDING.with(|count| count.set(count.get() + 1));
        log::trace!("native alloc {:p} ({} bytes)", ptr, size);
        Ok(Self { ptr, size })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.ptr.as_ptr()
    }

    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// Address as an untyped native pointer.
    pub fn address(&self) -> *mut c_void {
        self.ptr.as_ptr().cast()
    }

    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: the region is `size` initialised bytes owned by self.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.size) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: as above, and `&mut self` guarantees exclusivity.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.size) }
    }

    /// Release the region now rather than at scope exit.
    pub fn release(self) {
        drop(self)
    }
}

impl Drop for NativeBlock {
    fn drop(&mut self) {
        log::trace!("native free {:p} ({} bytes)", self.ptr, self.size);
        // SAFETY: ptr came from calloc and drop runs at most once.
        unsafe { libc::free(self.ptr.as_ptr().cast()) };
        OUTSTANDING.with(|count| count.set(count.get() - 1));
    }
}
