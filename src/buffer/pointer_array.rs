use std::mem::size_of;
use std::os::raw::c_void;

use super::ffi::NativeBlock;
use crate::error::{CompilerError, Result};

/// A contiguous native array of raw addresses (`const char**` and friends).
///
/// Slots start out null and are set one by one before the array is handed
/// to a native call.
#[derive(Debug)]
pub struct NativePointerArray {
    block: NativeBlock,
    len: usize,
}

impl NativePointerArray {
    pub fn acquire(len: usize) -> Result<Self> {
        let bytes = len
            .checked_mul(size_of::<*const c_void>())
            .ok_or(CompilerError::Allocation { size: usize::MAX })?;
        Ok(Self {
            block: NativeBlock::allocate(bytes)?,
            len,
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn set(&mut self, index: usize, value: *const c_void) -> Result<()> {
        if index >= self.len {
            return Err(CompilerError::IndexOutOfBounds {
                index,
                len: self.len,
            });
        }
        // SAFETY: index < len and the block holds len pointers.
        unsafe { (self.block.as_mut_ptr() as *mut *const c_void).add(index).write(value) };
        Ok(())
    }

    pub fn get(&self, index: usize) -> Option<*const c_void> {
        if index >= self.len {
            return None;
        }
        // SAFETY: bounds checked above.
        Some(unsafe { (self.block.as_ptr() as *const *const c_void).add(index).read() })
    }

    /// Base address, as passed to native code.
    pub fn as_ptr(&self) -> *const *const c_void {
        self.block.as_ptr().cast()
    }

    pub fn release(self) {
        self.block.release()
    }
}
