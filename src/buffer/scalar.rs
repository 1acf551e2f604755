use std::mem::size_of;
use std::os::raw::c_void;

use super::ffi::NativeBlock;
use crate::error::Result;

/// An eight-byte native cell used as an out-parameter.
///
/// NVRTC writes program handles (`nvrtcProgram*`), sizes (`size_t*`) and
/// string addresses (`const char**`) through such cells. The cell is wide
/// enough for a pointer or a 64-bit integer on every supported target.
#[derive(Debug)]
pub struct NativeScalar {
    block: NativeBlock,
}

impl NativeScalar {
    const WIDTH: usize = 8;

    /// Allocate a zeroed cell.
    pub fn acquire() -> Result<Self> {
        debug_assert!(size_of::<*mut c_void>() <= Self::WIDTH);
        Ok(Self {
            block: NativeBlock::allocate(Self::WIDTH)?,
        })
    }

    /// Address of the cell itself, passed to native code as the out-pointer.
    pub fn address(&self) -> *mut c_void {
        self.block.address()
    }

    pub fn read_i64(&self) -> i64 {
        // SAFETY: the cell is 8 bytes, owned by self; unaligned read tolerates any calloc alignment.
        unsafe { (self.block.as_ptr() as *const i64).read_unaligned() }
    }

    pub fn write_i64(&mut self, value: i64) {
        // SAFETY: as in read_i64.
        unsafe { (self.block.as_mut_ptr() as *mut i64).write_unaligned(value) }
    }

    /// The pointer value stored in the cell.
    pub fn read_pointer(&self) -> *mut c_void {
        // SAFETY: the cell holds at least one pointer width.
        unsafe { (self.block.as_ptr() as *const *mut c_void).read_unaligned() }
    }

    pub fn write_pointer(&mut self, value: *mut c_void) {
        // SAFETY: as in read_pointer.
        unsafe { (self.block.as_mut_ptr() as *mut *mut c_void).write_unaligned(value) }
    }

    pub fn release(self) {
        self.block.release()
    }
}
