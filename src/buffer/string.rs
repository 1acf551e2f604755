use std::ffi::CStr;
use std::os::raw::c_char;

use super::ffi::NativeBlock;
use crate::error::{CompilerError, Result};

/// Default ceiling for sizes reported by native code (1 MiB).
pub const MAX_NATIVE_TEXT: usize = 1 << 20;

/// Reject a native-reported length that is negative or above `limit`.
pub fn checked_length(size: i64, limit: usize) -> Result<usize> {
    match usize::try_from(size) {
        Ok(len) if len <= limit => Ok(len),
        _ => Err(CompilerError::InvalidAllocationSize { size, limit }),
    }
}

/// A zero-terminated string in native memory.
///
/// Either encoded from host text (`from_text`) to be read by native code,
/// or allocated empty (`with_length`) for native code to fill.
#[derive(Debug)]
pub struct NativeString {
    block: NativeBlock,
    len: usize,
}

impl NativeString {
    /// Encode `text` followed by a NUL terminator.
    pub fn from_text(text: &str) -> Result<Self> {
        let bytes = text.as_bytes();
        if let Some(offset) = bytes.iter().position(|b| *b == 0) {
            return Err(CompilerError::InteriorNul { offset });
        }

        let mut block = NativeBlock::allocate(bytes.len() + 1)?;
        block.as_mut_slice()[..bytes.len()].copy_from_slice(bytes);
        Ok(Self {
            block,
            len: bytes.len(),
        })
    }

    /// Allocate a zeroed buffer of exactly `size` bytes for a native fill call.
    pub fn with_length(size: i64, limit: usize) -> Result<Self> {
        let len = checked_length(size, limit)?;
        Ok(Self {
            block: NativeBlock::allocate(len)?,
            len,
        })
    }

    /// Byte length tracked for this string (terminator excluded for encoded text).
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_ptr(&self) -> *const c_char {
        self.block.as_ptr().cast()
    }

    pub fn as_mut_ptr(&mut self) -> *mut c_char {
        self.block.as_mut_ptr().cast()
    }

    /// Read up to `max_len` bytes, stopping at the first NUL.
    pub fn decode(&self, max_len: i64, limit: usize) -> Result<String> {
        let max_len = checked_length(max_len, limit)?;
        let bytes = self.block.as_slice();
        let window = &bytes[..max_len.min(bytes.len())];
        let end = window.iter().position(|b| *b == 0).unwrap_or(window.len());
        Ok(String::from_utf8_lossy(&window[..end]).into_owned())
    }

    pub fn release(self) {
        self.block.release()
    }
}

/// Text produced by a native call, tagged with who owns the bytes.
///
/// `Owned` buffers were allocated by this crate and are freed with it.
/// `Borrowed` strings belong to the native library (for instance a lowered
/// name owned by its program) and must be copied out before the owner dies.
#[derive(Debug)]
pub enum NativeText<'a> {
    Owned(NativeString),
    Borrowed(&'a CStr),
}

impl<'a> NativeText<'a> {
    /// Wrap a native-owned string, scanning at most `limit` bytes for its terminator.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or point to memory readable up to its terminator
    /// (or `limit + 1` bytes) for the whole of `'a`.
    pub unsafe fn borrowed(ptr: *const c_char, limit: usize) -> Result<Option<Self>> {
        if ptr.is_null() {
            return Ok(None);
        }
        let bytes = ptr as *const u8;
        for offset in 0..=limit {
            if *bytes.add(offset) == 0 {
                let slice = std::slice::from_raw_parts(bytes, offset + 1);
                return Ok(Some(NativeText::Borrowed(CStr::from_bytes_with_nul_unchecked(slice))));
            }
        }
        Err(CompilerError::InvalidAllocationSize {
            size: (limit as i64).saturating_add(1),
            limit,
        })
    }

    /// Copy into host-owned memory.
    pub fn into_string(self, limit: usize) -> Result<String> {
        match self {
            NativeText::Owned(buffer) => buffer.decode(buffer.len() as i64, limit),
            NativeText::Borrowed(text) => Ok(text.to_string_lossy().into_owned()),
        }
    }
}
