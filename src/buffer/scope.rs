use std::os::raw::{c_char, c_void};

use super::pointer_array::NativePointerArray;
use super::scalar::NativeScalar;
use super::string::NativeString;
use crate::error::Result;

/// Any native region that can be parked in a [`ResourceScope`].
#[derive(Debug)]
pub enum ScopedResource {
    Scalar(NativeScalar),
    String(NativeString),
    PointerArray(NativePointerArray),
}

impl From<NativeScalar> for ScopedResource {
    fn from(value: NativeScalar) -> Self {
        ScopedResource::Scalar(value)
    }
}

impl From<NativeString> for ScopedResource {
    fn from(value: NativeString) -> Self {
        ScopedResource::String(value)
    }
}

impl From<NativePointerArray> for ScopedResource {
    fn from(value: NativePointerArray) -> Self {
        ScopedResource::PointerArray(value)
    }
}

/// Owns every region allocated for one native call.
///
/// Regions are released in the order they were adopted, on every exit path:
/// an explicit `release_all`, an early `?` return, or an unwind.
#[derive(Debug, Default)]
pub struct ResourceScope {
    resources: Vec<ScopedResource>,
}

impl ResourceScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn adopt(&mut self, resource: impl Into<ScopedResource>) {
        self.resources.push(resource.into());
    }

    /// Encode `text` as a native string owned by this scope.
    pub fn encode(&mut self, text: &str) -> Result<*const c_char> {
        let native = NativeString::from_text(text)?;
        let ptr = native.as_ptr();
        self.adopt(native);
        Ok(ptr)
    }

    /// Encode `texts` into native strings plus one pointer array addressing them.
    ///
    /// Slot `i` holds the address of `texts[i]`; order is preserved and
    /// duplicates are kept. An empty input allocates nothing and yields null.
    pub fn encode_array<S: AsRef<str>>(&mut self, texts: &[S]) -> Result<*const *const c_char> {
        if texts.is_empty() {
            return Ok(std::ptr::null());
        }

        let mut array = NativePointerArray::acquire(texts.len())?;
        for (index, text) in texts.iter().enumerate() {
            let ptr = self.encode(text.as_ref())?;
            array.set(index, ptr as *const c_void)?;
        }
        let base = array.as_ptr() as *const *const c_char;
        self.adopt(array);
        Ok(base)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn release_all(self) {
        drop(self)
    }
}

impl Drop for ResourceScope {
    fn drop(&mut self) {
        if !self.resources.is_empty() {
            log::trace!("releasing {} scoped native regions", self.resources.len());
        }
        // Front to back: strings before the array that addresses them.
        for resource in self.resources.drain(..) {
            drop(resource);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::outstanding_allocations;
    use std::ffi::CStr;

    #[test]
    fn test_encode_array_preserves_order_and_duplicates() {
        let opts = ["-arch=compute_70", "-G", "-G", "--std=c++14"];
        let mut scope = ResourceScope::new();
        let base = scope.encode_array(&opts).expect("encode failed");
        assert_eq!(scope.len(), opts.len() + 1);

        let slots = unsafe { std::slice::from_raw_parts(base, opts.len()) };
        let decoded: Vec<&str> = slots
            .iter()
            .map(|p| unsafe { CStr::from_ptr(*p) }.to_str().unwrap())
            .collect();
        assert_eq!(decoded, opts);
    }

    #[test]
    fn test_empty_array_allocates_nothing() {
        let before = outstanding_allocations();
        let mut scope = ResourceScope::new();
        let empty: [&str; 0] = [];
        assert!(scope.encode_array(&empty).unwrap().is_null());
        assert!(scope.is_empty());
        assert_eq!(outstanding_allocations(), before);
    }

    #[test]
    fn test_scope_releases_on_error_path() {
        let before = outstanding_allocations();
        {
            let mut scope = ResourceScope::new();
            let result = scope.encode_array(&["ok", "bad\0option", "never"]);
            assert!(result.is_err());
        }
        assert_eq!(outstanding_allocations(), before);
    }

    #[test]
    fn test_release_all_frees_everything() {
        let before = outstanding_allocations();
        let mut scope = ResourceScope::new();
        scope.encode_array(&["a", "b"]).unwrap();
        scope.adopt(NativeScalar::acquire().unwrap());
        assert_eq!(outstanding_allocations(), before + 4);
        scope.release_all();
        assert_eq!(outstanding_allocations(), before);
    }
}
