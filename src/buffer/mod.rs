//! # Native Buffers
//!
//! Owned cells of C-heap memory that cross the NVRTC boundary: a scalar
//! out-parameter, a zero-terminated string, an array of pointers, and a
//! scope that releases a group of them together.
//!
//! Release is tied to ownership. Each primitive frees its region when it
//! drops or when `release(self)` consumes it, so a region cannot be freed
//! twice and a freed address cannot be handed out again.

pub mod ffi;
mod pointer_array;
mod scalar;
mod scope;
mod string;

pub use ffi::{outstanding_allocations, NativeBlock};
pub use pointer_array::NativePointerArray;
pub use scalar::NativeScalar;
pub use scope::{ResourceScope, ScopedResource};
pub use string::{checked_length, NativeString, NativeText, MAX_NATIVE_TEXT};
