//! # nvrtc-jit - Runtime CUDA Kernel Compilation
//!
//! Compiles CUDA C++ source into PTX at runtime through NVRTC's C ABI and
//! returns the PTX together with the lowered (mangled) kernel name a loader
//! needs to launch it.
//!
//! ## Key Features
//!
//! - **Dynamic Binding**: NVRTC is loaded with `libloading` and every symbol
//!   is checked against a fixed ABI signature table before use
//! - **Owned Native Memory**: handle cells, strings and option arrays live
//!   in C-heap buffers that are released exactly once, on every exit path
//! - **Guaranteed Teardown**: a created program is destroyed whether
//!   compilation succeeds or fails
//! - **Typed Errors**: every `nvrtcResult` code becomes an [`NvrtcResult`],
//!   and failed compiles carry the full program log
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use nvrtc_jit::{CompilerConfig, RuntimeCompiler};
//!
//! let compiler = RuntimeCompiler::load(CompilerConfig::default().with_env_overrides()?)?;
//! let kernel = compiler.compile(
//!     "extern \"C\" __global__ void inc(int *p) { *p += 1; }",
//!     "inc",
//!     "inc.cu",
//!     &[] as &[&str],
//! )?;
//! assert_eq!(kernel.lowered_name(), "inc");
//! # Ok::<(), nvrtc_jit::CompilerError>(())
//! ```
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────┐     ┌────────────────┐     ┌──────────────┐
//! │ RuntimeCompiler  │────▶│ ProgramSession │────▶│   NvrtcApi   │
//! └──────────────────┘     └───────┬────────┘     └──────┬───────┘
//!                                  │                     │
//!                          ┌───────▼────────┐     ┌──────▼───────┐
//!                          │ buffer::*      │     │ libnvrtc.so  │
//!                          │ (C heap cells) │     │  (or stub)   │
//!                          └────────────────┘     └──────────────┘
//! ```
//!
//! ## Safety and Error Handling
//!
//! All FFI boundaries sit in `buffer` and `runtime`, each `unsafe` block
//! states the contract it relies on, and sizes reported by NVRTC are
//! bounded by `max_native_text` before any buffer is allocated.

pub mod buffer;
pub mod config;
pub mod error;
pub mod runtime;

pub use config::CompilerConfig;
pub use error::{CompilerError, NvrtcResult, Result};
pub use runtime::{CompiledKernel, KernelBinary, KernelLoader, ProgramSession, RuntimeCompiler};
