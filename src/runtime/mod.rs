//! # Runtime Module - Dynamic CUDA Kernel Compilation
//!
//! Compiles CUDA C++ source to PTX at runtime by driving NVRTC through its
//! C ABI. Nothing is linked at build time: every entry point is resolved
//! from a loaded library by name and ABI signature, then called through a
//! typed function pointer.
//!
//! ## Key Components
//!
//! - **Symbols**: the fixed NVRTC symbol table and the resolver seam
//! - **NVRTC API**: typed entry points plus return-code translation
//! - **Program Session**: one native program from create to destroy
//! - **Runtime Compiler**: source + kernel name in, PTX + lowered name out
//! - **Stub** (feature `stub`): an in-process NVRTC stand-in for tests and `--stub` runs
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  CUDA C++ Source│
//! └────────┬────────┘
//!          │  RuntimeCompiler::compile
//!          ▼
//! ┌─────────────────┐   create → add name → compile → log/PTX/lowered name → destroy
//! │ ProgramSession  │
//! └────────┬────────┘
//!          │  NvrtcApi (resolved through a SymbolResolver)
//!          ▼
//! ┌─────────────────┐
//! │  libnvrtc.so    │
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ CompiledKernel  │  PTX + lowered name, handed to a KernelLoader
//! └─────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use nvrtc_jit::config::CompilerConfig;
//! use nvrtc_jit::runtime::RuntimeCompiler;
//!
//! let compiler = RuntimeCompiler::load(CompilerConfig::default())?;
//! let kernel = compiler.compile(
//!     "extern \"C\" __global__ void inc(int *p) { *p += 1; }",
//!     "inc",
//!     "inc.cu",
//!     &["--gpu-architecture=compute_70"],
//! )?;
//! println!("{} -> {} bytes of PTX", kernel.lowered_name(), kernel.ptx().len());
//! # Ok::<(), nvrtc_jit::error::CompilerError>(())
//! ```

pub mod nvrtc;
pub mod runtime_compiler;
pub mod session;
#[cfg(feature = "stub")]
pub mod stub;
pub mod symbols;

pub use nvrtc::{ErrorTranslator, NvrtcApi, NvrtcEntryPoints, NvrtcProgram};
pub use runtime_compiler::{CompiledKernel, KernelBinary, KernelLoader, RuntimeCompiler};
pub use session::{ProgramSession, SessionState};
pub use symbols::{
    AbiSignature, InvocableHandle, NativeLibraries, NativeType, NvrtcFunction, SymbolDescriptor,
    SymbolResolver,
};
