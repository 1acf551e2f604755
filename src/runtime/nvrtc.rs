//! Typed NVRTC entry points.
//!
//! [`NvrtcApi`] is built either by resolving every [`NvrtcFunction`]
//! through a [`SymbolResolver`] or directly from function pointers. All
//! calls go through these pointers; nothing is linked at build time, so a
//! missing toolkit surfaces as a `LibraryLoad`/`SymbolNotFound` error rather
//! than a link failure.

use std::mem::size_of;
use std::os::raw::{c_char, c_int, c_void};
use std::sync::Arc;

use libloading::Library;

use super::symbols::{AbiSignature, NvrtcFunction, SymbolResolver};
use crate::buffer::NativeText;
use crate::error::{CompilerError, NvrtcResult, Result};

/// Opaque `nvrtcProgram`.
pub type NvrtcProgram = *mut c_void;

pub type GetErrorStringFn = unsafe extern "C" fn(result: c_int) -> *const c_char;
pub type CreateProgramFn = unsafe extern "C" fn(
    prog: *mut NvrtcProgram,
    src: *const c_char,
    name: *const c_char,
    num_headers: c_int,
    headers: *const *const c_char,
    include_names: *const *const c_char,
) -> c_int;
pub type DestroyProgramFn = unsafe extern "C" fn(prog: *mut NvrtcProgram) -> c_int;
pub type AddNameExpressionFn =
    unsafe extern "C" fn(prog: NvrtcProgram, name_expression: *const c_char) -> c_int;
pub type CompileProgramFn = unsafe extern "C" fn(
    prog: NvrtcProgram,
    num_options: c_int,
    options: *const *const c_char,
) -> c_int;
pub type GetSizeFn = unsafe extern "C" fn(prog: NvrtcProgram, size: *mut usize) -> c_int;
pub type GetTextFn = unsafe extern "C" fn(prog: NvrtcProgram, text: *mut c_char) -> c_int;
pub type GetLoweredNameFn = unsafe extern "C" fn(
    prog: NvrtcProgram,
    name_expression: *const c_char,
    lowered_name: *mut *const c_char,
) -> c_int;

/// Raw function pointers for every bound entry point.
#[derive(Debug, Clone, Copy)]
pub struct NvrtcEntryPoints {
    pub get_error_string: GetErrorStringFn,
    pub create_program: CreateProgramFn,
    pub destroy_program: DestroyProgramFn,
    pub add_name_expression: AddNameExpressionFn,
    pub compile_program: CompileProgramFn,
    pub get_program_log_size: GetSizeFn,
    pub get_program_log: GetTextFn,
    pub get_lowered_name: GetLoweredNameFn,
    pub get_ptx_size: GetSizeFn,
    pub get_ptx: GetTextFn,
}

// Bound on native error strings; they are short static literals in practice.
const MAX_ERROR_STRING: usize = 4096;

/// Maps native return codes to [`NvrtcResult`] and builds typed failures.
#[derive(Debug, Clone, Copy)]
pub struct ErrorTranslator {
    error_string: Option<GetErrorStringFn>,
}

impl ErrorTranslator {
    pub fn new(error_string: Option<GetErrorStringFn>) -> Self {
        Self { error_string }
    }

    pub fn translate(&self, code: c_int) -> NvrtcResult {
        NvrtcResult::from_code(code)
    }

    /// Human-readable text for `code`, preferring `nvrtcGetErrorString`.
    pub fn describe(&self, code: c_int) -> String {
        let fallback = || self.translate(code).description().to_string();
        let Some(error_string) = self.error_string else {
            return fallback();
        };

        // SAFETY: nvrtcGetErrorString accepts any code and returns null or a
        // static string.
        let text = unsafe { NativeText::borrowed(error_string(code), MAX_ERROR_STRING) };
        match text {
            Ok(Some(text)) => text.into_string(MAX_ERROR_STRING).unwrap_or_else(|_| fallback()),
            _ => fallback(),
        }
    }

    /// Build the failure for a non-success `code` returned by `operation`.
    ///
    /// With a diagnostic `log` the failure is `CompilationFailed`; otherwise
    /// it is a `SessionError` carrying the native error string.
    pub fn raise(&self, code: c_int, operation: &'static str, log: Option<String>) -> CompilerError {
        let outcome = self.translate(code);
        match log {
            Some(log) => CompilerError::CompilationFailed {
                operation,
                outcome,
                log,
            },
            None => CompilerError::SessionError {
                operation,
                outcome,
                message: self.describe(code),
            },
        }
    }

    pub fn check(&self, code: c_int, function: NvrtcFunction) -> Result<()> {
        if self.translate(code).is_success() {
            Ok(())
        } else {
            Err(self.raise(code, function.symbol(), None))
        }
    }
}

/// The bound NVRTC library.
pub struct NvrtcApi {
    entry: NvrtcEntryPoints,
    translator: ErrorTranslator,
    _libraries: Vec<Arc<Library>>,
}

impl NvrtcApi {
    /// Resolve and type-check every entry point from `library`.
    pub fn bind(resolver: &dyn SymbolResolver, library: &str) -> Result<Self> {
        let mut libraries = Vec::new();
        let entry = NvrtcEntryPoints {
            get_error_string: bind_one(resolver, library, NvrtcFunction::GetErrorString, &mut libraries)?,
            create_program: bind_one(resolver, library, NvrtcFunction::CreateProgram, &mut libraries)?,
            destroy_program: bind_one(resolver, library, NvrtcFunction::DestroyProgram, &mut libraries)?,
            add_name_expression: bind_one(resolver, library, NvrtcFunction::AddNameExpression, &mut libraries)?,
            compile_program: bind_one(resolver, library, NvrtcFunction::CompileProgram, &mut libraries)?,
            get_program_log_size: bind_one(resolver, library, NvrtcFunction::GetProgramLogSize, &mut libraries)?,
            get_program_log: bind_one(resolver, library, NvrtcFunction::GetProgramLog, &mut libraries)?,
            get_lowered_name: bind_one(resolver, library, NvrtcFunction::GetLoweredName, &mut libraries)?,
            get_ptx_size: bind_one(resolver, library, NvrtcFunction::GetPtxSize, &mut libraries)?,
            get_ptx: bind_one(resolver, library, NvrtcFunction::GetPtx, &mut libraries)?,
        };
        log::debug!("bound {} NVRTC entry points from `{}`", NvrtcFunction::ALL.len(), library);

        Ok(Self {
            entry,
            translator: ErrorTranslator::new(Some(entry.get_error_string)),
            _libraries: libraries,
        })
    }

    /// Wrap already-resolved entry points (statically linked or in-process).
    pub fn from_entry_points(entry: NvrtcEntryPoints) -> Self {
        Self {
            entry,
            translator: ErrorTranslator::new(Some(entry.get_error_string)),
            _libraries: Vec::new(),
        }
    }

    pub fn entry_points(&self) -> &NvrtcEntryPoints {
        &self.entry
    }

    pub fn translator(&self) -> &ErrorTranslator {
        &self.translator
    }

    /// `nvrtcGetErrorString`, falling back to the static description.
    pub fn error_string(&self, code: c_int) -> String {
        self.translator.describe(code)
    }
}

fn bind_one<F: Copy>(
    resolver: &dyn SymbolResolver,
    library: &str,
    function: NvrtcFunction,
    libraries: &mut Vec<Arc<Library>>,
) -> Result<F> {
    let descriptor = function.descriptor();
    let expected = AbiSignature::parse(descriptor.abi_signature)?;
    let handle = resolver.resolve(library, &descriptor)?;

    if handle.signature != expected {
        return Err(CompilerError::SignatureMismatch {
            symbol: descriptor.name.to_string(),
            expected: expected.to_string(),
            found: handle.signature.to_string(),
        });
    }
    if let Some(lib) = handle.keepalive() {
        if !libraries.iter().any(|held| Arc::ptr_eq(held, lib)) {
            libraries.push(Arc::clone(lib));
        }
    }

    debug_assert_eq!(size_of::<F>(), size_of::<*mut c_void>());
    let address = handle.address();
    // SAFETY: the address was resolved for a symbol whose ABI signature matches
    // the descriptor table, which is the contract `F` is declared against.
    Ok(unsafe { std::mem::transmute_copy::<*mut c_void, F>(&address) })
}
