//! # Error Model
//!
//! Every NVRTC entry point reports its outcome as a plain `nvrtcResult`
//! integer. [`NvrtcResult`] is the closed set of outcomes declared in
//! `nvrtc.h`; codes the header does not know about map to
//! [`NvrtcResult::Unknown`] instead of failing the mapping.
//!
//! [`CompilerError`] is the crate-wide failure type. Native failures only
//! become a `CompilerError` through the runtime's `ErrorTranslator`.

use std::fmt;
use std::os::raw::c_int;

use thiserror::Error;

/// Outcome of an NVRTC call, mirroring `nvrtcResult`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NvrtcResult {
    Success,
    OutOfMemory,
    ProgramCreationFailure,
    InvalidInput,
    InvalidProgram,
    InvalidOption,
    CompilationFailure,
    BuiltinOperationFailure,
    NoNameExpressionsAfterCompilation,
    NoLoweredNamesBeforeCompilation,
    NameExpressionNotValid,
    InternalError,
    Unknown(i32),
}

impl NvrtcResult {
    const KNOWN: [NvrtcResult; 12] = [
        NvrtcResult::Success,
        NvrtcResult::OutOfMemory,
        NvrtcResult::ProgramCreationFailure,
        NvrtcResult::InvalidInput,
        NvrtcResult::InvalidProgram,
        NvrtcResult::InvalidOption,
        NvrtcResult::CompilationFailure,
        NvrtcResult::BuiltinOperationFailure,
        NvrtcResult::NoNameExpressionsAfterCompilation,
        NvrtcResult::NoLoweredNamesBeforeCompilation,
        NvrtcResult::NameExpressionNotValid,
        NvrtcResult::InternalError,
    ];

    /// Total mapping from a native return code.
    pub fn from_code(code: c_int) -> Self {
        Self::KNOWN
            .iter()
            .copied()
            .find(|known| known.code() == code)
            .unwrap_or(NvrtcResult::Unknown(code))
    }

    /// The native integer for this outcome.
    pub fn code(self) -> c_int {
        match self {
            NvrtcResult::Success => 0,
            NvrtcResult::OutOfMemory => 1,
            NvrtcResult::ProgramCreationFailure => 2,
            NvrtcResult::InvalidInput => 3,
            NvrtcResult::InvalidProgram => 4,
            NvrtcResult::InvalidOption => 5,
            NvrtcResult::CompilationFailure => 6,
            NvrtcResult::BuiltinOperationFailure => 7,
            NvrtcResult::NoNameExpressionsAfterCompilation => 8,
            NvrtcResult::NoLoweredNamesBeforeCompilation => 9,
            NvrtcResult::NameExpressionNotValid => 10,
            NvrtcResult::InternalError => 11,
            NvrtcResult::Unknown(code) => code,
        }
    }

    pub fn is_success(self) -> bool {
        self == NvrtcResult::Success
    }

    /// Header name of the outcome, e.g. `NVRTC_ERROR_COMPILATION`.
    pub fn name(self) -> &'static str {
        match self {
            NvrtcResult::Success => "NVRTC_SUCCESS",
            NvrtcResult::OutOfMemory => "NVRTC_ERROR_OUT_OF_MEMORY",
            NvrtcResult::ProgramCreationFailure => "NVRTC_ERROR_PROGRAM_CREATION_FAILURE",
            NvrtcResult::InvalidInput => "NVRTC_ERROR_INVALID_INPUT",
            NvrtcResult::InvalidProgram => "NVRTC_ERROR_INVALID_PROGRAM",
            NvrtcResult::InvalidOption => "NVRTC_ERROR_INVALID_OPTION",
            NvrtcResult::CompilationFailure => "NVRTC_ERROR_COMPILATION",
            NvrtcResult::BuiltinOperationFailure => "NVRTC_ERROR_BUILTIN_OPERATION_FAILURE",
            NvrtcResult::NoNameExpressionsAfterCompilation => {
                "NVRTC_ERROR_NO_NAME_EXPRESSIONS_AFTER_COMPILATION"
            }
            NvrtcResult::NoLoweredNamesBeforeCompilation => {
                "NVRTC_ERROR_NO_LOWERED_NAMES_BEFORE_COMPILATION"
            }
            NvrtcResult::NameExpressionNotValid => "NVRTC_ERROR_NAME_EXPRESSION_NOT_VALID",
            NvrtcResult::InternalError => "NVRTC_ERROR_INTERNAL_ERROR",
            NvrtcResult::Unknown(_) => "NVRTC_UNKNOWN_CODE",
        }
    }

    /// Static description, used when the native error string is unavailable.
    pub fn description(self) -> &'static str {
        match self {
            NvrtcResult::Success => "no error",
            NvrtcResult::OutOfMemory => "out of memory",
            NvrtcResult::ProgramCreationFailure => "program creation failure",
            NvrtcResult::InvalidInput => "invalid input",
            NvrtcResult::InvalidProgram => "invalid program",
            NvrtcResult::InvalidOption => "invalid option",
            NvrtcResult::CompilationFailure => "compilation error",
            NvrtcResult::BuiltinOperationFailure => "builtin operation failure",
            NvrtcResult::NoNameExpressionsAfterCompilation => {
                "no name expressions can be added after compilation"
            }
            NvrtcResult::NoLoweredNamesBeforeCompilation => {
                "lowered names are not available before a successful compilation"
            }
            NvrtcResult::NameExpressionNotValid => "name expression is not valid",
            NvrtcResult::InternalError => "internal compiler error",
            NvrtcResult::Unknown(_) => "unrecognized result code",
        }
    }
}

impl fmt::Display for NvrtcResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name(), self.code())
    }
}

#[derive(Error, Debug)]
pub enum CompilerError {
    #[error("native allocation of {size} bytes failed")]
    Allocation { size: usize },

    #[error("symbol `{symbol}` with signature `{signature}` not found in `{library}`: {reason}")]
    SymbolNotFound {
        library: String,
        symbol: String,
        signature: String,
        reason: String,
    },

    #[error("failed to load native library `{library}`: {reason}")]
    LibraryLoad { library: String, reason: String },

    #[error("malformed ABI signature `{signature}`: {reason}")]
    InvalidSignature { signature: String, reason: String },

    #[error("symbol `{symbol}` resolved as `{found}`, expected `{expected}`")]
    SignatureMismatch {
        symbol: String,
        expected: String,
        found: String,
    },

    #[error("invalid string allocation length {size}, expected at most {limit} bytes")]
    InvalidAllocationSize { size: i64, limit: usize },

    #[error("{operation} failed with {outcome}: {message}")]
    SessionError {
        operation: &'static str,
        outcome: NvrtcResult,
        message: String,
    },

    #[error("{operation} failed with {outcome}:\n{log}")]
    CompilationFailed {
        operation: &'static str,
        outcome: NvrtcResult,
        log: String,
    },

    #[error("`{operation}` is not valid on a program session in state {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },

    #[error("text passed to native code contains a NUL byte at offset {offset}")]
    InteriorNul { offset: usize },

    #[error("pointer array index {index} out of bounds for length {len}")]
    IndexOutOfBounds { index: usize, len: usize },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CompilerError {
    /// The NVRTC outcome carried by this error, if it came from a native code.
    pub fn outcome(&self) -> Option<NvrtcResult> {
        match self {
            CompilerError::SessionError { outcome, .. }
            | CompilerError::CompilationFailed { outcome, .. } => Some(*outcome),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, CompilerError>;
