//! Native symbol table and resolution.
//!
//! Each NVRTC entry point this crate calls is described by a
//! [`SymbolDescriptor`]: its exported name plus an ABI signature string such
//! as `(pointer, string): sint32`. A [`SymbolResolver`] turns a descriptor
//! into an [`InvocableHandle`], the raw entry address together with the
//! parsed signature it was resolved under.

use std::collections::HashMap;
use std::fmt;
use std::os::raw::c_void;
use std::ptr::NonNull;
use std::sync::Arc;

use libloading::{Library, Symbol};
use parking_lot::RwLock;

use crate::error::{CompilerError, Result};

/// Parameter and return types understood in signature strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeType {
    Pointer,
    String,
    Sint32,
    Sint64,
    Uint64,
    Void,
}

impl NativeType {
    pub fn parse(token: &str) -> Option<Self> {
        match token.trim() {
            "pointer" => Some(NativeType::Pointer),
            "string" => Some(NativeType::String),
            "sint32" => Some(NativeType::Sint32),
            "sint64" => Some(NativeType::Sint64),
            "uint64" => Some(NativeType::Uint64),
            "void" => Some(NativeType::Void),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NativeType::Pointer => "pointer",
            NativeType::String => "string",
            NativeType::Sint32 => "sint32",
            NativeType::Sint64 => "sint64",
            NativeType::Uint64 => "uint64",
            NativeType::Void => "void",
        }
    }
}

/// Parsed form of `(param, ...): return`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbiSignature {
    pub params: Vec<NativeType>,
    pub returns: NativeType,
}

impl AbiSignature {
    pub fn parse(signature: &str) -> Result<Self> {
        let invalid = |reason: &str| CompilerError::InvalidSignature {
            signature: signature.to_string(),
            reason: reason.to_string(),
        };

        let rest = signature
            .trim()
            .strip_prefix('(')
            .ok_or_else(|| invalid("missing '('"))?;
        let (params, returns) = rest.split_once(')').ok_or_else(|| invalid("missing ')'"))?;
        let returns = returns
            .trim()
            .strip_prefix(':')
            .ok_or_else(|| invalid("missing ':' before return type"))?;

        let params = if params.trim().is_empty() {
            Vec::new()
        } else {
            params
                .split(',')
                .map(|token| {
                    NativeType::parse(token)
                        .filter(|ty| *ty != NativeType::Void)
                        .ok_or_else(|| invalid(&format!("unknown parameter type '{}'", token.trim())))
                })
                .collect::<Result<Vec<_>>>()?
        };
        let returns = NativeType::parse(returns)
            .ok_or_else(|| invalid(&format!("unknown return type '{}'", returns.trim())))?;

        Ok(Self { params, returns })
    }
}

impl fmt::Display for AbiSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params: Vec<&str> = self.params.iter().map(|p| p.as_str()).collect();
        write!(f, "({}): {}", params.join(", "), self.returns.as_str())
    }
}

/// Name and ABI signature of one native entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymbolDescriptor {
    pub name: &'static str,
    pub abi_signature: &'static str,
}

/// The fixed NVRTC surface this crate binds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NvrtcFunction {
    GetErrorString,
    CreateProgram,
    DestroyProgram,
    AddNameExpression,
    CompileProgram,
    GetProgramLogSize,
    GetProgramLog,
    GetLoweredName,
    GetPtxSize,
    GetPtx,
}

impl NvrtcFunction {
    pub const ALL: [NvrtcFunction; 10] = [
        NvrtcFunction::GetErrorString,
        NvrtcFunction::CreateProgram,
        NvrtcFunction::DestroyProgram,
        NvrtcFunction::AddNameExpression,
        NvrtcFunction::CompileProgram,
        NvrtcFunction::GetProgramLogSize,
        NvrtcFunction::GetProgramLog,
        NvrtcFunction::GetLoweredName,
        NvrtcFunction::GetPtxSize,
        NvrtcFunction::GetPtx,
    ];

    pub fn descriptor(self) -> SymbolDescriptor {
        let (name, abi_signature) = match self {
            NvrtcFunction::GetErrorString => ("nvrtcGetErrorString", "(sint32): string"),
            NvrtcFunction::CreateProgram => (
                "nvrtcCreateProgram",
                "(pointer, string, string, sint32, pointer, pointer): sint32",
            ),
            NvrtcFunction::DestroyProgram => ("nvrtcDestroyProgram", "(pointer): sint32"),
            NvrtcFunction::AddNameExpression => ("nvrtcAddNameExpression", "(pointer, string): sint32"),
            NvrtcFunction::CompileProgram => ("nvrtcCompileProgram", "(pointer, sint32, pointer): sint32"),
            NvrtcFunction::GetProgramLogSize => ("nvrtcGetProgramLogSize", "(pointer, pointer): sint32"),
            NvrtcFunction::GetProgramLog => ("nvrtcGetProgramLog", "(pointer, pointer): sint32"),
            NvrtcFunction::GetLoweredName => ("nvrtcGetLoweredName", "(pointer, string, pointer): sint32"),
            NvrtcFunction::GetPtxSize => ("nvrtcGetPTXSize", "(pointer, pointer): sint32"),
            NvrtcFunction::GetPtx => ("nvrtcGetPTX", "(pointer, pointer): sint32"),
        };
        SymbolDescriptor { name, abi_signature }
    }

    pub fn symbol(self) -> &'static str {
        self.descriptor().name
    }
}

/// A resolved entry point.
#[derive(Debug, Clone)]
pub struct InvocableHandle {
    pub symbol: String,
    pub signature: AbiSignature,
    address: NonNull<c_void>,
    keepalive: Option<Arc<Library>>,
}

// SAFETY: the address is an immutable code pointer; the library it lives in
// is kept loaded by `keepalive` (or is static for in-process symbols).
unsafe impl Send for InvocableHandle {}
unsafe impl Sync for InvocableHandle {}

impl InvocableHandle {
    /// Handle for an entry point that lives for the whole process.
    pub fn from_static(symbol: &str, signature: AbiSignature, address: *mut c_void) -> Option<Self> {
        NonNull::new(address).map(|address| Self {
            symbol: symbol.to_string(),
            signature,
            address,
            keepalive: None,
        })
    }

    pub fn address(&self) -> *mut c_void {
        self.address.as_ptr()
    }

    /// The library that must stay loaded while this handle is used.
    pub fn keepalive(&self) -> Option<&Arc<Library>> {
        self.keepalive.as_ref()
    }
}

/// Resolves native entry points. Implementations may cache; callers do not.
pub trait SymbolResolver {
    fn resolve(&self, library: &str, descriptor: &SymbolDescriptor) -> Result<InvocableHandle>;
}

/// Registry of loaded shared libraries, keyed by library id.
#[derive(Default)]
pub struct NativeLibraries {
    loaded: RwLock<HashMap<String, Arc<Library>>>,
}

impl NativeLibraries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the first candidate path that opens and register it as `library`.
    pub fn load(&self, library: &str, candidates: &[String]) -> Result<()> {
        if self.is_loaded(library) {
            return Ok(());
        }

        let mut last_err = String::from("no candidate paths configured");
        for path in candidates {
            // SAFETY: loading runs the library's initialisers; NVRTC has no
            // preconditions on them.
            match unsafe { Library::new(path) } {
                Ok(lib) => {
                    log::info!("loaded `{}` from {}", library, path);
                    self.loaded.write().insert(library.to_string(), Arc::new(lib));
                    return Ok(());
                }
                Err(e) => {
                    log::debug!("failed to load {}: {}", path, e);
                    last_err = format!("{}: {}", path, e);
                }
            }
        }

        Err(CompilerError::LibraryLoad {
            library: library.to_string(),
            reason: last_err,
        })
    }

    pub fn is_loaded(&self, library: &str) -> bool {
        self.loaded.read().contains_key(library)
    }
}

impl SymbolResolver for NativeLibraries {
    fn resolve(&self, library: &str, descriptor: &SymbolDescriptor) -> Result<InvocableHandle> {
        let signature = AbiSignature::parse(descriptor.abi_signature)?;
        let not_found = |reason: String| CompilerError::SymbolNotFound {
            library: library.to_string(),
            symbol: descriptor.name.to_string(),
            signature: descriptor.abi_signature.to_string(),
            reason,
        };

        let lib = self
            .loaded
            .read()
            .get(library)
            .cloned()
            .ok_or_else(|| not_found("library is not loaded".to_string()))?;

        // SAFETY: the symbol is only read as an address here; its type is
        // checked against the descriptor when it is bound.
        let address = unsafe {
            let symbol: Symbol<*mut c_void> = lib
                .get(descriptor.name.as_bytes())
                .map_err(|e| not_found(e.to_string()))?;
            *symbol
        };
        let address = NonNull::new(address).ok_or_else(|| not_found("null address".to_string()))?;

        log::trace!("resolved {} at {:p}", descriptor.name, address);
        Ok(InvocableHandle {
            symbol: descriptor.name.to_string(),
            signature,
            address,
            keepalive: Some(lib),
        })
    }
}
