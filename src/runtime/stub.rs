//! In-process stand-in for NVRTC.
//!
//! Every entry point has the real C signature and reads its behavior from
//! thread-local state, so each test thread drives its own fake compiler.
//! Calls are journaled so tests can assert on exactly which native
//! functions ran, with which options, and how many programs were created
//! and destroyed.
//!
//! ```rust,no_run
//! use nvrtc_jit::runtime::stub::{self, StubBehavior};
//!
//! stub::install(StubBehavior::default().lower("inc", "_Z3incPi"));
//! let api = stub::api();
//! ```

use std::cell::RefCell;
use std::collections::HashMap;
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int, c_void};

use super::nvrtc::{NvrtcApi, NvrtcEntryPoints, NvrtcProgram};
use super::symbols::{AbiSignature, InvocableHandle, NvrtcFunction, SymbolDescriptor, SymbolResolver};
use crate::error::{CompilerError, NvrtcResult, Result};

/// PTX returned when no other text is configured.
pub const CANNED_PTX: &str = "//\n// Generated by NVRTC stub\n//\n.version 7.0\n.target sm_70\n.address_size 64\n";

/// What the stub reports back to its caller.
#[derive(Debug, Clone)]
pub struct StubBehavior {
    /// Return code per entry point; anything absent returns success.
    pub codes: HashMap<NvrtcFunction, c_int>,
    pub log: String,
    pub ptx: String,
    /// Size reported by `nvrtcGetProgramLogSize` instead of the real one.
    pub log_size: Option<i64>,
    /// Size reported by `nvrtcGetPTXSize` instead of the real one.
    pub ptx_size: Option<i64>,
    /// Lowered name per name expression. Unlisted names lower to themselves.
    pub lowered_names: HashMap<String, String>,
    /// Make `nvrtcGetErrorString` return null for every code.
    pub null_error_strings: bool,
}

impl Default for StubBehavior {
    fn default() -> Self {
        Self {
            codes: HashMap::new(),
            log: String::new(),
            ptx: CANNED_PTX.to_string(),
            log_size: None,
            ptx_size: None,
            lowered_names: HashMap::new(),
            null_error_strings: false,
        }
    }
}

impl StubBehavior {
    pub fn fail(mut self, function: NvrtcFunction, code: c_int) -> Self {
        self.codes.insert(function, code);
        self
    }

    pub fn with_log(mut self, log: impl Into<String>) -> Self {
        self.log = log.into();
        self
    }

    pub fn with_ptx(mut self, ptx: impl Into<String>) -> Self {
        self.ptx = ptx.into();
        self
    }

    pub fn report_log_size(mut self, size: i64) -> Self {
        self.log_size = Some(size);
        self
    }

    pub fn report_ptx_size(mut self, size: i64) -> Self {
        self.ptx_size = Some(size);
        self
    }

    pub fn lower(mut self, name: impl Into<String>, lowered: impl Into<String>) -> Self {
        self.lowered_names.insert(name.into(), lowered.into());
        self
    }

    pub fn without_error_strings(mut self) -> Self {
        self.null_error_strings = true;
        self
    }

    fn code(&self, function: NvrtcFunction) -> c_int {
        self.codes.get(&function).copied().unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedProgram {
    pub source: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileCall {
    pub options: Vec<String>,
    /// Address of each option string as passed in the pointer array.
    pub option_addresses: Vec<usize>,
    /// Address of the pointer array itself (0 for null).
    pub array_address: usize,
}

/// Record of every stub call on this thread since the last install/reset.
#[derive(Debug, Clone, Default)]
pub struct StubJournal {
    pub calls: Vec<NvrtcFunction>,
    pub created: Vec<CreatedProgram>,
    pub destroyed: usize,
    pub name_expressions: Vec<String>,
    pub compiles: Vec<CompileCall>,
}

impl StubJournal {
    pub fn count(&self, function: NvrtcFunction) -> usize {
        self.calls.iter().filter(|call| **call == function).count()
    }
}

#[derive(Default)]
struct StubProgram {
    names: Vec<String>,
    compiled: bool,
    lowered: HashMap<String, CString>,
    reported_log: usize,
    reported_ptx: usize,
}

#[derive(Default)]
struct StubState {
    behavior: StubBehavior,
    journal: StubJournal,
    programs: HashMap<usize, StubProgram>,
    next_program: usize,
}

thread_local! {
    static STATE: RefCell<StubState> = RefCell::new(StubState::default());
}

fn with_state<R>(f: impl FnOnce(&mut StubState) -> R) -> R {
    STATE.with(|state| f(&mut state.borrow_mut()))
}

/// Replace this thread's behavior and clear the journal and live programs.
pub fn install(behavior: StubBehavior) {
    with_state(|state| {
        *state = StubState {
            behavior,
            ..StubState::default()
        }
    });
}

pub fn reset() {
    install(StubBehavior::default());
}

pub fn journal() -> StubJournal {
    with_state(|state| state.journal.clone())
}

/// Programs created and not yet destroyed on this thread.
pub fn live_programs() -> usize {
    with_state(|state| state.programs.len())
}

pub fn entry_points() -> NvrtcEntryPoints {
    NvrtcEntryPoints {
        get_error_string: stub_get_error_string,
        create_program: stub_create_program,
        destroy_program: stub_destroy_program,
        add_name_expression: stub_add_name_expression,
        compile_program: stub_compile_program,
        get_program_log_size: stub_get_program_log_size,
        get_program_log: stub_get_program_log,
        get_lowered_name: stub_get_lowered_name,
        get_ptx_size: stub_get_ptx_size,
        get_ptx: stub_get_ptx,
    }
}

/// An [`NvrtcApi`] wired straight to the stub entry points.
pub fn api() -> NvrtcApi {
    NvrtcApi::from_entry_points(entry_points())
}

fn address_of(function: NvrtcFunction) -> *mut c_void {
    let entry = entry_points();
    match function {
        NvrtcFunction::GetErrorString => entry.get_error_string as *mut c_void,
        NvrtcFunction::CreateProgram => entry.create_program as *mut c_void,
        NvrtcFunction::DestroyProgram => entry.destroy_program as *mut c_void,
        NvrtcFunction::AddNameExpression => entry.add_name_expression as *mut c_void,
        NvrtcFunction::CompileProgram => entry.compile_program as *mut c_void,
        NvrtcFunction::GetProgramLogSize => entry.get_program_log_size as *mut c_void,
        NvrtcFunction::GetProgramLog => entry.get_program_log as *mut c_void,
        NvrtcFunction::GetLoweredName => entry.get_lowered_name as *mut c_void,
        NvrtcFunction::GetPtxSize => entry.get_ptx_size as *mut c_void,
        NvrtcFunction::GetPtx => entry.get_ptx as *mut c_void,
    }
}

/// Resolves the NVRTC symbol table to the stub entry points.
///
/// Symbols can be hidden or re-declared under another signature to exercise
/// the binding failure paths.
#[derive(Debug, Clone)]
pub struct StubResolver {
    library: String,
    missing: Vec<&'static str>,
    signatures: HashMap<&'static str, &'static str>,
}

impl StubResolver {
    pub fn new(library: impl Into<String>) -> Self {
        Self {
            library: library.into(),
            missing: Vec::new(),
            signatures: HashMap::new(),
        }
    }

    pub fn without(mut self, symbol: &'static str) -> Self {
        self.missing.push(symbol);
        self
    }

    pub fn with_signature(mut self, symbol: &'static str, signature: &'static str) -> Self {
        self.signatures.insert(symbol, signature);
        self
    }
}

impl SymbolResolver for StubResolver {
    fn resolve(&self, library: &str, descriptor: &SymbolDescriptor) -> Result<InvocableHandle> {
        let not_found = |reason: &str| CompilerError::SymbolNotFound {
            library: library.to_string(),
            symbol: descriptor.name.to_string(),
            signature: descriptor.abi_signature.to_string(),
            reason: reason.to_string(),
        };

        if library != self.library {
            return Err(not_found("library is not loaded"));
        }
        if self.missing.contains(&descriptor.name) {
            return Err(not_found("undefined symbol"));
        }
        let function = NvrtcFunction::ALL
            .into_iter()
            .find(|f| f.symbol() == descriptor.name)
            .ok_or_else(|| not_found("undefined symbol"))?;

        let declared = self
            .signatures
            .get(descriptor.name)
            .copied()
            .unwrap_or(descriptor.abi_signature);
        let signature = AbiSignature::parse(declared)?;
        InvocableHandle::from_static(descriptor.name, signature, address_of(function))
            .ok_or_else(|| not_found("null address"))
    }
}

fn error_text(code: c_int) -> &'static [u8] {
    match NvrtcResult::from_code(code) {
        NvrtcResult::Success => b"NVRTC_SUCCESS\0",
        NvrtcResult::OutOfMemory => b"NVRTC_ERROR_OUT_OF_MEMORY\0",
        NvrtcResult::ProgramCreationFailure => b"NVRTC_ERROR_PROGRAM_CREATION_FAILURE\0",
        NvrtcResult::InvalidInput => b"NVRTC_ERROR_INVALID_INPUT\0",
        NvrtcResult::InvalidProgram => b"NVRTC_ERROR_INVALID_PROGRAM\0",
        NvrtcResult::InvalidOption => b"NVRTC_ERROR_INVALID_OPTION\0",
        NvrtcResult::CompilationFailure => b"NVRTC_ERROR_COMPILATION\0",
        NvrtcResult::BuiltinOperationFailure => b"NVRTC_ERROR_BUILTIN_OPERATION_FAILURE\0",
        NvrtcResult::NoNameExpressionsAfterCompilation => b"NVRTC_ERROR_NO_NAME_EXPRESSIONS_AFTER_COMPILATION\0",
        NvrtcResult::NoLoweredNamesBeforeCompilation => b"NVRTC_ERROR_NO_LOWERED_NAMES_BEFORE_COMPILATION\0",
        NvrtcResult::NameExpressionNotValid => b"NVRTC_ERROR_NAME_EXPRESSION_NOT_VALID\0",
        NvrtcResult::InternalError => b"NVRTC_ERROR_INTERNAL_ERROR\0",
        NvrtcResult::Unknown(_) => b"NVRTC_ERROR unknown\0",
    }
}

const INVALID_INPUT: c_int = 3;
const INVALID_PROGRAM: c_int = 4;
const NO_NAME_EXPRESSIONS_AFTER_COMPILATION: c_int = 8;
const NO_LOWERED_NAMES_BEFORE_COMPILATION: c_int = 9;
const NAME_EXPRESSION_NOT_VALID: c_int = 10;

unsafe fn read_text(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        None
    } else {
        Some(CStr::from_ptr(ptr).to_string_lossy().into_owned())
    }
}

unsafe extern "C" fn stub_get_error_string(code: c_int) -> *const c_char {
    let null = with_state(|state| {
        state.journal.calls.push(NvrtcFunction::GetErrorString);
        state.behavior.null_error_strings
    });
    if null {
        return std::ptr::null();
    }
    error_text(code).as_ptr() as *const c_char
}

unsafe extern "C" fn stub_create_program(
    prog: *mut NvrtcProgram,
    src: *const c_char,
    name: *const c_char,
    _num_headers: c_int,
    _headers: *const *const c_char,
    _include_names: *const *const c_char,
) -> c_int {
    let source = read_text(src);
    let label = read_text(name).unwrap_or_default();
    with_state(|state| {
        state.journal.calls.push(NvrtcFunction::CreateProgram);
        let code = state.behavior.code(NvrtcFunction::CreateProgram);
        if code != 0 {
            return code;
        }
        let (Some(source), false) = (source, prog.is_null()) else {
            return INVALID_INPUT;
        };

        state.next_program += 1;
        let key = state.next_program << 4;
        state.programs.insert(key, StubProgram::default());
        state.journal.created.push(CreatedProgram { source, label });
        *prog = key as NvrtcProgram;
        0
    })
}

unsafe extern "C" fn stub_destroy_program(prog: *mut NvrtcProgram) -> c_int {
    with_state(|state| {
        state.journal.calls.push(NvrtcFunction::DestroyProgram);
        if prog.is_null() {
            return INVALID_INPUT;
        }
        if state.programs.remove(&(*prog as usize)).is_none() {
            return INVALID_PROGRAM;
        }
        *prog = std::ptr::null_mut();
        state.journal.destroyed += 1;
        state.behavior.code(NvrtcFunction::DestroyProgram)
    })
}

unsafe extern "C" fn stub_add_name_expression(prog: NvrtcProgram, name_expression: *const c_char) -> c_int {
    let name = read_text(name_expression);
    with_state(|state| {
        state.journal.calls.push(NvrtcFunction::AddNameExpression);
        let code = state.behavior.code(NvrtcFunction::AddNameExpression);
        if code != 0 {
            return code;
        }
        let Some(program) = state.programs.get_mut(&(prog as usize)) else {
            return INVALID_PROGRAM;
        };
        if program.compiled {
            return NO_NAME_EXPRESSIONS_AFTER_COMPILATION;
        }
        let Some(name) = name else {
            return INVALID_INPUT;
        };
        program.names.push(name.clone());
        state.journal.name_expressions.push(name);
        0
    })
}

unsafe extern "C" fn stub_compile_program(
    prog: NvrtcProgram,
    num_options: c_int,
    options: *const *const c_char,
) -> c_int {
    let count = usize::try_from(num_options).unwrap_or(0);
    let mut call = CompileCall {
        options: Vec::with_capacity(count),
        option_addresses: Vec::with_capacity(count),
        array_address: options as usize,
    };
    if count > 0 && !options.is_null() {
        for i in 0..count {
            let option = *options.add(i);
            call.option_addresses.push(option as usize);
            call.options.push(read_text(option).unwrap_or_default());
        }
    }

    with_state(|state| {
        state.journal.calls.push(NvrtcFunction::CompileProgram);
        state.journal.compiles.push(call);
        if num_options < 0 || (num_options > 0 && options.is_null()) {
            return INVALID_INPUT;
        }
        let code = state.behavior.code(NvrtcFunction::CompileProgram);
        let lowered_names = &state.behavior.lowered_names;
        let Some(program) = state.programs.get_mut(&(prog as usize)) else {
            return INVALID_PROGRAM;
        };
        if code != 0 {
            return code;
        }

        program.compiled = true;
        for name in &program.names {
            let lowered = lowered_names.get(name).unwrap_or(name);
            program
                .lowered
                .insert(name.clone(), CString::new(lowered.as_str()).unwrap_or_default());
        }
        0
    })
}

unsafe fn report_size(
    prog: NvrtcProgram,
    size: *mut usize,
    function: NvrtcFunction,
    text_len: impl Fn(&StubBehavior) -> (usize, Option<i64>),
    remember: impl Fn(&mut StubProgram, usize),
) -> c_int {
    with_state(|state| {
        state.journal.calls.push(function);
        let code = state.behavior.code(function);
        if code != 0 {
            return code;
        }
        let (len, reported) = text_len(&state.behavior);
        let Some(program) = state.programs.get_mut(&(prog as usize)) else {
            return INVALID_PROGRAM;
        };
        if size.is_null() {
            return INVALID_INPUT;
        }
        let reported = reported.unwrap_or(len as i64 + 1);
        remember(program, usize::try_from(reported).unwrap_or(0));
        *size = reported as usize;
        0
    })
}

unsafe fn fill_text(
    prog: NvrtcProgram,
    out: *mut c_char,
    function: NvrtcFunction,
    text: impl Fn(&StubBehavior) -> &str,
    capacity: impl Fn(&StubProgram) -> usize,
) -> c_int {
    with_state(|state| {
        state.journal.calls.push(function);
        let code = state.behavior.code(function);
        if code != 0 {
            return code;
        }
        let Some(program) = state.programs.get(&(prog as usize)) else {
            return INVALID_PROGRAM;
        };
        if out.is_null() {
            return INVALID_INPUT;
        }
        let capacity = capacity(program);
        if capacity == 0 {
            return 0;
        }
        let bytes = text(&state.behavior).as_bytes();
        let n = bytes.len().min(capacity - 1);
        std::ptr::copy_nonoverlapping(bytes.as_ptr(), out as *mut u8, n);
        *out.add(n) = 0;
        0
    })
}

unsafe extern "C" fn stub_get_program_log_size(prog: NvrtcProgram, size: *mut usize) -> c_int {
    report_size(
        prog,
        size,
        NvrtcFunction::GetProgramLogSize,
        |b| (b.log.len(), b.log_size),
        |p, n| p.reported_log = n,
    )
}

unsafe extern "C" fn stub_get_program_log(prog: NvrtcProgram, log: *mut c_char) -> c_int {
    fill_text(prog, log, NvrtcFunction::GetProgramLog, |b| b.log.as_str(), |p| p.reported_log)
}

unsafe extern "C" fn stub_get_ptx_size(prog: NvrtcProgram, size: *mut usize) -> c_int {
    report_size(
        prog,
        size,
        NvrtcFunction::GetPtxSize,
        |b| (b.ptx.len(), b.ptx_size),
        |p, n| p.reported_ptx = n,
    )
}

unsafe extern "C" fn stub_get_ptx(prog: NvrtcProgram, ptx: *mut c_char) -> c_int {
    fill_text(prog, ptx, NvrtcFunction::GetPtx, |b| b.ptx.as_str(), |p| p.reported_ptx)
}

unsafe extern "C" fn stub_get_lowered_name(
    prog: NvrtcProgram,
    name_expression: *const c_char,
    lowered_name: *mut *const c_char,
) -> c_int {
    let name = read_text(name_expression);
    with_state(|state| {
        state.journal.calls.push(NvrtcFunction::GetLoweredName);
        let code = state.behavior.code(NvrtcFunction::GetLoweredName);
        if code != 0 {
            return code;
        }
        let Some(program) = state.programs.get(&(prog as usize)) else {
            return INVALID_PROGRAM;
        };
        if !program.compiled {
            return NO_LOWERED_NAMES_BEFORE_COMPILATION;
        }
        let (Some(name), false) = (name, lowered_name.is_null()) else {
            return INVALID_INPUT;
        };
        match program.lowered.get(&name) {
            Some(lowered) => {
                *lowered_name = lowered.as_ptr();
                0
            }
            None => NAME_EXPRESSION_NOT_VALID,
        }
    })
}
