//! One NVRTC program across its lifecycle.
//!
//! ```text
//!  allocate()          create()            terminate()
//! ───────────▶ Allocated ─────────▶ Created ─────────────▶ Terminated
//!                  │                                          ▲
//!                  └──────────── terminate() ─────────────────┘
//!                        (backing memory only, no destroy call)
//! ```
//!
//! A `Created` session reaches `Terminated` exactly once: explicitly through
//! [`ProgramSession::terminate`], or from `Drop` on any other exit path.

use std::fmt;
use std::os::raw::{c_char, c_int};

use super::nvrtc::{GetSizeFn, GetTextFn, NvrtcApi, NvrtcProgram};
use super::symbols::NvrtcFunction;
use crate::buffer::{NativeScalar, NativeString, NativeText, ResourceScope};
use crate::error::{CompilerError, NvrtcResult, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Handle memory exists, no native program yet.
    Allocated,
    /// A native program exists.
    Created,
    /// Program destroyed and handle memory freed.
    Terminated,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Allocated => "Allocated",
            SessionState::Created => "Created",
            SessionState::Terminated => "Terminated",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct ProgramSession<'a> {
    api: &'a NvrtcApi,
    handle: Option<NativeScalar>,
    state: SessionState,
    compiled: Option<NvrtcResult>,
    max_text: usize,
}

impl<'a> ProgramSession<'a> {
    /// Reserve the handle cell. No native program exists yet.
    pub fn allocate(api: &'a NvrtcApi, max_text: usize) -> Result<Self> {
        Ok(Self {
            api,
            handle: Some(NativeScalar::acquire()?),
            state: SessionState::Allocated,
            compiled: None,
            max_text,
        })
    }

    /// Allocate and create in one step.
    ///
    /// If creation fails the session is dropped here while still `Allocated`,
    /// which frees the handle cell without a destroy call.
    pub fn open(api: &'a NvrtcApi, source: &str, label: &str, max_text: usize) -> Result<Self> {
        let mut session = Self::allocate(api, max_text)?;
        session.create(source, label)?;
        Ok(session)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Outcome of the last compile call, if any.
    pub fn compile_outcome(&self) -> Option<NvrtcResult> {
        self.compiled
    }

    /// `nvrtcCreateProgram(&handle, source, label, 0, NULL, NULL)`.
    pub fn create(&mut self, source: &str, label: &str) -> Result<()> {
        self.require(SessionState::Allocated, "create")?;

        let mut scope = ResourceScope::new();
        let source = scope.encode(source)?;
        let label = scope.encode(label)?;
        let handle_out = self.handle_cell("create")?.address() as *mut NvrtcProgram;

        // SAFETY: handle_out is a live 8-byte cell; source/label are
        // NUL-terminated and owned by `scope` until after the call.
        let code = unsafe {
            (self.api.entry_points().create_program)(
                handle_out,
                source,
                label,
                0,
                std::ptr::null(),
                std::ptr::null(),
            )
        };
        drop(scope);

        if let Err(e) = self.api.translator().check(code, NvrtcFunction::CreateProgram) {
            // Stay Allocated: terminate (or drop) frees the cell without a destroy call.
            if let Some(cell) = self.handle.as_mut() {
                cell.write_pointer(std::ptr::null_mut());
            }
            return Err(e);
        }

        self.state = SessionState::Created;
        log::debug!("created program {:p}", self.program_value()?);
        Ok(())
    }

    /// `nvrtcAddNameExpression(program, name)`.
    ///
    /// A failure leaves the session `Created`; the caller still terminates it.
    pub fn add_name_expression(&mut self, name: &str) -> Result<()> {
        let program = self.live_program("add_name_expression")?;
        let mut scope = ResourceScope::new();
        let name = scope.encode(name)?;

        // SAFETY: program is live; name is owned by scope across the call.
        let code = unsafe { (self.api.entry_points().add_name_expression)(program, name) };
        self.api.translator().check(code, NvrtcFunction::AddNameExpression)
    }

    /// `nvrtcCompileProgram(program, n, options)`.
    ///
    /// The native outcome is returned, not raised, so the caller can fetch
    /// the log first. Errors are reserved for marshaling and state faults.
    pub fn compile_with<S: AsRef<str>>(&mut self, options: &[S]) -> Result<NvrtcResult> {
        let program = self.live_program("compile_with")?;
        let count = c_int::try_from(options.len()).map_err(|_| CompilerError::IndexOutOfBounds {
            index: options.len(),
            len: c_int::MAX as usize,
        })?;

        let mut scope = ResourceScope::new();
        let array = scope.encode_array(options)?;

        // SAFETY: array is null with count 0, or holds `count` live string
        // addresses owned by scope until it drops below.
        let code = unsafe { (self.api.entry_points().compile_program)(program, count, array) };
        scope.release_all();

        let outcome = self.api.translator().translate(code);
        log::debug!("compiled program {:p} with {} options: {}", program, count, outcome);
        self.compiled = Some(outcome);
        Ok(outcome)
    }

    /// The program log; available whether or not compilation succeeded.
    pub fn fetch_log(&self) -> Result<String> {
        let program = self.live_program("fetch_log")?;
        let entry = self.api.entry_points();
        self.fetch_sized(
            program,
            (entry.get_program_log_size, NvrtcFunction::GetProgramLogSize),
            (entry.get_program_log, NvrtcFunction::GetProgramLog),
        )
    }

    /// The compiled PTX text.
    pub fn fetch_artifact_text(&self) -> Result<String> {
        let program = self.live_program("fetch_artifact_text")?;
        let entry = self.api.entry_points();
        self.fetch_sized(
            program,
            (entry.get_ptx_size, NvrtcFunction::GetPtxSize),
            (entry.get_ptx, NvrtcFunction::GetPtx),
        )
    }

    /// Mangled name registered for `requested` by `add_name_expression`.
    ///
    /// Only valid after a successful compile. The native string belongs to
    /// the program and is copied out before this returns.
    pub fn lower_name(&self, requested: &str) -> Result<String> {
        let program = self.live_program("lower_name")?;
        if self.compiled != Some(NvrtcResult::Success) {
            return Err(self.api.translator().raise(
                NvrtcResult::NoLoweredNamesBeforeCompilation.code(),
                NvrtcFunction::GetLoweredName.symbol(),
                None,
            ));
        }

        let mut scope = ResourceScope::new();
        let name = scope.encode(requested)?;
        let out = NativeScalar::acquire()?;

        // SAFETY: program is live; name is owned by scope; out is a live
        // pointer-sized cell.
        let code = unsafe {
            (self.api.entry_points().get_lowered_name)(program, name, out.address() as *mut *const c_char)
        };
        self.api.translator().check(code, NvrtcFunction::GetLoweredName)?;

        // SAFETY: on success NVRTC stores a string owned by `program`, which
        // outlives this borrow of self.
        let lowered = unsafe { NativeText::borrowed(out.read_pointer() as *const c_char, self.max_text)? };
        match lowered {
            Some(text) => text.into_string(self.max_text),
            None => Err(CompilerError::SessionError {
                operation: NvrtcFunction::GetLoweredName.symbol(),
                outcome: NvrtcResult::InternalError,
                message: format!("no lowered name returned for `{}`", requested),
            }),
        }
    }

    /// Destroy the native program (if one exists) and free the handle cell.
    ///
    /// Memory is released even when `nvrtcDestroyProgram` reports failure;
    /// that failure is still returned. Terminating twice is an
    /// `InvalidState` error and issues no native call.
    pub fn terminate(&mut self) -> Result<()> {
        match self.state {
            SessionState::Terminated => Err(CompilerError::InvalidState {
                operation: "terminate",
                state: self.state.as_str(),
            }),
            SessionState::Allocated => {
                self.release_handle();
                log::debug!("terminated session before program creation");
                Ok(())
            }
            SessionState::Created => {
                let code = match self.handle.as_ref() {
                    // SAFETY: the cell holds the live program; destroy nulls it.
                    Some(cell) => unsafe {
                        (self.api.entry_points().destroy_program)(cell.address() as *mut NvrtcProgram)
                    },
                    None => NvrtcResult::InvalidProgram.code(),
                };
                self.release_handle();
                log::debug!("terminated program session");
                self.api.translator().check(code, NvrtcFunction::DestroyProgram)
            }
        }
    }

    /// Shared size-then-fill protocol for log and PTX retrieval.
    fn fetch_sized(
        &self,
        program: NvrtcProgram,
        size_op: (GetSizeFn, NvrtcFunction),
        fill_op: (GetTextFn, NvrtcFunction),
    ) -> Result<String> {
        let size = NativeScalar::acquire()?;
        // SAFETY: size is a live 8-byte cell, wide enough for size_t.
        let code = unsafe { (size_op.0)(program, size.address() as *mut usize) };
        self.api.translator().check(code, size_op.1)?;

        let reported = size.read_i64();
        size.release();
        let mut buffer = NativeString::with_length(reported, self.max_text)?;

        // SAFETY: buffer holds exactly the size NVRTC reported for this text.
        let code = unsafe { (fill_op.0)(program, buffer.as_mut_ptr()) };
        self.api.translator().check(code, fill_op.1)?;

        NativeText::Owned(buffer).into_string(self.max_text)
    }

    fn require(&self, expected: SessionState, operation: &'static str) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(CompilerError::InvalidState {
                operation,
                state: self.state.as_str(),
            })
        }
    }

    fn handle_cell(&self, operation: &'static str) -> Result<&NativeScalar> {
        self.handle.as_ref().ok_or(CompilerError::InvalidState {
            operation,
            state: self.state.as_str(),
        })
    }

    fn program_value(&self) -> Result<NvrtcProgram> {
        Ok(self.handle_cell("program")?.read_pointer())
    }

    fn live_program(&self, operation: &'static str) -> Result<NvrtcProgram> {
        self.require(SessionState::Created, operation)?;
        self.program_value()
    }

    fn release_handle(&mut self) {
        if let Some(cell) = self.handle.take() {
            cell.release();
        }
        self.state = SessionState::Terminated;
    }
}

impl Drop for ProgramSession<'_> {
    fn drop(&mut self) {
        if self.state != SessionState::Terminated {
            if let Err(e) = self.terminate() {
                log::warn!("program teardown reported an error: {}", e);
            }
        }
    }
}
