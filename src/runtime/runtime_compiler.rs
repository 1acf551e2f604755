use std::path::Path;

use parking_lot::Mutex;

use super::nvrtc::NvrtcApi;
use super::session::ProgramSession;
use super::symbols::{NativeLibraries, NvrtcFunction, SymbolResolver};
use crate::config::CompilerConfig;
use crate::error::Result;

/// PTX for one kernel plus the names needed to launch it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledKernel {
    ptx: String,
    requested_name: String,
    lowered_name: String,
}

impl CompiledKernel {
    pub fn new(ptx: String, requested_name: impl Into<String>, lowered_name: String) -> Self {
        Self {
            ptx,
            requested_name: requested_name.into(),
            lowered_name,
        }
    }

    /// The compiled PTX text.
    pub fn ptx(&self) -> &str {
        &self.ptx
    }

    /// Name as written in the source (e.g. `inc`).
    pub fn requested_name(&self) -> &str {
        &self.requested_name
    }

    /// Name the loader must look up (e.g. `_Z3incPi`, or `inc` for `extern "C"`).
    pub fn lowered_name(&self) -> &str {
        &self.lowered_name
    }
}

/// Binary handed to a kernel loader.
#[derive(Debug, Clone, Copy)]
pub enum KernelBinary<'a> {
    /// Freshly compiled PTX.
    Ptx(&'a CompiledKernel),
    /// A prebuilt cubin on disk.
    CubinFile(&'a Path),
}

/// Turns a binary and a declared argument signature into a launchable kernel.
///
/// Implemented by the launch layer; the signature string is passed through
/// without being inspected here.
pub trait KernelLoader {
    type Kernel;

    fn load_kernel(&self, binary: KernelBinary<'_>, kernel_name: &str, signature: &str) -> Result<Self::Kernel>;
}

/// Runtime CUDA compiler using NVRTC
pub struct RuntimeCompiler {
    api: NvrtcApi,
    config: CompilerConfig,
    serial: Option<Mutex<()>>,
}

impl RuntimeCompiler {
    pub fn new(api: NvrtcApi, config: CompilerConfig) -> Self {
        let serial = config.serialize_compilations.then(|| Mutex::new(()));
        Self { api, config, serial }
    }

    /// Load NVRTC from the configured paths and bind it.
    pub fn load(config: CompilerConfig) -> Result<Self> {
        config.validate()?;
        let libraries = NativeLibraries::new();
        libraries.load(&config.library, &config.library_paths)?;
        Self::with_resolver(&libraries, config)
    }

    /// Bind through an external resolver (the library id comes from `config`).
    pub fn with_resolver(resolver: &dyn SymbolResolver, config: CompilerConfig) -> Result<Self> {
        let api = NvrtcApi::bind(resolver, &config.library)?;
        Ok(Self::new(api, config))
    }

    pub fn api(&self) -> &NvrtcApi {
        &self.api
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Open a bare session for callers driving the protocol step by step.
    pub fn open_session(&self, source: &str, label: &str) -> Result<ProgramSession<'_>> {
        ProgramSession::open(&self.api, source, label, self.config.max_native_text)
    }

    /// Compile `source` and return the PTX and lowered name of `kernel_name`.
    ///
    /// The program is destroyed before this returns, on success and on every
    /// failure after creation.
    pub fn compile<S: AsRef<str>>(
        &self,
        source: &str,
        kernel_name: &str,
        module_label: &str,
        options: &[S],
    ) -> Result<CompiledKernel> {
        let _serial = self.serial.as_ref().map(|lock| lock.lock());
        let options: Vec<&str> = self
            .config
            .default_options
            .iter()
            .map(String::as_str)
            .chain(options.iter().map(AsRef::as_ref))
            .collect();

        let mut session = self.open_session(source, module_label)?;
        let result = self.drive(&mut session, kernel_name, &options);
        let teardown = session.terminate();

        match (result, teardown) {
            (Ok(kernel), Ok(())) => Ok(kernel),
            (Ok(kernel), Err(e)) => {
                log::warn!("program for `{}` compiled but teardown failed: {}", kernel_name, e);
                Ok(kernel)
            }
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(teardown)) => {
                log::warn!("teardown after failed compile also failed: {}", teardown);
                Err(e)
            }
        }
    }

    /// Compile, then hand the result to `loader` under `signature`.
    pub fn compile_and_load<L: KernelLoader, S: AsRef<str>>(
        &self,
        loader: &L,
        source: &str,
        kernel_name: &str,
        module_label: &str,
        options: &[S],
        signature: &str,
    ) -> Result<L::Kernel> {
        let kernel = self.compile(source, kernel_name, module_label, options)?;
        loader.load_kernel(KernelBinary::Ptx(&kernel), kernel.lowered_name(), signature)
    }

    fn drive(&self, session: &mut ProgramSession<'_>, kernel_name: &str, options: &[&str]) -> Result<CompiledKernel> {
        session.add_name_expression(kernel_name)?;

        let outcome = session.compile_with(options)?;
        if !outcome.is_success() {
            // The compile outcome wins over a failed log fetch.
            let log = session.fetch_log().unwrap_or_else(|e| {
                log::warn!("program log unavailable: {}", e);
                format!("<program log unavailable: {}>", e)
            });
            log::error!("compile result: {}", outcome);
            log::error!("program log: {}", log);
            return Err(self
                .api
                .translator()
                .raise(outcome.code(), NvrtcFunction::CompileProgram.symbol(), Some(log)));
        }

        let lowered_name = session.lower_name(kernel_name)?;
        let ptx = session.fetch_artifact_text()?;
        log::debug!("compiled `{}` as `{}` ({} bytes of PTX)", kernel_name, lowered_name, ptx.len());
        Ok(CompiledKernel::new(ptx, kernel_name, lowered_name))
    }
}
