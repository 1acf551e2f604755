//! nvrtc-jit - compile CUDA kernels to PTX through NVRTC
//!
//! # Usage
//!
//! ```bash
//! # Compile a kernel and print PTX to stdout
//! nvrtc-jit compile saxpy.cu --kernel saxpy --opt --gpu-architecture=compute_80
//!
//! # Write PTX to a file using a config file
//! nvrtc-jit compile saxpy.cu --kernel saxpy --config nvrtc.toml --output saxpy.ptx
//!
//! # Exercise the pipeline without a CUDA toolkit
//! nvrtc-jit compile saxpy.cu --kernel saxpy --stub
//!
//! # List the bound NVRTC symbols and check they resolve
//! nvrtc-jit symbols --check
//! ```

use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};

#[cfg(feature = "stub")]
use nvrtc_jit::runtime::stub::StubResolver;
use nvrtc_jit::runtime::{NativeLibraries, NvrtcApi, NvrtcFunction};
#[cfg(not(feature = "stub"))]
use nvrtc_jit::CompilerError;
use nvrtc_jit::{CompilerConfig, Result, RuntimeCompiler};

#[derive(Parser)]
#[command(name = "nvrtc-jit")]
#[command(version)]
#[command(about = "Just-in-time CUDA kernel compilation through NVRTC", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a CUDA source file to PTX
    Compile {
        /// Path to the CUDA source file
        source: PathBuf,

        /// Kernel entry point to register and lower
        #[arg(short, long)]
        kernel: String,

        /// Program label used in diagnostics (defaults to the file name)
        #[arg(long)]
        label: Option<String>,

        /// Compiler option, repeatable; order is kept
        #[arg(long = "opt", allow_hyphen_values = true)]
        options: Vec<String>,

        /// Write PTX here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Use the in-process NVRTC stand-in
        #[arg(long)]
        stub: bool,
    },

    /// Print the NVRTC symbol table
    Symbols {
        /// Load the library and bind every symbol
        #[arg(long)]
        check: bool,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("error: {}", e);
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Compile {
            source,
            kernel,
            label,
            options,
            output,
            stub,
        } => {
            let text = std::fs::read_to_string(&source)?;
            let label = label.unwrap_or_else(|| {
                source
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "program.cu".to_string())
            });

            let compiler = if stub {
                stub_compiler(config)?
            } else {
                RuntimeCompiler::load(config)?
            };

            let compiled = compiler.compile(&text, &kernel, &label, options.as_slice())?;
            eprintln!("{} -> {}", compiled.requested_name(), compiled.lowered_name());
            match output {
                Some(path) => {
                    std::fs::write(&path, compiled.ptx())?;
                    eprintln!("wrote {} bytes of PTX to {}", compiled.ptx().len(), path.display());
                }
                None => print!("{}", compiled.ptx()),
            }
            Ok(())
        }
        Commands::Symbols { check } => {
            for function in NvrtcFunction::ALL {
                let descriptor = function.descriptor();
                println!("{:<24} {}", descriptor.name, descriptor.abi_signature);
            }
            if check {
                let libraries = NativeLibraries::new();
                libraries.load(&config.library, &config.library_paths)?;
                NvrtcApi::bind(&libraries, &config.library)?;
                println!("all {} symbols bound from `{}`", NvrtcFunction::ALL.len(), config.library);
            }
            Ok(())
        }
    }
}

#[cfg(feature = "stub")]
fn stub_compiler(config: CompilerConfig) -> Result<RuntimeCompiler> {
    let resolver = StubResolver::new(config.library.clone());
    RuntimeCompiler::with_resolver(&resolver, config)
}

#[cfg(not(feature = "stub"))]
fn stub_compiler(_config: CompilerConfig) -> Result<RuntimeCompiler> {
    Err(CompilerError::Config("built without the `stub` feature".into()))
}

fn load_config(path: Option<&Path>) -> Result<CompilerConfig> {
    let config = match path {
        Some(path) => CompilerConfig::load(path)?,
        None => CompilerConfig::default(),
    };
    config.with_env_overrides()
}
