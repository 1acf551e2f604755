use std::path::Path;
use std::sync::Arc;
use std::thread;

use nvrtc_jit::buffer::outstanding_allocations;
use nvrtc_jit::runtime::stub::{self, StubBehavior, StubResolver};
use nvrtc_jit::runtime::NvrtcFunction;
use nvrtc_jit::{
    CompiledKernel, CompilerConfig, CompilerError, KernelBinary, KernelLoader, NvrtcResult, Result,
    RuntimeCompiler,
};

const SOURCE: &str = "extern \"C\" __global__ void inc(int*p){*p+=1;}";
const PTX: &str = ".version 7.0\n.target sm_70\n.address_size 64\n.visible .entry _Z3incPi(.param .u64 p) { ret; }\n";

fn stub_compiler(config: CompilerConfig) -> RuntimeCompiler {
    RuntimeCompiler::new(stub::api(), config)
}

#[test]
fn test_inc_kernel_end_to_end() {
    stub::install(StubBehavior::default().lower("inc", "_Z3incPi").with_ptx(PTX));
    let compiler = stub_compiler(CompilerConfig::default());
    let baseline = outstanding_allocations();

    let kernel = compiler.compile(SOURCE, "inc", "inc.cu", &[] as &[&str]).unwrap();

    assert_eq!(kernel.requested_name(), "inc");
    assert_eq!(kernel.lowered_name(), "_Z3incPi");
    assert_eq!(kernel.ptx(), PTX);

    let journal = stub::journal();
    assert_eq!(journal.count(NvrtcFunction::CreateProgram), 1);
    assert_eq!(journal.count(NvrtcFunction::DestroyProgram), 1);
    assert_eq!(journal.created[0].source, SOURCE);
    assert_eq!(journal.created[0].label, "inc.cu");
    assert_eq!(journal.name_expressions, vec!["inc"]);
    assert_eq!(stub::live_programs(), 0);
    assert_eq!(outstanding_allocations(), baseline);
}

#[test]
fn test_call_order_on_success() {
    stub::install(StubBehavior::default());
    let compiler = stub_compiler(CompilerConfig::default());

    compiler.compile(SOURCE, "inc", "inc.cu", &["-lineinfo"]).unwrap();

    let calls = stub::journal().calls;
    assert_eq!(
        calls,
        vec![
            NvrtcFunction::CreateProgram,
            NvrtcFunction::AddNameExpression,
            NvrtcFunction::CompileProgram,
            NvrtcFunction::GetLoweredName,
            NvrtcFunction::GetPtxSize,
            NvrtcFunction::GetPtx,
            NvrtcFunction::DestroyProgram,
        ]
    );
}

#[test]
fn test_compile_failure_carries_log_and_destroys_once() {
    let log = "inc.cu(1): error: identifier \"q\" is undefined\n1 error detected in the compilation of \"inc.cu\".";
    stub::install(
        StubBehavior::default()
            .fail(NvrtcFunction::CompileProgram, 6)
            .with_log(log),
    );
    let compiler = stub_compiler(CompilerConfig::default());
    let baseline = outstanding_allocations();

    let err = compiler.compile(SOURCE, "inc", "inc.cu", &[] as &[&str]).unwrap_err();
    match err {
        CompilerError::CompilationFailed { operation, outcome, log: text } => {
            assert_eq!(operation, "nvrtcCompileProgram");
            assert_eq!(outcome, NvrtcResult::CompilationFailure);
            assert_eq!(text, log);
        }
        other => panic!("unexpected error: {}", other),
    }

    let journal = stub::journal();
    assert_eq!(journal.count(NvrtcFunction::GetProgramLog), 1);
    assert_eq!(journal.count(NvrtcFunction::GetLoweredName), 0);
    assert_eq!(journal.count(NvrtcFunction::GetPtx), 0);
    assert_eq!(journal.count(NvrtcFunction::DestroyProgram), 1);
    assert_eq!(journal.destroyed, 1);
    assert_eq!(outstanding_allocations(), baseline);
}

#[test]
fn test_unknown_code_surfaces_as_unknown() {
    stub::install(StubBehavior::default().fail(NvrtcFunction::AddNameExpression, 42));
    let compiler = stub_compiler(CompilerConfig::default());

    let err = compiler.compile(SOURCE, "inc", "inc.cu", &[] as &[&str]).unwrap_err();
    assert_eq!(err.outcome(), Some(NvrtcResult::Unknown(42)));
    assert!(err.to_string().contains("NVRTC_UNKNOWN_CODE(42)"));

    let journal = stub::journal();
    assert_eq!(journal.count(NvrtcFunction::CompileProgram), 0);
    assert_eq!(journal.destroyed, 1);
}

#[test]
fn test_create_failure_skips_destroy() {
    stub::install(StubBehavior::default().fail(NvrtcFunction::CreateProgram, 5));
    let compiler = stub_compiler(CompilerConfig::default());
    let baseline = outstanding_allocations();

    let err = compiler.compile(SOURCE, "inc", "inc.cu", &[] as &[&str]).unwrap_err();
    assert_eq!(err.outcome(), Some(NvrtcResult::InvalidOption));
    assert_eq!(stub::journal().count(NvrtcFunction::DestroyProgram), 0);
    assert_eq!(outstanding_allocations(), baseline);
}

#[test]
fn test_oversized_ptx_still_destroys_program() {
    stub::install(StubBehavior::default().report_ptx_size(2_000_000));
    let compiler = stub_compiler(CompilerConfig::default());

    let err = compiler.compile(SOURCE, "inc", "inc.cu", &[] as &[&str]).unwrap_err();
    assert!(matches!(err, CompilerError::InvalidAllocationSize { size: 2_000_000, .. }));
    assert_eq!(stub::journal().count(NvrtcFunction::GetPtx), 0);
    assert_eq!(stub::journal().destroyed, 1);
}

#[test]
fn test_teardown_failure_after_success_keeps_kernel() {
    stub::install(
        StubBehavior::default()
            .lower("inc", "_Z3incPi")
            .fail(NvrtcFunction::DestroyProgram, 11),
    );
    let compiler = stub_compiler(CompilerConfig::default());

    let kernel = compiler.compile(SOURCE, "inc", "inc.cu", &[] as &[&str]).unwrap();
    assert_eq!(kernel.lowered_name(), "_Z3incPi");
    assert_eq!(stub::live_programs(), 0);
}

#[test]
fn test_default_options_come_first() {
    stub::install(StubBehavior::default());
    let config = CompilerConfig {
        default_options: vec!["--gpu-architecture=compute_80".into(), "-std=c++17".into()],
        ..CompilerConfig::default()
    };
    let compiler = stub_compiler(config);

    compiler.compile(SOURCE, "inc", "inc.cu", &["-lineinfo", "-DBLOCK=256"]).unwrap();

    assert_eq!(
        stub::journal().compiles[0].options,
        vec!["--gpu-architecture=compute_80", "-std=c++17", "-lineinfo", "-DBLOCK=256"]
    );
}

#[test]
fn test_resolver_backed_compiler() {
    stub::install(StubBehavior::default().lower("inc", "_Z3incPi"));
    let config = CompilerConfig {
        serialize_compilations: true,
        ..CompilerConfig::default()
    };
    let compiler = RuntimeCompiler::with_resolver(&StubResolver::new("nvrtc"), config).unwrap();

    let kernel = compiler.compile(SOURCE, "inc", "inc.cu", &[] as &[&str]).unwrap();
    assert_eq!(kernel.lowered_name(), "_Z3incPi");
    assert!(compiler.config().serialize_compilations);
}

#[test]
fn test_compiler_is_shared_across_threads() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<RuntimeCompiler>();

    let compiler = Arc::new(stub_compiler(CompilerConfig::default()));
    let handles: Vec<_> = (0..4)
        .map(|i| {
            let compiler = Arc::clone(&compiler);
            thread::spawn(move || {
                let name = format!("k{}", i);
                stub::install(StubBehavior::default().lower(name.clone(), format!("_Z2{}Pi", name)));
                let kernel = compiler.compile(SOURCE, &name, "k.cu", &[] as &[&str]).unwrap();
                let journal = stub::journal();
                (kernel.lowered_name().to_string(), journal.created.len(), journal.destroyed)
            })
        })
        .collect();

    for (i, handle) in handles.into_iter().enumerate() {
        let (lowered, created, destroyed) = handle.join().unwrap();
        assert_eq!(lowered, format!("_Z2k{}Pi", i));
        assert_eq!((created, destroyed), (1, 1));
    }
}

struct RecordingLoader;

#[derive(Debug, PartialEq)]
struct LoadedKernel {
    image: String,
    name: String,
    signature: String,
}

impl KernelLoader for RecordingLoader {
    type Kernel = LoadedKernel;

    fn load_kernel(&self, binary: KernelBinary<'_>, kernel_name: &str, signature: &str) -> Result<LoadedKernel> {
        let image = match binary {
            KernelBinary::Ptx(kernel) => kernel.ptx().to_string(),
            KernelBinary::CubinFile(path) => path.display().to_string(),
        };
        Ok(LoadedKernel {
            image,
            name: kernel_name.to_string(),
            signature: signature.to_string(),
        })
    }
}

#[test]
fn test_compile_and_load_hands_over_lowered_name() {
    stub::install(StubBehavior::default().lower("inc", "_Z3incPi").with_ptx(PTX));
    let compiler = stub_compiler(CompilerConfig::default());

    let loaded = compiler
        .compile_and_load(&RecordingLoader, SOURCE, "inc", "inc.cu", &[] as &[&str], "(CuPtr{Cint},)")
        .unwrap();
    assert_eq!(
        loaded,
        LoadedKernel {
            image: PTX.to_string(),
            name: "_Z3incPi".to_string(),
            signature: "(CuPtr{Cint},)".to_string(),
        }
    );
}

#[test]
fn test_loader_accepts_cubin_path() {
    let loaded = RecordingLoader
        .load_kernel(KernelBinary::CubinFile(Path::new("kernels/inc.cubin")), "inc", "(Ptr,)")
        .unwrap();
    assert_eq!(loaded.image, "kernels/inc.cubin");

    let kernel = CompiledKernel::new(PTX.to_string(), "inc", "_Z3incPi".to_string());
    let loaded = RecordingLoader
        .load_kernel(KernelBinary::Ptx(&kernel), kernel.lowered_name(), "(Ptr,)")
        .unwrap();
    assert_eq!(loaded.image, PTX);
}

#[test]
fn test_failed_compile_keeps_outcome_when_log_is_unreadable() {
    stub::install(
        StubBehavior::default()
            .fail(NvrtcFunction::CompileProgram, 5)
            .report_log_size(2_000_000),
    );
    let compiler = stub_compiler(CompilerConfig::default());
    let baseline = outstanding_allocations();

    let err = compiler.compile(SOURCE, "inc", "inc.cu", &["--bogus-flag"]).unwrap_err();
    assert_eq!(err.outcome(), Some(NvrtcResult::InvalidOption));
    match err {
        CompilerError::CompilationFailed { operation, log, .. } => {
            assert_eq!(operation, "nvrtcCompileProgram");
            assert!(log.contains("program log unavailable"), "log was: {}", log);
            assert!(log.contains("2000000"), "log was: {}", log);
        }
        other => panic!("unexpected error: {}", other),
    }

    let journal = stub::journal();
    assert_eq!(journal.count(NvrtcFunction::GetProgramLog), 0);
    assert_eq!(journal.destroyed, 1);
    assert_eq!(outstanding_allocations(), baseline);
}
