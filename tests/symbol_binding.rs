use nvrtc_jit::runtime::stub::{self, StubBehavior, StubResolver};
use nvrtc_jit::runtime::{ErrorTranslator, NvrtcApi, NvrtcFunction, SymbolResolver};
use nvrtc_jit::{CompilerConfig, CompilerError, NvrtcResult, RuntimeCompiler};

#[test]
fn test_bind_resolves_every_symbol() {
    let resolver = StubResolver::new("nvrtc");
    for function in NvrtcFunction::ALL {
        let descriptor = function.descriptor();
        let handle = resolver.resolve("nvrtc", &descriptor).unwrap();
        assert_eq!(handle.symbol, descriptor.name);
        assert_eq!(handle.signature.to_string(), descriptor.abi_signature);
        assert!(!handle.address().is_null());
        assert!(handle.keepalive().is_none());
    }

    let api = NvrtcApi::bind(&resolver, "nvrtc").unwrap();
    assert_eq!(api.error_string(6), "NVRTC_ERROR_COMPILATION");
}

#[test]
fn test_bound_api_drives_stub() {
    stub::install(StubBehavior::default().lower("inc", "_Z3incPi"));
    let api = NvrtcApi::bind(&StubResolver::new("nvrtc"), "nvrtc").unwrap();
    let compiler = RuntimeCompiler::new(api, CompilerConfig::default());

    let kernel = compiler
        .compile("__global__ void inc(int *p) { *p += 1; }", "inc", "inc.cu", &[] as &[&str])
        .unwrap();
    assert_eq!(kernel.lowered_name(), "_Z3incPi");
    assert_eq!(kernel.ptx(), stub::CANNED_PTX);
}

#[test]
fn test_missing_symbol_fails_binding() {
    let resolver = StubResolver::new("nvrtc").without("nvrtcGetPTX");
    let err = NvrtcApi::bind(&resolver, "nvrtc").err().unwrap();
    match err {
        CompilerError::SymbolNotFound { library, symbol, signature, .. } => {
            assert_eq!(library, "nvrtc");
            assert_eq!(symbol, "nvrtcGetPTX");
            assert_eq!(signature, "(pointer, pointer): sint32");
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_unloaded_library_fails_binding() {
    let err = NvrtcApi::bind(&StubResolver::new("nvrtc"), "nvrtc-11.2").err().unwrap();
    assert!(matches!(err, CompilerError::SymbolNotFound { .. }));
}

#[test]
fn test_signature_mismatch_is_rejected() {
    let resolver = StubResolver::new("nvrtc")
        .with_signature("nvrtcCompileProgram", "(pointer, sint64, pointer): sint32");
    let err = NvrtcApi::bind(&resolver, "nvrtc").err().unwrap();
    match err {
        CompilerError::SignatureMismatch { symbol, expected, found } => {
            assert_eq!(symbol, "nvrtcCompileProgram");
            assert_eq!(expected, "(pointer, sint32, pointer): sint32");
            assert_eq!(found, "(pointer, sint64, pointer): sint32");
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_malformed_resolved_signature_is_rejected() {
    let resolver = StubResolver::new("nvrtc").with_signature("nvrtcDestroyProgram", "(pointer");
    let err = NvrtcApi::bind(&resolver, "nvrtc").err().unwrap();
    assert!(matches!(err, CompilerError::InvalidSignature { .. }));
}

#[test]
fn test_missing_library_fails_load() {
    let config = CompilerConfig {
        library_paths: vec!["/nonexistent/cuda/lib64/libnvrtc.so".into()],
        ..CompilerConfig::default()
    };
    let err = RuntimeCompiler::load(config).err().unwrap();
    match err {
        CompilerError::LibraryLoad { library, reason } => {
            assert_eq!(library, "nvrtc");
            assert!(reason.contains("/nonexistent/cuda/lib64/libnvrtc.so"));
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_translator_without_native_strings() {
    let translator = ErrorTranslator::new(None);
    assert_eq!(translator.translate(0), NvrtcResult::Success);
    assert_eq!(translator.translate(42), NvrtcResult::Unknown(42));
    assert_eq!(translator.describe(6), "compilation error");
    assert_eq!(translator.describe(42), "unrecognized result code");
    assert!(translator.check(0, NvrtcFunction::CompileProgram).is_ok());

    let err = translator.raise(42, "nvrtcCompileProgram", None);
    match err {
        CompilerError::SessionError { operation, outcome, message } => {
            assert_eq!(operation, "nvrtcCompileProgram");
            assert_eq!(outcome, NvrtcResult::Unknown(42));
            assert_eq!(message, "unrecognized result code");
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_translator_prefers_native_strings() {
    let api = stub::api();
    assert_eq!(api.error_string(9), "NVRTC_ERROR_NO_LOWERED_NAMES_BEFORE_COMPILATION");
    assert_eq!(api.error_string(42), "NVRTC_ERROR unknown");

    let err = api.translator().check(3, NvrtcFunction::AddNameExpression).unwrap_err();
    assert_eq!(
        err.to_string(),
        "nvrtcAddNameExpression failed with NVRTC_ERROR_INVALID_INPUT(3): NVRTC_ERROR_INVALID_INPUT"
    );

    let err = api
        .translator()
        .raise(6, "nvrtcCompileProgram", Some("1 error detected".into()));
    assert!(matches!(
        err,
        CompilerError::CompilationFailed { outcome: NvrtcResult::CompilationFailure, .. }
    ));
}

#[test]
fn test_null_native_string_falls_back_to_description() {
    stub::install(StubBehavior::default().without_error_strings());
    let api = stub::api();

    assert_eq!(api.error_string(6), "compilation error");
    assert_eq!(api.error_string(42), "unrecognized result code");

    let err = api.translator().check(6, NvrtcFunction::CompileProgram).unwrap_err();
    match err {
        CompilerError::SessionError { operation, outcome, message } => {
            assert_eq!(operation, "nvrtcCompileProgram");
            assert_eq!(outcome, NvrtcResult::CompilationFailure);
            assert_eq!(message, "compilation error");
        }
        other => panic!("unexpected error: {}", other),
    }
    assert!(stub::journal().count(NvrtcFunction::GetErrorString) >= 1);
}

#[test]
fn test_null_native_string_reaches_session_errors() {
    stub::install(
        StubBehavior::default()
            .without_error_strings()
            .fail(NvrtcFunction::CreateProgram, 2),
    );
    let compiler = RuntimeCompiler::new(stub::api(), CompilerConfig::default());

    let err = compiler.compile("__global__ void k() {}", "k", "k.cu", &[] as &[&str]).unwrap_err();
    assert_eq!(
        err.to_string(),
        "nvrtcCreateProgram failed with NVRTC_ERROR_PROGRAM_CREATION_FAILURE(2): program creation failure"
    );
}
