use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use nvrtc_jit::buffer::{NativeString, NativeText, ResourceScope, MAX_NATIVE_TEXT};

fn benchmark_option_arrays(c: &mut Criterion) {
    let mut group = c.benchmark_group("option_array");

    for count in [0usize, 4, 16, 64] {
        let options: Vec<String> = (0..count).map(|i| format!("-DPARAM_{}={}", i, i * 7)).collect();
        group.bench_with_input(BenchmarkId::from_parameter(count), &options, |b, options| {
            b.iter(|| {
                let mut scope = ResourceScope::new();
                let array = scope.encode_array(options.as_slice()).unwrap();
                black_box(array);
                scope.release_all();
            });
        });
    }

    group.finish();
}

fn benchmark_strings(c: &mut Criterion) {
    let mut group = c.benchmark_group("native_string");
    let source = "extern \"C\" __global__ void inc(int *p) { *p += 1; }\n".repeat(64);

    group.bench_function("encode_source", |b| {
        b.iter(|| {
            let encoded = NativeString::from_text(black_box(&source)).unwrap();
            black_box(encoded.as_ptr());
        });
    });

    group.bench_function("decode_filled_buffer", |b| {
        let len = source.len() as i64 + 1;
        b.iter(|| {
            let mut buffer = NativeString::with_length(len, MAX_NATIVE_TEXT).unwrap();
            unsafe {
                std::ptr::copy_nonoverlapping(source.as_ptr(), buffer.as_mut_ptr() as *mut u8, source.len());
            }
            black_box(NativeText::Owned(buffer).into_string(MAX_NATIVE_TEXT).unwrap());
        });
    });

    group.finish();
}

criterion_group!(benches, benchmark_option_arrays, benchmark_strings);
criterion_main!(benches);
