use chain_core::codec::{to_engine, to_host};
use criterion::{criterion_group, criterion_main, Criterion};
use ndarray::{ArrayD, IxDyn};

fn sample_array() -> ArrayD<f64> {
    let shape = [16, 32, 8];
    let len = shape.iter().product::<usize>();
    ArrayD::from_shape_vec(IxDyn(&shape), (0..len).map(|idx| idx as f64).collect()).unwrap()
}

fn bench_codec(c: &mut Criterion) {
    let host = sample_array();
    let engine = to_engine(&host.view()).unwrap();

    c.bench_function("codec_to_engine", |b| {
        b.iter(|| {
            let _ = to_engine(&host.view()).unwrap();
        })
    });
    c.bench_function("codec_to_host", |b| {
        b.iter(|| {
            let _ = to_host(&engine).unwrap();
        })
    });
}

criterion_group!(benches, bench_codec);
criterion_main!(benches);
