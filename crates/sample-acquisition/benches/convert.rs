use criterion::{black_box, criterion_group, criterion_main, Criterion};
use sample_acquisition::{convert_sc16, Complex32};

fn benchmark(c: &mut Criterion) {
    let raw: Vec<i16> = (0..2 * 363).map(|i| (i * 37 % 4096) as i16 - 2048).collect();
    let mut out = vec![Complex32::default(); 363];

    c.bench_function("sc16 packet to complex float", |b| {
        b.iter(|| convert_sc16(black_box(&raw), black_box(&mut out)))
    });
}

criterion_group!(benches, benchmark);
criterion_main!(benches);
