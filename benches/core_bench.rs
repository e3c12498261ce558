use criterion::{black_box, criterion_group, criterion_main, Criterion};
use mersenne_hunter::mersenne;
use mersenne_hunter::PrimeSource;

fn bench_mod_pow2(c: &mut Criterion) {
    // Largest 64-bit prime, so every squaring needs the u128 path
    let modulus = 18_446_744_073_709_551_557u64;
    c.bench_function("mod_pow2(999983, 2^64-59)", |b| {
        b.iter(|| mersenne::mod_pow2(black_box(999_983), black_box(modulus)));
    });
}

fn bench_find_factor_exhaustive(c: &mut Criterion) {
    // M31 is prime: the whole range up to 2^16 is scanned
    let small = PrimeSource::build(100);
    c.bench_function("find_factor(31, 2^16)", |b| {
        b.iter(|| mersenne::find_factor(black_box(31), black_box(1 << 16), small.primes()));
    });
}

fn bench_find_factor_clamped(c: &mut Criterion) {
    // M4423 is prime: a scan up to 2^24 finds nothing
    let small = PrimeSource::build(100);
    c.bench_function("find_factor(4423, 2^24)", |b| {
        b.iter(|| mersenne::find_factor(black_box(4423), black_box(1 << 24), small.primes()));
    });
}

fn bench_lucas_lehmer_1279(c: &mut Criterion) {
    c.bench_function("lucas_lehmer(1279)", |b| {
        b.iter(|| mersenne::lucas_lehmer(black_box(1279)));
    });
}

fn bench_lucas_lehmer_4423(c: &mut Criterion) {
    let mut group = c.benchmark_group("lucas_lehmer_large");
    group.sample_size(10);
    group.bench_function("lucas_lehmer(4423)", |b| {
        b.iter(|| mersenne::lucas_lehmer(black_box(4423)));
    });
    group.finish();
}

fn bench_prime_source_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("prime_source");
    group.sample_size(10);
    group.bench_function("build(1_000_000)", |b| {
        b.iter(|| PrimeSource::build(black_box(1_000_000)));
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_mod_pow2,
    bench_find_factor_exhaustive,
    bench_find_factor_clamped,
    bench_lucas_lehmer_1279,
    bench_lucas_lehmer_4423,
    bench_prime_source_build,
);
criterion_main!(benches);
