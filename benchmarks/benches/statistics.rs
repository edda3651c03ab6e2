use criterion::{criterion_group, criterion_main, Criterion};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tsadbench_benchmarks::comparison::Comparison;
use tsadbench_benchmarks::datasets::Table;
use tsadbench_benchmarks::metrics::wilcoxon_signed_rank;

const DATASETS: usize = 350;
const METHODS: usize = 40;

/// Synthetic results and benchmark tables shaped like the univariate suite.
fn synthetic_tables(seed: u64) -> (Table, Table) {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let files: Vec<String> = (0..DATASETS).map(|i| format!("{i:03}_synthetic.csv")).collect();

    let results = Table::new(
        vec!["file".to_string(), "VUS-PR".to_string()],
        files
            .iter()
            .map(|f| vec![f.clone(), rng.gen_range(0.0..1.0f64).to_string()])
            .collect(),
    );

    let headers = std::iter::once("file".to_string())
        .chain((0..METHODS).map(|m| format!("Method{m}")))
        .collect();
    let rows = files
        .iter()
        .map(|f| {
            std::iter::once(f.clone())
                .chain((0..METHODS).map(|_| rng.gen_range(0.0..1.0f64).to_string()))
                .collect()
        })
        .collect();
    (results, Table::new(headers, rows))
}

/// Benchmark join + ranking + significance over a full-size benchmark table.
fn bench_comparison(c: &mut Criterion) {
    let (results, benchmark) = synthetic_tables(2024);

    c.bench_function("comparison_build_rank_significance", |b| {
        b.iter(|| {
            let comparison = Comparison::build(&results, &benchmark, "PCA", "VUS-PR")
                .expect("synthetic tables share every file");
            let ranking = comparison.ranking();
            comparison.significance(&ranking)
        })
    });
}

/// Benchmark the signed-rank test alone, exact and approximate paths.
fn bench_wilcoxon(c: &mut Criterion) {
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    let small_x: Vec<f64> = (0..40).map(|_| rng.gen_range(0.0..1.0)).collect();
    let small_y: Vec<f64> = (0..40).map(|_| rng.gen_range(0.0..1.0)).collect();
    let large_x: Vec<f64> = (0..DATASETS).map(|_| rng.gen_range(0.0..1.0)).collect();
    let large_y: Vec<f64> = (0..DATASETS).map(|_| rng.gen_range(0.0..1.0)).collect();

    c.bench_function("wilcoxon_exact_n40", |b| {
        b.iter(|| wilcoxon_signed_rank(&small_x, &small_y))
    });
    c.bench_function("wilcoxon_normal_n350", |b| {
        b.iter(|| wilcoxon_signed_rank(&large_x, &large_y))
    });
}

criterion_group!(benches, bench_comparison, bench_wilcoxon);
criterion_main!(benches);
