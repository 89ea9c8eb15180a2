use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use phylo_ctmc::{
    eigen::{ComplexEigenSystem, EigenSystem},
    equilibrium::EquilibriumSolver,
    rate_layout::RateLayout,
    substitution_models::{unnormalised_q, SubstMatrix},
};

fn nonreversible_q(n: usize) -> SubstMatrix {
    let count = RateLayout::Asymmetric.rate_count(n);
    let rates: Vec<f64> = (0..count).map(|i| ((i * 7) % 13 + 1) as f64).collect();
    let total: f64 = rates.iter().sum();
    let rates: Vec<f64> = rates.iter().map(|r| r / total).collect();
    unnormalised_q(&rates, None, None, RateLayout::Asymmetric).unwrap()
}

fn run_for_sizes(group_name: &'static str, criterion: &mut Criterion) {
    let solver = EquilibriumSolver::default();
    let eigen_system = ComplexEigenSystem::default();
    let mut bench_group = criterion.benchmark_group(group_name);
    for n in [4, 20] {
        let q = nonreversible_q(n);
        bench_group.bench_function(format!("decompose_{n}"), |bench| {
            bench.iter(|| black_box(eigen_system.decompose(black_box(&q))))
        });
        bench_group.bench_function(format!("equilibrium_{n}"), |bench| {
            bench.iter(|| black_box(solver.equilibrium(black_box(&q))))
        });
    }
    bench_group.finish();
}

fn equilibrium(criterion: &mut Criterion) {
    run_for_sizes("nonreversible", criterion);
}

criterion_group!(benches, equilibrium);
criterion_main!(benches);
