use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ponio_rs::butcher::{DOPRI5, RK4};
use ponio_rs::erk::ExplicitRk;
use ponio_rs::method::Method;
use ponio_rs::problem::simple_problem;

fn rk4_lorenz_step(c: &mut Criterion) {
    let sigma = 10.0_f64;
    let rho = 28.0_f64;
    let beta = 8.0 / 3.0;

    c.bench_function("rk4_step_lorenz_scalar_x", |b| {
        b.iter(|| {
            let mut alg = ExplicitRk::<f64, 4>::new(&RK4);
            let mut pb = simple_problem(move |_t: f64, u: &f64, du: &mut f64| {
                *du = sigma * (rho - beta) * *u;
            });
            let (_, u1, _) = alg.step(&mut pb, 0.0, black_box(&1.0), black_box(0.01)).unwrap();
            black_box(u1);
        });
    });
}

fn dopri5_embedded_step(c: &mut Criterion) {
    c.bench_function("dopri5_embedded_step_scalar_decay", |b| {
        b.iter(|| {
            let mut alg = ExplicitRk::<f64, 7>::new(&DOPRI5).abs_tol(1e-8).rel_tol(1e-8);
            let mut pb = simple_problem(|_t: f64, u: &f64, du: &mut f64| *du = -*u);
            let (_, u1, _) = alg.step(&mut pb, black_box(0.0), black_box(&1.0), black_box(0.05)).unwrap();
            black_box(u1);
        });
    });
}

criterion_group!(benches, rk4_lorenz_step, dopri5_embedded_step);
criterion_main!(benches);
