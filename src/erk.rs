//! Explicit and embedded Runge-Kutta.
//!
//! `ExplicitRk<S>` wraps any [`ButcherTable<S>`] — embedded or not — and
//! implements [`StageAlgorithm`] by dispatching through
//! [`crate::method::run_static_stage_driver`]. Stage `i < S` computes
//! `k_i = f(tn + c_i*dt, un + dt*sum_{j<i} a_ij*k_j)`; stage `S` combines
//! with `b`; stage `S+1` (embedded only) combines with `b2`.

use crate::butcher::ButcherTable;
use crate::config::Tolerances;
use crate::iteration_info::IterationInfo;
use crate::method::{run_static_stage_driver, Method, StageAlgorithm};
use crate::problem::Rhs;
use crate::scalar::{inner_product, Components, Scalar, State};

pub struct ExplicitRk<T: Scalar, const S: usize> {
    table: &'static ButcherTable<S>,
    tol: Tolerances<T>,
    info: IterationInfo<T>,
}

impl<T: Scalar, const S: usize> ExplicitRk<T, S> {
    pub fn new(table: &'static ButcherTable<S>) -> Self {
        let tol = Tolerances::default();
        Self {
            table,
            info: IterationInfo::new(tol.abs_tol),
            tol,
        }
    }

    pub fn abs_tol(mut self, eps: T) -> Self {
        self.tol.abs_tol = eps;
        self
    }

    pub fn rel_tol(mut self, eps: T) -> Self {
        self.tol.rel_tol = eps;
        self
    }
}

impl<T, S, P, const N: usize> StageAlgorithm<T, S, P> for ExplicitRk<T, N>
where
    T: Scalar,
    S: State<T>,
    P: Rhs<T, S>,
{
    const N_STAGES: usize = N;

    fn stage(&mut self, i: usize, pb: &mut P, tn: T, un: &S, k: &[S], dt: T, out: &mut S) {
        if i < N {
            let a_row: Vec<T> = (0..i).map(|j| self.table.a::<T>(i, j)).collect();
            let stage_u = inner_product(&a_row, &k[..i], un.clone(), dt);
            let ci = self.table.c::<T>(i);
            pb.call(tn + ci * dt, &stage_u, out);
        } else if i == N {
            let b: Vec<T> = (0..N).map(|j| self.table.b::<T>(j)).collect();
            *out = inner_product(&b, &k[..N], un.clone(), dt);
        } else {
            let b2: Vec<T> = (0..N).map(|j| self.table.b2::<T>(j)).collect();
            *out = inner_product(&b2, &k[..N], un.clone(), dt);
        }
    }

    fn order(&self) -> usize {
        self.table.order
    }

    fn is_embedded(&self) -> bool {
        self.table.is_embedded()
    }

    fn tolerances(&self) -> Tolerances<T> {
        self.tol
    }

    fn info_mut(&mut self) -> &mut IterationInfo<T> {
        &mut self.info
    }

    fn info(&self) -> &IterationInfo<T> {
        &self.info
    }
}

impl<T, S, P, const N: usize> Method<T, S, P> for ExplicitRk<T, N>
where
    T: Scalar,
    S: State<T> + Components<T>,
    P: Rhs<T, S>,
{
    fn step(&mut self, pb: &mut P, tn: T, un: &S, dt: T) -> Result<(T, S, T), crate::error::PonioError> {
        run_static_stage_driver(self, pb, tn, un, dt)
    }

    fn info(&self) -> &IterationInfo<T> {
        &self.info
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::butcher::{DOPRI5, RK3_HEUN, RK4};
    use crate::problem::simple_problem;

    /// Exponential growth `u' = u`, RK4 with dt=0.02, reproduces `e`
    /// to 1e-6.
    #[test]
    fn rk4_exponential_growth() {
        let mut alg = ExplicitRk::<f64, 4>::new(&RK4);
        let mut pb = simple_problem(|_t: f64, u: &f64, du: &mut f64| *du = *u);
        let mut t = 0.0_f64;
        let mut u = 1.0_f64;
        let dt = 0.02_f64;
        while t < 1.0 - 1e-9 {
            let (tn, un, _) = alg.step(&mut pb, t, &u, dt).unwrap();
            t = tn;
            u = un;
        }
        assert!((u - std::f64::consts::E).abs() < 1e-6, "u={u}");
    }

    #[test]
    fn rk3_heun_order_three_convergence() {
        let exact = |t: f64| (-t).exp();
        let mut errors = Vec::new();
        for &dt in &[0.02, 0.01, 0.005] {
            let mut alg = ExplicitRk::<f64, 3>::new(&RK3_HEUN);
            let mut pb = simple_problem(|_t: f64, u: &f64, du: &mut f64| *du = -*u);
            let mut t = 0.0_f64;
            let mut u = 1.0_f64;
            let mut n = 0;
            let steps = (1.0 / dt).round() as usize;
            while n < steps {
                let (tn, un, _) = alg.step(&mut pb, t, &u, dt).unwrap();
                t = tn;
                u = un;
                n += 1;
            }
            errors.push((u - exact(1.0)).abs());
        }
        let slope = (errors[0] / errors[1]).ln() / 2.0_f64.ln();
        assert!(slope >= 3.0 - 0.1, "empirical order {slope}");
    }

    #[test]
    fn dopri5_embedded_accepts_smooth_problem() {
        let mut alg = ExplicitRk::<f64, 7>::new(&DOPRI5).abs_tol(1e-8).rel_tol(1e-8);
        let mut pb = simple_problem(|_t: f64, u: &f64, du: &mut f64| *du = -*u);
        let (_, u1, _) = alg.step(&mut pb, 0.0, &1.0, 0.05).unwrap();
        assert!(alg.info().success);
        assert!((u1 - (-0.05_f64).exp()).abs() < 1e-6);
    }

    /// Arenstorf orbit: the embedded 5(4) pair at abs_tol=rel_tol=1e-5,
    /// integrated over one full period, returns within 1e-3 of u0.
    #[test]
    fn arenstorf_orbit_returns_near_start_after_one_period() {
        use crate::observer::NullObserver;
        use crate::scalar::VecState;
        use crate::solver_range::{make_solver_range, solve};

        let mu = 0.012277471_f64;
        let mu2 = 1.0 - mu;
        let rhs = move |_t: f64, u: &VecState<f64>, du: &mut VecState<f64>| {
            let y1 = u[0];
            let y2 = u[1];
            let dy1 = u[2];
            let dy2 = u[3];
            let d1 = ((y1 + mu) * (y1 + mu) + y2 * y2).powf(1.5);
            let d2 = ((y1 - mu2) * (y1 - mu2) + y2 * y2).powf(1.5);
            du.0[0] = dy1;
            du.0[1] = dy2;
            du.0[2] = y1 + 2.0 * dy2 - mu2 * (y1 + mu) / d1 - mu * (y1 - mu2) / d2;
            du.0[3] = y2 - 2.0 * dy1 - mu2 * y2 / d1 - mu * y2 / d2;
        };

        let u0 = VecState::from_vec(vec![0.994, 0.0, 0.0, -2.00158510637908]);
        let t_period = 17.0652165601579625_f64;

        let alg = ExplicitRk::<f64, 7>::new(&DOPRI5).abs_tol(1e-5).rel_tol(1e-5);
        let pb = simple_problem(rhs);
        let range = make_solver_range(alg, pb, 0.0, u0.clone(), 1e-3, t_period, NullObserver);
        let final_point = solve(range).unwrap();

        for i in 0..4 {
            assert!(
                (final_point.u[i] - u0[i]).abs() < 1e-3,
                "component {i}: got {} expected {}",
                final_point.u[i],
                u0[i]
            );
        }
    }
}
