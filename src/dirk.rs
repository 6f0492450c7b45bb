//! Diagonally-implicit Runge-Kutta.
//!
//! Jacobian-form DIRK: stage `i` solves
//! `k_i = f(tn + c_i*dt, un + dt*sum_{j<i} a_ij*k_j + dt*a_ii*k_i)` by Newton
//! iteration on `g(k) = k - f(..)` with Jacobian `I - dt*a_ii*df/du`, reusing
//! the [`crate::linalg::LinearAlgebra`] backend for the linear solve at each
//! Newton step. The operator-form variant
//! (implicit-operator problems) is the degenerate case where `df/du` is
//! supplied directly as the time-parameterized operator, so one
//! implementation covers both cases.

use crate::config::NewtonConfig;
use crate::error::PonioError;
use crate::iteration_info::IterationInfo;
use crate::linalg::LinearAlgebra;
use crate::method::{run_static_stage_driver, Method, StageAlgorithm};
use crate::problem::ImplicitRhs;
use crate::scalar::{inner_product, norm, Components, Scalar, State};
use num_traits::ToPrimitive;

pub struct Dirk<T: Scalar, const N: usize, B> {
    table: &'static crate::butcher::ButcherTable<N>,
    backend: B,
    newton: NewtonConfig<T>,
    tol: crate::config::Tolerances<T>,
    info: IterationInfo<T>,
}

impl<T: Scalar, const N: usize, B> Dirk<T, N, B> {
    pub fn new(table: &'static crate::butcher::ButcherTable<N>, backend: B) -> Self {
        let newton = NewtonConfig::default();
        Self {
            table,
            backend,
            tol: crate::config::Tolerances::default(),
            info: IterationInfo::new(newton.tol),
            newton,
        }
    }

    pub fn newton_tol(mut self, eps: T) -> Self {
        self.newton.tol = eps;
        self
    }

    pub fn newton_max_iter(mut self, n: usize) -> Self {
        self.newton.max_iter = n;
        self
    }
}

impl<T, S, P, B, const N: usize> StageAlgorithm<T, S, P> for Dirk<T, N, B>
where
    T: Scalar,
    S: State<T>,
    B: LinearAlgebra<T, S>,
    P: ImplicitRhs<T, S, B::Op>,
{
    const N_STAGES: usize = N;

    fn stage(&mut self, i: usize, pb: &mut P, tn: T, un: &S, k: &[S], dt: T, out: &mut S) {
        if i < N {
            let aii = self.table.a::<T>(i, i);
            let ci = self.table.c::<T>(i);
            let ti = tn + ci * dt;
            let a_row: Vec<T> = (0..i).map(|j| self.table.a::<T>(i, j)).collect();
            let base = inner_product(&a_row, &k[..i], un.clone(), dt);

            let mut ki = base.clone();
            pb.call(ti, &base, &mut ki);
            self.info.number_of_eval += 1;

            let mut converged = false;
            for _ in 0..self.newton.max_iter {
                let trial_u = base.clone() + ki.clone() * (dt * aii);
                let mut f_val = trial_u.clone();
                pb.call(ti, &trial_u, &mut f_val);
                self.info.number_of_eval += 1;

                let g = ki.clone() - f_val;
                let residual = norm(&g);
                if residual <= self.newton.tol {
                    converged = true;
                    break;
                }

                let jac = pb.jacobian(ti, &trial_u);
                let op = self.backend.identity(&trial_u) - jac * (dt * aii);
                let neg_g = g * (-T::one());
                match self.backend.solve(&op, &neg_g) {
                    Ok(delta) => ki = ki + delta,
                    Err(_) => break,
                }
            }

            if !converged {
                tracing::debug!(stage = i, "DIRK Newton iteration failed to converge");
                self.info.success = false;
            }
            *out = ki;
        } else {
            let b: Vec<T> = (0..N).map(|j| self.table.b::<T>(j)).collect();
            *out = inner_product(&b, &k[..N], un.clone(), dt);
        }
    }

    fn order(&self) -> usize {
        self.table.order
    }

    fn is_embedded(&self) -> bool {
        false
    }

    fn tolerances(&self) -> crate::config::Tolerances<T> {
        self.tol
    }

    fn info_mut(&mut self) -> &mut IterationInfo<T> {
        &mut self.info
    }

    fn info(&self) -> &IterationInfo<T> {
        &self.info
    }
}

impl<T, S, P, B, const N: usize> Method<T, S, P> for Dirk<T, N, B>
where
    T: Scalar,
    S: State<T> + Components<T>,
    B: LinearAlgebra<T, S>,
    P: ImplicitRhs<T, S, B::Op>,
{
    fn step(&mut self, pb: &mut P, tn: T, un: &S, dt: T) -> Result<(T, S, T), PonioError> {
        self.info.success = true;
        let result = run_static_stage_driver(self, pb, tn, un, dt)?;
        if !self.info.success {
            return Err(PonioError::Convergence {
                residual: f64::NAN,
                tol: self.newton.tol.to_f64().unwrap_or(f64::NAN),
                max_iter: self.newton.max_iter,
            });
        }
        Ok(result)
    }

    fn info(&self) -> &IterationInfo<T> {
        &self.info
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::butcher::SDIRK2;
    use crate::linalg::ScalarBackend;
    use crate::problem::implicit_problem;

    /// Curtiss-Hirschfelder stiff decay: DIRK at newton_tol=1e-10 tracks
    /// the quasi-steady solution `y ~ cos(t)` once transients die out.
    #[test]
    fn curtiss_hirschfelder_dirk() {
        let k = 50.0_f64;
        let mut alg = Dirk::<f64, 2, _>::new(&SDIRK2, ScalarBackend).newton_tol(1e-10);
        let mut pb = implicit_problem(
            move |t: f64, y: &f64, du: &mut f64| *du = k * (t.cos() - *y),
            move |_t: f64, _y: &f64| -k,
        );
        let mut t = 0.0_f64;
        let mut u = 2.0_f64;
        let dt = 0.01_f64;
        let steps = (2.0 / dt).round() as usize;
        for _ in 0..steps {
            let (tn, un, _) = alg.step(&mut pb, t, &u, dt).unwrap();
            t = tn;
            u = un;
        }
        // y(t) settles toward the quasi-steady solution y ~ cos(t) + O(1/k).
        assert!((u - 2.0_f64.cos()).abs() < 0.05, "u={u}");
    }

    /// A 2x2 linear-algebra backend distinct from [`crate::linalg::DenseBackend`]:
    /// it represents its operator as a plain `[[f64; 2]; 2]` and solves by
    /// Cramer's rule instead of going through `nalgebra`'s LU factorization.
    /// Exists only to give the test below a second, independently-implemented
    /// backend to compare against.
    #[derive(Debug, Default, Clone, Copy)]
    struct Cramer2x2Backend;

    #[derive(Debug, Clone, Copy)]
    struct Mat2([[f64; 2]; 2]);

    impl core::ops::Sub for Mat2 {
        type Output = Mat2;
        fn sub(self, rhs: Mat2) -> Mat2 {
            Mat2([
                [self.0[0][0] - rhs.0[0][0], self.0[0][1] - rhs.0[0][1]],
                [self.0[1][0] - rhs.0[1][0], self.0[1][1] - rhs.0[1][1]],
            ])
        }
    }

    impl core::ops::Mul<f64> for Mat2 {
        type Output = Mat2;
        fn mul(self, rhs: f64) -> Mat2 {
            Mat2([
                [self.0[0][0] * rhs, self.0[0][1] * rhs],
                [self.0[1][0] * rhs, self.0[1][1] * rhs],
            ])
        }
    }

    impl crate::linalg::LinearAlgebra<f64, crate::scalar::VecState<f64>> for Cramer2x2Backend {
        type Op = Mat2;

        fn identity(&self, _u: &crate::scalar::VecState<f64>) -> Mat2 {
            Mat2([[1.0, 0.0], [0.0, 1.0]])
        }

        fn solve(&self, a: &Mat2, b: &crate::scalar::VecState<f64>) -> Result<crate::scalar::VecState<f64>, crate::error::PonioError> {
            let [[a11, a12], [a21, a22]] = a.0;
            let det = a11 * a22 - a12 * a21;
            if det.abs() < 1e-300 {
                return Err(crate::error::PonioError::Linalg("singular 2x2 operator".into()));
            }
            let (b1, b2) = (b[0], b[1]);
            let x0 = (b1 * a22 - a12 * b2) / det;
            let x1 = (a11 * b2 - b1 * a21) / det;
            Ok(crate::scalar::VecState::from_vec(vec![x0, x1]))
        }
    }

    #[test]
    fn brusselator_dirk_matches_custom_backend() {
        use crate::linalg::DenseBackend;
        use crate::scalar::VecState;

        let a = 1.0_f64;
        let b = 3.0_f64;
        let f = move |_t: f64, y: &VecState<f64>, du: &mut VecState<f64>| {
            let y0 = y[0];
            let y1 = y[1];
            du.0[0] = a + y0 * y0 * y1 - (b + 1.0) * y0;
            du.0[1] = b * y0 - y0 * y0 * y1;
        };
        let df_dense = move |_t: f64, y: &VecState<f64>| {
            let y0 = y[0];
            let y1 = y[1];
            nalgebra::DMatrix::from_row_slice(2, 2, &[2.0 * y0 * y1 - (b + 1.0), y0 * y0, b - 2.0 * y0 * y1, -y0 * y0])
        };
        let df_cramer = move |_t: f64, y: &VecState<f64>| {
            let y0 = y[0];
            let y1 = y[1];
            Mat2([
                [2.0 * y0 * y1 - (b + 1.0), y0 * y0],
                [b - 2.0 * y0 * y1, -y0 * y0],
            ])
        };

        let u0 = VecState::from_vec(vec![1.5, 3.0]);

        let mut alg_dense = Dirk::<f64, 2, _>::new(&SDIRK2, DenseBackend).newton_tol(1e-12);
        let mut pb_dense = implicit_problem(f, df_dense);
        let (_, u1_dense, _) = alg_dense.step(&mut pb_dense, 0.0, &u0, 0.01).unwrap();

        let mut alg_cramer = Dirk::<f64, 2, _>::new(&SDIRK2, Cramer2x2Backend).newton_tol(1e-12);
        let mut pb_cramer = implicit_problem(f, df_cramer);
        let (_, u1_cramer, _) = alg_cramer.step(&mut pb_cramer, 0.0, &u0, 0.01).unwrap();

        for i in 0..2 {
            assert!(
                (u1_dense[i] - u1_cramer[i]).abs() < 1e-10,
                "component {i}: dense={} cramer={}",
                u1_dense[i],
                u1_cramer[i]
            );
        }
    }
}
