//! Lawson and exponential (ETD) Runge-Kutta.
//!
//! Both integrate `u' = L*u + N(t, u)` through a caller-supplied action of
//! `exp(coeff*L)` (resp. `phi_j(coeff*L)`) on a state — the core
//! must never embed a matrix-exponential implementation itself.

use crate::butcher::ButcherTable;
use crate::config::Tolerances;
use crate::iteration_info::IterationInfo;
use crate::method::{run_static_stage_driver, Method, StageAlgorithm};
use crate::problem::{ExpAction, LawsonProblem};
use crate::scalar::{inner_product, Components, Scalar, State};

/// `u' = L*u + N(t,u)`, integrated by conjugating the nonlinear stage
/// evaluation with `exp(+-c_i*dt*L)`.
pub struct LawsonRk<T: Scalar, const S: usize, E> {
    table: &'static ButcherTable<S>,
    exp: E,
    tol: Tolerances<T>,
    info: IterationInfo<T>,
}

impl<T: Scalar, const S: usize, E> LawsonRk<T, S, E> {
    pub fn new(table: &'static ButcherTable<S>, exp: E) -> Self {
        let tol = Tolerances::default();
        Self {
            table,
            exp,
            info: IterationInfo::new(tol.abs_tol),
            tol,
        }
    }
}

impl<T, St, L, Nf, E, const N: usize> StageAlgorithm<T, St, LawsonProblem<L, Nf>> for LawsonRk<T, N, E>
where
    T: Scalar,
    St: State<T>,
    Nf: FnMut(T, &St, &mut St),
    E: ExpAction<T, St, L>,
{
    const N_STAGES: usize = N;

    fn stage(
        &mut self,
        i: usize,
        pb: &mut LawsonProblem<L, Nf>,
        tn: T,
        un: &St,
        k: &[St],
        dt: T,
        out: &mut St,
    ) {
        if i < N {
            let ci = self.table.c::<T>(i);
            let a_row: Vec<T> = (0..i).map(|j| self.table.a::<T>(i, j)).collect();
            let stage_u = inner_product(&a_row, &k[..i], un.clone(), dt);
            let transformed = self.exp.apply(ci * dt, &pb.l, &stage_u);
            let ti = tn + ci * dt;
            let mut nval = transformed.clone();
            (pb.n)(ti, &transformed, &mut nval);
            *out = self.exp.apply(-(ci * dt), &pb.l, &nval);
        } else {
            let b: Vec<T> = (0..N).map(|j| self.table.b::<T>(j)).collect();
            let combo = inner_product(&b, &k[..N], un.clone(), dt);
            *out = self.exp.apply(dt, &pb.l, &combo);
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

impl<T, St, L, Nf, E, const N: usize> Method<T, St, LawsonProblem<L, Nf>> for LawsonRk<T, N, E>
where
    T: Scalar,
    St: State<T> + Components<T>,
    Nf: FnMut(T, &St, &mut St),
    E: ExpAction<T, St, L>,
{
    fn step(
        &mut self,
        pb: &mut LawsonProblem<L, Nf>,
        tn: T,
        un: &St,
        dt: T,
    ) -> Result<(T, St, T), crate::error::PonioError> {
        run_static_stage_driver(self, pb, tn, un, dt)
    }

    fn info(&self) -> &IterationInfo<T> {
        &self.info
    }
}

/// Evaluates `phi_j(coeff*L)` applied to a state; `phi_0 = exp`,
/// `phi_1(z) = (exp(z)-1)/z`, etc. Supplied by the caller, same rationale as
/// [`ExpAction`].
pub trait PhiAction<T: Scalar, S: State<T>, L> {
    fn phi(&mut self, j: usize, coeff: T, l: &L, v: &S) -> S;
}

impl<T, S, L, F> PhiAction<T, S, L> for F
where
    T: Scalar,
    S: State<T>,
    F: FnMut(usize, T, &L, &S) -> S,
{
    fn phi(&mut self, j: usize, coeff: T, l: &L, v: &S) -> S {
        self(j, coeff, l, v)
    }
}

/// Exponential time-differencing RK: same stage/weight structure as a
/// classical RK but every product is weighted by `phi_j(dt*L)` rather than a
/// bare Butcher coefficient.
pub struct ExponentialRk<T: Scalar, const S: usize, E> {
    table: &'static ButcherTable<S>,
    phi: E,
    tol: Tolerances<T>,
    info: IterationInfo<T>,
}

impl<T: Scalar, const S: usize, E> ExponentialRk<T, S, E> {
    pub fn new(table: &'static ButcherTable<S>, phi: E) -> Self {
        let tol = Tolerances::default();
        Self {
            table,
            phi,
            info: IterationInfo::new(tol.abs_tol),
            tol,
        }
    }
}

impl<T, St, L, Nf, E, const N: usize> StageAlgorithm<T, St, LawsonProblem<L, Nf>> for ExponentialRk<T, N, E>
where
    T: Scalar,
    St: State<T>,
    Nf: FnMut(T, &St, &mut St),
    E: PhiAction<T, St, L>,
{
    const N_STAGES: usize = N;

    fn stage(
        &mut self,
        i: usize,
        pb: &mut LawsonProblem<L, Nf>,
        tn: T,
        un: &St,
        k: &[St],
        dt: T,
        out: &mut St,
    ) {
        if i < N {
            let ci = self.table.c::<T>(i);
            let base = self.phi.phi(0, ci * dt, &pb.l, un);
            let a_row: Vec<T> = (0..i).map(|j| self.table.a::<T>(i, j)).collect();
            let stage_u = inner_product(&a_row, &k[..i], base, dt);
            let ti = tn + ci * dt;
            let mut nval = stage_u.clone();
            (pb.n)(ti, &stage_u, &mut nval);
            *out = self.phi.phi(1, ci * dt, &pb.l, &nval);
        } else {
            let base = self.phi.phi(0, dt, &pb.l, un);
            let b: Vec<T> = (0..N).map(|j| self.table.b::<T>(j)).collect();
            *out = inner_product(&b, &k[..N], base, dt);
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

impl<T, St, L, Nf, E, const N: usize> Method<T, St, LawsonProblem<L, Nf>> for ExponentialRk<T, N, E>
where
    T: Scalar,
    St: State<T> + Components<T>,
    Nf: FnMut(T, &St, &mut St),
    E: PhiAction<T, St, L>,
{
    fn step(
        &mut self,
        pb: &mut LawsonProblem<L, Nf>,
        tn: T,
        un: &St,
        dt: T,
    ) -> Result<(T, St, T), crate::error::PonioError> {
        run_static_stage_driver(self, pb, tn, un, dt)
    }

    fn info(&self) -> &IterationInfo<T> {
        &self.info
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::butcher::RK4;
    use crate::problem::lawson_problem;

    /// A linear-only problem (`N = 0`) must reproduce `exp(dt*L)*u0` exactly
    /// regardless of the RK table, since every stage collapses to the
    /// identity action.
    #[test]
    fn lawson_linear_only_matches_exp() {
        let l = -3.0_f64;
        let exp_action = |coeff: f64, l: &f64, v: &f64| (coeff * *l).exp() * *v;
        let mut alg = LawsonRk::<f64, 4, _>::new(&RK4, exp_action);
        let mut pb = lawson_problem(l, |_t: f64, _u: &f64, du: &mut f64| *du = 0.0);
        let (_, u1, _) = alg.step(&mut pb, 0.0, &1.0, 0.1).unwrap();
        let expected = (0.1_f64 * l).exp();
        assert!((u1 - expected).abs() < 1e-10, "u1={u1} expected={expected}");
    }
}
