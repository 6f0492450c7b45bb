//! The generic per-stage driver.
//!
//! Ported from `method.hpp`. Upstream dispatches each stage through a
//! type-level `Stage<I>` overload set purely to avoid a runtime branch; in
//! Rust a plain `usize`-indexed loop carries the same information (the
//! stage count is still a compile-time constant on the algorithm type) with
//! far less machinery, so `StageAlgorithm::stage` takes a runtime stage
//! index instead of a const-generic marker. See DESIGN.md for the full
//! rationale.

use crate::config::Tolerances;
use crate::error::PonioError;
use crate::iteration_info::IterationInfo;
use crate::scalar::{norm_error, Components, Scalar, State};
use num_traits::ToPrimitive;

/// One fully advanced step of an integration: `Method(problem, tn, un, Δt) ->
/// (tn+1, un+1, Δt*)`.
pub trait Method<T: Scalar, S: State<T>, P> {
    fn step(&mut self, pb: &mut P, tn: T, un: &S, dt: T) -> Result<(T, S, T), PonioError>;
    fn info(&self) -> &IterationInfo<T>;
}

/// A static-stage algorithm: classical (embedded) Runge-Kutta, DIRK, Lawson,
/// exponential RK, RKC/RKL. `stage(i, ..)` writes `k[i]` for `i < N_STAGES`,
/// the candidate `u_{n+1}` for `i == N_STAGES`, and (when embedded) the
/// secondary estimate for `i == N_STAGES + 1`.
pub trait StageAlgorithm<T: Scalar, S: State<T>, P> {
    const N_STAGES: usize;

    fn stage(&mut self, i: usize, pb: &mut P, tn: T, un: &S, k: &[S], dt: T, out: &mut S);

    /// Declared order `p`, used by the embedded controller's `(tol/e)^(1/p)`.
    /// A runtime method rather than an associated const because one
    /// algorithm *type* (e.g. `ExplicitRk<N>`) is reused across tables of
    /// differing order (`RK4`, `RK3_HEUN`, ...).
    fn order(&self) -> usize;
    /// Whether the underlying table carries a `b2` secondary weight vector.
    fn is_embedded(&self) -> bool;

    fn tolerances(&self) -> Tolerances<T>;
    fn info_mut(&mut self) -> &mut IterationInfo<T>;
    fn info(&self) -> &IterationInfo<T>;
}

/// Runs the static-stage driver for any [`StageAlgorithm`]: allocates stage
/// storage, calls each stage in order, and on an embedded pair computes the
/// weighted-RMS error and the new `Δt`.
pub fn run_static_stage_driver<T, S, P, A>(
    alg: &mut A,
    pb: &mut P,
    tn: T,
    un: &S,
    dt: T,
) -> Result<(T, S, T), PonioError>
where
    T: Scalar,
    S: State<T> + Components<T>,
    A: StageAlgorithm<T, S, P>,
{
    alg.info_mut().reset_eval();
    alg.info_mut().number_of_stages = A::N_STAGES;
    let embedded = alg.is_embedded();

    let n_storage = A::N_STAGES + 1 + if embedded { 1 } else { 0 };
    let mut k: Vec<S> = Vec::with_capacity(n_storage);
    k.resize(n_storage, un.clone());

    for i in 0..A::N_STAGES {
        let mut out = un.clone();
        alg.stage(i, pb, tn, un, &k, dt, &mut out);
        alg.info_mut().number_of_eval += 1;
        k[i] = out;
    }

    let mut unp1 = un.clone();
    alg.stage(A::N_STAGES, pb, tn, un, &k, dt, &mut unp1);

    for v in unp1.components() {
        if !v.is_finite() {
            return Err(PonioError::Arithmetic {
                t: tn.to_f64().unwrap_or(f64::NAN),
            });
        }
    }

    if !embedded {
        alg.info_mut().success = true;
        alg.info_mut().error = T::zero();
        return Ok((tn + dt, unp1, dt));
    }

    let mut unp1bis = un.clone();
    alg.stage(A::N_STAGES + 1, pb, tn, un, &k, dt, &mut unp1bis);

    let Tolerances { abs_tol, rel_tol } = alg.tolerances();
    let diff = unp1.clone() - unp1bis.clone();
    let e = norm_error::<T, S>(&diff, un, &unp1, abs_tol, rel_tol);

    let p = T::from(alg.order()).unwrap();
    let accept = e < T::one();
    let safety = T::from(0.9).unwrap();
    let factor = safety * (T::one() / e).powf(T::one() / p);
    let clamped = factor.max(T::from(0.2).unwrap()).min(T::from(5.0).unwrap());
    let new_dt = dt * clamped;

    alg.info_mut().success = accept;
    alg.info_mut().error = e;

    if !accept {
        tracing::debug!(error = ?e, "embedded step rejected, shrinking dt");
        return Ok((tn, un.clone(), new_dt));
    }

    Ok((tn + dt, unp1, new_dt))
}
