//! Forward-only step iterator tying a [`Method`] to a problem, an initial
//! condition and a time span, with optional checkpoints the integration
//! must land on exactly.

use crate::error::PonioError;
use crate::iteration_info::IterationInfo;
use crate::method::Method;
use crate::observer::Observer;
use crate::scalar::{Scalar, State};

/// One accepted point along the trajectory.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CurrentSolution<T: Scalar, S: State<T>> {
    pub t: T,
    pub u: S,
    pub dt: T,
}

/// Iterates accepted steps of `method` over `pb` from `t0` to `tf`,
/// optionally observing every accepted step and clamping `dt` so the
/// trajectory lands exactly on each entry of `checkpoints` (sorted,
/// within `[t0, tf]`).
///
/// Rejected steps (an embedded controller shrinking `dt` without advancing
/// `t`) are retried internally and never surface as a yielded item — only
/// accepted points reach the caller, matching a plain `for` loop over the
/// upstream solver range.
pub struct SolverRange<T, S, P, M, O>
where
    T: Scalar,
    S: State<T>,
    M: Method<T, S, P>,
{
    pb: P,
    method: M,
    current: CurrentSolution<T, S>,
    tf: T,
    checkpoints: Vec<T>,
    observer: O,
    finished: bool,
    max_rejections_per_step: usize,
    /// The step size that was in effect before it was shrunk to land
    /// exactly on a checkpoint; restored at the top of the next call to
    /// `next()` so a checkpoint never permanently shrinks the step size
    /// for a fixed-step method.
    saved_dt: Option<T>,
}

impl<T, S, P, M, O> SolverRange<T, S, P, M, O>
where
    T: Scalar,
    S: State<T>,
    M: Method<T, S, P>,
{
    pub fn checkpoints(mut self, mut checkpoints: Vec<T>) -> Self {
        checkpoints.retain(|&c| c > self.current.t && c <= self.tf);
        checkpoints.sort_by(|a, b| a.partial_cmp(b).unwrap_or(core::cmp::Ordering::Equal));
        self.checkpoints = checkpoints;
        self
    }

    fn next_bound(&self) -> T {
        self.checkpoints
            .iter()
            .copied()
            .find(|&c| c > self.current.t)
            .unwrap_or(self.tf)
            .min(self.tf)
    }
}

/// Builds a [`SolverRange`] over `[t0, tf]` from an initial state `u0` and
/// starting step `dt0`. Observes `(t0, u0)` immediately, since §9 requires
/// the observer to see the initial condition as well as every accepted step.
pub fn make_solver_range<T, S, P, M, O>(
    method: M,
    pb: P,
    t0: T,
    u0: S,
    dt0: T,
    tf: T,
    mut observer: O,
) -> SolverRange<T, S, P, M, O>
where
    T: Scalar,
    S: State<T>,
    M: Method<T, S, P>,
    O: Observer<T, S>,
{
    observer.observe(t0, &u0, &IterationInfo::default());
    SolverRange {
        pb,
        method,
        current: CurrentSolution { t: t0, u: u0, dt: dt0 },
        tf,
        checkpoints: Vec::new(),
        observer,
        finished: false,
        max_rejections_per_step: 50,
        saved_dt: None,
    }
}

impl<T, S, P, M, O> Iterator for SolverRange<T, S, P, M, O>
where
    T: Scalar,
    S: State<T>,
    M: Method<T, S, P>,
    O: Observer<T, S>,
{
    type Item = Result<CurrentSolution<T, S>, PonioError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished || self.current.t >= self.tf {
            return None;
        }

        let bound = self.next_bound();
        let mut dt = self.saved_dt.take().unwrap_or(self.current.dt);
        if self.current.t + dt > bound {
            self.saved_dt = Some(dt);
            dt = bound - self.current.t;
        }

        for _ in 0..self.max_rejections_per_step {
            let step = self.method.step(&mut self.pb, self.current.t, &self.current.u, dt);
            let (tn, un, new_dt) = match step {
                Ok(v) => v,
                Err(e) => {
                    self.finished = true;
                    return Some(Err(e));
                }
            };

            if !self.method.info().success {
                dt = new_dt.min(bound - self.current.t);
                continue;
            }

            self.observer.observe(tn, &un, self.method.info());

            self.current = CurrentSolution {
                t: tn,
                u: un.clone(),
                dt: new_dt,
            };
            if self.current.t >= self.tf - T::epsilon() {
                self.finished = true;
            }
            return Some(Ok(CurrentSolution { t: tn, u: un, dt: new_dt }));
        }

        self.finished = true;
        Some(Err(PonioError::Convergence {
            residual: f64::NAN,
            tol: 0.0,
            max_iter: self.max_rejections_per_step,
        }))
    }
}

/// Eagerly drives a [`SolverRange`] to completion and returns the final
/// accepted state, short-circuiting on the first error.
pub fn solve<T, S, P, M, O>(range: SolverRange<T, S, P, M, O>) -> Result<CurrentSolution<T, S>, PonioError>
where
    T: Scalar,
    S: State<T>,
    M: Method<T, S, P>,
    O: Observer<T, S>,
{
    let mut last = None;
    for point in range {
        last = Some(point?);
    }
    last.ok_or_else(|| PonioError::Configuration("solver range produced no steps".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::butcher::RK4;
    use crate::erk::ExplicitRk;
    use crate::observer::VecObserver;
    use crate::problem::simple_problem;

    #[test]
    fn solver_range_advances_to_exactly_tf() {
        let alg = ExplicitRk::<f64, 4>::new(&RK4);
        let pb = simple_problem(|_t: f64, u: &f64, du: &mut f64| *du = -*u);
        let range = make_solver_range(alg, pb, 0.0, 1.0, 0.03, 1.0, crate::observer::NullObserver);
        let final_point = solve(range).unwrap();
        assert!((final_point.t - 1.0).abs() < 1e-9);
        assert!((final_point.u - (-1.0_f64).exp()).abs() < 1e-4);
    }

    #[test]
    fn solver_range_lands_exactly_on_checkpoints() {
        let alg = ExplicitRk::<f64, 4>::new(&RK4);
        let pb = simple_problem(|_t: f64, u: &f64, du: &mut f64| *du = -*u);
        let range = make_solver_range(alg, pb, 0.0, 1.0, 0.07, 1.0, NullObserverAlias::default())
            .checkpoints(vec![0.25, 0.5, 0.75]);
        let points: Vec<_> = range.map(|r| r.unwrap()).collect();
        let hit = |target: f64| points.iter().any(|p| (p.t - target).abs() < 1e-9);
        assert!(hit(0.25));
        assert!(hit(0.5));
        assert!(hit(0.75));
        assert!(hit(1.0));
    }

    type NullObserverAlias = crate::observer::NullObserver;

    #[test]
    fn solver_range_records_every_accepted_point_via_observer() {
        let alg = ExplicitRk::<f64, 4>::new(&RK4);
        let pb = simple_problem(|_t: f64, u: &f64, du: &mut f64| *du = -*u);
        let mut observer = VecObserver::<f64, f64>::new();
        {
            let range = make_solver_range(alg, pb, 0.0, 1.0, 0.25, 1.0, &mut observer);
            for point in range {
                point.unwrap();
            }
        }
        // initial condition plus 4 accepted steps of dt=0.25 to reach t=1.0
        assert_eq!(observer.times.len(), 5);
        assert!((observer.times[0]).abs() < 1e-9);
        assert!((*observer.times.last().unwrap() - 1.0).abs() < 1e-9);
    }
}
