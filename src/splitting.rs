//! Operator splitting: Lie, Strang, adaptive Strang.
//!
//! A splitting method composes heterogeneous sub-integrators over a
//! [`crate::problem::CompositeProblem`]'s parts. Each sub-integrator is a
//! boxed [`Method`] trait object addressing one part through
//! [`IndexedProblem`], which shares the composite via `Rc<RefCell<..>>` so
//! the collection of sub-methods can be dyn-compatible without threading a
//! borrow-checker lifetime through every sub-integrator's type.

use crate::error::PonioError;
use crate::iteration_info::IterationInfo;
use crate::method::Method;
use crate::problem::{CompositeProblem, Rhs};
use crate::scalar::{error_estimate, Components, Scalar, State};
use std::cell::RefCell;
use std::rc::Rc;

/// Addresses a single part `i` of a [`CompositeProblem`], shared so a
/// collection of heterogeneous sub-integrators can each own one.
pub struct IndexedProblem<T: Scalar, S: State<T>> {
    composite: Rc<RefCell<CompositeProblem<T, S>>>,
    pub index: usize,
}

impl<T: Scalar, S: State<T>> Rhs<T, S> for IndexedProblem<T, S> {
    fn call(&mut self, t: T, u: &S, du: &mut S) {
        self.composite.borrow_mut().call_at(self.index, t, u, du);
    }
}

/// Advances `method` from `t_begin` to `t_end` in steps of `dt_sub`,
/// clamping the final step so it lands exactly at `t_end`.
pub fn split_solve<T, S>(
    method: &mut dyn Method<T, S, IndexedProblem<T, S>>,
    pb: &mut IndexedProblem<T, S>,
    u0: S,
    t_begin: T,
    t_end: T,
    dt_sub: T,
) -> Result<S, PonioError>
where
    T: Scalar,
    S: State<T> + Components<T>,
{
    let mut t = t_begin;
    let mut u = u0;
    while t < t_end {
        let remaining = t_end - t;
        let dt = if remaining < dt_sub { remaining } else { dt_sub };
        let (tn, un, _) = method.step(pb, t, &u, dt)?;
        t = tn;
        u = un;
    }
    Ok(u)
}

pub type SubMethod<T, S> = Box<dyn Method<T, S, IndexedProblem<T, S>>>;

fn indexed<T: Scalar, S: State<T>>(composite: &Rc<RefCell<CompositeProblem<T, S>>>, i: usize) -> IndexedProblem<T, S> {
    IndexedProblem { composite: composite.clone(), index: i }
}

/// First-order Lie (sequential full-step) composition.
pub struct Lie<T: Scalar, S: State<T>> {
    composite: Rc<RefCell<CompositeProblem<T, S>>>,
    methods: Vec<SubMethod<T, S>>,
    dt_sub: Vec<T>,
    info: IterationInfo<T>,
}

impl<T: Scalar, S: State<T>> Lie<T, S> {
    pub fn new(composite: CompositeProblem<T, S>, methods: Vec<SubMethod<T, S>>, dt_sub: Vec<T>) -> Self {
        assert_eq!(methods.len(), dt_sub.len());
        Self {
            composite: Rc::new(RefCell::new(composite)),
            methods,
            dt_sub,
            info: IterationInfo::new(T::from(1e-4).unwrap()),
        }
    }
}

impl<T, S> Method<T, S, ()> for Lie<T, S>
where
    T: Scalar,
    S: State<T> + Components<T>,
{
    fn step(&mut self, _pb: &mut (), tn: T, un: &S, dt: T) -> Result<(T, S, T), PonioError> {
        let mut u = un.clone();
        for (i, method) in self.methods.iter_mut().enumerate() {
            let mut pb = indexed(&self.composite, i);
            u = split_solve(method.as_mut(), &mut pb, u, tn, tn + dt, self.dt_sub[i])?;
        }
        self.info.success = true;
        Ok((tn + dt, u, dt))
    }

    fn info(&self) -> &IterationInfo<T> {
        &self.info
    }
}

/// Second-order Strang (symmetric half/full/half) composition.
pub struct Strang<T: Scalar, S: State<T>> {
    composite: Rc<RefCell<CompositeProblem<T, S>>>,
    methods: Vec<SubMethod<T, S>>,
    dt_sub: Vec<T>,
    info: IterationInfo<T>,
}

impl<T: Scalar, S: State<T>> Strang<T, S> {
    pub fn new(composite: CompositeProblem<T, S>, methods: Vec<SubMethod<T, S>>, dt_sub: Vec<T>) -> Self {
        assert_eq!(methods.len(), dt_sub.len());
        Self {
            composite: Rc::new(RefCell::new(composite)),
            methods,
            dt_sub,
            info: IterationInfo::new(T::from(1e-4).unwrap()),
        }
    }

    /// Runs one Strang composition over `[tn, tn+dt]`, used both by `step`
    /// and by [`AdaptiveStrang`] for the reference/shifted pair.
    fn compose(&mut self, un: &S, tn: T, dt: T, delta: T) -> Result<S, PonioError> {
        let n = self.methods.len();
        let half = T::from(0.5).unwrap();
        let mut u = un.clone();
        let mut t = tn;

        for i in 0..n.saturating_sub(1) {
            let frac = if i == 0 { half + delta } else { half };
            let sub_dt = dt * frac;
            let mut pb = indexed(&self.composite, i);
            u = split_solve(self.methods[i].as_mut(), &mut pb, u, t, t + sub_dt, self.dt_sub[i])?;
            t = t + sub_dt;
        }
        if let Some(last) = n.checked_sub(1) {
            let mut pb = indexed(&self.composite, last);
            u = split_solve(self.methods[last].as_mut(), &mut pb, u, t, t + dt, self.dt_sub[last])?;
            t = t + dt;
        }
        for i in (0..n.saturating_sub(1)).rev() {
            let frac = if i == 0 { half - delta } else { half };
            let sub_dt = dt * frac;
            let mut pb = indexed(&self.composite, i);
            u = split_solve(self.methods[i].as_mut(), &mut pb, u, t, t + sub_dt, self.dt_sub[i])?;
            t = t + sub_dt;
        }
        Ok(u)
    }
}

impl<T, S> Method<T, S, ()> for Strang<T, S>
where
    T: Scalar,
    S: State<T> + Components<T>,
{
    fn step(&mut self, _pb: &mut (), tn: T, un: &S, dt: T) -> Result<(T, S, T), PonioError> {
        let u = self.compose(un, tn, dt, T::zero())?;
        self.info.success = true;
        Ok((tn + dt, u, dt))
    }

    fn info(&self) -> &IterationInfo<T> {
        &self.info
    }
}

/// Adaptive Strang: runs a reference Strang composition at nominal `dt` and
/// a delta-shifted one in parallel (sequentially in this single-threaded
/// core), estimating the local error from their difference.
pub struct AdaptiveStrang<T: Scalar, S: State<T>> {
    composite: Rc<RefCell<CompositeProblem<T, S>>>,
    methods_ref: Vec<SubMethod<T, S>>,
    methods_shift: Vec<SubMethod<T, S>>,
    dt_sub: Vec<T>,
    delta: T,
    tol: T,
    info: IterationInfo<T>,
}

impl<T: Scalar, S: State<T>> AdaptiveStrang<T, S> {
    pub fn new(
        composite: CompositeProblem<T, S>,
        methods_ref: Vec<SubMethod<T, S>>,
        methods_shift: Vec<SubMethod<T, S>>,
        dt_sub: Vec<T>,
        delta: T,
    ) -> Self {
        Self {
            composite: Rc::new(RefCell::new(composite)),
            methods_ref,
            methods_shift,
            dt_sub,
            delta,
            tol: T::from(1e-4).unwrap(),
            info: IterationInfo::new(T::from(1e-4).unwrap()),
        }
    }

    pub fn tol(mut self, tol: T) -> Self {
        self.tol = tol;
        self
    }
}

impl<T, S> Method<T, S, ()> for AdaptiveStrang<T, S>
where
    T: Scalar,
    S: State<T> + Components<T>,
{
    fn step(&mut self, _pb: &mut (), tn: T, un: &S, dt: T) -> Result<(T, S, T), PonioError> {
        let mut reference = Strang {
            composite: self.composite.clone(),
            methods: std::mem::take(&mut self.methods_ref),
            dt_sub: self.dt_sub.clone(),
            info: IterationInfo::new(self.tol),
        };
        let mut shifted = Strang {
            composite: self.composite.clone(),
            methods: std::mem::take(&mut self.methods_shift),
            dt_sub: self.dt_sub.clone(),
            info: IterationInfo::new(self.tol),
        };

        let u_ref = reference.compose(un, tn, dt, T::zero());
        let u_shift = shifted.compose(un, tn, dt, self.delta);

        self.methods_ref = reference.methods;
        self.methods_shift = shifted.methods;

        let u_ref = u_ref?;
        let u_shift = u_shift?;

        let e = error_estimate(un, &u_ref, &u_shift) / (T::one() + crate::scalar::norm(&u_ref).max(crate::scalar::norm(&u_shift)));
        let accept = e < self.tol;
        let factor = (self.tol / e.max(T::epsilon())).sqrt() * T::from(0.9).unwrap();
        let clamped = factor.max(T::from(0.2).unwrap()).min(T::from(5.0).unwrap());
        let new_dt = dt * clamped;

        self.info.error = e;
        self.info.success = accept;

        if !accept {
            tracing::debug!(error = ?e, "adaptive Strang step rejected, shrinking dt");
            return Ok((tn, un.clone(), new_dt));
        }
        Ok((tn + dt, u_ref, new_dt))
    }

    fn info(&self) -> &IterationInfo<T> {
        &self.info
    }
}

/// Given three `(a_i, b_i, c_i)`-parameterized defect evaluations,
/// estimates the scalar pair `(C0, omega)` from a quadratic error model
/// `e_i ~= C0 * (1 + omega * a_i) * b_i` used to retune `delta`.
/// The exact triple-selection the original source
/// uses was not present in the retrieved tree; this crate solves the
/// 2x2 linear system in `(C0, C0*omega)` implied by the first two
/// measurements, documented as an approximation in `DESIGN.md`.
pub fn estimate_lipschitz_constants<T: Scalar>(e1: T, e2: T, a1: T, a2: T, b1: T, b2: T) -> (T, T) {
    let rhs1 = e1 / b1;
    let rhs2 = e2 / b2;
    // rhs_i = C0 + C0*omega*a_i  =>  solve the 2x2 system for (C0, C0*omega)
    let denom = a2 - a1;
    if denom.abs() < T::epsilon() {
        return (rhs1, T::zero());
    }
    let c0_omega = (rhs2 - rhs1) / denom;
    let c0 = rhs1 - c0_omega * a1;
    let omega = if c0.abs() > T::epsilon() { c0_omega / c0 } else { T::zero() };
    (c0, omega)
}
