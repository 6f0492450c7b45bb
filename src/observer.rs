//! Observers: a hook called after every accepted step, used to collect a
//! trajectory or stream it elsewhere without the solver loop itself caring
//! about storage.

use crate::iteration_info::IterationInfo;
use crate::scalar::{Scalar, State};

/// Called once per accepted step with `(t, u, info)`.
pub trait Observer<T: Scalar, S: State<T>> {
    fn observe(&mut self, t: T, u: &S, info: &IterationInfo<T>);
}

impl<T, S, O> Observer<T, S> for &mut O
where
    T: Scalar,
    S: State<T>,
    O: Observer<T, S> + ?Sized,
{
    fn observe(&mut self, t: T, u: &S, info: &IterationInfo<T>) {
        (**self).observe(t, u, info)
    }
}

/// Discards everything; the default when the caller only wants the final
/// state.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl<T: Scalar, S: State<T>> Observer<T, S> for NullObserver {
    fn observe(&mut self, _t: T, _u: &S, _info: &IterationInfo<T>) {}
}

/// Accumulates the full `(t, u)` trajectory in memory.
#[derive(Debug, Default, Clone)]
pub struct VecObserver<T: Scalar, S: State<T>> {
    pub times: Vec<T>,
    pub states: Vec<S>,
}

impl<T: Scalar, S: State<T>> VecObserver<T, S> {
    pub fn new() -> Self {
        Self {
            times: Vec::new(),
            states: Vec::new(),
        }
    }
}

impl<T: Scalar, S: State<T>> Observer<T, S> for VecObserver<T, S> {
    fn observe(&mut self, t: T, u: &S, _info: &IterationInfo<T>) {
        self.times.push(t);
        self.states.push(u.clone());
    }
}

/// Runs `f` only when `info.success`, letting a caller wrap any observer to
/// skip the rejected-step retries a solver range may otherwise report.
pub struct AcceptedOnly<O>(pub O);

impl<T, S, O> Observer<T, S> for AcceptedOnly<O>
where
    T: Scalar,
    S: State<T>,
    O: Observer<T, S>,
{
    fn observe(&mut self, t: T, u: &S, info: &IterationInfo<T>) {
        if info.success {
            self.0.observe(t, u, info);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec_observer_records_every_call() {
        let mut obs = VecObserver::<f64, f64>::new();
        let info = IterationInfo::new(1e-4);
        obs.observe(0.0, &1.0, &info);
        obs.observe(0.1, &0.9, &info);
        assert_eq!(obs.times, vec![0.0, 0.1]);
        assert_eq!(obs.states, vec![1.0, 0.9]);
    }

    #[test]
    fn accepted_only_skips_rejected_steps() {
        let mut obs = AcceptedOnly(VecObserver::<f64, f64>::new());
        let mut ok = IterationInfo::new(1e-4);
        ok.success = true;
        let mut rejected = IterationInfo::new(1e-4);
        rejected.success = false;
        obs.observe(0.0, &1.0, &ok);
        obs.observe(0.05, &1.5, &rejected);
        obs.observe(0.1, &0.9, &ok);
        assert_eq!(obs.0.times, vec![0.0, 0.1]);
    }
}
