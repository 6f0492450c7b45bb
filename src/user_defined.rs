//! Adapter letting a caller plug in a bare step function without
//! implementing [`Method`] on a named type — the escape hatch for one-off
//! or externally-sourced integration schemes.

use crate::error::PonioError;
use crate::iteration_info::IterationInfo;
use crate::method::Method;
use crate::scalar::{Scalar, State};

/// Wraps `F: FnMut(&mut P, T, &S, T) -> Result<(T, S, T), PonioError>` as a
/// [`Method`]. `info()` always reports a fresh [`IterationInfo`] marked
/// successful, since a user-supplied closure has no stage-count or
/// error-estimate machinery to report through it.
pub struct UserDefinedMethod<T: Scalar, F> {
    step_fn: F,
    info: IterationInfo<T>,
}

impl<T: Scalar, F> UserDefinedMethod<T, F> {
    pub fn new(step_fn: F) -> Self {
        Self {
            step_fn,
            info: IterationInfo::new(T::from(1e-4).unwrap()),
        }
    }
}

impl<T, S, P, F> Method<T, S, P> for UserDefinedMethod<T, F>
where
    T: Scalar,
    S: State<T>,
    F: FnMut(&mut P, T, &S, T) -> Result<(T, S, T), PonioError>,
{
    fn step(&mut self, pb: &mut P, tn: T, un: &S, dt: T) -> Result<(T, S, T), PonioError> {
        let result = (self.step_fn)(pb, tn, un, dt)?;
        self.info.success = true;
        Ok(result)
    }

    fn info(&self) -> &IterationInfo<T> {
        &self.info
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::{simple_problem, Rhs};

    /// A hand-rolled forward-Euler step, exercised purely through the
    /// closure adapter with no [`crate::method::StageAlgorithm`] involved.
    #[test]
    fn user_defined_forward_euler_matches_hand_computed_step() {
        let mut alg = UserDefinedMethod::<f64, _>::new(|pb: &mut _, tn: f64, un: &f64, dt: f64| {
            let mut du = 0.0;
            Rhs::call(pb, tn, un, &mut du);
            Ok((tn + dt, un + dt * du, dt))
        });
        let mut pb = simple_problem(|_t: f64, u: &f64, du: &mut f64| *du = -2.0 * *u);
        let (tn, u1, dt) = alg.step(&mut pb, 0.0, &1.0, 0.1).unwrap();
        assert!((tn - 0.1).abs() < 1e-12);
        assert!((u1 - 0.8).abs() < 1e-12);
        assert!((dt - 0.1).abs() < 1e-12);
        assert!(alg.info().success);
    }
}
