//! Damped first-kind Chebyshev polynomial recursion shared by RKC2 and,
//! per the documented deviation in `DESIGN.md`, by ROCK2/ROCK4's
//! per-degree coefficients: `T_j(w0)`, `T_j'(w0)`, `T_j''(w0)` and
//! the damped `b_j`/`a_j` family, evaluated at `w0 = 1 + eps/s^2`.

use crate::scalar::Scalar;
use num_traits::Zero;

#[derive(Debug, Clone)]
pub struct ChebyshevRecursion<T: Scalar> {
    pub t: Vec<T>,
    pub dt: Vec<T>,
    pub ddt: Vec<T>,
    pub b: Vec<T>,
    pub a: Vec<T>,
    pub w0: T,
    pub w1: T,
}

/// Builds the recursion for degree `s` with damping `eps` (RKC's
/// conventional default is `2/13`).
pub fn build<T: Scalar>(s: usize, eps: T) -> ChebyshevRecursion<T> {
    let two = T::from(2.0).unwrap();
    let four = T::from(4.0).unwrap();
    let s2 = T::from((s * s) as f64).unwrap();
    let w0 = T::one() + eps / s2;

    let mut t = vec![T::zero(); s + 1];
    let mut dt = vec![T::zero(); s + 1];
    let mut ddt = vec![T::zero(); s + 1];
    t[0] = T::one();
    if s >= 1 {
        t[1] = w0;
        dt[1] = T::one();
    }
    for j in 2..=s {
        t[j] = two * w0 * t[j - 1] - t[j - 2];
        dt[j] = two * t[j - 1] + two * w0 * dt[j - 1] - dt[j - 2];
        ddt[j] = four * dt[j - 1] + two * w0 * ddt[j - 1] - ddt[j - 2];
    }

    let w1 = if s >= 1 && !ddt[s].is_zero() {
        dt[s] / ddt[s]
    } else {
        T::one()
    };

    let mut b = vec![T::zero(); s + 1];
    for j in 2..=s {
        b[j] = ddt[j] / (dt[j] * dt[j]);
    }
    if s >= 2 {
        b[0] = b[2];
        b[1] = b[2];
    } else {
        b[0] = T::one();
        b[1] = T::one();
    }

    let mut a = vec![T::zero(); s + 1];
    for (j, aj) in a.iter_mut().enumerate() {
        *aj = T::one() - b[j] * t[j];
    }

    ChebyshevRecursion { t, dt, ddt, b, a, w0, w1 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn t1_is_w0_and_derivative_is_one() {
        let r = build::<f64>(8, 2.0 / 13.0);
        assert!((r.t[1] - r.w0).abs() < 1e-12);
        assert!((r.dt[1] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn recursion_is_well_defined_for_small_degree() {
        let r = build::<f64>(2, 2.0 / 13.0);
        assert!(r.b[2].is_finite());
        assert!(r.a[2].is_finite());
    }
}
