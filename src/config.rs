//! Default tolerances shared by every adaptive algorithm.
//!
//! Mirrors `ponio_config.hpp`: a handful of crate-wide constants plus a small
//! `Tolerances` value used by the chained-setter builders in `dirk`, `rock`
//! and `pirock`.

use crate::scalar::Scalar;

pub mod default_config {
    pub const TOL: f64 = 1e-4;
    pub const NEWTON_TOLERANCE: f64 = 1e-10;
    pub const NEWTON_MAX_ITERATIONS: usize = 50;
}

/// Absolute/relative tolerance pair used by every embedded error controller.
#[derive(Debug, Clone, Copy)]
pub struct Tolerances<T: Scalar> {
    pub abs_tol: T,
    pub rel_tol: T,
}

impl<T: Scalar> Default for Tolerances<T> {
    fn default() -> Self {
        let tol = T::from(default_config::TOL).unwrap();
        Self {
            abs_tol: tol,
            rel_tol: tol,
        }
    }
}

/// Newton iteration configuration shared by DIRK and PIROCK's reaction solve.
#[derive(Debug, Clone, Copy)]
pub struct NewtonConfig<T: Scalar> {
    pub tol: T,
    pub max_iter: usize,
}

impl<T: Scalar> Default for NewtonConfig<T> {
    fn default() -> Self {
        Self {
            tol: T::from(default_config::NEWTON_TOLERANCE).unwrap(),
            max_iter: default_config::NEWTON_MAX_ITERATIONS,
        }
    }
}
