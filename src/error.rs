//! Crate-wide error type.
//!
//! One `thiserror`-derived enum covering every fatal condition in the engine.
//! Local recovery (step rejection, Δt shrink) is *not* represented here — per
//! it stays invisible to the caller except through `IterationInfo`.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PonioError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("Newton iteration did not converge within {max_iter} iterations (residual {residual:e}, tol {tol:e})")]
    Convergence {
        residual: f64,
        tol: f64,
        max_iter: usize,
    },

    #[error("stabilized polynomial degree {requested} exceeds table maximum {max}")]
    StabilityBound { requested: usize, max: usize },

    #[error("non-finite value encountered in state at t={t}")]
    Arithmetic { t: f64 },

    #[error("linear algebra backend error: {0}")]
    Linalg(String),
}

pub type PonioResult<T> = Result<T, PonioError>;
