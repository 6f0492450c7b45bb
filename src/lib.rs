//! `ponio_rs`: a Runge-Kutta family of time integrators for ODEs, spanning
//! classical explicit/embedded schemes, diagonally-implicit (DIRK) schemes,
//! exponential (Lawson/ETD) integrators, Chebyshev/Legendre stabilized
//! polynomial methods (RKC/RKL), the dynamic-stage ROCK2/ROCK4 stabilized
//! methods, the composite IMEX PIROCK method, and operator splitting.
//!
//! One module per algorithm family sits on a shared `problem`/`scalar`/
//! `method` layer, with a small `linalg` protocol standing in for a
//! concrete matrix backend so callers can plug in anything from a bare
//! scalar to a sparse factorization.

pub mod butcher;
pub mod cheby;
pub mod config;
pub mod dirk;
pub mod erk;
pub mod error;
pub mod iteration_info;
pub mod lawson;
pub mod linalg;
pub mod method;
pub mod observer;
pub mod pirock;
pub mod problem;
pub mod rkc;
pub mod rock;
pub mod scalar;
pub mod solver_range;
pub mod splitting;
pub mod user_defined;

pub use error::{PonioError, PonioResult};
pub use method::Method;
pub use scalar::{Scalar, State};
