//! Linear-algebra dispatch.
//!
//! A backend is a small protocol: `identity(u)`, `solve(A, b)`. DIRK and
//! PIROCK's reaction correction build `A = I - c·J` themselves (any `Op` that
//! is `Clone + Sub<Output = Op> + Mul<T, Output = Op>` supports that) and
//! hand it to `solve`. Two reference backends ship with the crate: a scalar
//! backend for `T` itself, and a dense backend built on `nalgebra::DMatrix`.

use crate::error::PonioError;
use crate::scalar::{Scalar, State};
use nalgebra::DMatrix;
use num_traits::Zero;

pub trait LinearAlgebra<T: Scalar, S: State<T>> {
    type Op: Clone + core::ops::Sub<Output = Self::Op> + core::ops::Mul<T, Output = Self::Op>;

    /// Identity operator shaped like `u`.
    fn identity(&self, u: &S) -> Self::Op;

    /// Solves `A·x = b` for `x`.
    fn solve(&self, a: &Self::Op, b: &S) -> Result<S, PonioError>;
}

/// Scalar backend: `T` itself as its own 1x1 "matrix".
#[derive(Debug, Default, Clone, Copy)]
pub struct ScalarBackend;

impl<T: Scalar> LinearAlgebra<T, T> for ScalarBackend {
    type Op = T;

    fn identity(&self, _u: &T) -> T {
        T::one()
    }

    fn solve(&self, a: &T, b: &T) -> Result<T, PonioError> {
        if a.is_zero() {
            return Err(PonioError::Linalg("singular scalar operator".into()));
        }
        Ok(*b / *a)
    }
}

/// Dense backend for small systems (e.g. the Brusselator 2x2 Jacobian),
/// backed by `nalgebra`'s dense LU.
#[derive(Debug, Default, Clone, Copy)]
pub struct DenseBackend;

use crate::scalar::VecState;

impl<T: Scalar + nalgebra::RealField> LinearAlgebra<T, VecState<T>> for DenseBackend {
    type Op = DMatrix<T>;

    fn identity(&self, u: &VecState<T>) -> DMatrix<T> {
        DMatrix::identity(u.len(), u.len())
    }

    fn solve(&self, a: &DMatrix<T>, b: &VecState<T>) -> Result<VecState<T>, PonioError> {
        let rhs = nalgebra::DVector::from_column_slice(b.as_slice());
        let lu = a.clone().lu();
        let x = lu
            .solve(&rhs)
            .ok_or_else(|| PonioError::Linalg("singular Jacobian in dense solve".into()))?;
        Ok(VecState::from_vec(x.as_slice().to_vec()))
    }
}

/// Shampine's trick: solves `op^l · x = y` by reusing a single already-built
/// linearized reaction operator `op` (`I - γ·Δt·∂_u F_R`) across `l` nested
/// solves, rather than rebuilding and re-factoring an operator per solve.
/// PIROCK's post-step defects (§4.9 step 4) go through this instead of a
/// fresh implicit solve; `op` is the same operator already assembled for the
/// step's reaction correction.
pub fn shampine_trick<T, S, B>(backend: &B, op: &B::Op, y: &S, l: usize) -> Result<S, PonioError>
where
    T: Scalar,
    S: State<T>,
    B: LinearAlgebra<T, S>,
{
    let mut x = y.clone();
    for _ in 0..l.max(1) {
        x = backend.solve(op, &x)?;
    }
    Ok(x)
}
