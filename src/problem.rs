//! Problem abstractions.
//!
//! The upstream `ponio::problem.hpp` accepts callables shaped either
//! "f returns du" or "f writes into du" via C++ overload resolution. Per the
//! resolved open question (a), this crate supports exactly one calling
//! convention: every right-hand side is `FnMut(T, &S, &mut S)`, writing its
//! result into the output parameter. `into_inplace` adapts a
//! "returns du"-shaped closure for callers coming from that style.

use crate::scalar::{Scalar, State};

/// Common right-hand side: `du <- f(t, u)`.
pub trait Rhs<T: Scalar, S: State<T>> {
    fn call(&mut self, t: T, u: &S, du: &mut S);
}

/// Adapts a closure of the form `Fn(T, &S) -> S` to the in-place convention.
pub struct IntoInplace<F>(pub F);

impl<T, S, F> Rhs<T, S> for IntoInplace<F>
where
    T: Scalar,
    S: State<T>,
    F: FnMut(T, &S) -> S,
{
    fn call(&mut self, t: T, u: &S, du: &mut S) {
        *du = (self.0)(t, u);
    }
}

/// A bare callable already in the in-place convention.
pub struct SimpleProblem<F>(pub F);

impl<T, S, F> Rhs<T, S> for SimpleProblem<F>
where
    T: Scalar,
    S: State<T>,
    F: FnMut(T, &S, &mut S),
{
    fn call(&mut self, t: T, u: &S, du: &mut S) {
        (self.0)(t, u, du)
    }
}

pub fn simple_problem<F>(f: F) -> SimpleProblem<F> {
    SimpleProblem(f)
}

/// An implicit problem: `f` plus its Jacobian (or, for an implicit-operator
/// problem, a `t`-only operator factory — see [`implicit_operator_problem`]).
/// `M` is the "matrix-like" type understood by a [`crate::linalg::LinearAlgebra`]
/// backend.
pub struct ImplicitProblem<F, J, M> {
    pub f: F,
    pub df: J,
    _m: core::marker::PhantomData<M>,
}

impl<T, S, F, J, M> Rhs<T, S> for ImplicitProblem<F, J, M>
where
    T: Scalar,
    S: State<T>,
    F: FnMut(T, &S, &mut S),
{
    fn call(&mut self, t: T, u: &S, du: &mut S) {
        (self.f)(t, u, du)
    }
}

impl<F, J, M> ImplicitProblem<F, J, M> {
    /// Evaluates the Jacobian operator `∂f/∂u` at `(t, u)`.
    pub fn jacobian<T, S>(&mut self, t: T, u: &S) -> M
    where
        J: FnMut(T, &S) -> M,
    {
        (self.df)(t, u)
    }
}

pub fn implicit_problem<F, J, M>(f: F, df: J) -> ImplicitProblem<F, J, M> {
    ImplicitProblem {
        f,
        df,
        _m: core::marker::PhantomData,
    }
}

/// An implicit-shaped problem that can also hand back its linearization —
/// DIRK's Newton stage (Jacobian form) and the implicit-operator form
/// both go through this.
pub trait ImplicitRhs<T: Scalar, S: State<T>, M>: Rhs<T, S> {
    fn jacobian(&mut self, t: T, u: &S) -> M;
}

impl<T, S, F, J, M> ImplicitRhs<T, S, M> for ImplicitProblem<F, J, M>
where
    T: Scalar,
    S: State<T>,
    F: FnMut(T, &S, &mut S),
    J: FnMut(T, &S) -> M,
{
    fn jacobian(&mut self, t: T, u: &S) -> M {
        (self.df)(t, u)
    }
}

/// `f_t(t)` returns a `t`-parameterized linear operator `L` with `f(t, u) =
/// L·u`; realized here as a Jacobian that ignores `u`.
pub fn implicit_operator_problem<F, Ft, M, T, S>(
    f: F,
    mut f_t: Ft,
) -> ImplicitProblem<F, impl FnMut(T, &S) -> M, M>
where
    Ft: FnMut(T) -> M,
{
    ImplicitProblem {
        f,
        df: move |t: T, _u: &S| f_t(t),
        _m: core::marker::PhantomData,
    }
}

/// Two-operator IMEX problem: `explicit_part` (e.g. diffusion `F_D`) handled
/// explicitly, `implicit_part` (e.g. reaction `F_R`) handled implicitly.
pub struct ImexProblem<Fd, Fr, Jr, M> {
    pub explicit_part: Fd,
    pub implicit_part: ImplicitProblem<Fr, Jr, M>,
}

pub fn imex_jacobian_problem<Fd, Fr, Jr, M>(
    explicit_part: Fd,
    fr: Fr,
    dfr: Jr,
) -> ImexProblem<Fd, Fr, Jr, M> {
    ImexProblem {
        explicit_part,
        implicit_part: implicit_problem(fr, dfr),
    }
}

pub fn imex_operator_problem<Fd, Fr, Ft, M, T, S>(
    explicit_part: Fd,
    fr: Fr,
    f_t: Ft,
) -> ImexProblem<Fd, Fr, impl FnMut(T, &S) -> M, M>
where
    Ft: FnMut(T) -> M,
{
    ImexProblem {
        explicit_part,
        implicit_part: implicit_operator_problem(fr, f_t),
    }
}

/// Three-operator IMEX problem for PIROCK-RDA: reaction `F_R` (implicit),
/// diffusion `F_D` (stabilized explicit) and advection `F_A` (explicit).
pub struct ImexRdaProblem<Fd, Fr, Jr, Fa, M> {
    pub diffusion: Fd,
    pub reaction: ImplicitProblem<Fr, Jr, M>,
    pub advection: Fa,
}

/// Builds a reaction-diffusion-advection problem from a Jacobian-form
/// reaction term, for PIROCK-RDA.
pub fn imex_rda_jacobian_problem<Fd, Fr, Jr, Fa, M>(
    diffusion: Fd,
    fr: Fr,
    dfr: Jr,
    advection: Fa,
) -> ImexRdaProblem<Fd, Fr, Jr, Fa, M> {
    ImexRdaProblem {
        diffusion,
        reaction: implicit_problem(fr, dfr),
        advection,
    }
}

/// `u̇ = L·u + N(t, u)`. `apply` supplies the caller's `exp(coeff·L)·v` action,
/// since the core must not embed a matrix-exponential implementation
/// itself.
pub struct LawsonProblem<L, N> {
    pub l: L,
    pub n: N,
}

pub fn lawson_problem<L, N>(l: L, n: N) -> LawsonProblem<L, N> {
    LawsonProblem { l, n }
}

/// Caller-supplied action of `exp(coeff * L)` on a state, used by Lawson and
/// exponential (ETD) Runge-Kutta since the core never computes a matrix
/// exponential itself.
pub trait ExpAction<T: Scalar, S: State<T>, L> {
    fn apply(&mut self, coeff: T, l: &L, v: &S) -> S;
}

impl<T, S, L, F> ExpAction<T, S, L> for F
where
    T: Scalar,
    S: State<T>,
    F: FnMut(T, &L, &S) -> S,
{
    fn apply(&mut self, coeff: T, l: &L, v: &S) -> S {
        self(coeff, l, v)
    }
}

/// Ordered tuple of sub-callables addressable by index: `problem(f1, ..,
/// fn)`. A `Box<dyn FnMut>` per entry is the idiomatic Rust answer to a
/// heterogeneous, runtime-indexable callable collection (the upstream's
/// compile-time tuple indexing doesn't have a zero-cost equivalent without a
/// bespoke macro, and this crate's composite problems are always small).
pub struct CompositeProblem<T, S> {
    parts: Vec<Box<dyn FnMut(T, &S, &mut S)>>,
}

impl<T: Scalar, S: State<T>> CompositeProblem<T, S> {
    pub fn new(parts: Vec<Box<dyn FnMut(T, &S, &mut S)>>) -> Self {
        Self { parts }
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Evaluates only the `i`-th sub-callable.
    pub fn call_at(&mut self, i: usize, t: T, u: &S, du: &mut S) {
        (self.parts[i])(t, u, du)
    }
}

impl<T: Scalar, S: State<T>> Rhs<T, S> for CompositeProblem<T, S> {
    fn call(&mut self, t: T, u: &S, du: &mut S) {
        let mut acc = u.clone() - u.clone();
        let mut tmp = acc.clone();
        for part in self.parts.iter_mut() {
            part(t, u, &mut tmp);
            acc = acc + tmp.clone();
        }
        *du = acc;
    }
}

pub fn problem<T: Scalar, S: State<T>>(parts: Vec<Box<dyn FnMut(T, &S, &mut S)>>) -> CompositeProblem<T, S> {
    CompositeProblem::new(parts)
}
