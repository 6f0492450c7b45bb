//! Polymorphic scalar/state/norm machinery.
//!
//! Rather than the upstream's separate
//! overloads for scalar states, `std::ranges::range` states and mesh-field
//! `array_range` states, every norm in this crate goes through one
//! `Components` accessor so a one-component slice and an N-component slice
//! share the same formula.

use num_traits::Float;

/// Any floating-point type usable as a time/coefficient scalar.
pub trait Scalar: Float + core::fmt::Debug + 'static {}
impl<T: Float + core::fmt::Debug + 'static> Scalar for T {}

/// A state vector (or bare scalar) that can be combined with `Δt`-scaled
/// stage derivatives: `u + Σ a_i * k_i`.
pub trait State<T: Scalar>:
    Clone + core::ops::Add<Self, Output = Self> + core::ops::Sub<Self, Output = Self> + core::ops::Mul<T, Output = Self>
{
}

impl<T: Scalar> State<T> for T {}

/// Newtype wrapper giving `Vec<T>` the arithmetic this crate needs without
/// violating the orphan rule on `std::ops` impls for a foreign type.
#[derive(Debug, Clone, PartialEq)]
pub struct VecState<T>(pub Vec<T>);

impl<T: Scalar> core::ops::Mul<T> for VecState<T> {
    type Output = VecState<T>;
    fn mul(self, rhs: T) -> VecState<T> {
        VecState(self.0.into_iter().map(|x| x * rhs).collect())
    }
}

impl<T: Scalar> core::ops::Add for VecState<T> {
    type Output = VecState<T>;
    fn add(self, rhs: VecState<T>) -> VecState<T> {
        VecState(self.0.iter().zip(rhs.0.iter()).map(|(a, b)| *a + *b).collect())
    }
}

impl<T: Scalar> core::ops::Sub for VecState<T> {
    type Output = VecState<T>;
    fn sub(self, rhs: VecState<T>) -> VecState<T> {
        VecState(self.0.iter().zip(rhs.0.iter()).map(|(a, b)| *a - *b).collect())
    }
}

impl<T: Scalar> State<T> for VecState<T> {}

impl<T> core::ops::Index<usize> for VecState<T> {
    type Output = T;
    fn index(&self, i: usize) -> &T {
        &self.0[i]
    }
}

impl<T> core::ops::IndexMut<usize> for VecState<T> {
    fn index_mut(&mut self, i: usize) -> &mut T {
        &mut self.0[i]
    }
}

impl<T> VecState<T> {
    pub fn len(&self) -> usize {
        self.0.len()
    }
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
    pub fn from_vec(v: Vec<T>) -> Self {
        VecState(v)
    }
    pub fn as_slice(&self) -> &[T] {
        &self.0
    }
}

/// Exposes the scalar components of a state so norms can treat a bare scalar
/// and a container uniformly.
pub trait Components<T: Scalar> {
    fn components(&self) -> &[T];
}

impl<T: Scalar> Components<T> for T {
    fn components(&self) -> &[T] {
        core::slice::from_ref(self)
    }
}

impl<T: Scalar> Components<T> for VecState<T> {
    fn components(&self) -> &[T] {
        self.as_slice()
    }
}

/// \|x\| for a bare scalar, the Euclidean norm for a container.
pub fn norm<T: Scalar, S: Components<T>>(x: &S) -> T {
    let c = x.components();
    if c.len() == 1 {
        return c[0].abs();
    }
    let sum = c.iter().fold(T::zero(), |acc, v| acc + *v * *v);
    sum.sqrt()
}

/// Weighted-RMS error used by every embedded/adaptive Runge-Kutta family:
/// `sqrt( (1/N) * Σ ( x_i / (atol + rtol * max(|y_i|, |z_i|)) )^2 )`.
pub fn norm_error<T: Scalar, S: Components<T>>(x: &S, y: &S, z: &S, atol: T, rtol: T) -> T {
    let xs = x.components();
    let ys = y.components();
    let zs = z.components();
    let n = xs.len();
    let sum = (0..n).fold(T::zero(), |acc, i| {
        let denom = atol + rtol * ys[i].abs().max(zs[i].abs());
        let r = xs[i].abs() / denom;
        acc + r * r
    });
    (sum / T::from(n).unwrap()).sqrt()
}

/// The fixed-denominator error estimate used by splitting methods:
/// `sqrt( (1/N) * Σ ( (unp1_i - unp1bis_i) / (1 + max(|un_i|, |unp1_i|)) )^2 )`.
pub fn error_estimate<T: Scalar, S: Components<T>>(un: &S, unp1: &S, unp1bis: &S) -> T {
    let us = un.components();
    let u1s = unp1.components();
    let u1bs = unp1bis.components();
    let n = us.len();
    let sum = (0..n).fold(T::zero(), |acc, i| {
        let denom = T::one() + us[i].abs().max(u1s[i].abs());
        let r = (u1s[i] - u1bs[i]).abs() / denom;
        acc + r * r
    });
    (sum / T::from(n).unwrap()).sqrt()
}

/// `init + Δt * Σ_{i=0}^{N-1} a_i * k_i`, the stage-combination primitive used
/// by every Runge-Kutta family (`tpl_inner_product` upstream).
pub fn inner_product<T: Scalar, S: State<T>>(a: &[T], k: &[S], init: S, dt: T) -> S {
    let mut acc = init;
    for i in 0..a.len() {
        acc = acc + k[i].clone() * (a[i] * dt);
    }
    acc
}
