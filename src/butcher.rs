//! Butcher tableau.
//!
//! Coefficients are stored as `f64` literals — lower-triangular `A`, weights
//! `b`, nodes `c`, optional embedded weights `b2` — and converted to the
//! integration scalar `T` at stage-dispatch time. `S` (the stage count) is a
//! const generic so a table is a plain compile-time-sized value, stored as
//! a const array rather than a heap-allocated vector.

use crate::scalar::Scalar;

/// Immutable coefficient record for a Runge-Kutta method. Serializable
/// (not deserializable: `id` is a `&'static str`, and built-in tables are
/// meant to be referenced by the constants below rather than reconstructed).
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ButcherTable<const S: usize> {
    pub a: [[f64; S]; S],
    pub b: [f64; S],
    pub c: [f64; S],
    pub b2: Option<[f64; S]>,
    pub order: usize,
    pub id: &'static str,
}

impl<const S: usize> ButcherTable<S> {
    pub const fn stages(&self) -> usize {
        S
    }

    pub fn is_embedded(&self) -> bool {
        self.b2.is_some()
    }

    pub fn a<T: Scalar>(&self, i: usize, j: usize) -> T {
        T::from(self.a[i][j]).unwrap()
    }

    pub fn b<T: Scalar>(&self, i: usize) -> T {
        T::from(self.b[i]).unwrap()
    }

    pub fn b2<T: Scalar>(&self, i: usize) -> T {
        T::from(self.b2.expect("table has no embedded weights")[i]).unwrap()
    }

    pub fn c<T: Scalar>(&self, i: usize) -> T {
        T::from(self.c[i]).unwrap()
    }
}

/// Classical RK4, order 4, 4 stages, not embedded.
pub const RK4: ButcherTable<4> = ButcherTable {
    a: [
        [0.0, 0.0, 0.0, 0.0],
        [0.5, 0.0, 0.0, 0.0],
        [0.0, 0.5, 0.0, 0.0],
        [0.0, 0.0, 1.0, 0.0],
    ],
    b: [1.0 / 6.0, 1.0 / 3.0, 1.0 / 3.0, 1.0 / 6.0],
    c: [0.0, 0.5, 0.5, 1.0],
    b2: None,
    order: 4,
    id: "RK4",
};

/// Heun's third-order method, 3 stages, not embedded.
pub const RK3_HEUN: ButcherTable<3> = ButcherTable {
    a: [
        [0.0, 0.0, 0.0],
        [1.0 / 3.0, 0.0, 0.0],
        [0.0, 2.0 / 3.0, 0.0],
    ],
    b: [0.25, 0.0, 0.75],
    c: [0.0, 1.0 / 3.0, 2.0 / 3.0],
    b2: None,
    order: 3,
    id: "RK3",
};

/// Heun-Euler embedded 2(1) pair, used as the smallest embedded smoke test.
pub const HEUN_EULER21: ButcherTable<2> = ButcherTable {
    a: [[0.0, 0.0], [1.0, 0.0]],
    b: [0.5, 0.5],
    c: [0.0, 1.0],
    b2: Some([1.0, 0.0]),
    order: 2,
    id: "HeunEuler21",
};

/// Dormand-Prince embedded 5(4) pair (`ode45`'s tableau), 7 stages, FSAL.
pub const DOPRI5: ButcherTable<7> = ButcherTable {
    a: [
        [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
        [1.0 / 5.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
        [3.0 / 40.0, 9.0 / 40.0, 0.0, 0.0, 0.0, 0.0, 0.0],
        [44.0 / 45.0, -56.0 / 15.0, 32.0 / 9.0, 0.0, 0.0, 0.0, 0.0],
        [
            19372.0 / 6561.0,
            -25360.0 / 2187.0,
            64448.0 / 6561.0,
            -212.0 / 729.0,
            0.0,
            0.0,
            0.0,
        ],
        [
            9017.0 / 3168.0,
            -355.0 / 33.0,
            46732.0 / 5247.0,
            49.0 / 176.0,
            -5103.0 / 18656.0,
            0.0,
            0.0,
        ],
        [
            35.0 / 384.0,
            0.0,
            500.0 / 1113.0,
            125.0 / 192.0,
            -2187.0 / 6784.0,
            11.0 / 84.0,
            0.0,
        ],
    ],
    b: [
        35.0 / 384.0,
        0.0,
        500.0 / 1113.0,
        125.0 / 192.0,
        -2187.0 / 6784.0,
        11.0 / 84.0,
        0.0,
    ],
    c: [0.0, 1.0 / 5.0, 3.0 / 10.0, 4.0 / 5.0, 8.0 / 9.0, 1.0, 1.0],
    b2: Some([
        5179.0 / 57600.0,
        0.0,
        7571.0 / 16695.0,
        393.0 / 640.0,
        -92097.0 / 339200.0,
        187.0 / 2100.0,
        1.0 / 40.0,
    ]),
    order: 5,
    id: "DOPRI5",
};

/// 2-stage, order 2, L-stable SDIRK (Norsett), `gamma = 1 - sqrt(2)/2`; the
/// DIRK table used by the fixed-step DIRK smoke tests.
pub const SDIRK2: ButcherTable<2> = ButcherTable {
    a: [
        [0.2928932188134524, 0.0],
        [1.0 - 2.0 * 0.2928932188134524, 0.2928932188134524],
    ],
    b: [1.0 - 0.2928932188134524, 0.2928932188134524],
    c: [0.2928932188134524, 1.0],
    b2: None,
    order: 2,
    id: "SDIRK2",
};

#[cfg(test)]
mod tests {
    use super::*;

    fn row_sums_match_c<const S: usize>(t: &ButcherTable<S>) {
        for i in 0..S {
            let sum: f64 = t.a[i].iter().sum();
            assert!((sum - t.c[i]).abs() < 1e-12, "{}: c[{i}] mismatch", t.id);
        }
    }

    #[test]
    fn consistency_conditions() {
        row_sums_match_c(&RK4);
        row_sums_match_c(&RK3_HEUN);
        row_sums_match_c(&HEUN_EULER21);
        row_sums_match_c(&DOPRI5);
        row_sums_match_c(&SDIRK2);
        assert!((RK4.b.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!((DOPRI5.b2.unwrap().iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!((SDIRK2.b.iter().sum::<f64>() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn sdirk2_is_order_two() {
        let g = 0.2928932188134524_f64;
        let order2 = 2.0 * g - g * g;
        assert!((order2 - 0.5).abs() < 1e-12);
    }
}
