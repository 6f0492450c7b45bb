//! Per-step diagnostics.
//!
//! Ported from `iteration_info.hpp`. `number_of_eval` is reset at the start
//! of every step attempt for dynamic-stage algorithms (ROCK/PIROCK/DIRK),
//! but set once at construction and left untouched for static fixed-stage
//! algorithms (classical explicit RK), matching the asymmetry observed
//! between `erk.hpp` (sets it once) and `dirk.hpp`/`rock.hpp` (reset per
//! step).

use crate::scalar::Scalar;

#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IterationInfo<T: Scalar> {
    pub error: T,
    pub success: bool,
    pub is_step: bool,
    pub number_of_stages: usize,
    pub number_of_eval: usize,
    pub tolerance: T,
}

impl<T: Scalar> IterationInfo<T> {
    pub fn new(tolerance: T) -> Self {
        Self {
            error: T::zero(),
            success: true,
            is_step: true,
            number_of_stages: 0,
            number_of_eval: 0,
            tolerance,
        }
    }

    pub fn reset_eval(&mut self) {
        self.number_of_eval = 0;
    }
}

impl<T: Scalar> Default for IterationInfo<T> {
    fn default() -> Self {
        Self::new(T::from(crate::config::default_config::TOL).unwrap())
    }
}
