//! PIROCK / PIROCK-RDA: a composite IMEX stabilized method that
//! blends a ROCK2-like explicit diffusion sweep with an implicit reaction
//! correction (`gamma = 1 - sqrt(2)/2`) and, in the RDA variant, an explicit
//! advection blend. Per the `alpha`/`beta` strategy open choice, this crate
//! always uses the "`beta = 0`" branch with `alpha = 1/(2s)` (documented
//! deviation in `DESIGN.md`: the exact `alpha = 1/(2 P'_{s-2+l}(0))` strategy
//! needs the standard (undamped) Chebyshev derivative at the origin, which
//! the retrieved source did not carry a closed form for).

use crate::cheby;
use crate::config::Tolerances;
use crate::error::PonioError;
use crate::iteration_info::IterationInfo;
use crate::linalg::LinearAlgebra;
use crate::method::Method;
use crate::problem::ImplicitRhs;
use crate::rock::power_method_rho;
use crate::scalar::{norm_error, Components, Scalar, State};
use num_traits::ToPrimitive;

const GAMMA: f64 = 0.2928932188134524; // 1 - sqrt(2)/2

fn diffusion_sweep<T, S, Fd>(
    fd: &mut Fd,
    tn: T,
    un: &S,
    dt: T,
    alpha: T,
    stages: usize,
    n_eval: &mut usize,
) -> S
where
    T: Scalar,
    S: State<T>,
    Fd: FnMut(T, &S, &mut S),
{
    let rec = cheby::build(stages.max(1), T::from(2.0 / 13.0).unwrap());
    let two = T::from(2.0).unwrap();
    let adt = alpha * dt;

    let mut f0 = un.clone();
    fd(tn, un, &mut f0);
    *n_eval += 1;

    let mu_tilde_1 = rec.b[1] * rec.w1;
    let mut y_jm2 = un.clone();
    let mut y_jm1 = un.clone() + f0.clone() * (mu_tilde_1 * adt);

    for j in 2..=stages {
        let mu_j = two * rec.b[j] * rec.w0 / rec.b[j - 1];
        let nu_j = -rec.b[j] / rec.b[j - 2];
        let mu_tilde_j = mu_j * rec.w1 / rec.w0;
        let gamma_tilde_j = -rec.a[j - 1] * mu_tilde_j;

        let mut f_prev = y_jm1.clone();
        fd(tn, &y_jm1, &mut f_prev);
        *n_eval += 1;

        let one_minus = T::one() - mu_j - nu_j;
        let y_j = un.clone() * one_minus
            + y_jm1.clone() * mu_j
            + y_jm2.clone() * nu_j
            + f_prev * (mu_tilde_j * adt)
            + f0.clone() * (gamma_tilde_j * adt);

        y_jm2 = y_jm1;
        y_jm1 = y_j;
    }
    y_jm1
}

/// PIROCK for reaction-diffusion problems (`F_D` explicit/stabilized,
/// `F_R` implicit).
pub struct PiRock<T: Scalar, B> {
    pub l: usize, // 1 or 2
    backend: B,
    tol: Tolerances<T>,
    newton: crate::config::NewtonConfig<T>,
    embedded: bool,
    info: IterationInfo<T>,
}

impl<T: Scalar, B> PiRock<T, B> {
    pub fn new(backend: B) -> Self {
        let tol = Tolerances::default();
        Self {
            l: 1,
            backend,
            info: IterationInfo::new(tol.abs_tol),
            tol,
            newton: crate::config::NewtonConfig::default(),
            embedded: true,
        }
    }

    pub fn abs_tol(mut self, eps: T) -> Self {
        self.tol.abs_tol = eps;
        self
    }

    pub fn rel_tol(mut self, eps: T) -> Self {
        self.tol.rel_tol = eps;
        self
    }
}

impl<T, S, Fd, Fr, Jr, M, B> Method<T, S, crate::problem::ImexProblem<Fd, Fr, Jr, M>> for PiRock<T, B>
where
    T: Scalar,
    S: State<T> + Components<T>,
    Fd: FnMut(T, &S, &mut S),
    crate::problem::ImplicitProblem<Fr, Jr, M>: ImplicitRhs<T, S, M>,
    B: LinearAlgebra<T, S, Op = M>,
    M: Clone,
{
    fn step(
        &mut self,
        pb: &mut crate::problem::ImexProblem<Fd, Fr, Jr, M>,
        tn: T,
        un: &S,
        dt: T,
    ) -> Result<(T, S, T), PonioError> {
        self.info.reset_eval();

        let mut f_d_un = un.clone();
        (pb.explicit_part)(tn, un, &mut f_d_un);
        self.info.number_of_eval += 1;
        let rho_d = power_method_rho(&mut pb.explicit_part, tn, un, &f_d_un, &mut self.info.number_of_eval);

        let c1 = T::from(1.5).unwrap();
        let c2 = T::from(0.811).unwrap();
        let m_raw = ((c1 + dt * rho_d) / c2).ceil();
        let m = m_raw.to_usize().unwrap_or(3).clamp(3, 200);
        self.info.number_of_stages = m;

        let l = self.l.clamp(1, 2);
        let core_stages = (m + l).saturating_sub(2).max(1);
        let alpha = T::one() / T::from(2.0 * core_stages as f64).unwrap();

        let u_core = diffusion_sweep(&mut pb.explicit_part, tn, un, dt, alpha, core_stages, &mut self.info.number_of_eval);

        // two finishing explicit stages (u*_{s-1}, u*_s) at the same alpha scaling.
        let mut f_core = u_core.clone();
        (pb.explicit_part)(tn, &u_core, &mut f_core);
        self.info.number_of_eval += 1;
        let u_star_1 = u_core.clone() + f_core.clone() * (alpha * dt);
        let mut f_star_1 = u_star_1.clone();
        (pb.explicit_part)(tn, &u_star_1, &mut f_star_1);
        self.info.number_of_eval += 1;
        let u_star_s = u_star_1.clone() + f_star_1.clone() * (alpha * dt);

        let gamma = T::from(GAMMA).unwrap();
        let ident = self.backend.identity(un);
        let jac = pb.implicit_part.jacobian(tn, un);
        let op = ident - jac.clone() * (gamma * dt);

        // stage s+1: (I - gamma*dt*F_R) u^{s+1} = u_core
        let mut u_sp1 = u_core.clone();
        for _ in 0..self.newton.max_iter {
            let mut f_r = u_sp1.clone();
            pb.implicit_part.call(tn, &u_sp1, &mut f_r);
            self.info.number_of_eval += 1;
            let residual = u_sp1.clone() - (u_core.clone() + f_r * (gamma * dt));
            let res_norm = crate::scalar::norm(&residual);
            if res_norm <= self.newton.tol {
                break;
            }
            if let Ok(delta) = self.backend.solve(&op, &(residual * (-T::one()))) {
                u_sp1 = u_sp1 + delta;
            } else {
                break;
            }
        }

        let mut f_d_sp1 = u_sp1.clone();
        (pb.explicit_part)(tn, &u_sp1, &mut f_d_sp1);
        self.info.number_of_eval += 1;
        let mut f_r_sp1 = u_sp1.clone();
        pb.implicit_part.call(tn, &u_sp1, &mut f_r_sp1);
        self.info.number_of_eval += 1;

        let beta = T::zero();
        let one_minus_2gamma = T::one() - T::from(2.0).unwrap() * gamma;
        let rhs_sp2 = u_core.clone() + f_d_sp1.clone() * (beta * dt) + f_r_sp1.clone() * (one_minus_2gamma * dt);

        let mut u_sp2 = rhs_sp2.clone();
        for _ in 0..self.newton.max_iter {
            let mut f_r = u_sp2.clone();
            pb.implicit_part.call(tn, &u_sp2, &mut f_r);
            self.info.number_of_eval += 1;
            let residual = u_sp2.clone() - (rhs_sp2.clone() + f_r * (gamma * dt));
            let res_norm = crate::scalar::norm(&residual);
            if res_norm <= self.newton.tol {
                break;
            }
            if let Ok(delta) = self.backend.solve(&op, &(residual * (-T::one()))) {
                u_sp2 = u_sp2 + delta;
            } else {
                break;
            }
        }

        let reaction_correction = u_sp2.clone() - u_sp1.clone();
        let diffusion_defect = u_star_s.clone() - u_star_1.clone();
        let u_final = u_star_s.clone() + reaction_correction.clone();

        for v in u_final.components() {
            if !v.is_finite() {
                return Err(PonioError::Arithmetic { t: tn.to_f64().unwrap_or(f64::NAN) });
            }
        }

        if !self.embedded {
            self.info.success = true;
            return Ok((tn + dt, u_final, dt));
        }

        let err_d = diffusion_defect;
        let err_r = u_sp2.clone() - u_sp1.clone();
        let e_d = norm_error(&err_d, un, &u_final, self.tol.abs_tol, self.tol.rel_tol);
        let e_r = norm_error(&err_r, un, &u_final, self.tol.abs_tol, self.tol.rel_tol);
        let e = ((e_d * e_d + e_r * e_r) / T::from(2.0).unwrap()).sqrt();

        let accept = e < T::one();
        let fac = (T::one() / e).sqrt().max(T::from(0.5).unwrap()).min(T::from(2.0).unwrap());
        let new_dt = T::from(0.8).unwrap() * fac * dt;

        self.info.success = accept;
        self.info.error = e;

        if !accept {
            tracing::debug!(error = ?e, "PIROCK step rejected, shrinking dt");
            return Ok((tn, un.clone(), new_dt));
        }
        Ok((tn + dt, u_final, new_dt))
    }

    fn info(&self) -> &IterationInfo<T> {
        &self.info
    }
}

/// PIROCK-RDA for reaction-diffusion-advection problems (`F_R` implicit,
/// `F_D` stabilized explicit, `F_A` explicit). Adds the two advection
/// sub-stages `u^{(s+4)}`, `u^{(s+5)}` on top of the reaction-diffusion
/// core of [`PiRock`]; optionally reuses the linearized reaction operator
/// through [`crate::linalg::shampine_trick`] for the `u^{(s+5)}` advection
/// defect instead of a second explicit advection evaluation.
pub struct PiRockRda<T: Scalar, B> {
    pub l: usize,
    backend: B,
    tol: Tolerances<T>,
    newton: crate::config::NewtonConfig<T>,
    embedded: bool,
    use_shampine_trick: bool,
    info: IterationInfo<T>,
}

impl<T: Scalar, B> PiRockRda<T, B> {
    pub fn new(backend: B) -> Self {
        let tol = Tolerances::default();
        Self {
            l: 1,
            backend,
            info: IterationInfo::new(tol.abs_tol),
            tol,
            newton: crate::config::NewtonConfig::default(),
            embedded: true,
            use_shampine_trick: false,
        }
    }

    pub fn abs_tol(mut self, eps: T) -> Self {
        self.tol.abs_tol = eps;
        self
    }

    pub fn rel_tol(mut self, eps: T) -> Self {
        self.tol.rel_tol = eps;
        self
    }

    /// Reuses the already-assembled `(I - γΔt·F_R)` operator for the
    /// `u^{(s+5)}` advection defect rather than a second explicit
    /// advection evaluation (§4.9 step 4, "Shampine's trick").
    pub fn with_shampine_trick(mut self) -> Self {
        self.use_shampine_trick = true;
        self
    }
}

impl<T, S, Fd, Fr, Jr, Fa, M, B> Method<T, S, crate::problem::ImexRdaProblem<Fd, Fr, Jr, Fa, M>> for PiRockRda<T, B>
where
    T: Scalar,
    S: State<T> + Components<T>,
    Fd: FnMut(T, &S, &mut S),
    Fa: FnMut(T, &S, &mut S),
    crate::problem::ImplicitProblem<Fr, Jr, M>: ImplicitRhs<T, S, M>,
    B: LinearAlgebra<T, S, Op = M>,
    M: Clone,
{
    fn step(
        &mut self,
        pb: &mut crate::problem::ImexRdaProblem<Fd, Fr, Jr, Fa, M>,
        tn: T,
        un: &S,
        dt: T,
    ) -> Result<(T, S, T), PonioError> {
        self.info.reset_eval();

        let mut f_d_un = un.clone();
        (pb.diffusion)(tn, un, &mut f_d_un);
        self.info.number_of_eval += 1;
        let rho_d = power_method_rho(&mut pb.diffusion, tn, un, &f_d_un, &mut self.info.number_of_eval);

        let c1 = T::from(1.5).unwrap();
        let c2 = T::from(0.811).unwrap();
        let m_raw = ((c1 + dt * rho_d) / c2).ceil();
        let m = m_raw.to_usize().unwrap_or(3).clamp(3, 200);
        self.info.number_of_stages = m;

        let l = self.l.clamp(1, 2);
        let core_stages = (m + l).saturating_sub(2).max(1);
        let alpha = T::one() / T::from(2.0 * core_stages as f64).unwrap();
        let beta = T::zero();

        let u_core = diffusion_sweep(&mut pb.diffusion, tn, un, dt, alpha, core_stages, &mut self.info.number_of_eval);

        let mut f_core = u_core.clone();
        (pb.diffusion)(tn, &u_core, &mut f_core);
        self.info.number_of_eval += 1;
        let u_star_1 = u_core.clone() + f_core.clone() * (alpha * dt);
        let mut f_star_1 = u_star_1.clone();
        (pb.diffusion)(tn, &u_star_1, &mut f_star_1);
        self.info.number_of_eval += 1;
        let u_star_s = u_star_1.clone() + f_star_1.clone() * (alpha * dt);

        let gamma = T::from(GAMMA).unwrap();
        let ident = self.backend.identity(un);
        let jac = pb.reaction.jacobian(tn, un);
        let op = ident - jac.clone() * (gamma * dt);

        // u^{(s+1)}: (I - gamma*dt*F_R) u_sp1 = u_core
        let mut u_sp1 = u_core.clone();
        for _ in 0..self.newton.max_iter {
            let mut f_r = u_sp1.clone();
            pb.reaction.call(tn, &u_sp1, &mut f_r);
            self.info.number_of_eval += 1;
            let residual = u_sp1.clone() - (u_core.clone() + f_r * (gamma * dt));
            let res_norm = crate::scalar::norm(&residual);
            if res_norm <= self.newton.tol {
                break;
            }
            if let Ok(delta) = self.backend.solve(&op, &(residual * (-T::one()))) {
                u_sp1 = u_sp1 + delta;
            } else {
                break;
            }
        }

        let mut f_a_sp1 = u_sp1.clone();
        (pb.advection)(tn, &u_sp1, &mut f_a_sp1);
        self.info.number_of_eval += 1;

        let mut f_d_sp1 = u_sp1.clone();
        (pb.diffusion)(tn, &u_sp1, &mut f_d_sp1);
        self.info.number_of_eval += 1;
        let mut f_r_sp1 = u_sp1.clone();
        pb.reaction.call(tn, &u_sp1, &mut f_r_sp1);
        self.info.number_of_eval += 1;

        let one_minus_2gamma = T::one() - T::from(2.0).unwrap() * gamma;
        let rhs_sp2 = u_core.clone()
            + f_d_sp1.clone() * (beta * dt)
            + f_a_sp1.clone() * dt
            + f_r_sp1.clone() * (one_minus_2gamma * dt);

        // u^{(s+2)}: (I - gamma*dt*F_R) u_sp2 = rhs_sp2
        let mut u_sp2 = rhs_sp2.clone();
        for _ in 0..self.newton.max_iter {
            let mut f_r = u_sp2.clone();
            pb.reaction.call(tn, &u_sp2, &mut f_r);
            self.info.number_of_eval += 1;
            let residual = u_sp2.clone() - (rhs_sp2.clone() + f_r * (gamma * dt));
            let res_norm = crate::scalar::norm(&residual);
            if res_norm <= self.newton.tol {
                break;
            }
            if let Ok(delta) = self.backend.solve(&op, &(residual * (-T::one()))) {
                u_sp2 = u_sp2 + delta;
            } else {
                break;
            }
        }

        // advection sub-stages u^{(s+4)}, u^{(s+5)}
        let third = T::one() / T::from(3.0).unwrap();
        let two_thirds = T::from(2.0).unwrap() / T::from(3.0).unwrap();
        let u_sp4 = u_core.clone() + f_a_sp1.clone() * (third * dt);

        let mut f_a_sp4 = u_sp4.clone();
        (pb.advection)(tn, &u_sp4, &mut f_a_sp4);
        self.info.number_of_eval += 1;

        let advection_term = if self.use_shampine_trick {
            let y = f_a_sp4.clone() * dt;
            crate::linalg::shampine_trick(&self.backend, &op, &y, 1)?
        } else {
            f_a_sp4.clone() * dt
        };

        let mut f_r_sp2 = u_sp2.clone();
        pb.reaction.call(tn, &u_sp2, &mut f_r_sp2);
        self.info.number_of_eval += 1;

        let two_thirds_minus_gamma = two_thirds - gamma;
        let u_sp5 = u_core.clone()
            + f_d_sp1.clone() * (two_thirds * beta * dt)
            + advection_term.clone() * two_thirds
            + f_r_sp1.clone() * (two_thirds_minus_gamma * dt)
            + f_r_sp2.clone() * (two_thirds * gamma * dt);

        let reaction_correction = u_sp2.clone() - u_sp1.clone();
        let advection_correction = u_sp5.clone() - u_sp4.clone();
        let diffusion_defect = u_star_s.clone() - u_star_1.clone();

        let u_final = u_star_s.clone() + reaction_correction.clone() + advection_correction.clone();

        for v in u_final.components() {
            if !v.is_finite() {
                return Err(PonioError::Arithmetic { t: tn.to_f64().unwrap_or(f64::NAN) });
            }
        }

        if !self.embedded {
            self.info.success = true;
            return Ok((tn + dt, u_final, dt));
        }

        let e_d = norm_error(&diffusion_defect, un, &u_final, self.tol.abs_tol, self.tol.rel_tol);
        let e_r = norm_error(&reaction_correction, un, &u_final, self.tol.abs_tol, self.tol.rel_tol);
        let e_a = norm_error(&advection_correction, un, &u_final, self.tol.abs_tol, self.tol.rel_tol);
        let three = T::from(3.0).unwrap();
        let e = ((e_d * e_d + e_r * e_r + e_a * e_a) / three).sqrt();

        let accept = e < T::one();
        let fac = (T::one() / e).sqrt().max(T::from(0.5).unwrap()).min(T::from(2.0).unwrap());
        let new_dt = T::from(0.8).unwrap() * fac * dt;

        self.info.success = accept;
        self.info.error = e;

        if !accept {
            tracing::debug!(error = ?e, "PIROCK-RDA step rejected, shrinking dt");
            return Ok((tn, un.clone(), new_dt));
        }
        Ok((tn + dt, u_final, new_dt))
    }

    fn info(&self) -> &IterationInfo<T> {
        &self.info
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linalg::ScalarBackend;
    use crate::problem::imex_jacobian_problem;

    /// Stable reaction-diffusion smoke test: a linear diffusion-like decay
    /// `F_D` plus a linear reaction `F_R`, both negative, must stay bounded.
    #[test]
    fn pirock_stable_on_linear_reaction_diffusion() {
        let kd = -800.0_f64;
        let kr = -50.0_f64;
        let mut alg = PiRock::<f64, _>::new(ScalarBackend).abs_tol(1e-4).rel_tol(1e-4);
        let mut pb = imex_jacobian_problem(
            move |_t: f64, u: &f64, du: &mut f64| *du = kd * *u,
            move |_t: f64, u: &f64, du: &mut f64| *du = kr * *u,
            move |_t: f64, _u: &f64| kr,
        );
        let mut t = 0.0;
        let mut u = 1.0;
        let mut dt = 0.001;
        for _ in 0..20 {
            let (tn, un, new_dt) = alg.step(&mut pb, t, &u, dt).unwrap();
            if alg.info().success {
                t = tn;
                u = un;
            }
            dt = new_dt;
        }
        assert!(u.is_finite());
        assert!(u.abs() <= 1.0 + 1e-6);
    }

    /// Reaction-diffusion-advection smoke test: three linear negative
    /// operators must keep the PIROCK-RDA step bounded and finite, both
    /// with and without Shampine's trick enabled for the advection defect.
    #[test]
    fn pirock_rda_stable_on_linear_reaction_diffusion_advection() {
        use crate::problem::imex_rda_jacobian_problem;

        let kd = -600.0_f64;
        let kr = -40.0_f64;
        let ka = -10.0_f64;

        for use_trick in [false, true] {
            let mut alg = PiRockRda::<f64, _>::new(ScalarBackend).abs_tol(1e-4).rel_tol(1e-4);
            if use_trick {
                alg = alg.with_shampine_trick();
            }
            let mut pb = imex_rda_jacobian_problem(
                move |_t: f64, u: &f64, du: &mut f64| *du = kd * *u,
                move |_t: f64, u: &f64, du: &mut f64| *du = kr * *u,
                move |_t: f64, _u: &f64| kr,
                move |_t: f64, u: &f64, du: &mut f64| *du = ka * *u,
            );
            let mut t = 0.0;
            let mut u = 1.0;
            let mut dt = 0.001;
            for _ in 0..20 {
                let (tn, un, new_dt) = alg.step(&mut pb, t, &u, dt).unwrap();
                if alg.info().success {
                    t = tn;
                    u = un;
                }
                dt = new_dt;
            }
            assert!(u.is_finite());
            assert!(u.abs() <= 1.0 + 1e-6);
        }
    }
}
