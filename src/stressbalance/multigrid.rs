//! Nonlinear multigrid for the Blatter-Pattyn system
//!
//! Full approximation scheme (FAS) V-cycles with damped Newton steps as the
//! smoother. On level `l` the solver works on `F_l(u) = b_l`:
//!
//! 1. pre-smooth with Newton steps, solving each linearization only roughly
//!    with a few Krylov iterations;
//! 2. inject the iterate to the coarse grid (`u_c0`) and restrict the
//!    defect `b - F(u)` with the transpose of prolongation;
//! 3. solve `F_c(u_c) = F_c(u_c0) + Pᵀ(b - F(u))` recursively;
//! 4. correct `u += P(u_c - u_c0)` away from Dirichlet nodes;
//! 5. post-smooth.
//!
//! The coarsest level takes Newton steps with accurate linear solves.

use super::assembly::{add_flat, field_norm, to_flat, zero_velocity, BlatterAssembler, VelocityField};
use crate::config::StressBalanceConfig;
use crate::error::{ConfigError, SolverError};
use crate::grid::hierarchy::{inject, prolong, restrict_residual, GridHierarchy};
use crate::grid::level::GridLevel;
use crate::linalg::{DirectSolver, KrylovMethod, Solver, SolverStats};
use nalgebra::Vector2;

/// Largest system handed to the dense LU solver on the coarsest level
const DIRECT_SOLVE_LIMIT: usize = 2000;

/// Convergence history of one nonlinear solve
#[derive(Debug, Clone, Default)]
pub struct SolveStats {
    pub cycles: usize,
    pub newton_iterations: usize,
    pub linear_iterations: usize,
    /// Newton steps whose line search did not reduce the defect
    pub line_search_failures: usize,
    pub initial_residual: f64,
    pub final_residual: f64,
    pub converged: bool,
}

/// Nonlinear multigrid driver for one stress-balance solve
pub struct MultigridSolver<'a> {
    assembler: &'a BlatterAssembler<'a>,
    config: &'a StressBalanceConfig,
    krylov: KrylovMethod,
}

impl<'a> MultigridSolver<'a> {
    pub fn new(assembler: &'a BlatterAssembler<'a>, config: &'a StressBalanceConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            assembler,
            config,
            krylov: KrylovMethod::from_name(&config.linear_solver)?,
        })
    }

    /// `F(u) - b` on `level`
    fn defect(&self, level: &GridLevel, u: &VelocityField, b: &VelocityField) -> VelocityField {
        let mut r = self.assembler.residual(level, u);
        for (ri, bi) in r.as_mut_slice().iter_mut().zip(b.iter()) {
            *ri -= bi;
        }
        r
    }

    /// Solve `F(u) = 0` on the finest level of `hierarchy`, starting from `u`
    pub fn solve(&self, hierarchy: &GridHierarchy, u: &mut VelocityField) -> Result<SolveStats, SolverError> {
        let fine = hierarchy.finest();
        let b = zero_velocity(fine);
        let mut stats = SolveStats::default();

        let r0 = field_norm(&self.assembler.residual(fine, u));
        if !r0.is_finite() {
            return Err(SolverError::NonFinite { level: 0 });
        }
        stats.initial_residual = r0;
        stats.final_residual = r0;
        if r0 <= self.config.atol {
            log::debug!("initial residual {:.3e} already below tolerance", r0);
            stats.converged = true;
            return Ok(stats);
        }

        for cycle in 1..=self.config.max_cycles {
            self.fas_cycle(hierarchy, 0, u, &b, &mut stats)?;

            let r = field_norm(&self.assembler.residual(fine, u));
            if !r.is_finite() {
                return Err(SolverError::NonFinite { level: 0 });
            }
            stats.cycles = cycle;
            stats.final_residual = r;
            log::debug!("multigrid cycle {:2}: |F| = {:.3e} (rel {:.3e})", cycle, r, r / r0);

            if r <= self.config.rtol * r0 || r <= self.config.atol {
                stats.converged = true;
                log::info!(
                    "stress balance converged in {} cycles ({} Newton, {} linear iterations), |F| = {:.3e}",
                    stats.cycles,
                    stats.newton_iterations,
                    stats.linear_iterations,
                    r
                );
                return Ok(stats);
            }
        }

        Err(SolverError::Diverged {
            iterations: self.config.max_cycles,
            residual_norm: stats.final_residual,
        })
    }

    fn fas_cycle(
        &self,
        hierarchy: &GridHierarchy,
        l: usize,
        u: &mut VelocityField,
        b: &VelocityField,
        stats: &mut SolveStats,
    ) -> Result<(), SolverError> {
        let level = hierarchy.level(l);

        if l + 1 == hierarchy.n_levels() {
            for it in 0..self.config.coarse_newton_iterations {
                let r = self.newton_step(l, level, u, b, true, it, stats)?;
                if r <= self.config.atol {
                    break;
                }
            }
            return Ok(());
        }

        for it in 0..self.config.pre_smooth {
            self.newton_step(l, level, u, b, false, it, stats)?;
        }

        let coarse = hierarchy.level(l + 1);
        let dims = coarse.dims();
        let mut defect = self.defect(level, u, b);
        defect.as_mut_slice().iter_mut().for_each(|d| *d = -*d);

        let u_c0 = inject(u, dims);
        let mut b_c = restrict_residual(&defect, dims, Vector2::zeros());
        let f_c0 = self.assembler.residual(coarse, &u_c0);
        for j in 0..coarse.my {
            for i in 0..coarse.mx {
                for k in 0..coarse.mz {
                    // coarse Dirichlet rows keep their injected values
                    if coarse.is_dirichlet(i, j, k) {
                        b_c[(i, j, k)] = Vector2::zeros();
                    }
                    b_c[(i, j, k)] += f_c0[(i, j, k)];
                }
            }
        }

        let mut u_c = u_c0.clone();
        self.fas_cycle(hierarchy, l + 1, &mut u_c, &b_c, stats)?;

        for (e, e0) in u_c.as_mut_slice().iter_mut().zip(u_c0.iter()) {
            *e -= e0;
        }
        let correction = prolong(&u_c, level.dims(), Vector2::zeros());
        for j in 0..level.my {
            for i in 0..level.mx {
                for k in 0..level.mz {
                    if !level.is_dirichlet(i, j, k) {
                        u[(i, j, k)] += correction[(i, j, k)];
                    }
                }
            }
        }

        for it in 0..self.config.post_smooth {
            self.newton_step(l, level, u, b, false, it, stats)?;
        }
        Ok(())
    }

    fn linear_solve(&self, jac: &sprs::CsMat<f64>, rhs: &[f64], coarse: bool) -> (Vec<f64>, SolverStats) {
        if coarse && rhs.len() <= DIRECT_SOLVE_LIMIT {
            DirectSolver::new().solve(jac, rhs)
        } else if coarse {
            let max_iterations = rhs.len().max(1000);
            self.krylov.solve(jac, rhs, max_iterations, self.config.linear_rtol)
        } else {
            self.krylov
                .solve(jac, rhs, self.config.smoother_linear_iterations, self.config.linear_rtol)
        }
    }

    /// One damped Newton step for `F(u) = b`; returns the new defect norm
    #[allow(clippy::too_many_arguments)]
    fn newton_step(
        &self,
        l: usize,
        level: &GridLevel,
        u: &mut VelocityField,
        b: &VelocityField,
        coarse: bool,
        newton_iteration: usize,
        stats: &mut SolveStats,
    ) -> Result<f64, SolverError> {
        let r = self.defect(level, u, b);
        let r_norm = field_norm(&r);
        if !r_norm.is_finite() {
            return Err(SolverError::NonFinite { level: l });
        }
        if r_norm == 0.0 {
            return Ok(0.0);
        }

        let jac = self.assembler.jacobian(level, u);
        let rhs: Vec<f64> = to_flat(&r).iter().map(|x| -x).collect();
        let (delta, lin) = self.linear_solve(&jac, &rhs, coarse);
        stats.newton_iterations += 1;
        stats.linear_iterations += lin.iterations;

        if lin.singular {
            return Err(SolverError::SingularJacobian { level: l });
        }
        if delta.iter().any(|d| !d.is_finite()) {
            return Err(SolverError::NonFinite { level: l });
        }
        if coarse && !lin.converged && !(lin.relative_residual < 1e-3) {
            return Err(SolverError::LinearSolveFailed {
                level: l,
                newton_iteration,
                residual: lin.residual_norm,
            });
        }

        // backtracking line search on the defect norm
        let mut alpha = 1.0;
        let mut attempt = 0;
        let (trial, trial_norm) = loop {
            let mut trial = u.clone();
            add_flat(&mut trial, &delta, alpha);
            let norm = field_norm(&self.defect(level, &trial, b));
            if (norm.is_finite() && norm < r_norm) || attempt == self.config.max_line_search {
                break (trial, norm);
            }
            attempt += 1;
            alpha *= self.config.line_search_rho;
        };
        if !trial_norm.is_finite() {
            return Err(SolverError::NonFinite { level: l });
        }
        if trial_norm >= r_norm {
            stats.line_search_failures += 1;
            log::warn!("level {}: line search did not reduce |F| ({:.3e} -> {:.3e})", l, r_norm, trial_norm);
        }

        log::trace!(
            "level {} Newton {}: |F| {:.3e} -> {:.3e}, step {:.3}, {} linear iterations",
            l,
            newton_iteration,
            r_norm,
            trial_norm,
            alpha,
            lin.iterations
        );
        *u = trial;
        Ok(trial_norm)
    }
}
