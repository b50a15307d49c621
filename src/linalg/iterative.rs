use sprs::CsMat;

use super::preconditioner::{JacobiPreconditioner, Preconditioner};
use super::solver::{LinearOperator, Solver, SolverStats, SolverUtils};
use crate::error::ConfigError;

/// Krylov method used for Newton updates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KrylovMethod {
    ConjugateGradient,
    Gmres,
}

impl KrylovMethod {
    pub fn from_name(name: &str) -> Result<Self, ConfigError> {
        match name {
            "cg" => Ok(Self::ConjugateGradient),
            "gmres" => Ok(Self::Gmres),
            other => Err(ConfigError::UnknownName {
                kind: "linear solver",
                name: other.to_string(),
            }),
        }
    }

    /// Solve `A x = b` with Jacobi preconditioning
    #[allow(non_snake_case)]
    pub fn solve(
        self,
        A: &CsMat<f64>,
        b: &[f64],
        max_iterations: usize,
        tolerance: f64,
    ) -> (Vec<f64>, SolverStats) {
        match self {
            Self::ConjugateGradient => ConjugateGradient::new()
                .with_max_iterations(max_iterations)
                .with_tolerance(tolerance)
                .solve(A, b),
            Self::Gmres => GMRES::new()
                .with_max_iterations(max_iterations)
                .with_tolerance(tolerance)
                .solve(A, b),
        }
    }
}

/// Preconditioned conjugate gradients for symmetric positive definite systems
pub struct ConjugateGradient {
    max_iterations: usize,
    tolerance: f64,
    abs_tolerance: f64,
}

impl ConjugateGradient {
    pub fn new() -> Self {
        Self {
            max_iterations: 1000,
            tolerance: 1e-8,
            abs_tolerance: 1e-300,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_abs_tolerance(mut self, abs_tolerance: f64) -> Self {
        self.abs_tolerance = abs_tolerance;
        self
    }

    fn run<O, P>(&self, a: &O, b: &[f64], precond: &P) -> (Vec<f64>, SolverStats)
    where
        O: LinearOperator,
        P: Preconditioner,
    {
        let n = b.len();
        let b_norm = SolverUtils::norm(b);
        if b_norm == 0.0 {
            return (vec![0.0; n], SolverStats::trivial());
        }

        let mut x = vec![0.0; n];
        let mut r = b.to_vec();
        let mut z = precond.apply(&r);
        let mut p = z.clone();
        let mut rz = SolverUtils::dot(&r, &z);

        let mut iteration = 0;
        let mut converged = false;
        let mut final_res = b_norm;

        while iteration < self.max_iterations {
            let ap = a.apply(&p);
            let p_ap = SolverUtils::dot(&p, &ap);
            if p_ap.abs() < 1e-300 {
                log::trace!("CG breakdown at iteration {}", iteration);
                break;
            }
            let alpha = rz / p_ap;

            for i in 0..n {
                x[i] += alpha * p[i];
                r[i] -= alpha * ap[i];
            }
            iteration += 1;

            final_res = SolverUtils::norm(&r);
            if final_res < self.tolerance * b_norm || final_res < self.abs_tolerance {
                converged = true;
                break;
            }

            z = precond.apply(&r);
            let rz_new = SolverUtils::dot(&r, &z);
            let beta = rz_new / rz;
            rz = rz_new;
            for i in 0..n {
                p[i] = z[i] + beta * p[i];
            }
        }

        log::trace!(
            "CG: {} iterations, |r|/|b| = {:.3e}",
            iteration,
            final_res / b_norm
        );

        (
            x,
            SolverStats {
                iterations: iteration,
                residual_norm: final_res,
                relative_residual: final_res / b_norm,
                converged,
                singular: false,
            },
        )
    }
}

impl Solver for ConjugateGradient {
    fn solve(&self, a: &CsMat<f64>, b: &[f64]) -> (Vec<f64>, SolverStats) {
        self.run(a, b, &JacobiPreconditioner::new(a))
    }

    fn name(&self) -> &str {
        "cg"
    }
}

/// Restarted GMRES with right preconditioning
pub struct GMRES {
    max_iterations: usize,
    restart: usize,
    tolerance: f64,
    abs_tolerance: f64,
}

impl GMRES {
    pub fn new() -> Self {
        Self {
            max_iterations: 1000,
            restart: 30,
            tolerance: 1e-8,
            abs_tolerance: 1e-300,
        }
    }

    pub fn with_restart(mut self, m: usize) -> Self {
        self.restart = m.max(1);
        self
    }

    pub fn with_max_iterations(mut self, max_iter: usize) -> Self {
        self.max_iterations = max_iter;
        self
    }

    pub fn with_tolerance(mut self, tol: f64) -> Self {
        self.tolerance = tol;
        self
    }

    fn run<O, P>(&self, a: &O, b: &[f64], precond: &P) -> (Vec<f64>, SolverStats)
    where
        O: LinearOperator,
        P: Preconditioner,
    {
        let n = b.len();
        let b_norm = SolverUtils::norm(b);
        if b_norm == 0.0 {
            return (vec![0.0; n], SolverStats::trivial());
        }
        let target = (self.tolerance * b_norm).max(self.abs_tolerance);

        let mut x = vec![0.0; n];
        let mut total_iter = 0;
        let mut converged = false;
        let mut final_res = b_norm;

        while total_iter < self.max_iterations {
            let r = SolverUtils::compute_residual(a, &x, b);
            let r_norm = SolverUtils::norm(&r);
            final_res = r_norm;
            if r_norm < target {
                converged = true;
                break;
            }

            let m = self.restart;
            let mut v = vec![vec![0.0; n]; m + 1];
            let mut h = vec![vec![0.0; m]; m + 1];
            v[0].iter_mut().zip(r.iter()).for_each(|(vi, &ri)| *vi = ri / r_norm);

            let mut g = vec![0.0; m + 1];
            g[0] = r_norm;
            let mut cs = vec![0.0; m];
            let mut sn = vec![0.0; m];

            let mut k = 0;
            for j in 0..m {
                if total_iter >= self.max_iterations {
                    break;
                }

                // Arnoldi step with modified Gram-Schmidt
                let mut w = a.apply(&precond.apply(&v[j]));
                for i in 0..=j {
                    h[i][j] = SolverUtils::dot(&v[i], &w);
                    for l in 0..n {
                        w[l] -= h[i][j] * v[i][l];
                    }
                }
                h[j + 1][j] = SolverUtils::norm(&w);
                if h[j + 1][j] > 1e-300 {
                    for l in 0..n {
                        v[j + 1][l] = w[l] / h[j + 1][j];
                    }
                }

                for i in 0..j {
                    let temp = cs[i] * h[i][j] + sn[i] * h[i + 1][j];
                    h[i + 1][j] = -sn[i] * h[i][j] + cs[i] * h[i + 1][j];
                    h[i][j] = temp;
                }

                let (c, s, rho) = givens_rotation(h[j][j], h[j + 1][j]);
                cs[j] = c;
                sn[j] = s;
                h[j][j] = rho;
                h[j + 1][j] = 0.0;

                g[j + 1] = -s * g[j];
                g[j] *= c;

                k = j + 1;
                total_iter += 1;
                final_res = g[k].abs();
                if final_res < target {
                    break;
                }
            }

            // back substitution for the least-squares coefficients
            let mut y = vec![0.0; k];
            for i in (0..k).rev() {
                if h[i][i].abs() < 1e-300 {
                    break;
                }
                let sum: f64 = ((i + 1)..k).map(|j| h[i][j] * y[j]).sum();
                y[i] = (g[i] - sum) / h[i][i];
            }

            let mut dy = vec![0.0; n];
            for (j, &yj) in y.iter().enumerate() {
                for i in 0..n {
                    dy[i] += v[j][i] * yj;
                }
            }
            let correction = precond.apply(&dy);
            x.iter_mut().zip(correction.iter()).for_each(|(xi, &ci)| *xi += ci);

            if final_res < target {
                converged = true;
                break;
            }
        }

        log::trace!(
            "GMRES: {} iterations, |r|/|b| = {:.3e}",
            total_iter,
            final_res / b_norm
        );

        (
            x,
            SolverStats {
                iterations: total_iter,
                residual_norm: final_res,
                relative_residual: final_res / b_norm,
                converged,
                singular: false,
            },
        )
    }
}

fn givens_rotation(a: f64, b: f64) -> (f64, f64, f64) {
    if b.abs() < 1e-300 {
        (1.0, 0.0, a)
    } else if b.abs() > a.abs() {
        let tau = a / b;
        let s = 1.0 / (1.0 + tau * tau).sqrt();
        (s * tau, s, b * (1.0 + tau * tau).sqrt())
    } else {
        let tau = b / a;
        let c = 1.0 / (1.0 + tau * tau).sqrt();
        (c, c * tau, a * (1.0 + tau * tau).sqrt())
    }
}

impl Solver for GMRES {
    fn solve(&self, a: &CsMat<f64>, b: &[f64]) -> (Vec<f64>, SolverStats) {
        self.run(a, b, &JacobiPreconditioner::new(a))
    }

    fn name(&self) -> &str {
        "gmres"
    }
}

impl Default for ConjugateGradient {
    fn default() -> Self {
        Self::new()
    }
}

impl Default for GMRES {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use sprs::TriMat;

    /// 1D Laplacian with a non-uniform diagonal shift
    fn spd_matrix(n: usize) -> CsMat<f64> {
        let mut t = TriMat::new((n, n));
        for i in 0..n {
            t.add_triplet(i, i, 2.0 + i as f64 * 0.1);
            if i > 0 {
                t.add_triplet(i, i - 1, -1.0);
            }
            if i + 1 < n {
                t.add_triplet(i, i + 1, -1.0);
            }
        }
        t.to_csr()
    }

    #[test]
    fn test_cg_basic() {
        let mut t = TriMat::new((2, 2));
        t.add_triplet(0, 0, 2.0);
        t.add_triplet(0, 1, 1.0);
        t.add_triplet(1, 0, 1.0);
        t.add_triplet(1, 1, 2.0);
        let a: CsMat<f64> = t.to_csr();
        let (x, stats) = ConjugateGradient::new().solve(&a, &[3.0, 3.0]);
        assert_relative_eq!(x[0], 1.0, epsilon = 1e-6);
        assert_relative_eq!(x[1], 1.0, epsilon = 1e-6);
        assert!(stats.converged);
    }

    #[test]
    fn test_gmres_matches_cg() {
        let a = spd_matrix(20);
        let b: Vec<f64> = (0..20).map(|i| (i as f64).sin()).collect();
        let (x_cg, s_cg) = KrylovMethod::ConjugateGradient.solve(&a, &b, 200, 1e-12);
        let (x_gm, s_gm) = GMRES::new().with_tolerance(1e-12).solve(&a, &b);
        assert!(s_cg.converged && s_gm.converged);
        for (p, q) in x_cg.iter().zip(x_gm.iter()) {
            assert_relative_eq!(*p, *q, epsilon = 1e-8);
        }
    }

    #[test]
    fn test_iteration_cap_reports_not_converged() {
        let a = spd_matrix(50);
        let b = vec![1.0; 50];
        let (_, stats) = KrylovMethod::ConjugateGradient.solve(&a, &b, 2, 1e-14);
        assert!(!stats.converged);
        assert_eq!(stats.iterations, 2);
    }

    #[test]
    fn test_unknown_method_rejected() {
        assert!(KrylovMethod::from_name("bicgstab").is_err());
        assert_eq!(KrylovMethod::from_name("gmres").unwrap(), KrylovMethod::Gmres);
    }
}
