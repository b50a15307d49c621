use sprs::CsMat;

/// Statistics from a linear solve
#[derive(Debug, Clone, Default)]
pub struct SolverStats {
    /// Number of iterations (0 for direct solvers)
    pub iterations: usize,

    /// Final residual norm ||b - Ax||
    pub residual_norm: f64,

    /// Relative residual ||b - Ax|| / ||b||
    pub relative_residual: f64,

    pub converged: bool,

    /// The factorization broke down (direct solvers only)
    pub singular: bool,
}

impl SolverStats {
    /// Stats of a trivially solved system (zero right-hand side)
    pub fn trivial() -> Self {
        Self {
            converged: true,
            ..Self::default()
        }
    }
}

/// A linear operator that can be applied to a vector
pub trait LinearOperator {
    /// out = A * v
    fn apply(&self, v: &[f64]) -> Vec<f64>;

    fn rows(&self) -> usize;

    fn cols(&self) -> usize;
}

impl LinearOperator for CsMat<f64> {
    fn apply(&self, v: &[f64]) -> Vec<f64> {
        let mut result = vec![0.0; CsMat::rows(self)];
        for (row_idx, row) in self.outer_iterator().enumerate() {
            result[row_idx] = row.iter().map(|(col, &val)| val * v[col]).sum();
        }
        result
    }

    fn rows(&self) -> usize {
        CsMat::rows(self)
    }

    fn cols(&self) -> usize {
        CsMat::cols(self)
    }
}

/// Linear system solver: finds x with Ax = b
pub trait Solver {
    /// Solve with an assembled sparse matrix
    #[allow(non_snake_case)]
    fn solve(&self, A: &CsMat<f64>, b: &[f64]) -> (Vec<f64>, SolverStats);

    fn name(&self) -> &str;
}

/// Small vector helpers shared by the solvers
pub struct SolverUtils;

impl SolverUtils {
    /// r = b - Ax
    #[allow(non_snake_case)]
    pub fn compute_residual<O: LinearOperator>(A: &O, x: &[f64], b: &[f64]) -> Vec<f64> {
        let ax = A.apply(x);
        b.iter().zip(ax.iter()).map(|(&bi, &axi)| bi - axi).collect()
    }

    /// Euclidean norm
    pub fn norm(v: &[f64]) -> f64 {
        v.iter().map(|&x| x * x).sum::<f64>().sqrt()
    }

    pub fn dot(a: &[f64], b: &[f64]) -> f64 {
        a.iter().zip(b.iter()).map(|(&x, &y)| x * y).sum()
    }

    /// ||b - Ax|| / ||b||, or the absolute residual when b vanishes
    #[allow(non_snake_case)]
    pub fn relative_residual<O: LinearOperator>(A: &O, x: &[f64], b: &[f64]) -> f64 {
        let r_norm = Self::norm(&Self::compute_residual(A, x, b));
        let b_norm = Self::norm(b);
        if b_norm < 1e-14 {
            r_norm
        } else {
            r_norm / b_norm
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use sprs::TriMat;

    #[test]
    fn test_norm() {
        assert_relative_eq!(SolverUtils::norm(&[3.0, 4.0]), 5.0, epsilon = 1e-14);
    }

    #[test]
    #[allow(non_snake_case)]
    fn test_exact_solution_has_zero_residual() {
        let mut triplets = TriMat::new((2, 2));
        triplets.add_triplet(0, 0, 2.0);
        triplets.add_triplet(0, 1, 1.0);
        triplets.add_triplet(1, 0, 1.0);
        triplets.add_triplet(1, 1, 2.0);
        let A: CsMat<f64> = triplets.to_csr();

        let r = SolverUtils::compute_residual(&A, &[1.0, 1.0], &[3.0, 3.0]);
        assert_relative_eq!(SolverUtils::norm(&r), 0.0, epsilon = 1e-14);
        assert_eq!(LinearOperator::rows(&A), 2);
    }
}
