use sprs::CsMat;

use super::solver::{Solver, SolverStats, SolverUtils};

/// Dense LU solver for the coarsest multigrid level
///
/// Converts the sparse matrix to a dense nalgebra matrix, so it is only
/// meant for small systems.
#[derive(Debug, Default)]
pub struct DirectSolver;

impl DirectSolver {
    pub fn new() -> Self {
        Self
    }
}

impl Solver for DirectSolver {
    #[allow(non_snake_case)]
    fn solve(&self, A: &CsMat<f64>, b: &[f64]) -> (Vec<f64>, SolverStats) {
        let n = b.len();

        let mut a_dense = nalgebra::DMatrix::zeros(n, n);
        for (row_idx, row) in A.outer_iterator().enumerate() {
            for (col_idx, &val) in row.iter() {
                a_dense[(row_idx, col_idx)] = val;
            }
        }

        let b_vec = nalgebra::DVector::from_column_slice(b);
        let Some(x_vec) = a_dense.lu().solve(&b_vec) else {
            return (
                vec![0.0; n],
                SolverStats {
                    relative_residual: 1.0,
                    residual_norm: SolverUtils::norm(b),
                    singular: true,
                    ..SolverStats::default()
                },
            );
        };

        let x: Vec<f64> = x_vec.iter().copied().collect();
        let relative_residual = SolverUtils::relative_residual(A, &x, b);
        let stats = SolverStats {
            iterations: 0,
            residual_norm: relative_residual * SolverUtils::norm(b).max(1e-14),
            relative_residual,
            converged: relative_residual.is_finite() && relative_residual < 1e-8,
            singular: false,
        };

        (x, stats)
    }

    fn name(&self) -> &str {
        "lu"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use sprs::TriMat;

    #[test]
    #[allow(non_snake_case)]
    fn test_direct_solver_simple() {
        let mut triplets = TriMat::new((2, 2));
        triplets.add_triplet(0, 0, 2.0);
        triplets.add_triplet(0, 1, 1.0);
        triplets.add_triplet(1, 0, 1.0);
        triplets.add_triplet(1, 1, 2.0);
        let A: CsMat<f64> = triplets.to_csr();

        let (x, stats) = DirectSolver::new().solve(&A, &[3.0, 3.0]);

        assert_relative_eq!(x[0], 1.0, epsilon = 1e-10);
        assert_relative_eq!(x[1], 1.0, epsilon = 1e-10);
        assert!(stats.converged);
    }

    #[test]
    #[allow(non_snake_case)]
    fn test_singular_matrix_is_reported() {
        let mut triplets = TriMat::new((2, 2));
        triplets.add_triplet(0, 0, 1.0);
        triplets.add_triplet(0, 1, 1.0);
        triplets.add_triplet(1, 0, 1.0);
        triplets.add_triplet(1, 1, 1.0);
        let A: CsMat<f64> = triplets.to_csr();

        let (_, stats) = DirectSolver::new().solve(&A, &[1.0, 2.0]);
        assert!(stats.singular);
        assert!(!stats.converged);
    }
}
