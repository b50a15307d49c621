use sprs::CsMat;

/// Approximate inverse applied inside Krylov iterations: z ≈ A⁻¹ r
pub trait Preconditioner {
    fn apply(&self, r: &[f64]) -> Vec<f64>;
}

/// Jacobi (diagonal) preconditioner
///
/// Dirichlet rows of the stress-balance Jacobian carry a geometric scale
/// very different from the viscous rows, so diagonal scaling matters.
pub struct JacobiPreconditioner {
    diag_inv: Vec<f64>,
}

impl JacobiPreconditioner {
    #[allow(non_snake_case)]
    pub fn new(A: &CsMat<f64>) -> Self {
        let n = A.rows();
        let mut diag_inv = vec![1.0; n];
        for (i, d) in diag_inv.iter_mut().enumerate() {
            if let Some(&val) = A.get(i, i) {
                if val.abs() > 1e-300 {
                    *d = 1.0 / val;
                }
            }
        }
        Self { diag_inv }
    }
}

impl Preconditioner for JacobiPreconditioner {
    fn apply(&self, r: &[f64]) -> Vec<f64> {
        r.iter().zip(self.diag_inv.iter()).map(|(&ri, &di)| ri * di).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sprs::TriMat;

    #[test]
    fn test_jacobi_inverts_diagonal() {
        let mut t = TriMat::new((3, 3));
        t.add_triplet(0, 0, 2.0);
        t.add_triplet(1, 1, 4.0);
        t.add_triplet(1, 2, 1.0);
        t.add_triplet(2, 1, 1.0);
        // row 2 has no diagonal entry: left untouched
        let a: CsMat<f64> = t.to_csr();
        let z = JacobiPreconditioner::new(&a).apply(&[2.0, 2.0, 5.0]);
        assert_eq!(z, vec![1.0, 0.5, 5.0]);
    }
}
