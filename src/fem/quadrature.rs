/// Gauss-Legendre quadrature rules on the reference hexahedron [-1, 1]³
/// and on its faces
pub struct GaussQuadrature {
    /// Integration points in reference coordinates (ξ, η, ζ)
    pub points: Vec<[f64; 3]>,
    /// Integration weights
    pub weights: Vec<f64>,
}

/// Two-point Gauss-Legendre abscissa, 1/√3
const G2: f64 = 0.577_350_269_189_625_8;

impl GaussQuadrature {
    /// 2x2x2 rule on the reference cube
    ///
    /// Exact for polynomials of degree 3 in each variable
    pub fn hex_2x2x2() -> Self {
        let mut points = Vec::with_capacity(8);
        for &z in &[-G2, G2] {
            for &y in &[-G2, G2] {
                for &x in &[-G2, G2] {
                    points.push([x, y, z]);
                }
            }
        }
        Self {
            points,
            weights: vec![1.0; 8],
        }
    }

    /// 2x2 rule on a face of the reference cube
    ///
    /// `axis` is the reference coordinate held fixed at `side` (±1).
    pub fn face_2x2(axis: usize, side: f64) -> Self {
        debug_assert!(axis < 3);
        let mut points = Vec::with_capacity(4);
        for &b in &[-G2, G2] {
            for &a in &[-G2, G2] {
                let mut p = [0.0; 3];
                let (u, v) = tangent_axes(axis);
                p[axis] = side;
                p[u] = a;
                p[v] = b;
                points.push(p);
            }
        }
        Self {
            points,
            weights: vec![1.0; 4],
        }
    }

    pub fn num_points(&self) -> usize {
        self.points.len()
    }
}

/// Reference axes spanning the face normal to `axis`
pub fn tangent_axes(axis: usize) -> (usize, usize) {
    match axis {
        0 => (1, 2),
        1 => (0, 2),
        _ => (0, 1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_weights_sum_to_reference_volume() {
        let sum: f64 = GaussQuadrature::hex_2x2x2().weights.iter().sum();
        assert_relative_eq!(sum, 8.0, epsilon = 1e-14);
        let face: f64 = GaussQuadrature::face_2x2(2, -1.0).weights.iter().sum();
        assert_relative_eq!(face, 4.0, epsilon = 1e-14);
    }

    #[test]
    fn test_cubic_exactness() {
        // ∫ x² y² z² over [-1,1]³ = (2/3)³
        let rule = GaussQuadrature::hex_2x2x2();
        let integral: f64 = rule
            .points
            .iter()
            .zip(rule.weights.iter())
            .map(|(p, w)| w * p[0] * p[0] * p[1] * p[1] * p[2] * p[2] + w * p[0].powi(3))
            .sum();
        assert_relative_eq!(integral, (2.0f64 / 3.0).powi(3), epsilon = 1e-14);
    }

    #[test]
    fn test_face_points_lie_on_face() {
        let rule = GaussQuadrature::face_2x2(0, 1.0);
        assert!(rule.points.iter().all(|p| p[0] == 1.0));
    }
}
