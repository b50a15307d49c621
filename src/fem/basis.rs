use nalgebra::{Matrix3, Point3, Vector2, Vector3};

use super::quadrature::{tangent_axes, GaussQuadrature};

/// Trilinear (Q1) hexahedral element
///
/// Node numbering, with `(di, dj, dk)` offsets from the element's lower
/// corner:
///
/// ```text
///   0: (0,0,0)   1: (1,0,0)   2: (1,1,0)   3: (0,1,0)   bottom
///   4: (0,0,1)   5: (1,0,1)   6: (1,1,1)   7: (0,1,1)   top
/// ```
///
/// Reference coordinates (ξ, η, ζ) ∈ [-1, 1]³ follow i, j and k.
pub struct Q1Hex;

/// Grid offsets of the element nodes
pub const NODE_OFFSETS: [(usize, usize, usize); 8] = [
    (0, 0, 0),
    (1, 0, 0),
    (1, 1, 0),
    (0, 1, 0),
    (0, 0, 1),
    (1, 0, 1),
    (1, 1, 1),
    (0, 1, 1),
];

/// Faces as (fixed reference axis, side, element nodes on the face)
pub const FACES: [(usize, f64, [usize; 4]); 6] = [
    (0, -1.0, [0, 3, 7, 4]),
    (0, 1.0, [1, 2, 6, 5]),
    (1, -1.0, [0, 1, 5, 4]),
    (1, 1.0, [3, 2, 6, 7]),
    (2, -1.0, [0, 1, 2, 3]),
    (2, 1.0, [4, 5, 6, 7]),
];

impl Q1Hex {
    fn reference_node(a: usize) -> [f64; 3] {
        let (di, dj, dk) = NODE_OFFSETS[a];
        [
            2.0 * di as f64 - 1.0,
            2.0 * dj as f64 - 1.0,
            2.0 * dk as f64 - 1.0,
        ]
    }

    /// N_a(ξ) = (1 + ξ ξ_a)(1 + η η_a)(1 + ζ ζ_a) / 8
    pub fn shape_functions(p: &[f64; 3]) -> [f64; 8] {
        let mut n = [0.0; 8];
        for (a, value) in n.iter_mut().enumerate() {
            let r = Self::reference_node(a);
            *value = 0.125 * (1.0 + p[0] * r[0]) * (1.0 + p[1] * r[1]) * (1.0 + p[2] * r[2]);
        }
        n
    }

    /// Derivatives of the shape functions with respect to (ξ, η, ζ)
    pub fn shape_derivatives(p: &[f64; 3]) -> [[f64; 3]; 8] {
        let mut d = [[0.0; 3]; 8];
        for (a, grad) in d.iter_mut().enumerate() {
            let r = Self::reference_node(a);
            let f = [1.0 + p[0] * r[0], 1.0 + p[1] * r[1], 1.0 + p[2] * r[2]];
            *grad = [
                0.125 * r[0] * f[1] * f[2],
                0.125 * f[0] * r[1] * f[2],
                0.125 * f[0] * f[1] * r[2],
            ];
        }
        d
    }
}

/// Value and physical gradient of one test function at one quadrature point
#[derive(Debug, Clone, Copy, Default)]
pub struct ShapeValue {
    pub val: f64,
    pub dx: f64,
    pub dy: f64,
    pub dz: f64,
}

/// Velocity and its gradient at a quadrature point
#[derive(Debug, Clone, Copy)]
pub struct VelocityGradient {
    pub u: Vector2<f64>,
    pub dx: Vector2<f64>,
    pub dy: Vector2<f64>,
    pub dz: Vector2<f64>,
}

/// Jacobian of the reference map, `J[(r, c)] = ∂x_r / ∂ξ_c`
fn jacobian(nodes: &[Point3<f64>; 8], dshape: &[[f64; 3]; 8]) -> Matrix3<f64> {
    let mut j = Matrix3::zeros();
    for (x, d) in nodes.iter().zip(dshape.iter()) {
        for r in 0..3 {
            for c in 0..3 {
                j[(r, c)] += x[r] * d[c];
            }
        }
    }
    j
}

/// Q1 element with 2x2x2 quadrature mapped to a physical hexahedron
pub struct Q1Element {
    reference_values: Vec<[f64; 8]>,
    reference_derivatives: Vec<[[f64; 3]; 8]>,
    reference_weights: Vec<f64>,
    /// Quadrature weights times |det J|
    weights: Vec<f64>,
    chi: Vec<[ShapeValue; 8]>,
    points: Vec<Point3<f64>>,
}

impl Q1Element {
    pub fn new() -> Self {
        let rule = GaussQuadrature::hex_2x2x2();
        let n = rule.num_points();
        Self {
            reference_values: rule.points.iter().map(Q1Hex::shape_functions).collect(),
            reference_derivatives: rule.points.iter().map(Q1Hex::shape_derivatives).collect(),
            reference_weights: rule.weights,
            weights: vec![0.0; n],
            chi: vec![[ShapeValue::default(); 8]; n],
            points: vec![Point3::origin(); n],
        }
    }

    /// Map the element onto the hexahedron with corners `nodes`
    ///
    /// Returns `false` if the map is degenerate at some quadrature point.
    pub fn reset(&mut self, nodes: &[Point3<f64>; 8]) -> bool {
        for q in 0..self.reference_weights.len() {
            let dshape = &self.reference_derivatives[q];
            let j = jacobian(nodes, dshape);
            let det = j.determinant();
            let Some(j_inv_t) = j.transpose().try_inverse() else {
                return false;
            };
            if !(det > 0.0) {
                return false;
            }

            self.weights[q] = self.reference_weights[q] * det;
            let mut point = Vector3::zeros();
            for a in 0..8 {
                let grad = j_inv_t * Vector3::new(dshape[a][0], dshape[a][1], dshape[a][2]);
                self.chi[q][a] = ShapeValue {
                    val: self.reference_values[q][a],
                    dx: grad[0],
                    dy: grad[1],
                    dz: grad[2],
                };
                point += nodes[a].coords * self.reference_values[q][a];
            }
            self.points[q] = Point3::from(point);
        }
        true
    }

    pub fn n_points(&self) -> usize {
        self.weights.len()
    }

    pub fn weight(&self, q: usize) -> f64 {
        self.weights[q]
    }

    pub fn chi(&self, q: usize) -> &[ShapeValue; 8] {
        &self.chi[q]
    }

    /// Physical coordinates of quadrature point `q`
    pub fn point(&self, q: usize) -> Point3<f64> {
        self.points[q]
    }

    /// Interpolate nodal scalars at every quadrature point
    pub fn evaluate(&self, nodal: &[f64; 8]) -> Vec<f64> {
        self.chi
            .iter()
            .map(|chi| chi.iter().zip(nodal.iter()).map(|(c, v)| c.val * v).sum())
            .collect()
    }

    /// Horizontal gradient of a nodal scalar at every quadrature point
    pub fn evaluate_horizontal_gradient(&self, nodal: &[f64; 8]) -> Vec<Vector2<f64>> {
        self.chi
            .iter()
            .map(|chi| {
                chi.iter()
                    .zip(nodal.iter())
                    .fold(Vector2::zeros(), |g, (c, v)| g + Vector2::new(c.dx, c.dy) * *v)
            })
            .collect()
    }

    /// Velocity and velocity gradient at every quadrature point
    pub fn evaluate_velocity(&self, nodal: &[Vector2<f64>; 8]) -> Vec<VelocityGradient> {
        self.chi
            .iter()
            .map(|chi| {
                let mut g = VelocityGradient {
                    u: Vector2::zeros(),
                    dx: Vector2::zeros(),
                    dy: Vector2::zeros(),
                    dz: Vector2::zeros(),
                };
                for (c, u) in chi.iter().zip(nodal.iter()) {
                    g.u += u * c.val;
                    g.dx += u * c.dx;
                    g.dy += u * c.dy;
                    g.dz += u * c.dz;
                }
                g
            })
            .collect()
    }
}

impl Default for Q1Element {
    fn default() -> Self {
        Self::new()
    }
}

/// Quadrature on one face of a Q1 element
pub struct Q1FaceElement {
    weights: Vec<f64>,
    values: Vec<[f64; 8]>,
    normals: Vec<Vector3<f64>>,
    points: Vec<Point3<f64>>,
}

impl Q1FaceElement {
    pub fn new() -> Self {
        Self {
            weights: vec![0.0; 4],
            values: vec![[0.0; 8]; 4],
            normals: vec![Vector3::zeros(); 4],
            points: vec![Point3::origin(); 4],
        }
    }

    /// Set up quadrature on face `face` (an index into `FACES`)
    pub fn reset(&mut self, face: usize, nodes: &[Point3<f64>; 8]) {
        let (axis, side, _) = FACES[face];
        let (u, v) = tangent_axes(axis);
        let rule = GaussQuadrature::face_2x2(axis, side);

        for (q, p) in rule.points.iter().enumerate() {
            let dshape = Q1Hex::shape_derivatives(p);
            let j = jacobian(nodes, &dshape);
            let t_u = j.column(u).into_owned();
            let t_v = j.column(v).into_owned();
            let t_n = j.column(axis).into_owned();

            let mut n = t_u.cross(&t_v);
            let area = n.norm();
            if n.dot(&t_n) * side < 0.0 {
                n = -n;
            }

            let values = Q1Hex::shape_functions(p);
            let point = nodes
                .iter()
                .zip(values.iter())
                .fold(Vector3::zeros(), |acc, (x, &w)| acc + x.coords * w);

            self.weights[q] = rule.weights[q] * area;
            self.values[q] = values;
            self.normals[q] = if area > 0.0 { n / area } else { n };
            self.points[q] = Point3::from(point);
        }
    }

    pub fn n_points(&self) -> usize {
        self.weights.len()
    }

    pub fn weight(&self, q: usize) -> f64 {
        self.weights[q]
    }

    /// Test function values at face point `q` (zero off the face)
    pub fn values(&self, q: usize) -> &[f64; 8] {
        &self.values[q]
    }

    /// Outward unit normal at face point `q`
    pub fn normal(&self, q: usize) -> Vector3<f64> {
        self.normals[q]
    }

    pub fn point(&self, q: usize) -> Point3<f64> {
        self.points[q]
    }
}

impl Default for Q1FaceElement {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn box_nodes(lx: f64, ly: f64, lz: f64) -> [Point3<f64>; 8] {
        let mut nodes = [Point3::origin(); 8];
        for (a, &(di, dj, dk)) in NODE_OFFSETS.iter().enumerate() {
            nodes[a] = Point3::new(di as f64 * lx, dj as f64 * ly, dk as f64 * lz);
        }
        nodes
    }

    #[test]
    fn test_partition_of_unity() {
        let p = [0.3, -0.7, 0.1];
        let n: f64 = Q1Hex::shape_functions(&p).iter().sum();
        assert_relative_eq!(n, 1.0, epsilon = 1e-14);
        let d = Q1Hex::shape_derivatives(&p);
        for c in 0..3 {
            let s: f64 = d.iter().map(|g| g[c]).sum();
            assert_relative_eq!(s, 0.0, epsilon = 1e-14);
        }
    }

    #[test]
    fn test_box_volume_and_gradients() {
        let mut e = Q1Element::new();
        assert!(e.reset(&box_nodes(2.0, 3.0, 0.5)));
        let volume: f64 = (0..e.n_points()).map(|q| e.weight(q)).sum();
        assert_relative_eq!(volume, 3.0, epsilon = 1e-12);

        // gradient of f = x + 2y - 4z is recovered exactly
        let nodes = box_nodes(2.0, 3.0, 0.5);
        let f: [f64; 8] = std::array::from_fn(|a| nodes[a].x + 2.0 * nodes[a].y - 4.0 * nodes[a].z);
        let velocity: [Vector2<f64>; 8] = std::array::from_fn(|a| Vector2::new(f[a], -f[a]));
        for g in e.evaluate_velocity(&velocity) {
            assert_relative_eq!(g.dx.x, 1.0, epsilon = 1e-12);
            assert_relative_eq!(g.dy.x, 2.0, epsilon = 1e-12);
            assert_relative_eq!(g.dz.y, 4.0, epsilon = 1e-12);
        }
        for g in e.evaluate_horizontal_gradient(&f) {
            assert_relative_eq!(g.y, 2.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_sheared_element_gradient() {
        // vertical edges with a sloping top, as on a terrain-following grid
        let mut nodes = box_nodes(1.0, 1.0, 1.0);
        for a in 4..8 {
            nodes[a].z += 0.2 * nodes[a].x + 0.1 * nodes[a].y;
        }
        let mut e = Q1Element::new();
        assert!(e.reset(&nodes));
        let f: [f64; 8] = std::array::from_fn(|a| 3.0 * nodes[a].z);
        for g in e.evaluate_velocity(&std::array::from_fn(|a| Vector2::new(f[a], 0.0))) {
            assert_relative_eq!(g.dz.x, 3.0, epsilon = 1e-12);
            assert_relative_eq!(g.dx.x, 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_face_normals_point_outward() {
        let nodes = box_nodes(2.0, 1.0, 1.0);
        let mut face = Q1FaceElement::new();
        let expected = [
            Vector3::new(-1.0, 0.0, 0.0),
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(0.0, -1.0, 0.0),
            Vector3::new(0.0, 1.0, 0.0),
            Vector3::new(0.0, 0.0, -1.0),
            Vector3::new(0.0, 0.0, 1.0),
        ];
        let areas = [1.0, 1.0, 2.0, 2.0, 2.0, 2.0];
        for f in 0..6 {
            face.reset(f, &nodes);
            let area: f64 = (0..face.n_points()).map(|q| face.weight(q)).sum();
            assert_relative_eq!(area, areas[f], epsilon = 1e-12);
            for q in 0..face.n_points() {
                assert_relative_eq!(face.normal(q), expected[f], epsilon = 1e-12);
                let off_face: f64 = (0..8)
                    .filter(|a| !FACES[f].2.contains(a))
                    .map(|a| face.values(q)[a].abs())
                    .sum();
                assert_relative_eq!(off_face, 0.0, epsilon = 1e-14);
            }
        }
    }
}
