//! Residual and Jacobian of the Blatter-Pattyn system on one grid level
//!
//! The weak form on Q1 hexahedra reads, for each test function ψ,
//!
//! ```text
//! R_u = ∫ η (ψ_x (4 u_x + 2 v_y) + ψ_y (u_y + v_x) + ψ_z u_z) + ψ (ρ g s_x - f_x)
//!       - ∫_Γ ψ G_x
//! R_v = ∫ η (ψ_x (u_y + v_x) + ψ_y (2 u_x + 4 v_y) + ψ_z v_z) + ψ (ρ g s_y - f_y)
//!       - ∫_Γ ψ G_y
//! ```
//!
//! with `η = η(B, γ)` from the flow law and
//! `γ = u_x² + v_y² + u_x v_y + ¼ ((u_y + v_x)² + u_z² + v_z²)`.
//! Γ is the set of lateral faces whose four nodes are all on the ice
//! margin. Dirichlet rows are replaced by `s (u - u_bc)` with a geometric
//! scale `s`.
//!
//! Each patch of the decomposition assembles the rows of its owned nodes
//! from a ghosted copy of the inputs; patches run in parallel.

use nalgebra::{Point3, Vector2};
use rayon::prelude::*;
use sprs::{CsMat, TriMat};

use super::forcing::BoundaryForcing;
use crate::fem::basis::{Q1Element, Q1FaceElement, ShapeValue, FACES, NODE_OFFSETS};
use crate::grid::array::Array3;
use crate::grid::decomposition::{LocalArray2, LocalArray3, Patch};
use crate::grid::level::{grid_z, GridLevel, NodeType, Parameters};
use crate::physics::flow_law::FlowLaw;

/// Horizontal velocity at every node of a level
pub type VelocityField = Array3<Vector2<f64>>;

/// Zero velocity on the grid of `level`
pub fn zero_velocity(level: &GridLevel) -> VelocityField {
    Array3::filled(level.mx, level.my, level.mz, Vector2::zeros())
}

/// Flatten a velocity field into `[u0, v0, u1, v1, ...]`
pub fn to_flat(field: &VelocityField) -> Vec<f64> {
    field.iter().flat_map(|u| [u.x, u.y]).collect()
}

/// Add a flat increment to a velocity field
pub fn add_flat(field: &mut VelocityField, delta: &[f64], scale: f64) {
    for (u, d) in field.as_mut_slice().iter_mut().zip(delta.chunks_exact(2)) {
        u.x += scale * d[0];
        u.y += scale * d[1];
    }
}

/// Euclidean norm of a velocity-shaped field
pub fn field_norm(field: &VelocityField) -> f64 {
    field.iter().map(|u| u.norm_squared()).sum::<f64>().sqrt()
}

/// Ghosted inputs of one patch
struct PatchView {
    params: LocalArray2<Parameters>,
    hardness: LocalArray3<f64>,
    velocity: LocalArray3<Vector2<f64>>,
}

/// Element inputs gathered from a patch view
struct ElementData {
    index: [(usize, usize, usize); 8],
    nodes: [Point3<f64>; 8],
    velocity: [Vector2<f64>; 8],
    hardness: [f64; 8],
    surface: [f64; 8],
    /// Velocity comes from the Dirichlet data, not the iterate
    prescribed: [bool; 8],
    margin: [bool; 8],
}

/// Derivatives of γ with respect to the u and v coefficients of one node
#[inline]
fn gamma_derivatives(psi: &ShapeValue, ux: f64, uy: f64, uz: f64, vx: f64, vy: f64, vz: f64) -> (f64, f64) {
    let shear = 0.5 * (uy + vx);
    (
        (2.0 * ux + vy) * psi.dx + shear * psi.dy + 0.5 * uz * psi.dz,
        (2.0 * vy + ux) * psi.dy + shear * psi.dx + 0.5 * vz * psi.dz,
    )
}

/// Second invariant of the first-order strain rate
#[inline]
pub fn strain_rate_invariant(ux: f64, uy: f64, uz: f64, vx: f64, vy: f64, vz: f64) -> f64 {
    ux * ux + vy * vy + ux * vy + 0.25 * ((uy + vx).powi(2) + uz * uz + vz * vz)
}

/// Evaluates the Blatter-Pattyn residual, Jacobian and strain heating
pub struct BlatterAssembler<'a> {
    flow_law: &'a dyn FlowLaw,
    forcing: &'a dyn BoundaryForcing,
    /// ρ g, multiplying the surface gradient in the driving stress
    rho_g: f64,
}

impl<'a> BlatterAssembler<'a> {
    pub fn new(flow_law: &'a dyn FlowLaw, forcing: &'a dyn BoundaryForcing, rho_g: f64) -> Self {
        Self {
            flow_law,
            forcing,
            rho_g,
        }
    }

    fn view(&self, level: &GridLevel, patch: &Patch, velocity: &VelocityField) -> PatchView {
        PatchView {
            params: level.params.acquire_ghosted(patch),
            hardness: level.hardness.acquire_ghosted(patch),
            velocity: velocity.acquire_ghosted(patch),
        }
    }

    /// Elements (by lower corner) with at least one node owned by `patch`
    fn patch_elements<'p>(level: &GridLevel, patch: &'p Patch) -> impl Iterator<Item = (usize, usize, usize)> + 'p {
        let mz = level.mz;
        let ie = patch.gxs + patch.gxm - 1;
        let je = patch.gys + patch.gym - 1;
        (patch.gys..je)
            .flat_map(move |j| (patch.gxs..ie).map(move |i| (i, j)))
            .filter(move |&(i, j)| {
                patch.owns(i, j) || patch.owns(i + 1, j) || patch.owns(i, j + 1) || patch.owns(i + 1, j + 1)
            })
            .flat_map(move |(i, j)| (0..mz - 1).map(move |k| (i, j, k)))
    }

    /// Collect element inputs; `None` if the element touches an exterior node
    fn gather(&self, level: &GridLevel, view: &PatchView, i: usize, j: usize, k: usize) -> Option<ElementData> {
        let mut e = ElementData {
            index: [(0, 0, 0); 8],
            nodes: [Point3::origin(); 8],
            velocity: [Vector2::zeros(); 8],
            hardness: [0.0; 8],
            surface: [0.0; 8],
            prescribed: [false; 8],
            margin: [false; 8],
        };
        for (a, &(di, dj, dk)) in NODE_OFFSETS.iter().enumerate() {
            let (ii, jj, kk) = (i + di, j + dj, k + dk);
            let p = view.params.get(ii, jj);
            if p.node_type == NodeType::Exterior {
                return None;
            }
            let z = grid_z(p.bed, p.thickness, level.mz, kk, level.min_thickness);
            e.index[a] = (ii, jj, kk);
            e.nodes[a] = Point3::new(level.x(ii), level.y(jj), z);
            e.prescribed[a] = kk == 0 || p.bc_mask;
            e.velocity[a] = if e.prescribed[a] {
                self.forcing.dirichlet_velocity(&e.nodes[a])
            } else {
                *view.velocity.get(ii, jj, kk)
            };
            e.hardness[a] = *view.hardness.get(ii, jj, kk);
            e.surface[a] = p.surface();
            e.margin[a] = p.node_type == NodeType::Boundary;
        }
        Some(e)
    }

    /// Lateral faces of the element on which the margin stress acts
    fn margin_faces(e: &ElementData) -> impl Iterator<Item = usize> + '_ {
        (0..4).filter(move |&f| FACES[f].2.iter().all(|&a| e.margin[a]))
    }

    /// Element residual contributions, one per element node
    fn element_residual(
        &self,
        e: &ElementData,
        element: &mut Q1Element,
        face: &mut Q1FaceElement,
    ) -> Option<[Vector2<f64>; 8]> {
        if !element.reset(&e.nodes) {
            return None;
        }
        let mut r = [Vector2::zeros(); 8];
        let grad = element.evaluate_velocity(&e.velocity);
        let hardness = element.evaluate(&e.hardness);
        let ds = element.evaluate_horizontal_gradient(&e.surface);

        for q in 0..element.n_points() {
            let w = element.weight(q);
            let g = &grad[q];
            let (ux, uy, uz) = (g.dx.x, g.dy.x, g.dz.x);
            let (vx, vy, vz) = (g.dx.y, g.dy.y, g.dz.y);
            let gamma = strain_rate_invariant(ux, uy, uz, vx, vy, vz);
            let (eta, _) = self.flow_law.effective_viscosity(hardness[q], gamma);
            let f = ds[q] * self.rho_g - self.forcing.body_force(&element.point(q));

            for (t, psi) in element.chi(q).iter().enumerate() {
                r[t].x += w * (eta * (psi.dx * (4.0 * ux + 2.0 * vy) + psi.dy * (uy + vx) + psi.dz * uz) + psi.val * f.x);
                r[t].y += w * (eta * (psi.dx * (uy + vx) + psi.dy * (2.0 * ux + 4.0 * vy) + psi.dz * vz) + psi.val * f.y);
            }
        }

        for f in Self::margin_faces(e) {
            face.reset(f, &e.nodes);
            for q in 0..face.n_points() {
                let stress = self.forcing.lateral_stress(&face.point(q), &face.normal(q));
                let w = face.weight(q);
                for (t, &psi) in face.values(q).iter().enumerate() {
                    r[t] -= stress * (w * psi);
                }
            }
        }

        Some(r)
    }

    /// Element Jacobian, ordered `[u0, v0, u1, v1, ...]`
    fn element_jacobian(&self, e: &ElementData, element: &mut Q1Element) -> Option<[[f64; 16]; 16]> {
        if !element.reset(&e.nodes) {
            return None;
        }
        let mut jac = [[0.0; 16]; 16];
        let grad = element.evaluate_velocity(&e.velocity);
        let hardness = element.evaluate(&e.hardness);

        for q in 0..element.n_points() {
            let w = element.weight(q);
            let g = &grad[q];
            let (ux, uy, uz) = (g.dx.x, g.dy.x, g.dz.x);
            let (vx, vy, vz) = (g.dx.y, g.dy.y, g.dz.y);
            let gamma = strain_rate_invariant(ux, uy, uz, vx, vy, vz);
            let (eta, deta) = self.flow_law.effective_viscosity(hardness[q], gamma);
            let chi = element.chi(q);

            let dgamma: [(f64, f64); 8] = std::array::from_fn(|a| gamma_derivatives(&chi[a], ux, uy, uz, vx, vy, vz));

            // blocks with s >= t only; the rest is filled by symmetry below
            for t in 0..8 {
                let psi = &chi[t];
                let (gu_t, gv_t) = dgamma[t];
                for s in t..8 {
                    let phi = &chi[s];
                    let (gu_s, gv_s) = dgamma[s];
                    jac[2 * t][2 * s] += w
                        * (eta * (4.0 * psi.dx * phi.dx + psi.dy * phi.dy + psi.dz * phi.dz)
                            + 2.0 * deta * gu_s * gu_t);
                    jac[2 * t][2 * s + 1] +=
                        w * (eta * (2.0 * psi.dx * phi.dy + psi.dy * phi.dx) + 2.0 * deta * gv_s * gu_t);
                    jac[2 * t + 1][2 * s] +=
                        w * (eta * (psi.dx * phi.dy + 2.0 * psi.dy * phi.dx) + 2.0 * deta * gu_s * gv_t);
                    jac[2 * t + 1][2 * s + 1] += w
                        * (eta * (psi.dx * phi.dx + 4.0 * psi.dy * phi.dy + psi.dz * phi.dz)
                            + 2.0 * deta * gv_s * gv_t);
                }
            }
        }

        for t in 0..8 {
            for s in t + 1..8 {
                for a in 0..2 {
                    for b in 0..2 {
                        jac[2 * s + b][2 * t + a] = jac[2 * t + a][2 * s + b];
                    }
                }
            }
        }
        Some(jac)
    }

    /// Target value of a Dirichlet node
    fn dirichlet_target(&self, level: &GridLevel, i: usize, j: usize, k: usize) -> Vector2<f64> {
        if level.is_prescribed(i, j, k) {
            self.forcing
                .dirichlet_velocity(&Point3::new(level.x(i), level.y(j), level.z(i, j, k)))
        } else {
            Vector2::zeros()
        }
    }

    fn residual_patch(&self, level: &GridLevel, patch: &Patch, velocity: &VelocityField) -> LocalArray3<Vector2<f64>> {
        let view = self.view(level, patch, velocity);
        let mut out = LocalArray3::filled(patch, level.mz, Vector2::zeros());
        let mut element = Q1Element::new();
        let mut face = Q1FaceElement::new();

        for (i, j, k) in Self::patch_elements(level, patch) {
            let Some(e) = self.gather(level, &view, i, j, k) else {
                continue;
            };
            let Some(r) = self.element_residual(&e, &mut element, &mut face) else {
                log::warn!("degenerate element at ({}, {}, {}) skipped", i, j, k);
                continue;
            };
            for a in 0..8 {
                let (ii, jj, kk) = e.index[a];
                if !e.prescribed[a] && patch.owns(ii, jj) {
                    *out.get_mut(ii, jj, kk) += r[a];
                }
            }
        }

        for (i, j) in patch.owned_points() {
            let [sx, sy] = level.dirichlet_scale(i, j);
            for k in 0..level.mz {
                if level.is_dirichlet(i, j, k) {
                    let d = view.velocity.get(i, j, k) - self.dirichlet_target(level, i, j, k);
                    *out.get_mut(i, j, k) = Vector2::new(sx * d.x, sy * d.y);
                }
            }
        }
        out
    }

    /// Residual `F(u)` at every node of `level`
    pub fn residual(&self, level: &GridLevel, velocity: &VelocityField) -> VelocityField {
        let patches = level.decomposition.patches();
        let locals: Vec<_> = patches
            .par_iter()
            .map(|patch| self.residual_patch(level, patch, velocity))
            .collect();

        let mut result = zero_velocity(level);
        for (patch, local) in patches.iter().zip(locals.iter()) {
            result.release_owned(patch, local);
        }
        result
    }

    fn jacobian_patch(&self, level: &GridLevel, patch: &Patch, velocity: &VelocityField) -> Vec<(usize, usize, f64)> {
        let view = self.view(level, patch, velocity);
        let mut element = Q1Element::new();
        let mut triplets = Vec::new();

        for (i, j, k) in Self::patch_elements(level, patch) {
            let Some(e) = self.gather(level, &view, i, j, k) else {
                continue;
            };
            let Some(jac) = self.element_jacobian(&e, &mut element) else {
                continue;
            };
            let dofs: [usize; 8] = std::array::from_fn(|a| {
                let (ii, jj, kk) = e.index[a];
                2 * level.node_index(ii, jj, kk)
            });
            for t in 0..8 {
                let (ti, tj, _) = e.index[t];
                if e.prescribed[t] || !patch.owns(ti, tj) {
                    continue;
                }
                for s in 0..8 {
                    if e.prescribed[s] {
                        continue;
                    }
                    for c in 0..2 {
                        for d in 0..2 {
                            triplets.push((dofs[t] + c, dofs[s] + d, jac[2 * t + c][2 * s + d]));
                        }
                    }
                }
            }
        }

        for (i, j) in patch.owned_points() {
            let [sx, sy] = level.dirichlet_scale(i, j);
            for k in 0..level.mz {
                if level.is_dirichlet(i, j, k) {
                    let dof = 2 * level.node_index(i, j, k);
                    triplets.push((dof, dof, sx));
                    triplets.push((dof + 1, dof + 1, sy));
                }
            }
        }
        triplets
    }

    /// Newton Jacobian `dF/du` in CSR format
    pub fn jacobian(&self, level: &GridLevel, velocity: &VelocityField) -> CsMat<f64> {
        let n = level.n_dofs();
        let local_triplets: Vec<_> = level
            .decomposition
            .patches()
            .par_iter()
            .map(|patch| self.jacobian_patch(level, patch, velocity))
            .collect();

        let mut triplets = TriMat::new((n, n));
        for patch_triplets in local_triplets {
            for (i, j, val) in patch_triplets {
                triplets.add_triplet(i, j, val);
            }
        }
        triplets.to_csr()
    }

    /// Volumetric strain heating `4 η γ` averaged over the elements
    /// around each node
    pub fn strain_heating(&self, level: &GridLevel, velocity: &VelocityField) -> Array3<f64> {
        let patches = level.decomposition.patches();
        let locals: Vec<_> = patches
            .par_iter()
            .map(|patch| {
                let view = self.view(level, patch, velocity);
                let mut sum = LocalArray3::filled(patch, level.mz, 0.0);
                let mut count = LocalArray3::filled(patch, level.mz, 0.0);
                let mut element = Q1Element::new();

                for (i, j, k) in Self::patch_elements(level, patch) {
                    let Some(e) = self.gather(level, &view, i, j, k) else {
                        continue;
                    };
                    if !element.reset(&e.nodes) {
                        continue;
                    }
                    let grad = element.evaluate_velocity(&e.velocity);
                    let hardness = element.evaluate(&e.hardness);
                    let mean = (0..element.n_points())
                        .map(|q| {
                            let g = &grad[q];
                            let gamma = strain_rate_invariant(g.dx.x, g.dy.x, g.dz.x, g.dx.y, g.dy.y, g.dz.y);
                            let (eta, _) = self.flow_law.effective_viscosity(hardness[q], gamma);
                            4.0 * eta * gamma
                        })
                        .sum::<f64>()
                        / element.n_points() as f64;

                    for &(ii, jj, kk) in &e.index {
                        if patch.owns(ii, jj) {
                            *sum.get_mut(ii, jj, kk) += mean;
                            *count.get_mut(ii, jj, kk) += 1.0;
                        }
                    }
                }

                for (i, j) in patch.owned_points() {
                    for k in 0..level.mz {
                        let c = *count.get(i, j, k);
                        let s = sum.get_mut(i, j, k);
                        *s = if c > 0.0 { *s / c } else { 0.0 };
                    }
                }
                sum
            })
            .collect();

        let mut result = Array3::filled(level.mx, level.my, level.mz, 0.0);
        for (patch, local) in patches.iter().zip(locals.iter()) {
            result.release_owned(patch, local);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::decomposition::Decomposition;
    use crate::linalg::LinearOperator;
    use crate::physics::flow_law::{GlenFlowLaw, NewtonianFlowLaw};
    use crate::stressbalance::forcing::{NoForcing, UniformSliding};
    use approx::assert_relative_eq;
    use rand::{Rng, SeedableRng};

    /// Small sloping slab with a bump, split into four patches
    fn slab(px: usize, py: usize) -> GridLevel {
        let mut level = GridLevel::new(5, 5, 3, 0.0, 0.0, 1.0, 1.0, 0.1, Decomposition::new(5, 5, px, py, 1).unwrap())
            .unwrap();
        for j in 0..5 {
            for i in 0..5 {
                let p = level.params.get_mut(i, j);
                p.bed = -0.1 * i as f64;
                p.thickness = 1.0 + 0.05 * (i * j) as f64;
            }
        }
        level.hardness.set_all(1.0);
        level.compute_node_types();
        level
    }

    fn random_velocity(level: &GridLevel, seed: u64) -> VelocityField {
        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
        Array3::from_fn(level.mx, level.my, level.mz, |_, _, _| {
            Vector2::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0))
        })
    }

    #[test]
    fn test_zero_velocity_on_flat_surface_has_zero_residual() {
        let mut level = slab(1, 1);
        for j in 0..5 {
            for i in 0..5 {
                let p = level.params.get_mut(i, j);
                p.bed = 0.0;
                p.thickness = 1.0;
            }
        }
        let law = NewtonianFlowLaw;
        let assembler = BlatterAssembler::new(&law, &NoForcing, 1.0);
        let r = assembler.residual(&level, &zero_velocity(&level));
        assert_eq!(field_norm(&r), 0.0);
    }

    #[test]
    fn test_jacobian_matches_finite_differences() {
        let level = slab(2, 2);
        let law = GlenFlowLaw::new("isothermal_glen", 3.0, 1e-2);
        let assembler = BlatterAssembler::new(&law, &NoForcing, 1.0);

        let u = random_velocity(&level, 1);
        let direction = to_flat(&random_velocity(&level, 2));
        let jv = assembler.jacobian(&level, &u).apply(&direction);

        let h = 1e-6;
        let mut plus = u.clone();
        add_flat(&mut plus, &direction, h);
        let mut minus = u.clone();
        add_flat(&mut minus, &direction, -h);
        let fd: Vec<f64> = to_flat(&assembler.residual(&level, &plus))
            .iter()
            .zip(to_flat(&assembler.residual(&level, &minus)).iter())
            .map(|(p, m)| (p - m) / (2.0 * h))
            .collect();

        let scale = fd.iter().map(|x| x * x).sum::<f64>().sqrt();
        let err = fd.iter().zip(jv.iter()).map(|(a, b)| (a - b).powi(2)).sum::<f64>().sqrt();
        assert!(err < 1e-6 * scale, "|J v - FD| = {:e}, |FD| = {:e}", err, scale);
    }

    #[test]
    fn test_jacobian_is_symmetric() {
        let level = slab(1, 2);
        let law = GlenFlowLaw::new("isothermal_glen", 3.0, 1e-2);
        let assembler = BlatterAssembler::new(&law, &NoForcing, 1.0);
        let jac = assembler.jacobian(&level, &random_velocity(&level, 3));
        let dense = jac.to_dense();
        for i in 0..dense.nrows() {
            for j in 0..i {
                assert_relative_eq!(dense[[i, j]], dense[[j, i]], epsilon = 1e-10, max_relative = 1e-10);
            }
        }
    }

    #[test]
    fn test_element_jacobian_is_exactly_symmetric() {
        let level = slab(1, 1);
        let law = GlenFlowLaw::new("isothermal_glen", 3.0, 1e-2);
        let assembler = BlatterAssembler::new(&law, &NoForcing, 1.0);
        let u = random_velocity(&level, 7);
        let patch = &level.decomposition.patches()[0];
        let view = assembler.view(&level, patch, &u);
        let mut element = Q1Element::new();

        let e = assembler.gather(&level, &view, 1, 2, 0).unwrap();
        let jac = assembler.element_jacobian(&e, &mut element).unwrap();
        for r in 0..16 {
            for c in 0..16 {
                assert_eq!(jac[r][c], jac[c][r], "entry ({}, {})", r, c);
            }
            assert!(jac[r][r] > 0.0);
        }
    }

    #[test]
    fn test_partitioning_does_not_change_residual() {
        let law = GlenFlowLaw::new("isothermal_glen", 3.0, 1e-2);
        let assembler = BlatterAssembler::new(&law, &NoForcing, 1.0);
        let serial = slab(1, 1);
        let split = slab(3, 2);
        let u = random_velocity(&serial, 4);
        let a = assembler.residual(&serial, &u);
        let b = assembler.residual(&split, &u);
        for (x, y) in a.iter().zip(b.iter()) {
            assert_relative_eq!(x.x, y.x, epsilon = 1e-12);
            assert_relative_eq!(x.y, y.y, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_dirichlet_rows_are_scaled_differences() {
        let level = slab(1, 1);
        let law = NewtonianFlowLaw;
        let forcing = UniformSliding {
            velocity: Vector2::new(2.0, 0.0),
        };
        let assembler = BlatterAssembler::new(&law, &forcing, 1.0);
        let u = random_velocity(&level, 5);
        let r = assembler.residual(&level, &u);
        let [sx, sy] = level.dirichlet_scale(2, 3);
        let base = u[(2, 3, 0)];
        assert_relative_eq!(r[(2, 3, 0)].x, sx * (base.x - 2.0), epsilon = 1e-12);
        assert_relative_eq!(r[(2, 3, 0)].y, sy * base.y, epsilon = 1e-12);
    }

    #[test]
    fn test_strain_heating_is_nonnegative() {
        let level = slab(2, 1);
        let law = GlenFlowLaw::new("isothermal_glen", 3.0, 1e-2);
        let assembler = BlatterAssembler::new(&law, &NoForcing, 1.0);
        let heat = assembler.strain_heating(&level, &random_velocity(&level, 6));
        assert!(heat.iter().all(|&h| h >= 0.0));
        assert!(heat.iter().any(|&h| h > 0.0));
    }
}
