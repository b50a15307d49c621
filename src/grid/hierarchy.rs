//! Multigrid hierarchy of stress-balance grids
//!
//! Each coarse level halves the number of intervals in all three directions.
//! Transfer operators are tensor products of 1D stencils: trilinear
//! prolongation, its transpose for residuals, injection for iterates and
//! normalized full weighting for parameters.

use std::ops::{Add, Mul};

use super::array::{Array2, Array3};
use super::level::{GridLevel, Parameters};
use crate::error::ConfigError;

/// Fine neighbors of coarse index `c` with full-weighting weights
fn fine_stencil(c: usize, n_fine: usize) -> impl Iterator<Item = (usize, f64)> {
    let f = 2 * c;
    [(f as isize - 1, 0.5), (f as isize, 1.0), (f as isize + 1, 0.5)]
        .into_iter()
        .filter(move |&(i, _)| i >= 0 && (i as usize) < n_fine)
        .map(|(i, w)| (i as usize, w))
}

/// Coarse neighbors of fine index `f` with linear interpolation weights
fn coarse_stencil(f: usize) -> [(usize, f64); 2] {
    if f % 2 == 0 {
        [(f / 2, 1.0), (f / 2, 0.0)]
    } else {
        [(f / 2, 0.5), (f / 2 + 1, 0.5)]
    }
}

/// Trilinear interpolation of a coarse field onto the fine grid
pub fn prolong<T>(coarse: &Array3<T>, fine_dims: (usize, usize, usize), zero: T) -> Array3<T>
where
    T: Copy + Add<Output = T> + Mul<f64, Output = T>,
{
    let (mx, my, mz) = fine_dims;
    Array3::from_fn(mx, my, mz, |i, j, k| {
        let mut value = zero;
        for &(ic, wi) in &coarse_stencil(i) {
            for &(jc, wj) in &coarse_stencil(j) {
                for &(kc, wk) in &coarse_stencil(k) {
                    let w = wi * wj * wk;
                    if w != 0.0 {
                        value = value + *coarse.get(ic, jc, kc) * w;
                    }
                }
            }
        }
        value
    })
}

/// Transpose of `prolong`: maps fine residuals to the coarse grid
pub fn restrict_residual<T>(fine: &Array3<T>, coarse_dims: (usize, usize, usize), zero: T) -> Array3<T>
where
    T: Copy + Add<Output = T> + Mul<f64, Output = T>,
{
    let (mx, my, mz) = coarse_dims;
    Array3::from_fn(mx, my, mz, |ic, jc, kc| {
        let mut value = zero;
        for (i, wi) in fine_stencil(ic, fine.mx()) {
            for (j, wj) in fine_stencil(jc, fine.my()) {
                for (k, wk) in fine_stencil(kc, fine.mz()) {
                    value = value + *fine.get(i, j, k) * (wi * wj * wk);
                }
            }
        }
        value
    })
}

/// Coarse values taken from coincident fine nodes
pub fn inject<T: Copy>(fine: &Array3<T>, coarse_dims: (usize, usize, usize)) -> Array3<T> {
    let (mx, my, mz) = coarse_dims;
    Array3::from_fn(mx, my, mz, |i, j, k| *fine.get(2 * i, 2 * j, 2 * k))
}

/// Normalized full weighting of a 3D scalar field
pub fn restrict_average(fine: &Array3<f64>, coarse_dims: (usize, usize, usize)) -> Array3<f64> {
    let (mx, my, mz) = coarse_dims;
    Array3::from_fn(mx, my, mz, |ic, jc, kc| {
        let (mut sum, mut weight) = (0.0, 0.0);
        for (i, wi) in fine_stencil(ic, fine.mx()) {
            for (j, wj) in fine_stencil(jc, fine.my()) {
                for (k, wk) in fine_stencil(kc, fine.mz()) {
                    let w = wi * wj * wk;
                    sum += w * fine.get(i, j, k);
                    weight += w;
                }
            }
        }
        sum / weight
    })
}

/// Normalized full weighting of the 2D parameters
///
/// Scalars are averaged; the Dirichlet mask is injected. Node types are
/// left for the caller to recompute.
fn restrict_parameters(fine: &Array2<Parameters>, mx: usize, my: usize) -> Array2<Parameters> {
    Array2::from_fn(mx, my, |ic, jc| {
        let mut p = Parameters {
            bc_mask: fine.get(2 * ic, 2 * jc).bc_mask,
            ..Parameters::default()
        };
        let mut weight = 0.0;
        for (i, wi) in fine_stencil(ic, fine.mx()) {
            for (j, wj) in fine_stencil(jc, fine.my()) {
                let w = wi * wj;
                let f = fine.get(i, j);
                p.bed += w * f.bed;
                p.thickness += w * f.thickness;
                p.tauc += w * f.tauc;
                p.sea_level += w * f.sea_level;
                weight += w;
            }
        }
        p.bed /= weight;
        p.thickness /= weight;
        p.tauc /= weight;
        p.sea_level /= weight;
        p
    })
}

/// Coarse level carrying the fine level's parameters and hardness
///
/// Returns a copy of `coarse` whose parameters are restricted from `fine`
/// and whose node types are recomputed from the restricted thickness.
pub fn restrict_and_reclassify(fine: &GridLevel, coarse: &GridLevel) -> GridLevel {
    let mut result = coarse.clone();
    result.params = restrict_parameters(&fine.params, coarse.mx, coarse.my);
    result.hardness = restrict_average(&fine.hardness, (coarse.mx, coarse.my, coarse.mz));
    result.compute_node_types();
    result
}

impl GridLevel {
    /// Next coarser level; fails unless every dimension has an even number
    /// of intervals
    pub fn coarsened(&self) -> Result<GridLevel, ConfigError> {
        let coarsen = |n: usize| {
            if n >= 3 && (n - 1) % 2 == 0 {
                Some((n - 1) / 2 + 1)
            } else {
                None
            }
        };
        let (Some(mx), Some(my), Some(mz)) = (coarsen(self.mx), coarsen(self.my), coarsen(self.mz)) else {
            return Err(ConfigError::NotCoarsenable {
                points: self.mx.max(self.my).max(self.mz),
                levels: 2,
            });
        };
        let decomposition = self.decomposition.resized(mx, my)?;
        let mut coarse = GridLevel::new(
            mx,
            my,
            mz,
            self.x_min,
            self.y_min,
            2.0 * self.dx,
            2.0 * self.dy,
            self.min_thickness,
            decomposition,
        )?;
        coarse.params = restrict_parameters(&self.params, mx, my);
        coarse.hardness = restrict_average(&self.hardness, (mx, my, mz));
        coarse.compute_node_types();
        Ok(coarse)
    }

    pub fn dims(&self) -> (usize, usize, usize) {
        (self.mx, self.my, self.mz)
    }
}

/// Grid levels from finest (index 0) to coarsest
#[derive(Debug, Clone)]
pub struct GridHierarchy {
    levels: Vec<GridLevel>,
}

impl GridHierarchy {
    /// Build `n_levels` levels by repeated coarsening of `finest`
    pub fn new(finest: GridLevel, n_levels: usize) -> Result<Self, ConfigError> {
        if n_levels == 0 {
            return Err(ConfigError::invalid("stress_balance.n_levels", "need at least 1 level"));
        }
        let points = finest.mx.max(finest.my).max(finest.mz);
        let mut levels = vec![finest];
        while levels.len() < n_levels {
            let coarse = levels[levels.len() - 1]
                .coarsened()
                .map_err(|_| ConfigError::NotCoarsenable { points, levels: n_levels })?;
            levels.push(coarse);
        }
        Ok(Self { levels })
    }

    pub fn levels(&self) -> &[GridLevel] {
        &self.levels
    }

    pub fn level(&self, l: usize) -> &GridLevel {
        &self.levels[l]
    }

    pub fn finest(&self) -> &GridLevel {
        &self.levels[0]
    }

    pub fn finest_mut(&mut self) -> &mut GridLevel {
        &mut self.levels[0]
    }

    pub fn n_levels(&self) -> usize {
        self.levels.len()
    }

    /// Propagate the finest level's parameters down the hierarchy
    ///
    /// Called once per solve, after the finest parameters change.
    pub fn restrict_parameters(&mut self) {
        self.levels[0].compute_node_types();
        for l in 1..self.levels.len() {
            let updated = restrict_and_reclassify(&self.levels[l - 1], &self.levels[l]);
            self.levels[l] = updated;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::decomposition::Decomposition;
    use crate::grid::level::NodeType;
    use approx::assert_relative_eq;
    use nalgebra::Vector2;

    fn level(mx: usize, my: usize, mz: usize) -> GridLevel {
        GridLevel::new(mx, my, mz, 0.0, 0.0, 100.0, 100.0, 0.1, Decomposition::new(mx, my, 2, 1, 1).unwrap())
            .unwrap()
    }

    #[test]
    fn test_prolong_reproduces_trilinear_fields() {
        let f = |x: f64, y: f64, z: f64| 1.0 + 2.0 * x - y + 0.5 * z;
        let coarse = Array3::from_fn(3, 3, 3, |i, j, k| f(2.0 * i as f64, 2.0 * j as f64, 2.0 * k as f64));
        let fine = prolong(&coarse, (5, 5, 5), 0.0);
        for j in 0..5 {
            for i in 0..5 {
                for k in 0..5 {
                    assert_relative_eq!(fine[(i, j, k)], f(i as f64, j as f64, k as f64), epsilon = 1e-12);
                }
            }
        }
    }

    #[test]
    fn test_restriction_is_transpose_of_prolongation() {
        // <P c, f> == <c, P^T f> for arbitrary fields
        let coarse = Array3::from_fn(3, 2, 3, |i, j, k| Vector2::new((i + 2 * j) as f64, (k * k) as f64 - 1.0));
        let fine = Array3::from_fn(5, 3, 5, |i, j, k| Vector2::new(((i * 7 + j * 3 + k) % 5) as f64, (i + k) as f64 * 0.1));
        let pc = prolong(&coarse, (5, 3, 5), Vector2::zeros());
        let ptf = restrict_residual(&fine, (3, 2, 3), Vector2::zeros());
        let lhs: f64 = pc.iter().zip(fine.iter()).map(|(a, b)| a.dot(b)).sum();
        let rhs: f64 = coarse.iter().zip(ptf.iter()).map(|(a, b)| a.dot(b)).sum();
        assert_relative_eq!(lhs, rhs, epsilon = 1e-10);
    }

    #[test]
    fn test_average_preserves_constants() {
        let fine = Array3::filled(5, 5, 3, 3.5);
        let coarse = restrict_average(&fine, (3, 3, 2));
        assert!(coarse.iter().all(|&v| (v - 3.5).abs() < 1e-12));
    }

    #[test]
    fn test_hierarchy_dimensions() {
        let h = GridHierarchy::new(level(9, 5, 5), 3).unwrap();
        assert_eq!(h.n_levels(), 3);
        assert_eq!(h.level(1).dims(), (5, 3, 3));
        assert_eq!(h.level(2).dims(), (3, 2, 2));
        assert_relative_eq!(h.level(2).dx, 400.0);
    }

    #[test]
    fn test_odd_interval_count_not_coarsenable() {
        assert!(matches!(
            GridHierarchy::new(level(6, 5, 5), 2),
            Err(ConfigError::NotCoarsenable { .. })
        ));
    }

    #[test]
    fn test_restricted_thickness_drives_node_types() {
        let mut h = GridHierarchy::new(level(9, 9, 3), 2).unwrap();
        for j in 0..9 {
            for i in 0..9 {
                h.finest_mut().params.get_mut(i, j).thickness = if i < 5 { 500.0 } else { 0.0 };
            }
        }
        h.restrict_parameters();
        let coarse = h.level(1);
        assert_relative_eq!(coarse.params[(1, 2)].thickness, 500.0);
        assert_eq!(coarse.params[(1, 2)].node_type, NodeType::Interior);
        assert_eq!(coarse.params[(4, 2)].node_type, NodeType::Exterior);
        assert!(coarse.hardness.iter().all(|&b| b == 0.0));
    }
}
