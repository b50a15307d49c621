//! One level of the terrain-following stress-balance grid
//!
//! Nodes are indexed `(i, j, k)` with `k` counting sigma levels from the
//! base; node `(i, j, k)` sits at `z = b + H k / (mz - 1)` where `H` is
//! clamped from below by the minimum thickness.

use super::array::{Array2, Array3};
use super::decomposition::Decomposition;
use crate::error::ConfigError;

/// Classification of a horizontal node with respect to the ice extent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NodeType {
    /// All four neighboring cells contain ice
    #[default]
    Interior,
    /// Some but not all neighboring cells contain ice
    Boundary,
    /// No neighboring cell contains ice
    Exterior,
}

/// Per-column parameters of the stress balance
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Parameters {
    /// Bed elevation (m)
    pub bed: f64,
    /// Ice thickness (m)
    pub thickness: f64,
    /// Basal yield stress (Pa)
    pub tauc: f64,
    /// Sea level elevation (m)
    pub sea_level: f64,
    /// Velocity is prescribed in this whole column
    pub bc_mask: bool,
    pub node_type: NodeType,
}

impl Parameters {
    /// Ice surface elevation
    pub fn surface(&self) -> f64 {
        self.bed + self.thickness
    }
}

/// Horizontal coordinate of grid index `i`
#[inline]
pub fn grid_xy(min: f64, delta: f64, i: usize) -> f64 {
    min + delta * i as f64
}

/// Elevation of sigma level `k`, with the thickness clamped to `min_thickness`
#[inline]
pub fn grid_z(bed: f64, thickness: f64, mz: usize, k: usize, min_thickness: f64) -> f64 {
    bed + thickness.max(min_thickness) * k as f64 / (mz - 1) as f64
}

/// Number of points to add so that `n` points coarsen `n_levels - 1` times
///
/// The padded size is the smallest `C m + 1 >= n` with `C = 2^(n_levels-1)`.
pub fn grid_padding(n: usize, n_levels: usize) -> usize {
    let c = 1usize << n_levels.saturating_sub(1);
    let m = (n.max(2) - 1).div_ceil(c);
    c * m + 1 - n
}

/// Grid, parameters and ice hardness of one multigrid level
#[derive(Debug, Clone)]
pub struct GridLevel {
    pub mx: usize,
    pub my: usize,
    pub mz: usize,
    pub x_min: f64,
    pub y_min: f64,
    pub dx: f64,
    pub dy: f64,
    pub min_thickness: f64,
    pub params: Array2<Parameters>,
    /// Ice hardness B at every node
    pub hardness: Array3<f64>,
    pub decomposition: Decomposition,
}

impl GridLevel {
    /// Empty level with zero parameters and hardness
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        mx: usize,
        my: usize,
        mz: usize,
        x_min: f64,
        y_min: f64,
        dx: f64,
        dy: f64,
        min_thickness: f64,
        decomposition: Decomposition,
    ) -> Result<Self, ConfigError> {
        if mx < 2 || my < 2 || mz < 2 {
            return Err(ConfigError::invalid(
                "grid",
                format!("need at least 2 points per direction, got {}x{}x{}", mx, my, mz),
            ));
        }
        if !(dx > 0.0 && dy > 0.0) {
            return Err(ConfigError::invalid("grid", "spacing must be positive"));
        }
        if decomposition.mx() != mx || decomposition.my() != my {
            return Err(ConfigError::invalid("grid", "decomposition does not match the grid"));
        }
        Ok(Self {
            mx,
            my,
            mz,
            x_min,
            y_min,
            dx,
            dy,
            min_thickness,
            params: Array2::filled(mx, my, Parameters::default()),
            hardness: Array3::filled(mx, my, mz, 0.0),
            decomposition,
        })
    }

    pub fn n_nodes(&self) -> usize {
        self.mx * self.my * self.mz
    }

    /// Number of unknowns (two velocity components per node)
    pub fn n_dofs(&self) -> usize {
        2 * self.n_nodes()
    }

    #[inline]
    pub fn node_index(&self, i: usize, j: usize, k: usize) -> usize {
        (j * self.mx + i) * self.mz + k
    }

    pub fn x(&self, i: usize) -> f64 {
        grid_xy(self.x_min, self.dx, i)
    }

    pub fn y(&self, j: usize) -> f64 {
        grid_xy(self.y_min, self.dy, j)
    }

    pub fn z(&self, i: usize, j: usize, k: usize) -> f64 {
        let p = self.params.get(i, j);
        grid_z(p.bed, p.thickness, self.mz, k, self.min_thickness)
    }

    /// Basal nodes and masked columns take prescribed velocities
    #[inline]
    pub fn is_prescribed(&self, i: usize, j: usize, k: usize) -> bool {
        k == 0 || self.params.get(i, j).bc_mask
    }

    /// Rows replaced by a scaled Dirichlet condition
    #[inline]
    pub fn is_dirichlet(&self, i: usize, j: usize, k: usize) -> bool {
        self.is_prescribed(i, j, k) || self.params.get(i, j).node_type == NodeType::Exterior
    }

    /// Scaling of Dirichlet rows, comparable to the diagonal of the
    /// viscous operator for unit viscosity
    pub fn dirichlet_scale(&self, i: usize, j: usize) -> [f64; 2] {
        let h = self.params.get(i, j).thickness.max(self.min_thickness);
        let dz = h / (self.mz - 1) as f64;
        let (dx, dy) = (self.dx, self.dy);
        [
            dx * dy / dz + dx * dz / dy + 4.0 * dy * dz / dx,
            dx * dy / dz + 4.0 * dx * dz / dy + dy * dz / dx,
        ]
    }

    /// Does the cell with lower-left corner `(i, j)` contain ice?
    ///
    /// A cell is icy when any of its corners has at least the minimum
    /// thickness; cells outside the grid are ice-free.
    fn cell_has_ice(&self, i: isize, j: isize) -> bool {
        if i < 0 || j < 0 || i as usize + 1 >= self.mx || j as usize + 1 >= self.my {
            return false;
        }
        let (i, j) = (i as usize, j as usize);
        [(i, j), (i + 1, j), (i + 1, j + 1), (i, j + 1)]
            .iter()
            .any(|&(a, b)| self.params.get(a, b).thickness >= self.min_thickness)
    }

    /// Classify every node from the current thickness
    ///
    /// Growing the thickness never turns a node from interior or boundary
    /// into exterior.
    pub fn compute_node_types(&mut self) {
        let types = Array2::from_fn(self.mx, self.my, |i, j| {
            let (i, j) = (i as isize, j as isize);
            let icy = [(i - 1, j - 1), (i, j - 1), (i, j), (i - 1, j)]
                .iter()
                .filter(|&&(a, b)| self.cell_has_ice(a, b))
                .count();
            match icy {
                4 => NodeType::Interior,
                0 => NodeType::Exterior,
                _ => NodeType::Boundary,
            }
        });
        for j in 0..self.my {
            for i in 0..self.mx {
                self.params.get_mut(i, j).node_type = *types.get(i, j);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn level(mx: usize, my: usize) -> GridLevel {
        GridLevel::new(mx, my, 3, 0.0, 0.0, 1.0, 1.0, 0.1, Decomposition::serial(mx, my).unwrap()).unwrap()
    }

    #[test]
    fn test_grid_padding() {
        assert_eq!(grid_padding(5, 1), 0);
        assert_eq!(grid_padding(5, 3), 0);
        assert_eq!(grid_padding(6, 2), 1);
        assert_eq!(grid_padding(6, 3), 3);
        assert_eq!(grid_padding(2, 2), 1);
    }

    #[test]
    fn test_grid_z_clamps_thickness() {
        assert_eq!(grid_z(10.0, 100.0, 5, 4, 0.1), 110.0);
        assert_eq!(grid_z(10.0, 0.0, 5, 4, 0.1), 10.1);
    }

    #[test]
    fn test_node_types_of_ice_cap() {
        let mut lvl = level(7, 7);
        for j in 2..5 {
            for i in 2..5 {
                lvl.params.get_mut(i, j).thickness = 100.0;
            }
        }
        lvl.compute_node_types();
        assert_eq!(lvl.params[(3, 3)].node_type, NodeType::Interior);
        assert_eq!(lvl.params[(2, 2)].node_type, NodeType::Interior);
        // ice-free node touching an icy cell
        assert_eq!(lvl.params[(1, 3)].node_type, NodeType::Boundary);
        assert_eq!(lvl.params[(0, 0)].node_type, NodeType::Exterior);
        assert_eq!(lvl.params[(6, 3)].node_type, NodeType::Exterior);
    }

    #[test]
    fn test_domain_edge_nodes_are_boundary() {
        let mut lvl = level(4, 4);
        for j in 0..4 {
            for i in 0..4 {
                lvl.params.get_mut(i, j).thickness = 50.0;
            }
        }
        lvl.compute_node_types();
        assert_eq!(lvl.params[(0, 2)].node_type, NodeType::Boundary);
        assert_eq!(lvl.params[(1, 1)].node_type, NodeType::Interior);
        assert!(lvl.is_dirichlet(1, 1, 0));
        assert!(!lvl.is_dirichlet(1, 1, 1));
    }

    #[test]
    fn test_dirichlet_scale_is_positive() {
        let lvl = level(3, 3);
        let [sx, sy] = lvl.dirichlet_scale(1, 1);
        assert!(sx > 0.0 && sy > 0.0);
    }
}
