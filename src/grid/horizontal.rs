//! Horizontal model grid shared by the stress balance and the column solvers

use super::decomposition::Decomposition;
use super::level::grid_xy;
use crate::error::ConfigError;

/// Regular `mx x my` grid of column centers
#[derive(Debug, Clone, PartialEq)]
pub struct HorizontalGrid {
    pub mx: usize,
    pub my: usize,
    pub x_min: f64,
    pub y_min: f64,
    pub dx: f64,
    pub dy: f64,
}

impl HorizontalGrid {
    /// Grid covering `[x_min, x_max] x [y_min, y_max]` with `mx x my` points
    pub fn from_bounds(mx: usize, my: usize, x: [f64; 2], y: [f64; 2]) -> Result<Self, ConfigError> {
        if mx < 2 || my < 2 {
            return Err(ConfigError::invalid(
                "grid",
                format!("need at least 2 points per direction, got {}x{}", mx, my),
            ));
        }
        if !(x[1] > x[0] && y[1] > y[0]) {
            return Err(ConfigError::invalid("grid", "domain bounds must be increasing"));
        }
        Ok(Self {
            mx,
            my,
            x_min: x[0],
            y_min: y[0],
            dx: (x[1] - x[0]) / (mx - 1) as f64,
            dy: (y[1] - y[0]) / (my - 1) as f64,
        })
    }

    pub fn x(&self, i: usize) -> f64 {
        grid_xy(self.x_min, self.dx, i)
    }

    pub fn y(&self, j: usize) -> f64 {
        grid_xy(self.y_min, self.dy, j)
    }

    pub fn n_points(&self) -> usize {
        self.mx * self.my
    }

    /// Patch layout for column loops
    pub fn decomposition(&self, partitions: [usize; 2], stencil_width: usize) -> Result<Decomposition, ConfigError> {
        Decomposition::new(self.mx, self.my, partitions[0], partitions[1], stencil_width)
    }
}
