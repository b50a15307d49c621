//! Vertical grids for the column solvers
//!
//! 3D model fields live on a possibly non-uniform storage grid of heights
//! above the ice base. Column systems are solved on an equally spaced fine
//! grid covering the same interval; `VerticalMapping` interpolates between
//! the two.

use crate::error::ConfigError;

/// Storage levels, in meters above the ice base
#[derive(Debug, Clone, PartialEq)]
pub struct VerticalGrid {
    levels: Vec<f64>,
}

impl VerticalGrid {
    /// Levels must start at zero and be strictly increasing
    pub fn new(levels: Vec<f64>) -> Result<Self, ConfigError> {
        if levels.len() < 2 {
            return Err(ConfigError::invalid("vertical grid", "need at least two levels"));
        }
        if levels[0] != 0.0 {
            return Err(ConfigError::invalid("vertical grid", "first level must be at z = 0"));
        }
        if levels.windows(2).any(|w| !(w[1] > w[0])) {
            return Err(ConfigError::invalid("vertical grid", "levels must be strictly increasing"));
        }
        Ok(Self { levels })
    }

    /// `mz` equally spaced levels from 0 to `height`
    pub fn equal(height: f64, mz: usize) -> Result<Self, ConfigError> {
        if mz < 2 || !(height > 0.0) {
            return Err(ConfigError::invalid(
                "vertical grid",
                format!("need mz >= 2 and positive height, got mz = {}, Lz = {}", mz, height),
            ));
        }
        let dz = height / (mz - 1) as f64;
        Self::new((0..mz).map(|k| k as f64 * dz).collect())
    }

    pub fn levels(&self) -> &[f64] {
        &self.levels
    }

    pub fn mz(&self) -> usize {
        self.levels.len()
    }

    /// Domain height Lz
    pub fn height(&self) -> f64 {
        self.levels[self.levels.len() - 1]
    }

    /// Index of the highest level at or below `z` (clamped to the grid)
    pub fn level_below(&self, z: f64) -> usize {
        let idx = self.levels.partition_point(|&level| level <= z);
        idx.saturating_sub(1).min(self.levels.len() - 1)
    }
}

/// Linear interpolation between the storage grid and the fine column grid
#[derive(Debug, Clone)]
pub struct VerticalMapping {
    storage: VerticalGrid,
    fine_dz: f64,
    fine_levels: Vec<f64>,
    /// For each fine level: storage level below and weight of the level above
    to_fine: Vec<(usize, f64)>,
    /// For each storage level: fine level below and weight of the level above
    to_storage: Vec<(usize, f64)>,
}

fn interpolation_table(from: &[f64], to: &[f64]) -> Vec<(usize, f64)> {
    let last = from.len() - 1;
    to.iter()
        .map(|&z| {
            let k = from.partition_point(|&level| level <= z).saturating_sub(1).min(last);
            if k == last {
                (k, 0.0)
            } else {
                let w = ((z - from[k]) / (from[k + 1] - from[k])).clamp(0.0, 1.0);
                (k, w)
            }
        })
        .collect()
}

fn interpolate(table: &[(usize, f64)], values: &[f64], out: &mut [f64]) {
    for (o, &(k, w)) in out.iter_mut().zip(table.iter()) {
        *o = if w == 0.0 {
            values[k]
        } else {
            (1.0 - w) * values[k] + w * values[k + 1]
        };
    }
}

impl VerticalMapping {
    /// Fine spacing is the smallest storage spacing, adjusted to divide Lz
    pub fn new(storage: &VerticalGrid) -> Self {
        let z = storage.levels();
        let lz = storage.height();
        let min_dz = z.windows(2).map(|w| w[1] - w[0]).fold(f64::INFINITY, f64::min);

        // equally spaced storage grids map one-to-one
        let intervals = ((lz / min_dz) - 1e-6).ceil().max(1.0) as usize;
        let fine_dz = lz / intervals as f64;
        let fine_levels: Vec<f64> = (0..=intervals).map(|k| k as f64 * fine_dz).collect();

        Self {
            to_fine: interpolation_table(z, &fine_levels),
            to_storage: interpolation_table(&fine_levels, z),
            storage: storage.clone(),
            fine_dz,
            fine_levels,
        }
    }

    pub fn storage(&self) -> &VerticalGrid {
        &self.storage
    }

    pub fn fine_dz(&self) -> f64 {
        self.fine_dz
    }

    pub fn fine_levels(&self) -> &[f64] {
        &self.fine_levels
    }

    pub fn fine_mz(&self) -> usize {
        self.fine_levels.len()
    }

    /// Index of the last fine level inside ice of the given thickness
    ///
    /// Returns `None` when the ice is thicker than the domain.
    pub fn ks(&self, thickness: f64) -> Option<usize> {
        if thickness > self.storage.height() + 1e-9 * self.storage.height() {
            return None;
        }
        let ks = (thickness.max(0.0) / self.fine_dz + 1e-9).floor() as usize;
        Some(ks.min(self.fine_mz() - 1))
    }

    /// Interpolate a storage column onto the fine grid
    pub fn storage_to_fine(&self, column: &[f64], fine: &mut [f64]) {
        interpolate(&self.to_fine, column, fine);
    }

    /// Interpolate a fine column back onto the storage grid
    pub fn fine_to_storage(&self, fine: &[f64], column: &mut [f64]) {
        interpolate(&self.to_storage, fine, column);
    }
}
