//! Ice age
//!
//! Solves `∂τ/∂t + u·∇τ + w ∂τ/∂z = 1` column by column with explicit
//! first-order upwind horizontal advection and implicit first-order upwind
//! vertical advection. Surface ice has age zero, and so does ice frozen on
//! at the base (`w > 0` there).

use rayon::prelude::*;

use super::enthalpy_model::upwind;
use crate::config::Config;
use crate::error::{ConfigError, EnergyError, Result};
use crate::grid::{Array2, Array3, Decomposition, HorizontalGrid, LocalArray3, Patch, VerticalGrid, VerticalMapping};
use crate::linalg::TridiagonalSystem;

/// Age field (s) on the storage grid and its column solver
pub struct AgeModel {
    grid: HorizontalGrid,
    decomposition: Decomposition,
    mapping: VerticalMapping,
    age: Array3<f64>,
}

/// Work arrays of one patch
struct AgeColumn {
    system: TridiagonalSystem,
    age: Vec<f64>,
    u: Vec<f64>,
    v: Vec<f64>,
    w: Vec<f64>,
    west: Vec<f64>,
    east: Vec<f64>,
    south: Vec<f64>,
    north: Vec<f64>,
    x: Vec<f64>,
}

impl AgeColumn {
    fn new(mz: usize) -> Self {
        Self {
            system: TridiagonalSystem::new(mz),
            age: vec![0.0; mz],
            u: vec![0.0; mz],
            v: vec![0.0; mz],
            w: vec![0.0; mz],
            west: vec![0.0; mz],
            east: vec![0.0; mz],
            south: vec![0.0; mz],
            north: vec![0.0; mz],
            x: vec![0.0; mz],
        }
    }
}

impl AgeModel {
    pub fn new(config: &Config, grid: &HorizontalGrid, vertical: &VerticalGrid) -> Result<Self> {
        let sb = &config.stress_balance;
        Ok(Self {
            decomposition: grid.decomposition(sb.partitions, sb.stencil_width)?,
            mapping: VerticalMapping::new(vertical),
            age: Array3::filled(grid.mx, grid.my, vertical.mz(), 0.0),
            grid: grid.clone(),
        })
    }

    pub fn age(&self) -> &Array3<f64> {
        &self.age
    }

    pub fn set_age(&mut self, age: Array3<f64>) -> std::result::Result<(), ConfigError> {
        if age.len() != self.age.len() {
            return Err(ConfigError::SizeMismatch {
                name: "age",
                expected: self.age.len(),
                actual: age.len(),
            });
        }
        self.age = age;
        Ok(())
    }

    /// Advance the age by `dt` seconds using storage-grid velocities
    pub fn update(
        &mut self,
        thickness: &Array2<f64>,
        u: &Array3<f64>,
        v: &Array3<f64>,
        w: &Array3<f64>,
        dt: f64,
    ) -> Result<()> {
        let n2 = self.grid.mx * self.grid.my;
        let n3 = self.age.len();
        for (name, expected, actual) in [
            ("thickness", n2, thickness.len()),
            ("u", n3, u.len()),
            ("v", n3, v.len()),
            ("w", n3, w.len()),
        ] {
            if expected != actual {
                return Err(ConfigError::SizeMismatch { name, expected, actual }.into());
            }
        }

        let results = self
            .decomposition
            .patches()
            .par_iter()
            .map(|patch| self.update_patch(patch, thickness, [u, v, w], dt))
            .collect::<std::result::Result<Vec<_>, EnergyError>>()?;

        for (patch, local) in self.decomposition.patches().iter().zip(results.iter()) {
            self.age.release_owned(patch, local);
        }
        Ok(())
    }

    fn update_patch(
        &self,
        patch: &Patch,
        thickness: &Array2<f64>,
        [u, v, w]: [&Array3<f64>; 3],
        dt: f64,
    ) -> std::result::Result<LocalArray3<f64>, EnergyError> {
        let map = &self.mapping;
        let (mx, my) = (self.grid.mx, self.grid.my);
        let (dx, dy, dz) = (self.grid.dx, self.grid.dy, map.fine_dz());
        let old = self.age.acquire_ghosted(patch);
        let mut result = LocalArray3::filled(patch, map.storage().mz(), 0.0);
        let mut c = AgeColumn::new(map.fine_mz());

        for (i, j) in patch.owned_points() {
            let h = *thickness.get(i, j);
            let ks = map.ks(h).ok_or(EnergyError::ThicknessExceedsDomain {
                i,
                j,
                thickness: h,
                height: map.storage().height(),
            })?;
            if ks == 0 {
                // result is already zero
                continue;
            }

            map.storage_to_fine(old.column(i, j), &mut c.age);
            map.storage_to_fine(u.column(i, j), &mut c.u);
            map.storage_to_fine(v.column(i, j), &mut c.v);
            map.storage_to_fine(w.column(i, j), &mut c.w);
            map.storage_to_fine(old.column(i.saturating_sub(1), j), &mut c.west);
            map.storage_to_fine(old.column((i + 1).min(mx - 1), j), &mut c.east);
            map.storage_to_fine(old.column(i, j.saturating_sub(1)), &mut c.south);
            map.storage_to_fine(old.column(i, (j + 1).min(my - 1)), &mut c.north);

            let nu = dt / dz;
            for k in 0..ks {
                let tau = c.age[k];
                let advection = upwind(c.u[k], c.west[k], tau, c.east[k], dx)
                    + upwind(c.v[k], c.south[k], tau, c.north[k], dy);
                let aa = nu * c.w[k];
                let rhs = tau + dt * (1.0 - advection);
                let s = &mut c.system;
                if k == 0 {
                    s.l[0] = 0.0;
                    if c.w[0] > 0.0 {
                        s.d[0] = 1.0;
                        s.u[0] = 0.0;
                        s.rhs[0] = 0.0;
                    } else {
                        s.d[0] = 1.0 - aa;
                        s.u[0] = aa;
                        s.rhs[0] = rhs;
                    }
                } else if c.w[k] >= 0.0 {
                    s.l[k] = -aa;
                    s.d[k] = 1.0 + aa;
                    s.u[k] = 0.0;
                    s.rhs[k] = rhs;
                } else {
                    s.l[k] = 0.0;
                    s.d[k] = 1.0 - aa;
                    s.u[k] = aa;
                    s.rhs[k] = rhs;
                }
            }
            c.system.l[ks] = 0.0;
            c.system.d[ks] = 1.0;
            c.system.u[ks] = 0.0;
            c.system.rhs[ks] = 0.0;

            c.x.iter_mut().for_each(|x| *x = 0.0);
            c.system.solve(ks + 1, &mut c.x).map_err(|row| {
                let dump = c.system.dump(ks + 1);
                log::error!("age column ({}, {}): zero pivot in row {} (ks = {})\n{}", i, j, row, ks, dump);
                EnergyError::ZeroPivot {
                    system: "age",
                    i,
                    j,
                    row,
                    ks,
                    dump,
                }
            })?;
            map.fine_to_storage(&c.x, result.column_mut(i, j));
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn model() -> (AgeModel, HorizontalGrid) {
        let grid = HorizontalGrid::from_bounds(4, 3, [0.0, 3000.0], [0.0, 2000.0]).unwrap();
        let vertical = VerticalGrid::equal(1000.0, 11).unwrap();
        (AgeModel::new(&Config::default(), &grid, &vertical).unwrap(), grid)
    }

    #[test]
    fn test_motionless_ice_ages_with_time() {
        let (mut model, grid) = model();
        let zeros = Array3::filled(grid.mx, grid.my, 11, 0.0);
        let mut thickness = Array2::filled(grid.mx, grid.my, 600.0);
        *thickness.get_mut(0, 0) = 0.0;
        let dt = 1.0e9;
        model.update(&thickness, &zeros, &zeros, &zeros, dt).unwrap();
        model.update(&thickness, &zeros, &zeros, &zeros, dt).unwrap();

        let age = model.age();
        for k in 0..6 {
            assert_relative_eq!(age[(2, 1, k)], 2.0 * dt, max_relative = 1e-12);
        }
        for k in 6..11 {
            assert_eq!(age[(2, 1, k)], 0.0);
        }
        assert!(age.column(0, 0).iter().all(|&a| a == 0.0));
    }

    #[test]
    fn test_downward_flow_carries_younger_ice() {
        let (mut model, grid) = model();
        let zeros = Array3::filled(grid.mx, grid.my, 11, 0.0);
        let w = Array3::filled(grid.mx, grid.my, 11, -1e-8);
        let thickness = Array2::filled(grid.mx, grid.my, 1000.0);
        for _ in 0..20 {
            model.update(&thickness, &zeros, &zeros, &w, 1.0e9).unwrap();
        }
        let column = model.age().column(1, 1);
        assert_eq!(column[10], 0.0);
        for k in 0..10 {
            assert!(column[k] > column[k + 1], "age must increase with depth");
        }
    }

    #[test]
    fn test_thickness_above_domain_is_an_error() {
        let (mut model, grid) = model();
        let zeros = Array3::filled(grid.mx, grid.my, 11, 0.0);
        let thickness = Array2::filled(grid.mx, grid.my, 1500.0);
        assert!(model.update(&thickness, &zeros, &zeros, &zeros, 1.0).is_err());
    }
}
