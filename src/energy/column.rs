//! Implicit enthalpy system of one ice column
//!
//! Solves
//!
//! ```text
//! ρ (∂E/∂t + u·∇E + w ∂E/∂z) = ∂/∂z (K(E) ∂E/∂z) + Σ
//! ```
//!
//! on the equally spaced fine grid `z_k = k dz`, `k = 0..=ks`, by backward
//! Euler in the vertical. Horizontal advection `u·∇E` is explicit and is
//! supplied per level by the caller. `K = k/c` in cold ice and a fraction
//! of it in temperate ice.
//!
//! Vertical advection blends centered and upwind differences with weight
//! `λ`: `λ = 1` is centered, `λ = 0` fully upwind. `λ` is the largest value
//! that keeps the cold part of the column free of oscillations, and zero
//! as soon as any level is temperate.

use crate::error::EnergyError;
use crate::linalg::TridiagonalSystem;
use crate::physics::enthalpy::{Conductivity, EnthalpyConverter};
use crate::utils::units::SECONDS_PER_YEAR;

/// Boundary condition at the ice base
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BasalBoundary {
    /// Prescribed enthalpy (J/kg)
    Enthalpy(f64),
    /// Heat flux into the ice (W/m²), positive upward
    HeatFlux(f64),
}

/// Material parameters of the column system
#[derive(Debug, Clone, Copy)]
pub struct ColumnMaterial {
    /// Ice density (kg/m³)
    pub density: f64,
    /// Specific heat of ice (J/(kg K))
    pub specific_heat: f64,
    /// Conductivity of ice at the reference temperature (W/(m K))
    pub conductivity: f64,
    /// Conductivity law used in cold ice
    pub conductivity_law: Conductivity,
    /// Temperate enthalpy conductivity as a fraction of the cold value
    pub temperate_ratio: f64,
}

/// Work arrays and coefficients of one column solve
///
/// The caller fills `enthalpy`, `w`, `strain_heating` and `advection` for
/// levels `0..=ks`, calls `prepare`, sets both boundary conditions, then
/// calls `solve`.
#[derive(Debug, Clone)]
pub struct EnthalpyColumn {
    material: ColumnMaterial,
    dz: f64,
    ks: usize,
    dt: f64,
    thickness: f64,
    lambda: f64,
    /// Enthalpy at the start of the step (J/kg)
    pub enthalpy: Vec<f64>,
    /// Vertical velocity (m/s)
    pub w: Vec<f64>,
    /// Strain heating (W/m³)
    pub strain_heating: Vec<f64>,
    /// Explicit horizontal advection term `u·∇E` (J/(kg s))
    pub advection: Vec<f64>,
    pressure: Vec<f64>,
    enthalpy_cts: Vec<f64>,
    /// Enthalpy conductivity K (kg/(m s))
    k_enthalpy: Vec<f64>,
    surface: Option<f64>,
    basal: Option<BasalBoundary>,
    system: TridiagonalSystem,
}

impl EnthalpyColumn {
    /// Work space for columns of up to `mz` fine levels spaced `dz` apart
    pub fn new(material: ColumnMaterial, mz: usize, dz: f64) -> Self {
        Self {
            material,
            dz,
            ks: 0,
            dt: 0.0,
            thickness: 0.0,
            lambda: 1.0,
            enthalpy: vec![0.0; mz],
            w: vec![0.0; mz],
            strain_heating: vec![0.0; mz],
            advection: vec![0.0; mz],
            pressure: vec![0.0; mz],
            enthalpy_cts: vec![0.0; mz],
            k_enthalpy: vec![0.0; mz],
            surface: None,
            basal: None,
            system: TridiagonalSystem::new(mz),
        }
    }

    pub fn mz(&self) -> usize {
        self.enthalpy.len()
    }

    pub fn dz(&self) -> f64 {
        self.dz
    }

    pub fn ks(&self) -> usize {
        self.ks
    }

    pub fn lambda(&self) -> f64 {
        self.lambda
    }

    /// Was vertical advection treated partly upwind?
    pub fn reduced_accuracy(&self) -> bool {
        self.lambda < 1.0
    }

    /// Pressure (Pa) at fine levels `0..=ks`
    pub fn pressures(&self) -> &[f64] {
        &self.pressure[..=self.ks]
    }

    /// Enthalpy at the cold-temperate transition at fine level `k`
    pub fn enthalpy_cts(&self, k: usize) -> f64 {
        self.enthalpy_cts[k]
    }

    pub fn thickness(&self) -> f64 {
        self.thickness
    }

    /// Compute pressure, transition enthalpy, conductivity and `λ` from
    /// the filled work arrays, and clear the boundary conditions
    pub fn prepare(&mut self, thickness: f64, ks: usize, dt: f64, ec: &dyn EnthalpyConverter) {
        debug_assert!(ks < self.mz());
        self.thickness = thickness;
        self.ks = ks;
        self.dt = dt;
        self.surface = None;
        self.basal = None;

        let m = &self.material;
        let k_temperate = m.temperate_ratio * m.conductivity / m.specific_heat;
        for k in 0..=ks {
            let p = ec.pressure(thickness - k as f64 * self.dz);
            let e_s = ec.enthalpy_cts(p);
            let e = self.enthalpy[k];
            self.pressure[k] = p;
            self.enthalpy_cts[k] = e_s;
            self.k_enthalpy[k] = if e < e_s {
                m.conductivity_law.at(ec.temperature(e, p)) / m.specific_heat
            } else {
                k_temperate
            };
        }

        self.lambda = self.compute_lambda();
    }

    fn compute_lambda(&self) -> f64 {
        let m = &self.material;
        // 1e-6 m/year
        let epsilon = 1e-6 / SECONDS_PER_YEAR;
        let mut lambda: f64 = 1.0;
        for k in 0..=self.ks {
            if self.enthalpy[k] > self.enthalpy_cts[k] {
                return 0.0;
            }
            let denom = (self.w[k].abs() + epsilon) * m.density * m.specific_heat * self.dz;
            lambda = lambda.min(2.0 * m.conductivity / denom);
        }
        lambda
    }

    /// Dirichlet condition at the surface (level `ks`)
    pub fn set_surface_enthalpy(&mut self, enthalpy: f64) {
        self.surface = Some(enthalpy);
    }

    pub fn set_basal_boundary(&mut self, bc: BasalBoundary) {
        self.basal = Some(bc);
    }

    fn r(&self, k: usize) -> f64 {
        self.k_enthalpy[k] * self.dt / (self.material.density * self.dz * self.dz)
    }

    /// Solve for the new enthalpy of column `(i, j)`
    ///
    /// Levels of `x` above `ks` receive the surface enthalpy.
    pub fn solve(&mut self, i: usize, j: usize, x: &mut [f64]) -> Result<(), EnergyError> {
        let surface = self.surface.ok_or_else(|| {
            EnergyError::InvalidState(format!("surface boundary condition not set at ({}, {})", i, j))
        })?;
        let basal = self.basal.ok_or_else(|| {
            EnergyError::InvalidState(format!("basal boundary condition not set at ({}, {})", i, j))
        })?;
        let ks = self.ks;
        debug_assert!(x.len() >= ks + 1);

        x[ks..].iter_mut().for_each(|e| *e = surface);
        if ks == 0 {
            return Ok(());
        }

        let rho = self.material.density;
        let dt = self.dt;
        let nu = dt / self.dz;
        let lambda = self.lambda;

        match basal {
            BasalBoundary::Enthalpy(e_b) => {
                self.system.d[0] = 1.0;
                self.system.u[0] = 0.0;
                self.system.rhs[0] = e_b;
            }
            BasalBoundary::HeatFlux(q) => {
                // ghost point from -K dE/dz = q: E_{-1} = E_1 + 2 dz q / K
                let r0 = self.r(0);
                self.system.d[0] = 1.0 + 2.0 * r0;
                self.system.u[0] = -2.0 * r0;
                self.system.rhs[0] = self.enthalpy[0]
                    + dt * (self.strain_heating[0] / rho - self.advection[0])
                    + 2.0 * dt * q / (rho * self.dz);
            }
        }
        self.system.l[0] = 0.0;

        for k in 1..ks {
            let r = self.r(k);
            let r_minus = 0.5 * (self.r(k - 1) + r);
            let r_plus = 0.5 * (r + self.r(k + 1));
            let aa = nu * self.w[k];
            let (l, d, u) = if self.w[k] >= 0.0 {
                (
                    -r_minus - aa * (1.0 - 0.5 * lambda),
                    1.0 + r_minus + r_plus + aa * (1.0 - lambda),
                    -r_plus + aa * 0.5 * lambda,
                )
            } else {
                (
                    -r_minus - aa * 0.5 * lambda,
                    1.0 + r_minus + r_plus - aa * (1.0 - lambda),
                    -r_plus + aa * (1.0 - 0.5 * lambda),
                )
            };
            self.system.l[k] = l;
            self.system.d[k] = d;
            self.system.u[k] = u;
            self.system.rhs[k] = self.enthalpy[k] + dt * (self.strain_heating[k] / rho - self.advection[k]);
        }

        self.system.l[ks] = 0.0;
        self.system.d[ks] = 1.0;
        self.system.u[ks] = 0.0;
        self.system.rhs[ks] = surface;

        self.system.solve(ks + 1, x).map_err(|row| {
            let dump = self.system.dump(ks + 1);
            log::error!(
                "enthalpy column ({}, {}): zero pivot in row {} (ks = {}, H = {:.3} m, lambda = {:.3})\n{}",
                i,
                j,
                row,
                ks,
                self.thickness,
                lambda,
                dump
            );
            EnergyError::ZeroPivot {
                system: "enthalpy",
                i,
                j,
                row,
                ks,
                dump,
            }
        })
    }
}
