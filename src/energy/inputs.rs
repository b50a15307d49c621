//! Inputs of the column energy solvers
//!
//! Every field is supplied by a collaborator (geometry, surface and ocean
//! models, hydrology, the stress balance) and is read-only during a step.

use crate::error::ConfigError;
use crate::grid::{Array2, Array3};

/// Classification of a column by what lies beneath the ice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CellType {
    #[default]
    IceFree,
    Grounded,
    Floating,
}

impl CellType {
    /// Classify from geometry with the flotation criterion
    pub fn from_geometry(bed: f64, thickness: f64, sea_level: f64, ice_density: f64, ocean_density: f64) -> Self {
        if thickness <= 0.0 {
            CellType::IceFree
        } else if bed + thickness * ice_density / ocean_density < sea_level {
            CellType::Floating
        } else {
            CellType::Grounded
        }
    }
}

/// Fields read by `EnthalpyModel::update` and `AgeModel::update`
///
/// All fields are required; missing ones are reported by `check`.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnergyInputs<'a> {
    pub thickness: Option<&'a Array2<f64>>,
    pub cell_type: Option<&'a Array2<CellType>>,
    /// Ice surface temperature (K)
    pub surface_temperature: Option<&'a Array2<f64>>,
    /// Liquid water fraction at the ice surface
    pub surface_liquid_fraction: Option<&'a Array2<f64>>,
    /// Ice temperature at the base of ice shelves (K)
    pub shelf_base_temperature: Option<&'a Array2<f64>>,
    /// Geothermal heat flux into the ice (W/m²)
    pub geothermal_flux: Option<&'a Array2<f64>>,
    /// Basal frictional heating (W/m²)
    pub frictional_heating: Option<&'a Array2<f64>>,
    /// Effective thickness of subglacial water stored in till (m)
    pub till_water_thickness: Option<&'a Array2<f64>>,
    /// Ice velocity (m/s) on the storage grid
    pub u: Option<&'a Array3<f64>>,
    pub v: Option<&'a Array3<f64>>,
    pub w: Option<&'a Array3<f64>>,
    /// Strain heating (W/m³) on the storage grid
    pub strain_heating: Option<&'a Array3<f64>>,
}

/// Checked view of `EnergyInputs`
#[derive(Debug, Clone, Copy)]
pub struct EnergyFields<'a> {
    pub thickness: &'a Array2<f64>,
    pub cell_type: &'a Array2<CellType>,
    pub surface_temperature: &'a Array2<f64>,
    pub surface_liquid_fraction: &'a Array2<f64>,
    pub shelf_base_temperature: &'a Array2<f64>,
    pub geothermal_flux: &'a Array2<f64>,
    pub frictional_heating: &'a Array2<f64>,
    pub till_water_thickness: &'a Array2<f64>,
    pub u: &'a Array3<f64>,
    pub v: &'a Array3<f64>,
    pub w: &'a Array3<f64>,
    pub strain_heating: &'a Array3<f64>,
}

fn field2<'a, T>(field: Option<&'a Array2<T>>, name: &'static str, n: usize) -> Result<&'a Array2<T>, ConfigError> {
    let field = field.ok_or(ConfigError::MissingInput(name))?;
    if field.len() != n {
        return Err(ConfigError::SizeMismatch {
            name,
            expected: n,
            actual: field.len(),
        });
    }
    Ok(field)
}

fn field3<'a>(field: Option<&'a Array3<f64>>, name: &'static str, n: usize) -> Result<&'a Array3<f64>, ConfigError> {
    let field = field.ok_or(ConfigError::MissingInput(name))?;
    if field.len() != n {
        return Err(ConfigError::SizeMismatch {
            name,
            expected: n,
            actual: field.len(),
        });
    }
    Ok(field)
}

impl<'a> EnergyInputs<'a> {
    /// Verify that every field is present and sized for an
    /// `mx x my x mz` storage grid
    pub fn check(&self, mx: usize, my: usize, mz: usize) -> Result<EnergyFields<'a>, ConfigError> {
        let n2 = mx * my;
        let n3 = n2 * mz;
        Ok(EnergyFields {
            thickness: field2(self.thickness, "thickness", n2)?,
            cell_type: field2(self.cell_type, "cell_type", n2)?,
            surface_temperature: field2(self.surface_temperature, "surface_temperature", n2)?,
            surface_liquid_fraction: field2(self.surface_liquid_fraction, "surface_liquid_fraction", n2)?,
            shelf_base_temperature: field2(self.shelf_base_temperature, "shelf_base_temperature", n2)?,
            geothermal_flux: field2(self.geothermal_flux, "geothermal_flux", n2)?,
            frictional_heating: field2(self.frictional_heating, "frictional_heating", n2)?,
            till_water_thickness: field2(self.till_water_thickness, "till_water_thickness", n2)?,
            u: field3(self.u, "u", n3)?,
            v: field3(self.v, "v", n3)?,
            w: field3(self.w, "w", n3)?,
            strain_heating: field3(self.strain_heating, "strain_heating", n3)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flotation_criterion() {
        let ct = |bed, h| CellType::from_geometry(bed, h, 0.0, 910.0, 1028.0);
        assert_eq!(ct(-100.0, 0.0), CellType::IceFree);
        assert_eq!(ct(-500.0, 300.0), CellType::Floating);
        assert_eq!(ct(-100.0, 300.0), CellType::Grounded);
        assert_eq!(ct(10.0, 1.0), CellType::Grounded);
    }

    #[test]
    fn test_missing_field_is_named() {
        let h = Array2::filled(3, 2, 100.0);
        let inputs = EnergyInputs {
            thickness: Some(&h),
            ..Default::default()
        };
        match inputs.check(3, 2, 4) {
            Err(ConfigError::MissingInput(name)) => assert_eq!(name, "cell_type"),
            other => panic!("unexpected {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_wrong_size_is_rejected() {
        let h = Array2::filled(3, 3, 100.0);
        let inputs = EnergyInputs {
            thickness: Some(&h),
            ..Default::default()
        };
        assert!(matches!(
            inputs.check(3, 2, 4),
            Err(ConfigError::SizeMismatch { name: "thickness", .. })
        ));
    }
}
