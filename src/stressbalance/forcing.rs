//! Problem-specific forcing of the first-order stress balance
//!
//! All hooks default to zero, so a plain ice-sheet run only needs
//! `NoForcing`. Verification setups override the hooks they need.

use nalgebra::{Point3, Vector2, Vector3};

/// Boundary data and body forces for the Blatter-Pattyn system
pub trait BoundaryForcing: Send + Sync {
    /// Velocity at Dirichlet nodes (base and masked columns)
    fn dirichlet_velocity(&self, _x: &Point3<f64>) -> Vector2<f64> {
        Vector2::zeros()
    }

    /// Body force added to the driving stress
    fn body_force(&self, _x: &Point3<f64>) -> Vector2<f64> {
        Vector2::zeros()
    }

    /// Stress applied on lateral ice-margin faces with outward normal `n`
    fn lateral_stress(&self, _x: &Point3<f64>, _n: &Vector3<f64>) -> Vector2<f64> {
        Vector2::zeros()
    }
}

/// Homogeneous boundary conditions and no extra body force
#[derive(Debug, Clone, Copy, Default)]
pub struct NoForcing;

impl BoundaryForcing for NoForcing {}

/// Prescribed uniform sliding at the base
#[derive(Debug, Clone, Copy)]
pub struct UniformSliding {
    pub velocity: Vector2<f64>,
}

impl BoundaryForcing for UniformSliding {
    fn dirichlet_velocity(&self, _x: &Point3<f64>) -> Vector2<f64> {
        self.velocity
    }
}
