//! Intensity prediction for one (mode, orientation, configuration) triple.
//!
//! The predicted relative intensity is the squared scattering amplitude
//!
//! ```text
//! I = | e_s · R A R^T · e_i |²
//! ```
//!
//! where `A` is the mode's Raman tensor in the crystal frame, `R` the
//! crystal→lab rotation, and `e_i`/`e_s` the unit incident/scattered
//! polarization vectors of the configuration. The sample-rotation angle of a
//! configuration rotates both vectors about the beam (z) axis before use.

use nalgebra::{Matrix3, Vector3};

use crate::domain::{Orientation, PolarizationConfiguration, VibrationalMode};
use crate::error::AppError;
use crate::math::deg_to_rad;
use crate::model::rotation::rotation_matrix;

/// A configuration with validated, normalized, sample-rotated polarization
/// vectors. Built once at input validation and then shared read-only.
#[derive(Debug, Clone)]
pub struct ResolvedConfiguration {
    pub id: String,
    pub e_incident: Vector3<f64>,
    pub e_scattered: Vector3<f64>,
}

impl ResolvedConfiguration {
    /// Validate a configuration and resolve its effective unit vectors.
    ///
    /// Degenerate geometry (non-finite or near-zero vectors, non-finite
    /// sample rotation) fails fast here rather than producing a silent zero
    /// intensity during fitting.
    pub fn resolve(config: &PolarizationConfiguration) -> Result<Self, AppError> {
        let e_i = unit_vector(&config.e_incident, &config.id, "incident")?;
        let e_s = unit_vector(&config.e_scattered, &config.id, "scattered")?;

        if !config.sample_rotation_deg.is_finite() {
            return Err(AppError::invalid_input(format!(
                "Invalid configuration '{}': non-finite sample rotation.",
                config.id
            )));
        }

        let psi = deg_to_rad(config.sample_rotation_deg);
        let (s, c) = psi.sin_cos();
        let rz = Matrix3::new(c, -s, 0.0, s, c, 0.0, 0.0, 0.0, 1.0);

        Ok(Self {
            id: config.id.clone(),
            e_incident: rz * e_i,
            e_scattered: rz * e_s,
        })
    }
}

fn unit_vector(v: &Vector3<f64>, id: &str, role: &str) -> Result<Vector3<f64>, AppError> {
    if v.iter().any(|x| !x.is_finite()) {
        return Err(AppError::invalid_input(format!(
            "Invalid configuration '{id}': non-finite {role} polarization vector."
        )));
    }
    let norm = v.norm();
    if norm < 1e-12 {
        return Err(AppError::invalid_input(format!(
            "Invalid configuration '{id}': {role} polarization vector has zero length."
        )));
    }
    Ok(v / norm)
}

/// Predicted relative intensity. Non-negative by construction for finite
/// inputs; callers treat non-finite outputs as numerical instability of the
/// proposed orientation, not of the run.
pub fn predict(
    mode: &VibrationalMode,
    orientation: &Orientation,
    config: &ResolvedConfiguration,
) -> f64 {
    let r = rotation_matrix(orientation);
    let tensor_lab = r * mode.tensor.matrix() * r.transpose();
    let amplitude = config.e_scattered.dot(&(tensor_lab * config.e_incident));
    amplitude * amplitude
}
