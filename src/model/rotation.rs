//! ZYZ Euler rotations and misorientation distance.

use nalgebra::Matrix3;

use crate::domain::Orientation;
use crate::math::rad_to_deg;

fn rot_z(theta: f64) -> Matrix3<f64> {
    let (s, c) = theta.sin_cos();
    Matrix3::new(c, -s, 0.0, s, c, 0.0, 0.0, 0.0, 1.0)
}

fn rot_y(theta: f64) -> Matrix3<f64> {
    let (s, c) = theta.sin_cos();
    Matrix3::new(c, 0.0, s, 0.0, 1.0, 0.0, -s, 0.0, c)
}

/// Crystal→lab rotation `R = Rz(α) · Ry(β) · Rz(γ)`.
pub fn rotation_matrix(orientation: &Orientation) -> Matrix3<f64> {
    rot_z(orientation.alpha) * rot_y(orientation.beta) * rot_z(orientation.gamma)
}

/// Misorientation angle between two orientations, degrees.
///
/// Computed from the rotation taking one frame into the other:
/// `cos θ = (tr(R_a R_b^T) - 1) / 2`. This is the proper rotational distance;
/// naive per-angle differences misbehave near gimbal configurations.
pub fn misorientation_deg(a: &Orientation, b: &Orientation) -> f64 {
    let ra = rotation_matrix(a);
    let rb = rotation_matrix(b);
    misorientation_matrices_deg(&ra, &rb)
}

/// Misorientation between two rotation matrices, degrees.
pub fn misorientation_matrices_deg(ra: &Matrix3<f64>, rb: &Matrix3<f64>) -> f64 {
    let rel = ra * rb.transpose();
    let cos_theta = ((rel.trace() - 1.0) / 2.0).clamp(-1.0, 1.0);
    rad_to_deg(cos_theta.acos())
}
