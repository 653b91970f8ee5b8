//! Angle arithmetic on the periodic orientation domain.
//!
//! Euler angles live on a torus: every optimizer stage is free to drift
//! outside [0, 2π) during proposals, but stored orientations and any distance
//! computation must respect wrap-around. Keeping the wrapping logic here (and
//! only here) avoids off-by-2π bugs spread across the fit stages.

use std::f64::consts::PI;

pub const TWO_PI: f64 = 2.0 * PI;

/// Wrap an angle to [0, 2π).
pub fn wrap_angle(theta: f64) -> f64 {
    let mut t = theta % TWO_PI;
    if t < 0.0 {
        t += TWO_PI;
    }
    // `-1e-20 % TWO_PI + TWO_PI` rounds back to exactly TWO_PI.
    if t >= TWO_PI {
        t = 0.0;
    }
    t
}

/// Wrap an angle difference to [-π, π).
pub fn wrap_signed(delta: f64) -> f64 {
    let mut d = (delta + PI) % TWO_PI;
    if d < 0.0 {
        d += TWO_PI;
    }
    d - PI
}

pub fn deg_to_rad(deg: f64) -> f64 {
    deg * PI / 180.0
}

pub fn rad_to_deg(rad: f64) -> f64 {
    rad * 180.0 / PI
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_angle_stays_in_range() {
        for theta in [-10.0, -0.1, 0.0, 0.1, 6.28, 7.0, 100.0, -1e-20] {
            let w = wrap_angle(theta);
            assert!((0.0..TWO_PI).contains(&w), "wrap({theta}) = {w}");
        }
    }

    #[test]
    fn wrap_signed_is_symmetric() {
        assert!((wrap_signed(PI + 0.1) - (-PI + 0.1)).abs() < 1e-12);
        assert!((wrap_signed(-PI - 0.1) - (PI - 0.1)).abs() < 1e-12);
        assert!(wrap_signed(0.25).abs() - 0.25 < 1e-15);
    }

    #[test]
    fn degree_round_trip() {
        assert!((rad_to_deg(deg_to_rad(123.4)) - 123.4).abs() < 1e-12);
    }
}
