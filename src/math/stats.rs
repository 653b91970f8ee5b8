//! Small sample-statistics helpers shared by the fit stages.
//!
//! Everything here is deterministic and allocation-light: the MCMC summary
//! and the surrogate's acquisition function call these in inner loops.

use crate::math::angles::{wrap_angle, wrap_signed};

/// Linear-interpolation quantile of an unsorted sample.
///
/// Returns `None` for an empty sample or a non-finite `q`.
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() || !q.is_finite() {
        return None;
    }
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let q = q.clamp(0.0, 1.0);
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    if lo == hi {
        return Some(sorted[lo]);
    }
    let frac = pos - lo as f64;
    Some(sorted[lo] * (1.0 - frac) + sorted[hi] * frac)
}

/// Circular mean of angles in radians, wrapped to [0, 2π).
///
/// Returns `None` when the resultant vector is (numerically) zero, i.e. the
/// sample has no preferred direction.
pub fn circular_mean(angles: &[f64]) -> Option<f64> {
    if angles.is_empty() {
        return None;
    }
    let mut s = 0.0;
    let mut c = 0.0;
    for &a in angles {
        s += a.sin();
        c += a.cos();
    }
    let r = (s * s + c * c).sqrt() / angles.len() as f64;
    if r < 1e-12 {
        return None;
    }
    Some(wrap_angle(s.atan2(c)))
}

/// Quantile of angular offsets from a center, mapped back onto the circle.
///
/// Offsets are signed wrapped differences in [-π, π), so the interval edges
/// behave sensibly for posteriors straddling the 0/2π seam.
pub fn circular_quantile(angles: &[f64], center: f64, q: f64) -> Option<f64> {
    let offsets: Vec<f64> = angles.iter().map(|&a| wrap_signed(a - center)).collect();
    quantile(&offsets, q).map(|off| wrap_angle(center + off))
}

/// Effective sample size of a (roughly stationary) scalar series.
///
/// Uses the initial-positive-sequence truncation: sum sample autocorrelations
/// until the first non-positive lag. Crude but adequate as a mixing summary.
pub fn effective_sample_size(series: &[f64]) -> f64 {
    let n = series.len();
    if n < 4 {
        return n as f64;
    }
    let mean = series.iter().sum::<f64>() / n as f64;
    let var: f64 = series.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n as f64;
    if !(var.is_finite() && var > 0.0) {
        return n as f64;
    }

    let mut tau = 1.0;
    for lag in 1..(n / 2) {
        let mut acf = 0.0;
        for i in 0..(n - lag) {
            acf += (series[i] - mean) * (series[i + lag] - mean);
        }
        acf /= n as f64 * var;
        if acf <= 0.0 || !acf.is_finite() {
            break;
        }
        tau += 2.0 * acf;
    }
    (n as f64 / tau).max(1.0)
}

/// Error function (Abramowitz & Stegun 7.1.26, |error| < 1.5e-7).
pub fn erf(x: f64) -> f64 {
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();

    let t = 1.0 / (1.0 + 0.3275911 * x);
    let poly = t
        * (0.254829592
            + t * (-0.284496736 + t * (1.421413741 + t * (-1.453152027 + t * 1.061405429))));
    sign * (1.0 - poly * (-x * x).exp())
}

/// Standard normal CDF.
pub fn normal_cdf(x: f64) -> f64 {
    0.5 * (1.0 + erf(x / std::f64::consts::SQRT_2))
}

/// Standard normal PDF.
pub fn normal_pdf(x: f64) -> f64 {
    (-0.5 * x * x).exp() / (2.0 * std::f64::consts::PI).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn quantile_interpolates() {
        let v = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(quantile(&v, 0.0), Some(1.0));
        assert_eq!(quantile(&v, 1.0), Some(4.0));
        assert!((quantile(&v, 0.5).unwrap() - 2.5).abs() < 1e-12);
        assert_eq!(quantile(&[], 0.5), None);
    }

    #[test]
    fn circular_mean_handles_seam() {
        // Angles clustered around 0 but straddling the 0/2π seam.
        let angles = [0.1, 2.0 * PI - 0.1, 0.05, 2.0 * PI - 0.05];
        let mean = circular_mean(&angles).unwrap();
        assert!(mean < 0.01 || mean > 2.0 * PI - 0.01, "mean = {mean}");
    }

    #[test]
    fn circular_mean_of_uniform_is_none() {
        let angles = [0.0, PI / 2.0, PI, 3.0 * PI / 2.0];
        assert!(circular_mean(&angles).is_none());
    }

    #[test]
    fn ess_of_white_noise_is_large() {
        // Deterministic pseudo-noise; not i.i.d. but close enough for a bound.
        let series: Vec<f64> = (0..500).map(|i| ((i * 2654435761u64) % 1000) as f64).collect();
        let ess = effective_sample_size(&series);
        assert!(ess > 100.0, "ess = {ess}");
    }

    #[test]
    fn ess_of_constant_series_is_n() {
        let series = vec![1.0; 100];
        assert_eq!(effective_sample_size(&series), 100.0);
    }

    #[test]
    fn erf_matches_known_values() {
        // The A&S 7.1.26 approximation is only good to 1.5e-7, even at 0
        // (its coefficients do not sum exactly to 1).
        assert!(erf(0.0).abs() < 1.5e-7);
        assert!((erf(1.0) - 0.8427007929).abs() < 1e-6);
        assert!((erf(-1.0) + 0.8427007929).abs() < 1e-6);
        assert!((normal_cdf(0.0) - 0.5).abs() < 1.5e-7);
        assert!((normal_cdf(1.96) - 0.975).abs() < 1e-3);
    }
}
