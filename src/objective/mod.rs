//! The fit objective: validated inputs + cost / log-likelihood evaluation.
//!
//! `Objective::new` performs all input validation up front (orphan references,
//! empty observation sets, bad uncertainties, degenerate geometry), so the
//! optimizer stages can assume a clean, immutable snapshot and evaluate the
//! objective thousands of times without re-checking anything.
//!
//! Cost is a weighted sum of squared normalized residuals. Intensities are
//! normalized to the strongest peak of their normalization group (per
//! configuration or global, see `Normalization`) so absolute-calibration
//! differences between configurations do not drown orientation sensitivity.
//! The log-likelihood assumes independent Gaussian noise with the supplied
//! per-point uncertainty; an orientation producing any non-finite predicted
//! intensity gets infinite cost / -∞ log-likelihood and the run continues.

use std::collections::HashMap;

use crate::domain::{
    Normalization, ObservedPeak, Orientation, PolarizationConfiguration, VibrationalMode,
};
use crate::error::AppError;
use crate::model::{ResolvedConfiguration, predict};

/// One validated, normalized observation.
#[derive(Debug, Clone)]
struct ObsPoint {
    config_idx: usize,
    mode_idx: usize,
    /// Observed intensity divided by its group's strongest observed peak.
    obs_norm: f64,
    /// Uncertainty divided by the same reference.
    sigma_norm: f64,
}

/// Contiguous range of `points` sharing one normalization reference.
#[derive(Debug, Clone, Copy)]
struct Group {
    start: usize,
    end: usize,
}

/// Immutable, validated fit problem. Pure: evaluation has no side effects.
#[derive(Debug)]
pub struct Objective {
    modes: Vec<VibrationalMode>,
    configs: Vec<ResolvedConfiguration>,
    points: Vec<ObsPoint>,
    groups: Vec<Group>,
    /// `0.5 Σ ln(2π σ̂²)`, fixed per run: lets cost and log-likelihood
    /// convert into each other without re-evaluating residuals.
    norm_const: f64,
    normalization: Normalization,
}

impl Objective {
    pub fn new(
        modes: &[VibrationalMode],
        configurations: &[PolarizationConfiguration],
        observations: &[ObservedPeak],
        normalization: Normalization,
    ) -> Result<Self, AppError> {
        if modes.is_empty() {
            return Err(AppError::invalid_input("No vibrational modes supplied."));
        }
        if configurations.is_empty() {
            return Err(AppError::invalid_input(
                "No polarization configurations supplied.",
            ));
        }
        if observations.is_empty() {
            return Err(AppError::invalid_input(
                "No observed data points supplied; at least one configuration must carry peaks.",
            ));
        }

        // Resolve geometry first: degenerate configurations fail fast even if
        // no observation references them.
        let configs: Vec<ResolvedConfiguration> = configurations
            .iter()
            .map(ResolvedConfiguration::resolve)
            .collect::<Result<_, _>>()?;

        let mut config_index: HashMap<&str, usize> = HashMap::new();
        for (i, c) in configs.iter().enumerate() {
            if config_index.insert(c.id.as_str(), i).is_some() {
                return Err(AppError::invalid_input(format!(
                    "Duplicate configuration id '{}'.",
                    c.id
                )));
            }
        }
        let mut mode_index: HashMap<&str, usize> = HashMap::new();
        for (i, m) in modes.iter().enumerate() {
            if mode_index.insert(m.label.as_str(), i).is_some() {
                return Err(AppError::invalid_input(format!(
                    "Duplicate mode label '{}'.",
                    m.label
                )));
            }
        }

        let mut raw: Vec<(usize, usize, f64, f64)> = Vec::with_capacity(observations.len());
        for obs in observations {
            let Some(&config_idx) = config_index.get(obs.configuration.as_str()) else {
                return Err(AppError::invalid_input(format!(
                    "Observation references unknown configuration '{}'.",
                    obs.configuration
                )));
            };
            let Some(&mode_idx) = mode_index.get(obs.mode.as_str()) else {
                return Err(AppError::invalid_input(format!(
                    "Observation references unknown mode '{}'.",
                    obs.mode
                )));
            };
            if !obs.intensity.is_finite() {
                return Err(AppError::invalid_input(format!(
                    "Non-finite intensity for mode '{}' in configuration '{}'.",
                    obs.mode, obs.configuration
                )));
            }
            if !(obs.sigma.is_finite() && obs.sigma > 0.0) {
                return Err(AppError::invalid_input(format!(
                    "Uncertainty must be finite and > 0 (mode '{}', configuration '{}').",
                    obs.mode, obs.configuration
                )));
            }
            raw.push((config_idx, mode_idx, obs.intensity, obs.sigma));
        }

        // Deterministic point order: configuration, then mode, then input order.
        raw.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));

        let normalization = resolve_normalization(normalization, &raw);

        let (points, groups, norm_const) = normalize_points(&raw, normalization)?;

        Ok(Self {
            modes: modes.to_vec(),
            configs,
            points,
            groups,
            norm_const,
            normalization,
        })
    }

    /// The normalization actually in effect after resolving `Auto`.
    pub fn normalization(&self) -> Normalization {
        self.normalization
    }

    pub fn n_points(&self) -> usize {
        self.points.len()
    }

    /// Weighted sum of squared normalized residuals; `+∞` when the proposed
    /// orientation produces any non-finite or all-zero predicted group.
    pub fn cost(&self, orientation: &Orientation) -> f64 {
        self.residual_sum(orientation).unwrap_or(f64::INFINITY)
    }

    /// Gaussian log-likelihood; `-∞` rejects the orientation.
    pub fn log_likelihood(&self, orientation: &Orientation) -> f64 {
        match self.residual_sum(orientation) {
            Some(rss) => -0.5 * rss - self.norm_const,
            None => f64::NEG_INFINITY,
        }
    }

    /// Recover cost from a log-likelihood produced by this objective.
    ///
    /// The Gaussian normalization constant is fixed per run, so MCMC samples
    /// can feed the evaluated-points cache without a second evaluation.
    pub fn cost_from_log_likelihood(&self, log_likelihood: f64) -> f64 {
        if log_likelihood == f64::NEG_INFINITY {
            return f64::INFINITY;
        }
        -2.0 * (log_likelihood + self.norm_const)
    }

    fn residual_sum(&self, orientation: &Orientation) -> Option<f64> {
        let mut sum = 0.0;
        let mut predicted = Vec::new();

        for group in &self.groups {
            predicted.clear();
            let mut p_max = 0.0_f64;
            for point in &self.points[group.start..group.end] {
                let p = predict(
                    &self.modes[point.mode_idx],
                    orientation,
                    &self.configs[point.config_idx],
                );
                if !p.is_finite() {
                    return None;
                }
                if p > p_max {
                    p_max = p;
                }
                predicted.push(p);
            }
            // A group whose every predicted peak vanishes carries no shape
            // information at this orientation; the residual against non-zero
            // observations would be unbounded, so reject the orientation.
            if p_max <= 0.0 {
                return None;
            }
            for (point, &p) in self.points[group.start..group.end].iter().zip(&predicted) {
                let r = (p / p_max - point.obs_norm) / point.sigma_norm;
                sum += r * r;
            }
        }

        sum.is_finite().then_some(sum)
    }
}

fn resolve_normalization(
    requested: Normalization,
    raw: &[(usize, usize, f64, f64)],
) -> Normalization {
    match requested {
        Normalization::PerConfiguration | Normalization::Global => requested,
        Normalization::Auto => {
            let mut counts: HashMap<usize, usize> = HashMap::new();
            for &(config_idx, ..) in raw {
                *counts.entry(config_idx).or_insert(0) += 1;
            }
            if counts.values().all(|&n| n >= 2) {
                Normalization::PerConfiguration
            } else {
                Normalization::Global
            }
        }
    }
}

fn normalize_points(
    raw: &[(usize, usize, f64, f64)],
    normalization: Normalization,
) -> Result<(Vec<ObsPoint>, Vec<Group>, f64), AppError> {
    // Group boundaries over the (already config-sorted) points.
    let mut groups = Vec::new();
    match normalization {
        Normalization::Global => groups.push(Group {
            start: 0,
            end: raw.len(),
        }),
        _ => {
            let mut start = 0;
            for i in 1..=raw.len() {
                if i == raw.len() || raw[i].0 != raw[start].0 {
                    groups.push(Group { start, end: i });
                    start = i;
                }
            }
        }
    }

    let mut points = Vec::with_capacity(raw.len());
    let mut norm_const = 0.0;
    for group in &groups {
        let reference = raw[group.start..group.end]
            .iter()
            .map(|&(.., intensity, _)| intensity)
            .fold(f64::NEG_INFINITY, f64::max);
        if !(reference.is_finite() && reference > 0.0) {
            return Err(AppError::invalid_input(
                "Each normalization group needs a strictly positive strongest peak.",
            ));
        }
        for &(config_idx, mode_idx, intensity, sigma) in &raw[group.start..group.end] {
            let sigma_norm = sigma / reference;
            norm_const +=
                0.5 * (2.0 * std::f64::consts::PI * sigma_norm * sigma_norm).ln();
            points.push(ObsPoint {
                config_idx,
                mode_idx,
                obs_norm: intensity / reference,
                sigma_norm,
            });
        }
    }

    Ok((points, groups, norm_const))
}
