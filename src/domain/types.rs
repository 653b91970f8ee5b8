//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - used in-memory during fitting
//! - handed to the external reporting/visualization components as-is
//!   (the field names and types here are the schema contract)

use clap::ValueEnum;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::math::{deg_to_rad, rad_to_deg, wrap_angle};
use crate::model::RamanTensor;

/// Crystal symmetry class.
///
/// The class determines how many independent Raman-tensor elements a mode
/// has; the remaining elements are zero or tied to the free set. The counts
/// below are the totally-symmetric-mode tensor forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CrystalSymmetry {
    Cubic,
    Hexagonal,
    Trigonal,
    Tetragonal,
    Orthorhombic,
    Monoclinic,
    Triclinic,
}

impl CrystalSymmetry {
    /// Number of independent tensor elements left free by this class.
    ///
    /// Always within [1, 6]: 6 is the full symmetric tensor (triclinic),
    /// 1 is the isotropic diagonal (cubic).
    pub fn free_param_count(self) -> usize {
        match self {
            CrystalSymmetry::Cubic => 1,
            CrystalSymmetry::Hexagonal => 2,
            CrystalSymmetry::Trigonal => 2,
            CrystalSymmetry::Tetragonal => 2,
            CrystalSymmetry::Orthorhombic => 3,
            CrystalSymmetry::Monoclinic => 4,
            CrystalSymmetry::Triclinic => 6,
        }
    }

    /// Human-readable label for terminal output.
    pub fn display_name(self) -> &'static str {
        match self {
            CrystalSymmetry::Cubic => "cubic",
            CrystalSymmetry::Hexagonal => "hexagonal",
            CrystalSymmetry::Trigonal => "trigonal",
            CrystalSymmetry::Tetragonal => "tetragonal",
            CrystalSymmetry::Orthorhombic => "orthorhombic",
            CrystalSymmetry::Monoclinic => "monoclinic",
            CrystalSymmetry::Triclinic => "triclinic",
        }
    }
}

/// A Raman-active vibrational mode.
///
/// Created from calculated-mode or reference data before the run; read-only
/// during fitting.
#[derive(Debug, Clone)]
pub struct VibrationalMode {
    /// Peak label, used to match observations (e.g. `"A1g-520"`).
    pub label: String,
    /// Peak position in cm⁻¹ (informational; not used by the objective).
    pub wavenumber: f64,
    /// Symmetry-constrained Raman tensor for this mode.
    pub tensor: RamanTensor,
    /// Optional depolarization ratio from reference data (informational).
    pub depolarization: Option<f64>,
}

/// Crystal-frame → lab-frame rotation as ZYZ Euler angles, radians.
///
/// This is the quantity being estimated. It is `Copy` so optimizer proposals
/// always work on their own value; nothing mutates an orientation in place
/// across concurrent evaluations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Orientation {
    pub alpha: f64,
    pub beta: f64,
    pub gamma: f64,
}

impl Orientation {
    /// Construct from radians, wrapping each angle to [0, 2π).
    pub fn new(alpha: f64, beta: f64, gamma: f64) -> Self {
        Self {
            alpha: wrap_angle(alpha),
            beta: wrap_angle(beta),
            gamma: wrap_angle(gamma),
        }
    }

    pub fn from_degrees(alpha: f64, beta: f64, gamma: f64) -> Self {
        Self::new(deg_to_rad(alpha), deg_to_rad(beta), deg_to_rad(gamma))
    }

    pub fn from_array(angles: [f64; 3]) -> Self {
        Self::new(angles[0], angles[1], angles[2])
    }

    pub fn to_array(self) -> [f64; 3] {
        [self.alpha, self.beta, self.gamma]
    }

    pub fn to_degrees(self) -> [f64; 3] {
        [
            rad_to_deg(self.alpha),
            rad_to_deg(self.beta),
            rad_to_deg(self.gamma),
        ]
    }
}

/// One polarization/geometry setting of the experiment.
///
/// The configuration list defines the experiment design and is supplied
/// externally (GUI input in the full application). Vectors need not be
/// normalized here; validation normalizes them and rejects degenerate ones.
#[derive(Debug, Clone)]
pub struct PolarizationConfiguration {
    /// Identifier matched against `ObservedPeak::configuration`.
    pub id: String,
    /// Incident polarization direction in the lab frame.
    pub e_incident: Vector3<f64>,
    /// Scattered (analyzer) polarization direction in the lab frame.
    pub e_scattered: Vector3<f64>,
    /// Sample rotation about the beam (z) axis, degrees.
    pub sample_rotation_deg: f64,
}

/// One measured peak intensity: (configuration, mode, intensity, uncertainty).
///
/// Immutable input from the peak-detection component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservedPeak {
    /// Id of the `PolarizationConfiguration` this peak was measured under.
    pub configuration: String,
    /// Label of the `VibrationalMode` this peak belongs to.
    pub mode: String,
    /// Measured intensity (arbitrary units; normalized internally).
    pub intensity: f64,
    /// Measurement uncertainty, same units as `intensity`, strictly positive.
    pub sigma: f64,
}

/// How observed/predicted intensities are normalized before the residual.
///
/// Per-configuration normalization makes the objective insensitive to
/// configuration-to-configuration calibration differences, but it carries no
/// shape information when a configuration contains a single peak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Normalization {
    /// Per-configuration when every observed configuration has at least two
    /// peaks, otherwise global. Deterministic given the observation set.
    Auto,
    /// Normalize each configuration's peaks to its strongest peak.
    PerConfiguration,
    /// Normalize all peaks to the strongest peak in the whole set.
    Global,
}

/// Stage 1 (deterministic multi-start search) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stage1Config {
    /// Coarse grid points per Euler angle (grid size is the cube of this).
    pub grid_steps: usize,
    /// Additional seeded random restarts on top of the grid.
    pub random_restarts: usize,
    /// Nelder–Mead iteration cap per start.
    pub local_iters: usize,
    /// Nelder–Mead simplex-spread convergence tolerance on cost.
    pub local_tol: f64,
    /// Number of well-separated local minima retained for Stage-2 seeding.
    pub top_k: usize,
    /// Minimum misorientation (degrees) between retained minima.
    pub separation_deg: f64,
}

impl Default for Stage1Config {
    fn default() -> Self {
        Self {
            grid_steps: 6,
            random_restarts: 24,
            local_iters: 300,
            local_tol: 1e-12,
            top_k: 4,
            separation_deg: 15.0,
        }
    }
}

/// Stage 2 (affine-invariant ensemble MCMC) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McmcConfig {
    /// Number of walkers; must be even and at least 6 for the two-half
    /// stretch-move update to be well defined in 3 dimensions.
    pub n_walkers: usize,
    /// Number of ensemble steps (each step proposes one move per walker).
    pub n_steps: usize,
    /// Fraction of initial steps discarded as burn-in, in [0, 1).
    pub burn_in_frac: f64,
    /// Stretch-move scale parameter `a` (2.0 is the standard choice).
    pub stretch_a: f64,
    /// Std-dev (radians) of the Gaussian ball used to scatter walkers
    /// around the Stage-1 seed points.
    pub seed_ball_sigma: f64,
    /// Acceptance-rate band considered healthy; outside it the run is
    /// flagged as poorly mixed (flag, not error).
    pub acceptance_min: f64,
    pub acceptance_max: f64,
    /// Every `cache_thin`-th post-burn-in step contributes its walkers to
    /// the evaluated-points cache feeding Stage 3.
    pub cache_thin: usize,
}

impl Default for McmcConfig {
    fn default() -> Self {
        Self {
            n_walkers: 32,
            n_steps: 400,
            burn_in_frac: 0.25,
            stretch_a: 2.0,
            seed_ball_sigma: 0.05,
            acceptance_min: 0.1,
            acceptance_max: 0.9,
            cache_thin: 8,
        }
    }
}

/// Stage 3 (Gaussian-process surrogate refinement) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurrogateConfig {
    /// Acquisition/evaluation rounds.
    pub rounds: usize,
    /// Candidate orientations scored by expected improvement per round.
    pub candidates: usize,
    /// SE kernel length scale in the (cos, sin) angle embedding.
    pub length_scale: f64,
    /// Observation noise term added to the kernel diagonal.
    pub noise: f64,
    /// Training-set cap; the evaluated-points cache is thinned to this.
    pub max_train: usize,
    /// Weight of the Stage-2 posterior mean in the final reconciliation,
    /// in [0, 1] (0 = surrogate optimum only).
    pub posterior_weight: f64,
    /// Misorientation (degrees) between posterior mean and surrogate
    /// optimum beyond which the result is flagged ambiguous/multimodal.
    pub disagreement_deg: f64,
}

impl Default for SurrogateConfig {
    fn default() -> Self {
        Self {
            rounds: 16,
            candidates: 256,
            length_scale: 0.35,
            noise: 1e-6,
            max_train: 256,
            posterior_weight: 0.25,
            disagreement_deg: 10.0,
        }
    }
}

/// A full run's configuration, passed explicitly into the pipeline.
///
/// No stage reads ambient/global state; every numerical constant lives here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitConfig {
    /// Master RNG seed; fixes restarts, walker moves, and acquisition pools.
    pub seed: u64,
    /// Run Stage 2 (posterior sampling).
    pub run_mcmc: bool,
    /// Run Stage 3 (surrogate refinement). Requires `run_mcmc`.
    pub run_refine: bool,
    /// Intensity normalization scheme for the objective.
    pub normalization: Normalization,
    /// Progress events are emitted every `emit_every` iterations.
    pub emit_every: usize,
    pub stage1: Stage1Config,
    pub mcmc: McmcConfig,
    pub surrogate: SurrogateConfig,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            run_mcmc: true,
            run_refine: true,
            normalization: Normalization::Auto,
            emit_every: 25,
            stage1: Stage1Config::default(),
            mcmc: McmcConfig::default(),
            surrogate: SurrogateConfig::default(),
        }
    }
}

impl FitConfig {
    /// Validate cross-field consistency before any stage runs.
    pub fn validate(&self) -> Result<(), crate::error::AppError> {
        use crate::error::AppError;

        if self.run_refine && !self.run_mcmc {
            return Err(AppError::invalid_input(
                "Stage 3 (refine) requires Stage 2 (mcmc): the surrogate is seeded by the posterior.",
            ));
        }
        if self.stage1.grid_steps < 2 {
            return Err(AppError::invalid_input("stage1.grid_steps must be >= 2."));
        }
        if self.stage1.top_k == 0 {
            return Err(AppError::invalid_input("stage1.top_k must be >= 1."));
        }
        if self.run_mcmc {
            if self.mcmc.n_walkers < 6 || self.mcmc.n_walkers % 2 != 0 {
                return Err(AppError::invalid_input(
                    "mcmc.n_walkers must be even and >= 6.",
                ));
            }
            if self.mcmc.n_steps == 0 {
                return Err(AppError::invalid_input("mcmc.n_steps must be >= 1."));
            }
            if !(0.0..1.0).contains(&self.mcmc.burn_in_frac) {
                return Err(AppError::invalid_input(
                    "mcmc.burn_in_frac must be in [0, 1).",
                ));
            }
            if !(self.mcmc.stretch_a.is_finite() && self.mcmc.stretch_a > 1.0) {
                return Err(AppError::invalid_input("mcmc.stretch_a must be > 1."));
            }
            if self.mcmc.cache_thin == 0 {
                return Err(AppError::invalid_input("mcmc.cache_thin must be >= 1."));
            }
        }
        if self.run_refine {
            if self.surrogate.rounds == 0 {
                return Err(AppError::invalid_input("surrogate.rounds must be >= 1."));
            }
            if self.surrogate.candidates == 0 {
                return Err(AppError::invalid_input(
                    "surrogate.candidates must be >= 1.",
                ));
            }
            if !(0.0..=1.0).contains(&self.surrogate.posterior_weight) {
                return Err(AppError::invalid_input(
                    "surrogate.posterior_weight must be in [0, 1].",
                ));
            }
            if !(self.surrogate.length_scale.is_finite() && self.surrogate.length_scale > 0.0) {
                return Err(AppError::invalid_input(
                    "surrogate.length_scale must be finite and > 0.",
                ));
            }
            if !(self.surrogate.noise.is_finite() && self.surrogate.noise >= 0.0) {
                return Err(AppError::invalid_input(
                    "surrogate.noise must be finite and >= 0.",
                ));
            }
            if self.surrogate.max_train < 4 {
                return Err(AppError::invalid_input("surrogate.max_train must be >= 4."));
            }
        }
        if self.emit_every == 0 {
            return Err(AppError::invalid_input("emit_every must be >= 1."));
        }
        Ok(())
    }
}

/// Point estimate: one orientation and its objective cost.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PointEstimate {
    pub orientation: Orientation,
    pub cost: f64,
}

/// One posterior draw.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PosteriorSample {
    pub orientation: Orientation,
    pub log_likelihood: f64,
}

/// Credible/confidence interval for one angle, radians, wrapped endpoints.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CredibleInterval {
    pub lo: f64,
    pub hi: f64,
}

/// Posterior summary attached to a fit result when Stage 2 ran.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Posterior {
    /// Ordered post-burn-in draws (step-major, walker order within a step).
    pub samples: Vec<PosteriorSample>,
    /// Fraction of proposals accepted over the whole run.
    pub acceptance_rate: f64,
    /// Effective sample size of the pooled log-likelihood series.
    pub effective_sample_size: f64,
    /// Circular mean of the posterior draws.
    pub mean: Orientation,
    /// 95% credible interval per Euler angle, from sample quantiles.
    pub credible: [CredibleInterval; 3],
}

/// Surrogate-refined estimate with a calibrated confidence interval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefinedEstimate {
    pub orientation: Orientation,
    pub cost: f64,
    /// Per-angle confidence interval: posterior credible interval widened by
    /// the posterior/surrogate disagreement.
    pub confidence: [CredibleInterval; 3],
}

/// What the run produced, as a tagged variant.
///
/// Later stages only ever upgrade earlier ones, so the variants form a
/// strict ladder; consumers cannot read a posterior that was never sampled.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FitOutcome {
    PointOnly {
        point: PointEstimate,
    },
    PointWithPosterior {
        point: PointEstimate,
        posterior: Posterior,
    },
    FullyRefined {
        point: PointEstimate,
        posterior: Posterior,
        refined: RefinedEstimate,
    },
}

impl FitOutcome {
    /// Best available point estimate: refined if present, else Stage 1's.
    pub fn best_estimate(&self) -> PointEstimate {
        match self {
            FitOutcome::PointOnly { point } => *point,
            FitOutcome::PointWithPosterior { point, .. } => *point,
            FitOutcome::FullyRefined { refined, .. } => PointEstimate {
                orientation: refined.orientation,
                cost: refined.cost,
            },
        }
    }

    pub fn posterior(&self) -> Option<&Posterior> {
        match self {
            FitOutcome::PointOnly { .. } => None,
            FitOutcome::PointWithPosterior { posterior, .. } => Some(posterior),
            FitOutcome::FullyRefined { posterior, .. } => Some(posterior),
        }
    }
}

/// Non-fatal run diagnostics attached as flags, never as errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityFlag {
    /// MCMC acceptance rate outside the configured healthy band.
    PoorMixing,
    /// Posterior and surrogate disagree beyond the configured threshold.
    Ambiguous,
    /// The run was cancelled; this is the best partial result.
    Incomplete,
}

/// Per-run bookkeeping for reports and regression baselines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunDiagnostics {
    /// True-objective evaluations recorded in the shared cache.
    pub cached_evaluations: usize,
    pub stage1_best_cost: f64,
    pub stage2_acceptance: Option<f64>,
    pub stage3_rounds: Option<usize>,
}

/// Final output of a run. Constructed once by the aggregator; a new run
/// produces a new `FitResult`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitResult {
    pub outcome: FitOutcome,
    pub flags: Vec<QualityFlag>,
    pub diagnostics: RunDiagnostics,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn free_param_counts_match_documented_table() {
        let expected = [
            (CrystalSymmetry::Cubic, 1),
            (CrystalSymmetry::Hexagonal, 2),
            (CrystalSymmetry::Trigonal, 2),
            (CrystalSymmetry::Tetragonal, 2),
            (CrystalSymmetry::Orthorhombic, 3),
            (CrystalSymmetry::Monoclinic, 4),
            (CrystalSymmetry::Triclinic, 6),
        ];
        for (sym, count) in expected {
            assert_eq!(sym.free_param_count(), count, "{}", sym.display_name());
            assert!((1..=6).contains(&sym.free_param_count()));
        }
    }

    #[test]
    fn orientation_wraps_on_construction() {
        let o = Orientation::from_degrees(370.0, -20.0, 720.0);
        let deg = o.to_degrees();
        assert!((deg[0] - 10.0).abs() < 1e-9);
        assert!((deg[1] - 340.0).abs() < 1e-9);
        assert!(deg[2].abs() < 1e-9);
    }

    #[test]
    fn refine_without_mcmc_is_rejected() {
        let config = FitConfig {
            run_mcmc: false,
            run_refine: true,
            ..FitConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn odd_walker_count_is_rejected() {
        let mut config = FitConfig::default();
        config.mcmc.n_walkers = 31;
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_surrogate_budgets_are_rejected() {
        let mut config = FitConfig::default();
        config.surrogate.candidates = 0;
        assert_eq!(config.validate().unwrap_err().exit_code(), 2);

        let mut config = FitConfig::default();
        config.surrogate.rounds = 0;
        assert_eq!(config.validate().unwrap_err().exit_code(), 2);

        // The same settings are fine when Stage 3 is disabled.
        let mut config = FitConfig::default();
        config.surrogate.candidates = 0;
        config.run_refine = false;
        config.validate().unwrap();
    }

    #[test]
    fn best_estimate_prefers_refined() {
        let point = PointEstimate {
            orientation: Orientation::new(0.1, 0.2, 0.3),
            cost: 1.0,
        };
        let posterior = Posterior {
            samples: vec![],
            acceptance_rate: 0.3,
            effective_sample_size: 10.0,
            mean: point.orientation,
            credible: [CredibleInterval { lo: 0.0, hi: 0.0 }; 3],
        };
        let refined = RefinedEstimate {
            orientation: Orientation::new(0.4, 0.5, 0.6),
            cost: 0.5,
            confidence: [CredibleInterval { lo: 0.0, hi: 0.0 }; 3],
        };
        let outcome = FitOutcome::FullyRefined {
            point,
            posterior,
            refined,
        };
        assert_eq!(outcome.best_estimate().cost, 0.5);
    }
}
