//! Cost of producing an artifact.

use serde::{Deserialize, Serialize};

use super::round_score;

/// Bytes per megabyte used when converting a prepared dataset size.
pub const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Default weight per compute hour.
const DEFAULT_COMPUTE_HOURS_WEIGHT: f64 = 2.0;

/// Default weight per dataset megabyte.
const DEFAULT_DATASET_MB_WEIGHT: f64 = 0.1;

/// Default weight per billion model parameters.
const DEFAULT_MODEL_PARAMS_WEIGHT: f64 = 0.25;

/// Factors contributing to the cost of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostFactor {
    ComputeHours,
    DatasetMb,
    ModelParamsBillions,
}

impl std::fmt::Display for CostFactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CostFactor::ComputeHours => write!(f, "compute_hours"),
            CostFactor::DatasetMb => write!(f, "dataset_mb"),
            CostFactor::ModelParamsBillions => write!(f, "model_params_b"),
        }
    }
}

impl std::str::FromStr for CostFactor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "compute_hours" => Ok(CostFactor::ComputeHours),
            "dataset_mb" => Ok(CostFactor::DatasetMb),
            "model_params_b" | "model_params_billions" => Ok(CostFactor::ModelParamsBillions),
            other => Err(format!("unknown cost factor '{}'", other)),
        }
    }
}

/// Per-deployment weights applied to each cost factor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostWeights {
    pub compute_hours: f64,
    pub dataset_mb: f64,
    pub model_params_billions: f64,
}

impl Default for CostWeights {
    fn default() -> Self {
        Self {
            compute_hours: DEFAULT_COMPUTE_HOURS_WEIGHT,
            dataset_mb: DEFAULT_DATASET_MB_WEIGHT,
            model_params_billions: DEFAULT_MODEL_PARAMS_WEIGHT,
        }
    }
}

impl CostWeights {
    /// Returns the weight for a single factor.
    pub fn weight(&self, factor: CostFactor) -> f64 {
        match factor {
            CostFactor::ComputeHours => self.compute_hours,
            CostFactor::DatasetMb => self.dataset_mb,
            CostFactor::ModelParamsBillions => self.model_params_billions,
        }
    }

    /// Sets the weight for a single factor.
    pub fn with_weight(mut self, factor: CostFactor, weight: f64) -> Self {
        match factor {
            CostFactor::ComputeHours => self.compute_hours = weight,
            CostFactor::DatasetMb => self.dataset_mb = weight,
            CostFactor::ModelParamsBillions => self.model_params_billions = weight,
        }
        self
    }
}

/// Effort spent on a job, excluding the dataset which is measured separately.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EffortParameters {
    /// Compute hours consumed (estimated from epochs when not measured).
    pub compute_hours: f64,
    /// Model scale in billions of parameters.
    pub model_params_billions: f64,
}

impl EffortParameters {
    /// Estimates effort from the number of training epochs.
    pub fn from_epochs(epochs: u32, hours_per_epoch: f64, model_params_billions: f64) -> Self {
        Self {
            compute_hours: f64::from(epochs) * hours_per_epoch,
            model_params_billions,
        }
    }
}

/// Computes the cost of a job.
///
/// `cost = hours × w_hours + dataset_mb × w_mb + params_b × w_params`, rounded.
/// Negative or non-finite factors and weights count as zero, so the result is
/// always `>= 0` and non-decreasing in every factor.
pub fn compute_cost(effort: &EffortParameters, dataset_size_bytes: u64, weights: &CostWeights) -> f64 {
    let dataset_mb = dataset_size_bytes as f64 / BYTES_PER_MB;

    let terms = [
        (effort.compute_hours, weights.compute_hours),
        (dataset_mb, weights.dataset_mb),
        (effort.model_params_billions, weights.model_params_billions),
    ];

    let cost: f64 = terms
        .iter()
        .map(|&(amount, weight)| non_negative(amount) * non_negative(weight))
        .sum();

    tracing::debug!(
        compute_hours = effort.compute_hours,
        dataset_mb,
        model_params_billions = effort.model_params_billions,
        cost,
        "Computed job cost"
    );

    round_score(cost).max(0.0)
}

fn non_negative(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn effort(hours: f64, params: f64) -> EffortParameters {
        EffortParameters {
            compute_hours: hours,
            model_params_billions: params,
        }
    }

    #[test]
    fn test_single_epoch_default_cost() {
        let effort = EffortParameters::from_epochs(1, 2.0, 7.0);
        let cost = compute_cost(&effort, 0, &CostWeights::default());
        assert!((cost - 5.75).abs() < 1e-9);
    }

    #[test]
    fn test_dataset_size_contributes_per_megabyte() {
        let weights = CostWeights::default();
        let base = compute_cost(&effort(0.0, 0.0), 0, &weights);
        let ten_mb = compute_cost(&effort(0.0, 0.0), 10 * 1024 * 1024, &weights);
        assert_eq!(base, 0.0);
        assert!((ten_mb - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_cost_is_never_negative() {
        let weights = CostWeights {
            compute_hours: -3.0,
            dataset_mb: 0.1,
            model_params_billions: f64::NAN,
        };
        let cost = compute_cost(&effort(-5.0, f64::INFINITY), 0, &weights);
        assert!(cost >= 0.0);
    }

    #[test]
    fn test_cost_monotonic_in_each_factor() {
        let weights = CostWeights::default();
        let steps = [0.0, 0.5, 1.0, 2.0, 7.0, 70.0];

        for window in steps.windows(2) {
            let (lo, hi) = (window[0], window[1]);
            assert!(compute_cost(&effort(lo, 7.0), 1000, &weights) <= compute_cost(&effort(hi, 7.0), 1000, &weights));
            assert!(compute_cost(&effort(2.0, lo), 1000, &weights) <= compute_cost(&effort(2.0, hi), 1000, &weights));
        }

        let sizes = [0u64, 1, 1024, 1 << 20, 1 << 30];
        for window in sizes.windows(2) {
            assert!(
                compute_cost(&effort(2.0, 7.0), window[0], &weights)
                    <= compute_cost(&effort(2.0, 7.0), window[1], &weights)
            );
        }
    }

    #[test]
    fn test_cost_is_deterministic() {
        let weights = CostWeights::default();
        let e = effort(3.3, 13.0);
        let first = compute_cost(&e, 123_456, &weights);
        for _ in 0..10 {
            assert_eq!(compute_cost(&e, 123_456, &weights), first);
        }
    }

    #[test]
    fn test_cost_factor_parse_and_display() {
        for factor in [
            CostFactor::ComputeHours,
            CostFactor::DatasetMb,
            CostFactor::ModelParamsBillions,
        ] {
            let parsed: CostFactor = factor.to_string().parse().unwrap();
            assert_eq!(parsed, factor);
        }
        assert!("gpu_watts".parse::<CostFactor>().is_err());
    }

    #[test]
    fn test_with_weight() {
        let weights = CostWeights::default().with_weight(CostFactor::ComputeHours, 10.0);
        assert_eq!(weights.weight(CostFactor::ComputeHours), 10.0);
        assert_eq!(weights.weight(CostFactor::DatasetMb), 0.1);
    }
}
