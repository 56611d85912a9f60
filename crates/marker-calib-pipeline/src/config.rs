use marker_calib_core::Real;
use marker_calib_optim::{
    RobustKernel, SolveOptions, DEFAULT_DEPTH_PENALTY, DEFAULT_INVALID_DEPTH_WARN_AFTER,
};
use serde::{Deserialize, Serialize};

use crate::PipelineError;

/// Calibration settings; every field has a default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkerCalibConfig {
    /// Levenberg-Marquardt tolerances and iteration cap.
    pub solver: SolveOptions,
    /// Robust loss applied per detected corner.
    pub robust_kernel: RobustKernel,
    /// Residual (pixels) assigned to a corner behind its camera.
    pub depth_penalty: Real,
    /// Warn after this many consecutive evaluations with invalid depths.
    pub invalid_depth_warn_after: usize,
}

impl Default for MarkerCalibConfig {
    fn default() -> Self {
        Self {
            solver: SolveOptions::default(),
            robust_kernel: RobustKernel::None,
            depth_penalty: DEFAULT_DEPTH_PENALTY,
            invalid_depth_warn_after: DEFAULT_INVALID_DEPTH_WARN_AFTER,
        }
    }
}

impl MarkerCalibConfig {
    pub fn validate(&self) -> Result<(), PipelineError> {
        let invalid = |msg: String| Err(PipelineError::InvalidConfig(msg));
        self.solver
            .validate()
            .map_err(|e| PipelineError::InvalidConfig(format!("solver: {e}")))?;
        if !self.robust_kernel.is_valid() {
            return invalid(format!(
                "robust kernel {:?} needs a positive scale",
                self.robust_kernel
            ));
        }
        if !(self.depth_penalty.is_finite() && self.depth_penalty > 0.0) {
            return invalid(format!(
                "depth_penalty must be positive, got {}",
                self.depth_penalty
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_gives_defaults() {
        let cfg: MarkerCalibConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg, MarkerCalibConfig::default());
        assert_eq!(cfg.solver.ftol, 1e-10);
        assert_eq!(cfg.solver.xtol, 1e-10);
        assert_eq!(cfg.depth_penalty, 1e3);
        assert_eq!(cfg.invalid_depth_warn_after, 3);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn partial_json_overrides_fields() {
        let cfg: MarkerCalibConfig = serde_json::from_str(
            r#"{
                "solver": { "max_iters": 20, "ftol": 1e-8 },
                "robust_kernel": { "kind": "cauchy", "c": 2.0 }
            }"#,
        )
        .unwrap();
        assert_eq!(cfg.solver.max_iters, 20);
        assert_eq!(cfg.solver.ftol, 1e-8);
        assert_eq!(cfg.solver.gtol, 1e-10);
        assert_eq!(cfg.robust_kernel, RobustKernel::Cauchy { c: 2.0 });
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut cfg = MarkerCalibConfig::default();
        cfg.depth_penalty = 0.0;
        assert!(matches!(cfg.validate(), Err(PipelineError::InvalidConfig(_))));

        let mut cfg = MarkerCalibConfig::default();
        cfg.solver.xtol = Real::NAN;
        assert!(cfg.validate().is_err());

        let mut cfg = MarkerCalibConfig::default();
        cfg.robust_kernel = RobustKernel::Huber { delta: -1.0 };
        assert!(cfg.validate().is_err());
    }
}
