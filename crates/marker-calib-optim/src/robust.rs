use marker_calib_core::Real;
use serde::{Deserialize, Serialize};

/// Robust loss applied to the pixel error of each marker corner.
///
/// Weights come from iteratively re-weighted least squares: the corner's two
/// residual rows are scaled by `sqrt(w)` where `w` depends on the corner's
/// squared pixel error. Weights are never differentiated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RobustKernel {
    /// Plain squared error.
    #[default]
    None,
    /// Quadratic up to `delta` pixels, linear beyond.
    Huber { delta: Real },
    /// `c^2 * ln(1 + r^2 / c^2)`.
    Cauchy { c: Real },
}

impl RobustKernel {
    /// Loss `rho(r^2)` and IRLS weight for a squared corner error.
    pub fn rho_and_weight(self, r2: Real) -> (Real, Real) {
        match self {
            RobustKernel::None => (r2, 1.0),
            RobustKernel::Huber { delta } => {
                let r = r2.sqrt();
                if r <= delta {
                    (r2, 1.0)
                } else {
                    (2.0 * delta * r - delta * delta, delta / r)
                }
            }
            RobustKernel::Cauchy { c } => {
                let t = r2 / (c * c);
                (c * c * t.ln_1p(), 1.0 / (1.0 + t))
            }
        }
    }

    /// Square root of the IRLS weight, the factor applied to residual rows.
    pub fn row_scale(self, r2: Real) -> Real {
        self.rho_and_weight(r2).1.sqrt()
    }

    /// Kernels with a non-positive or non-finite scale are rejected.
    pub fn is_valid(self) -> bool {
        match self {
            RobustKernel::None => true,
            RobustKernel::Huber { delta } => delta.is_finite() && delta > 0.0,
            RobustKernel::Cauchy { c } => c.is_finite() && c > 0.0,
        }
    }
}
