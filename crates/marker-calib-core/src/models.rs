use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{Mat3, Real};

/// Errors raised when reading camera models from raw matrices.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ModelError {
    /// `K[2, 2]` is zero, so the matrix cannot be normalised.
    #[error("intrinsic matrix has a zero K[2,2] entry")]
    SingularIntrinsics,
    /// The matrix does not have the upper-triangular pinhole layout.
    #[error("intrinsic matrix is not upper triangular (entry ({row}, {col}) = {value})")]
    NotUpperTriangular { row: usize, col: usize, value: Real },
    /// Focal lengths must be positive.
    #[error("focal lengths must be positive, got fx={fx}, fy={fy}")]
    NonPositiveFocal { fx: Real, fy: Real },
}

/// Pinhole camera intrinsics.
///
/// The corresponding calibration matrix `K` has the form:
///
/// ```text
/// [ fx  skew  cx ]
/// [  0   fy   cy ]
/// [  0    0    1 ]
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Intrinsics {
    pub fx: Real,
    pub fy: Real,
    pub cx: Real,
    pub cy: Real,
    #[serde(default)]
    pub skew: Real,
}

impl Intrinsics {
    /// Build the 3×3 calibration matrix `K`.
    pub fn k_matrix(&self) -> Mat3 {
        Mat3::new(
            self.fx, self.skew, self.cx, 0.0, self.fy, self.cy, 0.0, 0.0, 1.0,
        )
    }

    /// Read intrinsics from a 3×3 calibration matrix `K`.
    ///
    /// The matrix is first normalised so that `K[2, 2] == 1`, then checked
    /// against the standard upper-triangular layout.
    pub fn try_from_k_matrix(k: &Mat3) -> Result<Self, ModelError> {
        let eps = 1e-9;
        let k33 = k[(2, 2)];
        if k33.abs() < eps {
            return Err(ModelError::SingularIntrinsics);
        }
        let k_norm = k / k33;

        for (row, col) in [(1, 0), (2, 0), (2, 1)] {
            let value = k_norm[(row, col)];
            if value.abs() > eps {
                return Err(ModelError::NotUpperTriangular { row, col, value });
            }
        }

        let fx = k_norm[(0, 0)];
        let fy = k_norm[(1, 1)];
        if fx <= 0.0 || fy <= 0.0 {
            return Err(ModelError::NonPositiveFocal { fx, fy });
        }

        Ok(Self {
            fx,
            fy,
            cx: k_norm[(0, 2)],
            cy: k_norm[(1, 2)],
            skew: k_norm[(0, 1)],
        })
    }

    /// Map distorted normalized coordinates to pixels.
    pub fn to_pixel(&self, x: Real, y: Real) -> (Real, Real) {
        (self.fx * x + self.skew * y + self.cx, self.fy * y + self.cy)
    }
}

/// Brown-Conrady radial-tangential distortion (OpenCV 5-coefficient model).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BrownConrady5 {
    pub k1: Real,
    pub k2: Real,
    pub p1: Real,
    pub p2: Real,
    pub k3: Real,
}

impl BrownConrady5 {
    /// Zero distortion.
    pub fn zeros() -> Self {
        Self::default()
    }

    /// Build from OpenCV's coefficient order `[k1, k2, p1, p2, k3]`.
    pub fn from_opencv(d: [Real; 5]) -> Self {
        Self {
            k1: d[0],
            k2: d[1],
            p1: d[2],
            p2: d[3],
            k3: d[4],
        }
    }

    /// Coefficients in OpenCV's order `[k1, k2, p1, p2, k3]`.
    pub fn to_opencv(&self) -> [Real; 5] {
        [self.k1, self.k2, self.p1, self.p2, self.k3]
    }

    /// Apply the distortion polynomial to normalized coordinates.
    pub fn distort(&self, x: Real, y: Real) -> (Real, Real) {
        let r2 = x * x + y * y;
        let radial = 1.0 + self.k1 * r2 + self.k2 * r2 * r2 + self.k3 * r2 * r2 * r2;
        let x_t = 2.0 * self.p1 * x * y + self.p2 * (r2 + 2.0 * x * x);
        let y_t = self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * x * y;
        (x * radial + x_t, y * radial + y_t)
    }
}
