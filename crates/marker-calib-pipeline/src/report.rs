use marker_calib_core::{CameraId, MarkerId, Pose, Real};
use marker_calib_optim::{SolveReport, SolveStatus};
use serde::{Deserialize, Serialize};

/// A global pose in every form a consumer may want.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseReport {
    /// Rotation vector (axis times angle, radians).
    pub rotation: [Real; 3],
    pub translation: [Real; 3],
    /// Row-major homogeneous 4×4 matrix.
    pub matrix: [[Real; 4]; 4],
}

impl From<&Pose> for PoseReport {
    fn from(pose: &Pose) -> Self {
        let m = pose.matrix();
        let r = pose.rotation;
        let t = pose.translation;
        Self {
            rotation: [r.x, r.y, r.z],
            translation: [t.x, t.y, t.z],
            matrix: std::array::from_fn(|row| std::array::from_fn(|col| m[(row, col)])),
        }
    }
}

impl PoseReport {
    pub fn to_pose(&self) -> Pose {
        Pose::from_components(self.translation.into(), self.rotation.into())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraReport {
    pub id: CameraId,
    /// `world_from_cam`.
    pub pose: PoseReport,
    /// RMS reprojection error (pixels) of this camera's corners after refinement.
    pub rms: Option<Real>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerReport {
    pub id: MarkerId,
    /// `world_from_marker`.
    pub pose: PoseReport,
    pub reference: bool,
}

/// Result of [`crate::run_marker_calibration`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerCalibReport {
    pub cameras: Vec<CameraReport>,
    pub markers: Vec<MarkerReport>,
    pub solver: SolveReport,
    /// RMS reprojection error (pixels) at the propagated poses.
    pub initial_rms: Real,
    /// RMS reprojection error (pixels) at the refined poses.
    pub final_rms: Real,
    /// Largest corner error (pixels) at the refined poses.
    pub final_max_error: Real,
    /// Corners still behind their camera at the refined poses.
    pub invalid_corners: usize,
}

impl MarkerCalibReport {
    pub fn status(&self) -> SolveStatus {
        self.solver.status
    }

    pub fn camera(&self, id: CameraId) -> Option<&CameraReport> {
        self.cameras.iter().find(|c| c.id == id)
    }

    pub fn marker(&self, id: MarkerId) -> Option<&MarkerReport> {
        self.markers.iter().find(|m| m.id == id)
    }
}
