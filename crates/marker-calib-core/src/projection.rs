use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{BrownConrady5, Intrinsics, Pose, Pt3, Real, Vec2};

/// Errors raised by the projector.
#[derive(Debug, Error, Clone, Copy, PartialEq)]
pub enum ProjectionError {
    /// The point lies on or behind the camera plane.
    #[error("point {index} has non-positive depth {depth} in the camera frame")]
    InvalidDepth { index: usize, depth: Real },
}

/// Pinhole camera with Brown-Conrady distortion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PinholeCamera {
    pub intrinsics: Intrinsics,
    #[serde(default)]
    pub distortion: BrownConrady5,
}

impl PinholeCamera {
    pub fn new(intrinsics: Intrinsics, distortion: BrownConrady5) -> Self {
        Self {
            intrinsics,
            distortion,
        }
    }

    /// Project a point expressed in the camera frame to pixels.
    ///
    /// Points with `z <= 0` (or a non-finite depth) are rejected.
    pub fn project(&self, p_c: &Pt3) -> Result<Vec2, ProjectionError> {
        project_camera_point(self, p_c, 0)
    }

    /// Project points given in a local frame through `cam_from_local`.
    pub fn project_points(
        &self,
        cam_from_local: &Pose,
        points: &[Pt3],
    ) -> Result<Vec<Vec2>, ProjectionError> {
        project(cam_from_local, &self.intrinsics, &self.distortion, points)
    }
}

/// Project `local_points` into pixels.
///
/// Each point is mapped into the camera frame with `cam_from_local`, divided
/// by its depth, distorted, and finally scaled by the focal lengths and
/// shifted by the principal point.
pub fn project(
    cam_from_local: &Pose,
    intrinsics: &Intrinsics,
    distortion: &BrownConrady5,
    local_points: &[Pt3],
) -> Result<Vec<Vec2>, ProjectionError> {
    let camera = PinholeCamera::new(*intrinsics, *distortion);
    let iso = cam_from_local.to_isometry();
    local_points
        .iter()
        .enumerate()
        .map(|(index, p)| project_camera_point(&camera, &iso.transform_point(p), index))
        .collect()
}

fn project_camera_point(
    camera: &PinholeCamera,
    p_c: &Pt3,
    index: usize,
) -> Result<Vec2, ProjectionError> {
    // Written as a negated comparison so that NaN depths are rejected too.
    if !(p_c.z > 0.0) {
        return Err(ProjectionError::InvalidDepth {
            index,
            depth: p_c.z,
        });
    }
    let x = p_c.x / p_c.z;
    let y = p_c.y / p_c.z;
    let (xd, yd) = camera.distortion.distort(x, y);
    let (u, v) = camera.intrinsics.to_pixel(xd, yd);
    Ok(Vec2::new(u, v))
}
