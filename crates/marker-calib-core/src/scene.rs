use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{BrownConrady5, Intrinsics, PinholeCamera, Pose, Pt3, Real, Vec2};

/// Camera identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CameraId(pub u32);

/// Marker identifier (the fiducial dictionary id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MarkerId(pub u32);

impl fmt::Display for CameraId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "camera {}", self.0)
    }
}

impl fmt::Display for MarkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "marker {}", self.0)
    }
}

/// Number of corners of a square fiducial marker.
pub const MARKER_CORNERS: usize = 4;

/// Local corner geometry of a square marker with side `size`.
///
/// Corners lie on the `z = 0` plane in the order top-left, top-right,
/// bottom-right, bottom-left, matching the ArUco detector output.
pub fn marker_corners(size: Real) -> [Pt3; MARKER_CORNERS] {
    let h = 0.5 * size;
    [
        Pt3::new(-h, h, 0.0),
        Pt3::new(h, h, 0.0),
        Pt3::new(h, -h, 0.0),
        Pt3::new(-h, -h, 0.0),
    ]
}

/// A calibrated or not-yet-calibrated camera.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    pub id: CameraId,
    pub model: PinholeCamera,
    /// `world_from_cam`, `None` until the camera is calibrated.
    #[serde(default)]
    pub pose: Option<Pose>,
}

impl Camera {
    pub fn new(id: CameraId, intrinsics: Intrinsics, distortion: BrownConrady5) -> Self {
        Self {
            id,
            model: PinholeCamera::new(intrinsics, distortion),
            pose: None,
        }
    }
}

/// A square planar fiducial marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    pub id: MarkerId,
    /// Corner geometry in the marker frame.
    pub corners: [Pt3; MARKER_CORNERS],
    /// `world_from_marker`, `None` until the marker is calibrated.
    #[serde(default)]
    pub pose: Option<Pose>,
}

impl Marker {
    /// An uncalibrated marker of side `size`.
    pub fn new(id: MarkerId, size: Real) -> Self {
        Self {
            id,
            corners: marker_corners(size),
            pose: None,
        }
    }

    /// The reference marker: pinned to the identity pose.
    pub fn reference(id: MarkerId, size: Real) -> Self {
        Self {
            id,
            corners: marker_corners(size),
            pose: Some(Pose::identity()),
        }
    }
}

/// One marker seen by one camera in one image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub camera: CameraId,
    pub marker: MarkerId,
    /// Detected corner pixels, in the same order as [`marker_corners`].
    pub corners: [Vec2; MARKER_CORNERS],
    /// Single-image estimate of `cam_from_marker` (e.g. from a PnP solve).
    pub cam_from_marker: Pose,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corners_are_centered_square() {
        let c = marker_corners(0.082);
        let centroid = c.iter().fold(Pt3::origin().coords, |acc, p| acc + p.coords) / 4.0;
        assert!(centroid.norm() < 1e-15);
        assert!(((c[1] - c[0]).norm() - 0.082).abs() < 1e-15);
        assert!(((c[2] - c[1]).norm() - 0.082).abs() < 1e-15);
        assert!(c.iter().all(|p| p.z == 0.0));
        assert!(c[0].x < 0.0 && c[0].y > 0.0);
    }

    #[test]
    fn reference_marker_starts_at_identity() {
        let m = Marker::reference(MarkerId(0), 0.1);
        assert_eq!(m.pose, Some(Pose::identity()));
        assert_eq!(Marker::new(MarkerId(1), 0.1).pose, None);
    }

    #[test]
    fn ids_serialize_as_plain_numbers() {
        let json = serde_json::to_string(&(CameraId(3), MarkerId(7))).unwrap();
        assert_eq!(json, "[3,7]");
        assert_eq!(CameraId(3).to_string(), "camera 3");
        assert_eq!(MarkerId(7).to_string(), "marker 7");
    }
}
