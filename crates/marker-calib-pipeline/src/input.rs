//! JSON-facing calibration input.

use marker_calib_core::synthetic::SyntheticScene;
use marker_calib_core::{
    BrownConrady5, Camera, CameraId, Detection, Intrinsics, Mat3, MarkerId, Pose, Real, Vec2,
    Vec3, MARKER_CORNERS,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::PipelineError;

/// A camera with known intrinsics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraInput {
    pub id: CameraId,
    /// Row-major 3×3 intrinsic matrix `K`.
    pub k: [[Real; 3]; 3],
    /// Distortion in OpenCV order `[k1, k2, p1, p2, k3]`.
    #[serde(default)]
    pub distortion: [Real; 5],
}

impl CameraInput {
    pub fn from_camera(camera: &Camera) -> Self {
        let k = camera.model.intrinsics.k_matrix();
        Self {
            id: camera.id,
            k: [
                [k[(0, 0)], k[(0, 1)], k[(0, 2)]],
                [k[(1, 0)], k[(1, 1)], k[(1, 2)]],
                [k[(2, 0)], k[(2, 1)], k[(2, 2)]],
            ],
            distortion: camera.model.distortion.to_opencv(),
        }
    }

    /// Uncalibrated camera record.
    pub fn to_camera(&self) -> Result<Camera, PipelineError> {
        let k = Mat3::from_fn(|r, c| self.k[r][c]);
        let intrinsics = Intrinsics::try_from_k_matrix(&k).map_err(|source| {
            PipelineError::Camera {
                camera: self.id,
                source,
            }
        })?;
        Ok(Camera::new(
            self.id,
            intrinsics,
            BrownConrady5::from_opencv(self.distortion),
        ))
    }
}

/// One detected marker in one image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionInput {
    pub camera: CameraId,
    pub marker: MarkerId,
    /// Corner pixels: top-left, top-right, bottom-right, bottom-left.
    pub corners: [[Real; 2]; MARKER_CORNERS],
    /// Rotation vector of the single-image `cam_from_marker` estimate.
    pub rotation: [Real; 3],
    /// Translation of the single-image `cam_from_marker` estimate.
    pub translation: [Real; 3],
}

impl DetectionInput {
    pub fn from_detection(det: &Detection) -> Self {
        let r = det.cam_from_marker.rotation;
        let t = det.cam_from_marker.translation;
        Self {
            camera: det.camera,
            marker: det.marker,
            corners: det.corners.map(|uv| [uv.x, uv.y]),
            rotation: [r.x, r.y, r.z],
            translation: [t.x, t.y, t.z],
        }
    }

    pub fn to_detection(&self) -> Detection {
        Detection {
            camera: self.camera,
            marker: self.marker,
            corners: self.corners.map(|[u, v]| Vec2::new(u, v)),
            cam_from_marker: Pose::from_components(
                Vec3::from(self.translation),
                Vec3::from(self.rotation),
            ),
        }
    }

    fn is_finite(&self) -> bool {
        self.corners.iter().flatten().all(|v| v.is_finite())
            && self.rotation.iter().all(|v| v.is_finite())
            && self.translation.iter().all(|v| v.is_finite())
    }
}

/// Everything needed for one calibration run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerCalibInput {
    pub cameras: Vec<CameraInput>,
    pub detections: Vec<DetectionInput>,
    /// Side length of every marker, in scene units.
    pub marker_size: Real,
    /// Marker whose frame defines the world frame.
    pub reference_marker: MarkerId,
}

impl MarkerCalibInput {
    /// Input built from a synthetic scene and a set of its detections.
    pub fn from_synthetic(scene: &SyntheticScene, detections: &[Detection]) -> Self {
        Self {
            cameras: scene.cameras.iter().map(CameraInput::from_camera).collect(),
            detections: detections.iter().map(DetectionInput::from_detection).collect(),
            marker_size: scene.marker_size,
            reference_marker: scene.reference,
        }
    }

    /// Structural checks that do not depend on the observation graph.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let invalid = |msg: String| Err(PipelineError::InvalidInput(msg));
        if self.cameras.is_empty() {
            return invalid("no cameras".into());
        }
        if self.detections.is_empty() {
            return invalid("no detections".into());
        }
        if !(self.marker_size.is_finite() && self.marker_size > 0.0) {
            return invalid(format!(
                "marker_size must be positive, got {}",
                self.marker_size
            ));
        }
        let mut seen = BTreeSet::new();
        for cam in &self.cameras {
            if !seen.insert(cam.id) {
                return invalid(format!("duplicate {}", cam.id));
            }
        }
        for (i, det) in self.detections.iter().enumerate() {
            if !seen.contains(&det.camera) {
                return invalid(format!("detection {i} references unknown {}", det.camera));
            }
            if !det.is_finite() {
                return invalid(format!("detection {i} contains non-finite values"));
            }
        }
        Ok(())
    }

    pub fn to_cameras(&self) -> Result<Vec<Camera>, PipelineError> {
        self.cameras.iter().map(CameraInput::to_camera).collect()
    }

    pub fn to_detections(&self) -> Vec<Detection> {
        self.detections
            .iter()
            .map(DetectionInput::to_detection)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> MarkerCalibInput {
        let scene = SyntheticScene::overhead_row(2, 2, 0.1);
        MarkerCalibInput::from_synthetic(&scene, &scene.visible_detections())
    }

    #[test]
    fn json_roundtrip_keeps_detections() {
        let input = sample();
        let json = serde_json::to_string(&input).unwrap();
        let back: MarkerCalibInput = serde_json::from_str(&json).unwrap();
        assert_eq!(back.cameras.len(), input.cameras.len());
        assert_eq!(back.detections.len(), input.detections.len());
        assert_eq!(back.reference_marker, input.reference_marker);
        let (a, b) = (&back.detections[0], &input.detections[0]);
        assert_eq!((a.camera, a.marker), (b.camera, b.marker));
        assert!((a.corners[2][0] - b.corners[2][0]).abs() < 1e-9);

        let scene = SyntheticScene::overhead_row(2, 2, 0.1);
        let det = &scene.visible_detections()[0];
        let restored = DetectionInput::from_detection(det).to_detection();
        assert_eq!(&restored, det);
    }

    #[test]
    fn camera_matrix_is_read_row_major() {
        let cam = CameraInput {
            id: CameraId(4),
            k: [[800.0, 0.0, 640.0], [0.0, 790.0, 480.0], [0.0, 0.0, 1.0]],
            distortion: [-0.1, 0.01, 0.0, 0.0, 0.0],
        }
        .to_camera()
        .unwrap();
        assert_eq!(cam.model.intrinsics.cx, 640.0);
        assert_eq!(cam.model.intrinsics.fy, 790.0);
        assert_eq!(cam.model.distortion.k1, -0.1);
        assert!(cam.pose.is_none());
    }

    #[test]
    fn malformed_k_names_the_camera() {
        let err = CameraInput {
            id: CameraId(2),
            k: [[800.0, 0.0, 640.0], [0.0, 790.0, 480.0], [0.5, 0.0, 1.0]],
            distortion: [0.0; 5],
        }
        .to_camera()
        .unwrap_err();
        assert!(err.to_string().starts_with("camera 2"), "{err}");
    }

    #[test]
    fn validate_catches_structural_problems() {
        assert!(sample().validate().is_ok());

        let mut input = sample();
        input.marker_size = -1.0;
        assert!(matches!(
            input.validate(),
            Err(PipelineError::InvalidInput(_))
        ));

        let mut input = sample();
        input.cameras.push(input.cameras[0].clone());
        assert!(input.validate().is_err());

        let mut input = sample();
        input.detections[0].corners[1][0] = Real::NAN;
        assert!(input.validate().is_err());

        let mut input = sample();
        input.detections.clear();
        assert!(input.validate().is_err());
    }
}
