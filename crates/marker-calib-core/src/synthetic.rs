//! Deterministic synthetic scenes.
//!
//! A [`SyntheticScene`] holds ground-truth cameras and markers and derives
//! exact detections from them: projected corners plus the exact
//! `cam_from_marker` pose. [`DetectionNoise`] perturbs detections with a
//! seeded, platform-independent sequence so tests stay reproducible.

use crate::{
    BrownConrady5, Camera, CameraId, Detection, Intrinsics, Marker, MarkerId, Pose, Real, Vec2,
    Vec3, MARKER_CORNERS,
};
use anyhow::{anyhow, Result};
use std::f64::consts::PI;

/// Ground-truth scene: every camera and marker carries its true pose.
#[derive(Debug, Clone)]
pub struct SyntheticScene {
    pub cameras: Vec<Camera>,
    pub markers: Vec<Marker>,
    pub marker_size: Real,
    pub reference: MarkerId,
    /// Image size `(width, height)` used for visibility checks.
    pub image_size: (Real, Real),
}

/// Default intrinsics of synthetic cameras (1280×960 image).
pub fn default_intrinsics() -> Intrinsics {
    Intrinsics {
        fx: 800.0,
        fy: 790.0,
        cx: 640.0,
        cy: 480.0,
        skew: 0.0,
    }
}

/// Mild barrel distortion used by synthetic cameras.
pub fn default_distortion() -> BrownConrady5 {
    BrownConrady5::from_opencv([-0.12, 0.03, 0.0005, -0.0004, 0.0])
}

impl SyntheticScene {
    /// Cameras hovering above a row of markers lying near the `z = 0` plane.
    ///
    /// Marker `0` is the reference and sits at the identity pose. Markers are
    /// spaced `0.3` apart along +X with small per-marker tilts; cameras look
    /// down (-Z) from heights around one unit, spread along the row.
    pub fn overhead_row(num_cameras: usize, num_markers: usize, marker_size: Real) -> Self {
        let markers = (0..num_markers)
            .map(|i| {
                let id = MarkerId(i as u32);
                if i == 0 {
                    return Marker::reference(id, marker_size);
                }
                let k = i as Real;
                let mut marker = Marker::new(id, marker_size);
                marker.pose = Some(Pose::from_components(
                    Vec3::new(0.3 * k, 0.04 * (i % 2) as Real, 0.02 * k),
                    Vec3::new(0.04 * k, -0.03 * k, 0.2 * k),
                ));
                marker
            })
            .collect::<Vec<_>>();

        let span = 0.3 * num_markers.saturating_sub(1) as Real;
        let look_down = Pose::from_components(Vec3::zeros(), Vec3::new(PI, 0.0, 0.0));
        let cameras = (0..num_cameras)
            .map(|j| {
                let k = j as Real;
                let frac = if num_cameras > 1 {
                    k / (num_cameras - 1) as Real
                } else {
                    0.5
                };
                let position = Pose::from_components(
                    Vec3::new(span * frac, -0.1 + 0.05 * k, 1.0 + 0.1 * k),
                    Vec3::zeros(),
                );
                let tilt = Pose::from_components(
                    Vec3::zeros(),
                    Vec3::new(0.03 * k, -0.05 + 0.02 * k, 0.1 * k),
                );
                let mut camera = Camera::new(
                    CameraId(j as u32),
                    default_intrinsics(),
                    default_distortion(),
                );
                camera.pose = Some(position.compose(&look_down).compose(&tilt));
                camera
            })
            .collect();

        Self {
            cameras,
            markers,
            marker_size,
            reference: MarkerId(0),
            image_size: (1280.0, 960.0),
        }
    }

    pub fn camera(&self, id: CameraId) -> Option<&Camera> {
        self.cameras.iter().find(|c| c.id == id)
    }

    pub fn marker(&self, id: MarkerId) -> Option<&Marker> {
        self.markers.iter().find(|m| m.id == id)
    }

    /// Exact detection of `marker` by `camera`.
    pub fn detection(&self, camera: CameraId, marker: MarkerId) -> Result<Detection> {
        let cam = self
            .camera(camera)
            .ok_or_else(|| anyhow!("{camera} is not part of the scene"))?;
        let mk = self
            .marker(marker)
            .ok_or_else(|| anyhow!("{marker} is not part of the scene"))?;
        let world_from_cam = cam
            .pose
            .ok_or_else(|| anyhow!("{camera} has no ground-truth pose"))?;
        let world_from_marker = mk
            .pose
            .ok_or_else(|| anyhow!("{marker} has no ground-truth pose"))?;

        let cam_from_marker = world_from_cam.inverse().compose(&world_from_marker);
        let pixels = cam
            .model
            .project_points(&cam_from_marker, &mk.corners)
            .map_err(|e| anyhow!("{camera} cannot see {marker}: {e}"))?;

        let mut corners = [Vec2::zeros(); MARKER_CORNERS];
        corners.copy_from_slice(&pixels);
        Ok(Detection {
            camera,
            marker,
            corners,
            cam_from_marker,
        })
    }

    /// Exact detections for an explicit visibility list.
    pub fn detections(&self, pairs: &[(CameraId, MarkerId)]) -> Result<Vec<Detection>> {
        pairs
            .iter()
            .map(|&(camera, marker)| self.detection(camera, marker))
            .collect()
    }

    /// Exact detections for every pair whose corners all land inside the image.
    pub fn visible_detections(&self) -> Vec<Detection> {
        let (w, h) = self.image_size;
        let mut out = Vec::new();
        for cam in &self.cameras {
            for mk in &self.markers {
                if let Ok(det) = self.detection(cam.id, mk.id) {
                    let inside = det
                        .corners
                        .iter()
                        .all(|uv| uv.x >= 0.0 && uv.x < w && uv.y >= 0.0 && uv.y < h);
                    if inside {
                        out.push(det);
                    }
                }
            }
        }
        out
    }
}

/// Deterministic uniform noise applied to detections.
///
/// Every component is drawn uniformly from `[-max, +max]` using a SplitMix64
/// stream keyed by `(seed, detection index, component)`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DetectionNoise {
    pub seed: u64,
    /// Maximum absolute per-axis corner noise (pixels).
    pub pixel_max_abs: Real,
    /// Maximum absolute per-axis rotation-vector noise (radians).
    pub rotation_max_abs: Real,
    /// Maximum absolute per-axis translation noise (scene units).
    pub translation_max_abs: Real,
}

impl DetectionNoise {
    /// Perturb one detection; `index` selects the noise stream.
    pub fn apply(&self, index: usize, det: &Detection) -> Detection {
        let mut out = det.clone();
        for (c, uv) in out.corners.iter_mut().enumerate() {
            *uv += Vec2::new(
                self.sample(index, 2 * c, self.pixel_max_abs),
                self.sample(index, 2 * c + 1, self.pixel_max_abs),
            );
        }
        let delta = Pose::from_components(
            Vec3::new(
                self.sample(index, 8, self.translation_max_abs),
                self.sample(index, 9, self.translation_max_abs),
                self.sample(index, 10, self.translation_max_abs),
            ),
            Vec3::new(
                self.sample(index, 11, self.rotation_max_abs),
                self.sample(index, 12, self.rotation_max_abs),
                self.sample(index, 13, self.rotation_max_abs),
            ),
        );
        out.cam_from_marker = delta.compose(&det.cam_from_marker);
        out
    }

    /// Perturb a list of detections.
    pub fn apply_all(&self, dets: &[Detection]) -> Vec<Detection> {
        dets.iter()
            .enumerate()
            .map(|(i, d)| self.apply(i, d))
            .collect()
    }

    fn sample(&self, index: usize, component: usize, max_abs: Real) -> Real {
        let max_abs = max_abs.abs();
        if max_abs == 0.0 {
            return 0.0;
        }
        let key = self.seed
            ^ (index as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
            ^ (component as u64).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        let u = u64_to_unit_f64(splitmix64(key));
        (u - 0.5) * 2.0 * max_abs
    }
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

fn u64_to_unit_f64(x: u64) -> Real {
    // Top 53 bits mapped to [0, 1).
    ((x >> 11) as Real) * (1.0 / ((1u64 << 53) as Real))
}
