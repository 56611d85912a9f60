//! Rigid poses parameterized by a rotation vector and a translation.
//!
//! The six numbers `[rx, ry, rz, tx, ty, tz]` are the source of truth for a
//! [`Pose`]. Rotation matrices, quaternions and homogeneous matrices are
//! derived on demand through the exponential map, so a pose can never hold a
//! non-orthonormal rotation.

use crate::{Iso3, Mat3, Mat4, Pt3, Real, Vec3};
use anyhow::{ensure, Result};
use nalgebra::{Rotation3, Translation3, UnitQuaternion};
use serde::{Deserialize, Serialize};

/// Number of free parameters of a [`Pose`].
pub const POSE_DIM: usize = 6;

/// Rigid transform `target <- source` stored as axis-angle + translation.
///
/// `rotation` is the axis scaled by the rotation angle in radians.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    /// Rotation vector (unit axis times angle).
    pub rotation: Vec3,
    /// Translation applied after the rotation.
    pub translation: Vec3,
}

impl Default for Pose {
    fn default() -> Self {
        Self::identity()
    }
}

impl Pose {
    /// The identity transform.
    pub fn identity() -> Self {
        Self {
            rotation: Vec3::zeros(),
            translation: Vec3::zeros(),
        }
    }

    /// Build a pose from a translation and a rotation vector.
    pub fn from_components(translation: Vec3, rotation: Vec3) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    /// Split the pose into `(translation, rotation_vector)`.
    pub fn to_components(&self) -> (Vec3, Vec3) {
        (self.translation, self.rotation)
    }

    /// Build a pose from a homogeneous 4×4 matrix.
    ///
    /// The upper-left block is read as a rotation matrix. A zero rotation
    /// angle yields the zero rotation vector.
    pub fn from_matrix(m: &Mat4) -> Self {
        let r: Mat3 = m.fixed_view::<3, 3>(0, 0).into_owned();
        let rot = Rotation3::from_matrix_unchecked(r);
        let q = UnitQuaternion::from_rotation_matrix(&rot);
        Self {
            rotation: q.scaled_axis(),
            translation: Vec3::new(m[(0, 3)], m[(1, 3)], m[(2, 3)]),
        }
    }

    /// Homogeneous 4×4 matrix of the pose.
    pub fn matrix(&self) -> Mat4 {
        let mut m = Mat4::identity();
        m.fixed_view_mut::<3, 3>(0, 0)
            .copy_from(&self.rotation_matrix());
        m.fixed_view_mut::<3, 1>(0, 3).copy_from(&self.translation);
        m
    }

    /// Rotation matrix obtained through the exponential map.
    pub fn rotation_matrix(&self) -> Mat3 {
        Rotation3::from_scaled_axis(self.rotation).into_inner()
    }

    /// Convert into a nalgebra isometry.
    pub fn to_isometry(&self) -> Iso3 {
        Iso3::from_parts(
            Translation3::from(self.translation),
            UnitQuaternion::from_scaled_axis(self.rotation),
        )
    }

    /// Build from a nalgebra isometry.
    pub fn from_isometry(iso: &Iso3) -> Self {
        Self {
            rotation: iso.rotation.scaled_axis(),
            translation: iso.translation.vector,
        }
    }

    /// Compose two poses: the result applies `other` first, then `self`.
    ///
    /// Equivalent to `self.matrix() * other.matrix()`, evaluated in
    /// quaternion form so long chains keep the rotation block orthonormal.
    pub fn compose(&self, other: &Pose) -> Pose {
        Pose::from_isometry(&(self.to_isometry() * other.to_isometry()))
    }

    /// Inverse transform.
    pub fn inverse(&self) -> Pose {
        Pose::from_isometry(&self.to_isometry().inverse())
    }

    /// Map a point from the source frame into the target frame.
    pub fn transform_point(&self, p: &Pt3) -> Pt3 {
        self.to_isometry().transform_point(p)
    }

    /// Parameter block `[rx, ry, rz, tx, ty, tz]`.
    pub fn to_array(&self) -> [Real; POSE_DIM] {
        [
            self.rotation.x,
            self.rotation.y,
            self.rotation.z,
            self.translation.x,
            self.translation.y,
            self.translation.z,
        ]
    }

    /// Parse a parameter block `[rx, ry, rz, tx, ty, tz]`.
    pub fn from_slice(v: &[Real]) -> Result<Self> {
        ensure!(
            v.len() == POSE_DIM,
            "expected pose vector of length {}, got {}",
            POSE_DIM,
            v.len()
        );
        Ok(Self {
            rotation: Vec3::new(v[0], v[1], v[2]),
            translation: Vec3::new(v[3], v[4], v[5]),
        })
    }

    /// Translation distance and rotation angle (radians) between two poses.
    pub fn error_to(&self, other: &Pose) -> (Real, Real) {
        let dt = (self.translation - other.translation).norm();
        let qa = UnitQuaternion::from_scaled_axis(self.rotation);
        let qb = UnitQuaternion::from_scaled_axis(other.rotation);
        (dt, qa.angle_to(&qb))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn sample_poses() -> Vec<Pose> {
        vec![
            Pose::from_components(Vec3::new(0.1, -0.2, 1.5), Vec3::new(0.3, -0.1, 0.2)),
            Pose::from_components(Vec3::new(-0.4, 0.0, 0.7), Vec3::new(0.0, 1.2, 0.0)),
            Pose::from_components(Vec3::new(0.0, 0.5, -0.3), Vec3::new(-2.0, 0.5, 1.0)),
            Pose::from_components(Vec3::new(2.0, 1.0, 0.0), Vec3::new(0.0, 0.0, 3.0)),
        ]
    }

    fn assert_pose_close(a: &Pose, b: &Pose, tol: Real) {
        let (dt, ang) = a.error_to(b);
        assert!(dt < tol, "translation differs by {dt}: {a:?} vs {b:?}");
        assert!(ang < tol, "rotation differs by {ang}: {a:?} vs {b:?}");
    }

    #[test]
    fn matrix_roundtrip_recovers_components() {
        for pose in sample_poses() {
            let restored = Pose::from_matrix(&pose.matrix());
            let (t, r) = restored.to_components();
            assert!((t - pose.translation).norm() < 1e-12);
            // All sample angles are below pi, so the rotation vector is unique.
            assert!(
                (r - pose.rotation).norm() < 1e-9,
                "rotation vector {r:?} vs {:?}",
                pose.rotation
            );
        }
    }

    #[test]
    fn angle_above_pi_roundtrips_up_to_wrap() {
        let axis = Vec3::new(0.0, 0.0, 1.0);
        let pose = Pose::from_components(Vec3::zeros(), axis * (1.5 * PI));
        let restored = Pose::from_matrix(&pose.matrix());
        let expected = axis * (-0.5 * PI);
        assert!((restored.rotation - expected).norm() < 1e-9);
        assert_pose_close(&restored, &pose, 1e-9);
    }

    #[test]
    fn zero_rotation_maps_to_zero_vector() {
        let mut m = Mat4::identity();
        m[(0, 3)] = 1.0;
        let pose = Pose::from_matrix(&m);
        assert_eq!(pose.rotation, Vec3::zeros());
        assert_eq!(pose.translation, Vec3::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn identity_is_neutral() {
        let id = Pose::identity();
        for pose in sample_poses() {
            assert_pose_close(&pose.compose(&id), &pose, 1e-12);
            assert_pose_close(&id.compose(&pose), &pose, 1e-12);
        }
    }

    #[test]
    fn composition_is_associative() {
        let poses = sample_poses();
        let (a, b, c) = (&poses[0], &poses[1], &poses[2]);
        let left = a.compose(&b.compose(c));
        let right = a.compose(b).compose(c);
        assert_pose_close(&left, &right, 1e-12);
    }

    #[test]
    fn compose_matches_matrix_product() {
        let poses = sample_poses();
        for a in &poses {
            for b in &poses {
                let expected = a.matrix() * b.matrix();
                let got = a.compose(b).matrix();
                assert!((expected - got).abs().max() < 1e-12);
            }
        }
    }

    #[test]
    fn long_chain_stays_orthonormal() {
        let step = sample_poses()[0];
        let mut acc = Pose::identity();
        for _ in 0..1000 {
            acc = acc.compose(&step);
        }
        let r = acc.rotation_matrix();
        let err = (r.transpose() * r - Mat3::identity()).abs().max();
        assert!(err < 1e-12, "orthonormality error {err}");
    }

    #[test]
    fn inverse_cancels() {
        for pose in sample_poses() {
            assert_pose_close(&pose.compose(&pose.inverse()), &Pose::identity(), 1e-12);
            assert_pose_close(&pose.inverse().compose(&pose), &Pose::identity(), 1e-12);
        }
    }

    #[test]
    fn slice_roundtrip_and_length_check() {
        let pose = sample_poses()[2];
        let restored = Pose::from_slice(&pose.to_array()).unwrap();
        assert_eq!(restored, pose);
        assert!(Pose::from_slice(&[0.0; 5]).is_err());
    }

    #[test]
    fn transform_point_matches_matrix() {
        let pose = sample_poses()[1];
        let p = Pt3::new(0.2, -0.1, 0.4);
        let expected = pose.matrix() * p.to_homogeneous();
        let got = pose.transform_point(&p);
        assert!((got.coords - expected.xyz()).norm() < 1e-12);
    }
}
