//! Projection helpers generic over [`RealField`] so they run on both `f64`
//! and dual numbers.

use marker_calib_core::{BrownConrady5, Intrinsics, Pt3, Real};
use nalgebra::{RealField, Vector2, Vector3};

/// Below this squared angle the rotation is applied to first order.
const SMALL_ANGLE_SQ: Real = 1e-16;

#[inline]
pub(crate) fn lit<T: RealField>(v: Real) -> T {
    nalgebra::convert(v)
}

/// Rotate `p` by the rotation vector `w` (Rodrigues' formula).
///
/// Near zero the first-order form `p + w × p` is used, which keeps the
/// derivative with respect to `w` exact at the origin.
pub fn rotate_point<T: RealField>(w: &Vector3<T>, p: &Vector3<T>) -> Vector3<T> {
    let theta2 = w.dot(w);
    if theta2 > lit::<T>(SMALL_ANGLE_SQ) {
        let theta = theta2.sqrt();
        let (s, c) = (theta.clone().sin(), theta.clone().cos());
        let k = w / theta;
        let k_cross_p = k.cross(p);
        let k_dot_p = k.dot(p);
        p * c.clone() + k_cross_p * s + k * (k_dot_p * (T::one() - c))
    } else {
        p + w.cross(p)
    }
}

/// Map a point from a local frame into the camera frame.
///
/// `cam` and `local` are `[rx, ry, rz, tx, ty, tz]` blocks of `world_from_cam`
/// and `world_from_local`.
pub fn local_to_camera<T: RealField>(cam: &[T], local: &[T], p: &Pt3) -> Vector3<T> {
    debug_assert!(cam.len() == 6, "camera pose must have 6 params");
    debug_assert!(local.len() == 6, "local pose must have 6 params");

    let w_l = Vector3::new(local[0].clone(), local[1].clone(), local[2].clone());
    let t_l = Vector3::new(local[3].clone(), local[4].clone(), local[5].clone());
    let w_c = Vector3::new(cam[0].clone(), cam[1].clone(), cam[2].clone());
    let t_c = Vector3::new(cam[3].clone(), cam[4].clone(), cam[5].clone());

    let p_l = Vector3::new(lit::<T>(p.x), lit::<T>(p.y), lit::<T>(p.z));
    let p_w = rotate_point(&w_l, &p_l) + t_l;
    rotate_point(&(-w_c), &(p_w - t_c))
}

/// Brown-Conrady distortion with fixed coefficients.
pub fn distort<T: RealField>(x: T, y: T, d: &BrownConrady5) -> (T, T) {
    let r2 = x.clone() * x.clone() + y.clone() * y.clone();
    let r4 = r2.clone() * r2.clone();
    let r6 = r4.clone() * r2.clone();
    let radial =
        T::one() + r2.clone() * lit::<T>(d.k1) + r4 * lit::<T>(d.k2) + r6 * lit::<T>(d.k3);

    let two: T = lit::<T>(2.0);
    let xy = x.clone() * y.clone();
    let x_t = two.clone() * xy.clone() * lit::<T>(d.p1)
        + (r2.clone() + two.clone() * x.clone() * x.clone()) * lit::<T>(d.p2);
    let y_t = (r2 + two.clone() * y.clone() * y.clone()) * lit::<T>(d.p1)
        + two * xy * lit::<T>(d.p2);

    (x * radial.clone() + x_t, y * radial + y_t)
}

/// Project a camera-frame point to pixels; `None` if its depth is not
/// strictly positive (NaN included).
pub fn project_camera_point<T: RealField>(
    p_c: &Vector3<T>,
    intrinsics: &Intrinsics,
    distortion: &BrownConrady5,
) -> Option<Vector2<T>> {
    if !(p_c.z > T::zero()) {
        return None;
    }
    let x = p_c.x.clone() / p_c.z.clone();
    let y = p_c.y.clone() / p_c.z.clone();
    let (xd, yd) = distort(x, y, distortion);
    let u = xd * lit::<T>(intrinsics.fx)
        + yd.clone() * lit::<T>(intrinsics.skew)
        + lit::<T>(intrinsics.cx);
    let v = yd * lit::<T>(intrinsics.fy) + lit::<T>(intrinsics.cy);
    Some(Vector2::new(u, v))
}

#[cfg(test)]
mod tests {
    use super::*;
    use marker_calib_core::{PinholeCamera, Pose, Vec3};

    #[test]
    fn rotation_matches_pose() {
        let pose = Pose::from_components(Vec3::zeros(), Vec3::new(0.3, -1.1, 0.7));
        let p = Vec3::new(0.2, 0.5, -0.4);
        let got = rotate_point(&pose.rotation, &p);
        let expected = pose.rotation_matrix() * p;
        assert!((got - expected).norm() < 1e-12);

        let tiny = Vec3::new(1e-10, 0.0, 0.0);
        let got = rotate_point(&tiny, &p);
        assert!((got - p).norm() < 1e-9);
    }

    #[test]
    fn matches_core_projector() {
        let cam = PinholeCamera::new(
            marker_calib_core::synthetic::default_intrinsics(),
            marker_calib_core::synthetic::default_distortion(),
        );
        let world_from_cam =
            Pose::from_components(Vec3::new(0.1, -0.2, 1.2), Vec3::new(3.0, 0.1, -0.2));
        let world_from_marker =
            Pose::from_components(Vec3::new(0.3, 0.0, 0.05), Vec3::new(0.05, -0.02, 0.4));
        let p = Pt3::new(0.05, 0.05, 0.0);

        let expected = cam
            .project_points(&world_from_cam.inverse().compose(&world_from_marker), &[p])
            .unwrap()[0];

        let p_c = local_to_camera(&world_from_cam.to_array(), &world_from_marker.to_array(), &p);
        let got = project_camera_point(&p_c, &cam.intrinsics, &cam.distortion).unwrap();
        assert!((got - expected).norm() < 1e-9, "{got:?} vs {expected:?}");
    }

    #[test]
    fn behind_camera_is_rejected() {
        let intr = marker_calib_core::synthetic::default_intrinsics();
        let d = BrownConrady5::zeros();
        assert!(project_camera_point(&Vec3::new(0.0, 0.0, -1.0), &intr, &d).is_none());
        assert!(project_camera_point(&Vec3::new(0.0, 0.0, 0.0), &intr, &d).is_none());
        assert!(project_camera_point(&Vec3::new(0.0, 0.0, Real::NAN), &intr, &d).is_none());
    }

    #[test]
    fn generic_distortion_matches_hand_computed_values() {
        let d = BrownConrady5::from_opencv([0.1, 0.2, 0.01, 0.02, 0.4]);
        let (x, y) = distort::<Real>(0.5, -0.25, &d);
        assert!((x - 0.545244140625).abs() < 1e-14, "x = {x}");
        assert!((y + 0.2663720703125).abs() < 1e-14, "y = {y}");
    }
}
