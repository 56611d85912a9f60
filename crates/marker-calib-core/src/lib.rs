//! Core math and geometry primitives for `marker-calib`.
//!
//! This crate contains:
//! - linear algebra type aliases (`Real`, `Vec2`, `Pt3`, ...),
//! - the [`Pose`] value type (rotation vector + translation),
//! - the pinhole + Brown-Conrady camera model and the point projector,
//! - scene records shared by the other crates ([`Camera`], [`Marker`], [`Detection`]),
//! - deterministic synthetic scenes for tests and examples.
//!
//! Frame conventions:
//! - a camera pose is `world_from_cam`,
//! - a marker pose is `world_from_marker`,
//! - a detection carries `cam_from_marker`, the single-image estimate of the
//!   marker relative to the observing camera.
//!
//! The world frame is the frame of the reference marker.

/// Linear algebra type aliases.
pub mod math;
/// Camera intrinsics and distortion models.
pub mod models;
/// Rigid poses.
pub mod pose;
/// Point projection through a camera.
pub mod projection;
/// Cameras, markers and detections.
pub mod scene;
/// Deterministic synthetic scenes.
pub mod synthetic;

pub use math::*;
pub use models::*;
pub use pose::*;
pub use projection::*;
pub use scene::*;
