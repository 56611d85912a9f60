//! Initial pose estimates for multi-camera marker calibration.
//!
//! Detections are turned into an [`ObservationGraph`] whose edges link a camera
//! to every marker it saw. [`propagate_poses`] walks that graph breadth-first
//! from the reference marker and chains the per-detection relative poses into
//! a global pose for every camera and marker.

mod error;
mod graph;
mod propagate;

pub use error::*;
pub use graph::*;
pub use propagate::*;
