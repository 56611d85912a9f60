use marker_calib_core::{CameraId, MarkerId};
use thiserror::Error;

use crate::NodeId;

/// Errors raised while building the observation graph or propagating poses.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum InitError {
    /// The detection list is empty.
    #[error("no detections provided")]
    NoDetections,
    /// The same camera id appears twice in the camera list.
    #[error("duplicate {0} in camera list")]
    DuplicateCamera(CameraId),
    /// A detection refers to a camera missing from the camera list.
    #[error("detection {index} references unknown {camera}")]
    UnknownCamera { index: usize, camera: CameraId },
    /// No camera saw the reference marker, so the world frame is unanchored.
    #[error("reference {0} is not observed by any camera")]
    ReferenceMarkerNotObserved(MarkerId),
    /// Some nodes share no path with the reference marker.
    #[error(
        "observation graph is disconnected; unreachable from the reference marker: {}",
        join_nodes(.unreachable)
    )]
    DisconnectedGraph { unreachable: Vec<NodeId> },
}

fn join_nodes(nodes: &[NodeId]) -> String {
    nodes
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
