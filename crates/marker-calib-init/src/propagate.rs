//! Breadth-first pose propagation from the reference marker.
//!
//! With `rel = cam_from_marker` on an edge, a camera reached from a known
//! marker gets `world_from_cam = world_from_marker * rel⁻¹`, and a marker
//! reached from a known camera gets `world_from_marker = world_from_cam * rel`.
//! The first edge that reaches a node wins; the result only seeds the
//! optimizer.

use log::{debug, info};
use marker_calib_core::{CameraId, MarkerId, Pose};
use std::collections::{BTreeMap, VecDeque};

use crate::{InitError, NodeId, ObservationGraph};

/// Global poses produced by [`propagate_poses`].
#[derive(Debug, Clone, PartialEq)]
pub struct PropagatedPoses {
    pub reference: MarkerId,
    /// `world_from_cam` per camera.
    pub cameras: BTreeMap<CameraId, Pose>,
    /// `world_from_marker` per marker, the reference included.
    pub markers: BTreeMap<MarkerId, Pose>,
    /// Nodes in the order they were calibrated.
    pub order: Vec<NodeId>,
}

/// Assign a global pose to every node reachable from the reference marker.
///
/// Each node is enqueued at most once, so the walk finishes after at most
/// `graph.num_nodes()` expansions. Nodes left without a pose are reported
/// through [`InitError::DisconnectedGraph`].
pub fn propagate_poses(graph: &ObservationGraph) -> Result<PropagatedPoses, InitError> {
    let root = NodeId::Marker(graph.reference());
    let mut poses: BTreeMap<NodeId, Pose> = BTreeMap::new();
    let mut order = Vec::with_capacity(graph.num_nodes());
    let mut queue = VecDeque::new();

    poses.insert(root, Pose::identity());
    order.push(root);
    queue.push_back(root);

    let mut expansions = 0usize;
    while let Some(node) = queue.pop_front() {
        expansions += 1;
        debug_assert!(expansions <= graph.num_nodes());
        let known = poses[&node];

        for edge in graph.incident(node) {
            let next = edge.other(node);
            if poses.contains_key(&next) {
                continue;
            }
            let derived = match next {
                NodeId::Camera(_) => known.compose(&edge.cam_from_marker.inverse()),
                NodeId::Marker(_) => known.compose(&edge.cam_from_marker),
            };
            debug!(
                "{next} calibrated from {node} via detection {}",
                edge.detection
            );
            poses.insert(next, derived);
            order.push(next);
            queue.push_back(next);
        }
    }

    let unreachable: Vec<NodeId> = graph.nodes().filter(|n| !poses.contains_key(n)).collect();
    if !unreachable.is_empty() {
        return Err(InitError::DisconnectedGraph { unreachable });
    }

    let mut cameras = BTreeMap::new();
    let mut markers = BTreeMap::new();
    for (node, pose) in poses {
        match node {
            NodeId::Camera(id) => {
                cameras.insert(id, pose);
            }
            NodeId::Marker(id) => {
                markers.insert(id, pose);
            }
        }
    }

    info!(
        "propagated poses for {} cameras and {} markers",
        cameras.len(),
        markers.len()
    );

    Ok(PropagatedPoses {
        reference: graph.reference(),
        cameras,
        markers,
        order,
    })
}
