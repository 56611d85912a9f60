//! Camera/marker observation graph.
//!
//! Nodes are cameras and markers; an edge `(camera, marker)` exists once per
//! detection of that marker by that camera and carries the detection's
//! `cam_from_marker` estimate. Parallel edges (one per image) are kept.

use log::debug;
use marker_calib_core::{CameraId, Detection, MarkerId, Pose};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::InitError;

/// Node of the observation graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum NodeId {
    Camera(CameraId),
    Marker(MarkerId),
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeId::Camera(id) => id.fmt(f),
            NodeId::Marker(id) => id.fmt(f),
        }
    }
}

/// A single "camera saw marker" observation.
#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub camera: CameraId,
    pub marker: MarkerId,
    /// Index of the originating detection.
    pub detection: usize,
    pub cam_from_marker: Pose,
}

impl Edge {
    /// The endpoint opposite to `node`.
    pub fn other(&self, node: NodeId) -> NodeId {
        match node {
            NodeId::Camera(_) => NodeId::Marker(self.marker),
            NodeId::Marker(_) => NodeId::Camera(self.camera),
        }
    }
}

/// Undirected bipartite graph over cameras and markers.
#[derive(Debug, Clone)]
pub struct ObservationGraph {
    reference: MarkerId,
    nodes: BTreeSet<NodeId>,
    edges: Vec<Edge>,
    adjacency: BTreeMap<NodeId, Vec<usize>>,
}

impl ObservationGraph {
    /// Build the graph from the camera list and all detections.
    ///
    /// Markers are the ones that appear in at least one detection. Cameras
    /// without detections stay in the graph as isolated nodes.
    pub fn build(
        cameras: &[CameraId],
        detections: &[Detection],
        reference: MarkerId,
    ) -> Result<Self, InitError> {
        if detections.is_empty() {
            return Err(InitError::NoDetections);
        }

        let mut nodes = BTreeSet::new();
        for &camera in cameras {
            if !nodes.insert(NodeId::Camera(camera)) {
                return Err(InitError::DuplicateCamera(camera));
            }
        }

        let mut edges = Vec::with_capacity(detections.len());
        let mut adjacency: BTreeMap<NodeId, Vec<usize>> = BTreeMap::new();
        for (index, det) in detections.iter().enumerate() {
            let cam_node = NodeId::Camera(det.camera);
            if !nodes.contains(&cam_node) {
                return Err(InitError::UnknownCamera {
                    index,
                    camera: det.camera,
                });
            }
            let marker_node = NodeId::Marker(det.marker);
            nodes.insert(marker_node);

            let edge_idx = edges.len();
            edges.push(Edge {
                camera: det.camera,
                marker: det.marker,
                detection: index,
                cam_from_marker: det.cam_from_marker,
            });
            adjacency.entry(cam_node).or_default().push(edge_idx);
            adjacency.entry(marker_node).or_default().push(edge_idx);
        }

        if !nodes.contains(&NodeId::Marker(reference)) {
            return Err(InitError::ReferenceMarkerNotObserved(reference));
        }

        debug!(
            "observation graph: {} nodes, {} edges",
            nodes.len(),
            edges.len()
        );

        Ok(Self {
            reference,
            nodes,
            edges,
            adjacency,
        })
    }

    pub fn reference(&self) -> MarkerId {
        self.reference
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.nodes.contains(&node)
    }

    /// All nodes, cameras first, each group in ascending id order.
    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.iter().copied()
    }

    pub fn cameras(&self) -> impl Iterator<Item = CameraId> + '_ {
        self.nodes.iter().filter_map(|n| match n {
            NodeId::Camera(id) => Some(*id),
            NodeId::Marker(_) => None,
        })
    }

    pub fn markers(&self) -> impl Iterator<Item = MarkerId> + '_ {
        self.nodes.iter().filter_map(|n| match n {
            NodeId::Marker(id) => Some(*id),
            NodeId::Camera(_) => None,
        })
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Edges incident to `node`, in detection order.
    pub fn incident(&self, node: NodeId) -> impl Iterator<Item = &Edge> + '_ {
        self.adjacency
            .get(&node)
            .into_iter()
            .flatten()
            .map(move |&idx| &self.edges[idx])
    }

    /// Distinct neighbours of `node`.
    pub fn neighbors(&self, node: NodeId) -> BTreeSet<NodeId> {
        self.incident(node).map(|e| e.other(node)).collect()
    }
}
