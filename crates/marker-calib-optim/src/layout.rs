//! Parameter vector layout.
//!
//! The vector holds one [`POSE_DIM`] block per free node: every camera in
//! ascending id order, then every marker except the reference in ascending id
//! order. The map is built once and shared by the code that packs the initial
//! guess and the cost function that decodes it.

use anyhow::{anyhow, ensure, Result};
use marker_calib_core::{CameraId, MarkerId, Pose, Real, POSE_DIM};
use marker_calib_init::{NodeId, ObservationGraph, PropagatedPoses};
use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Global poses of every camera and marker.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BundlePoses {
    /// `world_from_cam` per camera.
    pub cameras: BTreeMap<CameraId, Pose>,
    /// `world_from_marker` per marker, the reference included.
    pub markers: BTreeMap<MarkerId, Pose>,
}

impl From<&PropagatedPoses> for BundlePoses {
    fn from(p: &PropagatedPoses) -> Self {
        Self {
            cameras: p.cameras.clone(),
            markers: p.markers.clone(),
        }
    }
}

impl From<PropagatedPoses> for BundlePoses {
    fn from(p: PropagatedPoses) -> Self {
        Self {
            cameras: p.cameras,
            markers: p.markers,
        }
    }
}

/// Bidirectional map between free nodes and parameter offsets.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamLayout {
    reference: MarkerId,
    blocks: Vec<NodeId>,
    offsets: BTreeMap<NodeId, usize>,
}

impl ParamLayout {
    /// Layout over the given cameras and markers; the reference is skipped
    /// and duplicates are ignored.
    pub fn new(
        cameras: impl IntoIterator<Item = CameraId>,
        markers: impl IntoIterator<Item = MarkerId>,
        reference: MarkerId,
    ) -> Self {
        let mut nodes: BTreeSet<NodeId> = cameras.into_iter().map(NodeId::Camera).collect();
        nodes.extend(
            markers
                .into_iter()
                .filter(|m| *m != reference)
                .map(NodeId::Marker),
        );
        // `NodeId` orders cameras before markers.
        let blocks: Vec<NodeId> = nodes.into_iter().collect();
        let offsets = blocks
            .iter()
            .enumerate()
            .map(|(i, node)| (*node, i * POSE_DIM))
            .collect();
        Self {
            reference,
            blocks,
            offsets,
        }
    }

    /// Layout over every node of an observation graph.
    pub fn from_graph(graph: &ObservationGraph) -> Self {
        Self::new(graph.cameras(), graph.markers(), graph.reference())
    }

    pub fn reference(&self) -> MarkerId {
        self.reference
    }

    pub fn num_params(&self) -> usize {
        self.blocks.len() * POSE_DIM
    }

    /// Free nodes in parameter order.
    pub fn blocks(&self) -> &[NodeId] {
        &self.blocks
    }

    /// Offset of `node`'s block, `None` for the reference marker or an
    /// unknown node.
    pub fn offset(&self, node: NodeId) -> Option<usize> {
        self.offsets.get(&node).copied()
    }

    pub fn is_reference(&self, node: NodeId) -> bool {
        node == NodeId::Marker(self.reference)
    }

    /// Build the parameter vector from global poses.
    pub fn pack(&self, poses: &BundlePoses) -> Result<DVector<Real>> {
        let mut x = DVector::zeros(self.num_params());
        for (block, node) in self.blocks.iter().enumerate() {
            let pose = match node {
                NodeId::Camera(id) => poses.cameras.get(id),
                NodeId::Marker(id) => poses.markers.get(id),
            }
            .ok_or_else(|| anyhow!("no initial pose for {node}"))?;
            x.fixed_rows_mut::<POSE_DIM>(block * POSE_DIM)
                .copy_from_slice(&pose.to_array());
        }
        Ok(x)
    }

    /// Pose of `node` encoded in `x`; the reference decodes to the identity.
    pub fn pose(&self, x: &DVector<Real>, node: NodeId) -> Option<Pose> {
        if self.is_reference(node) {
            return Some(Pose::identity());
        }
        let offset = self.offset(node)?;
        x.as_slice()
            .get(offset..offset + POSE_DIM)
            .and_then(|v| Pose::from_slice(v).ok())
    }

    /// Decode every pose in `x`, the reference marker included.
    pub fn unpack(&self, x: &DVector<Real>) -> Result<BundlePoses> {
        ensure!(
            x.len() == self.num_params(),
            "parameter vector has length {}, layout expects {}",
            x.len(),
            self.num_params()
        );
        let mut out = BundlePoses::default();
        out.markers.insert(self.reference, Pose::identity());
        for (block, node) in self.blocks.iter().enumerate() {
            let start = block * POSE_DIM;
            let pose = Pose::from_slice(&x.as_slice()[start..start + POSE_DIM])?;
            match node {
                NodeId::Camera(id) => out.cameras.insert(*id, pose),
                NodeId::Marker(id) => out.markers.insert(*id, pose),
            };
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use marker_calib_core::Vec3;

    fn layout() -> ParamLayout {
        ParamLayout::new(
            [CameraId(2), CameraId(0)],
            [MarkerId(5), MarkerId(1), MarkerId(3), MarkerId(5)],
            MarkerId(3),
        )
    }

    #[test]
    fn cameras_first_then_markers_without_reference() {
        let l = layout();
        assert_eq!(l.num_params(), 4 * POSE_DIM);
        assert_eq!(
            l.blocks(),
            &[
                NodeId::Camera(CameraId(0)),
                NodeId::Camera(CameraId(2)),
                NodeId::Marker(MarkerId(1)),
                NodeId::Marker(MarkerId(5)),
            ]
        );
        assert_eq!(l.offset(NodeId::Camera(CameraId(2))), Some(6));
        assert_eq!(l.offset(NodeId::Marker(MarkerId(5))), Some(18));
        assert_eq!(l.offset(NodeId::Marker(MarkerId(3))), None);
        assert!(l.is_reference(NodeId::Marker(MarkerId(3))));
        assert!(!l.is_reference(NodeId::Marker(MarkerId(1))));
    }

    #[test]
    fn pack_then_unpack_restores_poses() {
        let l = layout();
        let mut poses = BundlePoses::default();
        for (k, id) in [0u32, 2].into_iter().enumerate() {
            let k = k as Real;
            poses.cameras.insert(
                CameraId(id),
                Pose::from_components(Vec3::new(k, 0.5, 1.0), Vec3::new(0.1 * k, 0.2, 3.0)),
            );
        }
        for id in [1u32, 5] {
            let k = id as Real;
            poses.markers.insert(
                MarkerId(id),
                Pose::from_components(Vec3::new(0.3 * k, 0.0, 0.0), Vec3::new(0.0, 0.0, 0.1 * k)),
            );
        }
        let x = l.pack(&poses).unwrap();
        assert_eq!(x[6 + 3], 1.0);

        let back = l.unpack(&x).unwrap();
        assert_eq!(back.cameras, poses.cameras);
        assert_eq!(back.markers[&MarkerId(3)], Pose::identity());
        assert_eq!(back.markers[&MarkerId(5)], poses.markers[&MarkerId(5)]);
        assert_eq!(
            l.pose(&x, NodeId::Marker(MarkerId(1))),
            Some(poses.markers[&MarkerId(1)])
        );
    }

    #[test]
    fn pack_reports_missing_pose() {
        let l = layout();
        let err = l.pack(&BundlePoses::default()).unwrap_err();
        assert!(err.to_string().contains("camera 0"), "{err}");
        assert!(l.unpack(&DVector::zeros(3)).is_err());
    }
}
