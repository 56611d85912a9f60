use anyhow::Result;
use marker_calib_core::synthetic::{DetectionNoise, SyntheticScene};
use marker_calib_core::{CameraId, MarkerId, Pose};
use marker_calib_init::{propagate_poses, InitError, NodeId, ObservationGraph};

fn camera_ids(scene: &SyntheticScene) -> Vec<CameraId> {
    scene.cameras.iter().map(|c| c.id).collect()
}

#[test]
fn exact_detections_reproduce_ground_truth() -> Result<()> {
    let scene = SyntheticScene::overhead_row(3, 4, 0.1);
    let dets = scene.visible_detections();
    let graph = ObservationGraph::build(&camera_ids(&scene), &dets, scene.reference)?;
    let poses = propagate_poses(&graph)?;

    assert_eq!(poses.cameras.len(), scene.cameras.len());
    assert_eq!(poses.markers.len(), scene.markers.len());
    assert_eq!(poses.markers[&scene.reference], Pose::identity());

    for cam in &scene.cameras {
        let (dt, ang) = poses.cameras[&cam.id].error_to(&cam.pose.unwrap());
        assert!(dt < 1e-9 && ang < 1e-9, "{}: dt={dt}, angle={ang}", cam.id);
    }
    for marker in &scene.markers {
        let (dt, ang) = poses.markers[&marker.id].error_to(&marker.pose.unwrap());
        assert!(dt < 1e-9 && ang < 1e-9, "{}: dt={dt}, angle={ang}", marker.id);
    }
    Ok(())
}

#[test]
fn noisy_relative_poses_give_a_nearby_guess() -> Result<()> {
    let scene = SyntheticScene::overhead_row(3, 4, 0.1);
    let noise = DetectionNoise {
        seed: 11,
        pixel_max_abs: 0.0,
        rotation_max_abs: 0.01,
        translation_max_abs: 0.005,
    };
    let dets = noise.apply_all(&scene.visible_detections());
    let graph = ObservationGraph::build(&camera_ids(&scene), &dets, scene.reference)?;
    let poses = propagate_poses(&graph)?;

    // Errors accumulate along the chain but stay small for short chains.
    for cam in &scene.cameras {
        let (dt, ang) = poses.cameras[&cam.id].error_to(&cam.pose.unwrap());
        assert!(dt < 0.1 && ang < 0.1, "{}: dt={dt}, angle={ang}", cam.id);
    }
    assert_eq!(poses.markers[&scene.reference], Pose::identity());
    Ok(())
}

#[test]
fn marker_seen_only_by_an_unconnected_camera_is_reported() -> Result<()> {
    let scene = SyntheticScene::overhead_row(3, 4, 0.1);
    let dets = scene.detections(&[
        (CameraId(0), MarkerId(0)),
        (CameraId(0), MarkerId(1)),
        (CameraId(1), MarkerId(1)),
        (CameraId(2), MarkerId(3)),
    ])?;
    let graph = ObservationGraph::build(&camera_ids(&scene), &dets, scene.reference)?;
    let err = propagate_poses(&graph).unwrap_err();
    assert_eq!(
        err,
        InitError::DisconnectedGraph {
            unreachable: vec![NodeId::Camera(CameraId(2)), NodeId::Marker(MarkerId(3))]
        }
    );
    Ok(())
}
