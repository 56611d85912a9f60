use log::{info, warn};
use marker_calib_core::CameraId;
use marker_calib_init::{propagate_poses, ObservationGraph};
use marker_calib_optim::{
    observation_terms, optimize_marker_bundle, BundlePoses, MarkerBundleProblem, ParamLayout,
};

use crate::{
    CameraReport, MarkerCalibConfig, MarkerCalibInput, MarkerCalibReport, MarkerReport,
    PipelineError, PoseReport,
};

/// Run the full pipeline: graph, propagation, bundle refinement, report.
///
/// Structural problems (bad input, disconnected graph) abort before any
/// optimization. A solver that stops without converging still yields a
/// report; inspect [`MarkerCalibReport::status`].
pub fn run_marker_calibration(
    input: &MarkerCalibInput,
    config: &MarkerCalibConfig,
) -> Result<MarkerCalibReport, PipelineError> {
    input.validate()?;
    config.validate()?;

    let cameras = input.to_cameras()?;
    let detections = input.to_detections();
    let camera_ids: Vec<CameraId> = cameras.iter().map(|c| c.id).collect();

    let graph = ObservationGraph::build(&camera_ids, &detections, input.reference_marker)?;
    let initial = BundlePoses::from(propagate_poses(&graph)?);

    let terms = observation_terms(&cameras, &detections, input.marker_size)
        .map_err(PipelineError::Optim)?;
    let problem = MarkerBundleProblem::new(
        ParamLayout::from_graph(&graph),
        terms,
        config.robust_kernel,
        config.depth_penalty,
    )
    .map_err(PipelineError::Optim)?
    .with_invalid_depth_warn_after(config.invalid_depth_warn_after);

    let x0 = problem
        .layout()
        .pack(&initial)
        .map_err(PipelineError::Optim)?;
    let before = problem.reprojection_stats(&x0);
    info!(
        "initial reprojection RMS {:.4} px over {} corners",
        before.rms, before.corners
    );

    let result = optimize_marker_bundle(&problem, &initial, &config.solver)
        .map_err(PipelineError::Optim)?;
    let after = problem.reprojection_stats(&result.params);
    info!(
        "final reprojection RMS {:.4} px (max {:.4} px)",
        after.rms, after.max
    );
    if !result.report.converged() {
        warn!(
            "solver stopped with status {:?}; poses are the best estimate found",
            result.report.status
        );
    }

    let cameras = result
        .poses
        .cameras
        .iter()
        .map(|(id, pose)| CameraReport {
            id: *id,
            pose: PoseReport::from(pose),
            rms: after.per_camera_rms.get(id).copied(),
        })
        .collect();
    let markers = result
        .poses
        .markers
        .iter()
        .map(|(id, pose)| MarkerReport {
            id: *id,
            pose: PoseReport::from(pose),
            reference: *id == input.reference_marker,
        })
        .collect();

    Ok(MarkerCalibReport {
        cameras,
        markers,
        solver: result.report,
        initial_rms: before.rms,
        final_rms: after.rms,
        final_max_error: after.max,
        invalid_corners: after.invalid_corners,
    })
}
