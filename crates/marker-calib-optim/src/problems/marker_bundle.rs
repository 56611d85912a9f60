//! Joint refinement of camera and marker poses from marker-corner detections.
//!
//! Every detection contributes one [`ObservationTerm`]: the four local marker
//! corners are mapped through `world_from_marker`, then into the observing
//! camera through `inverse(world_from_cam)`, distorted and projected. The
//! residual is the projected pixel minus the detected pixel, ordered
//! `[u0, v0, u1, v1, u2, v2, u3, v3]`.
//!
//! A corner that lands on or behind the camera plane yields the constant
//! `depth_penalty` on both of its rows, with zero derivative, so the solver is
//! steered away without producing NaNs.

use crate::jacobian_ad::jacobian_unweighted_ad;
use crate::math::projection::{lit, local_to_camera, project_camera_point};
use crate::{
    BundlePoses, LmBackend, NllsProblem, NllsSolverBackend, ParamLayout, RobustKernel,
    SolveOptions, SolveReport, SolveStatus,
};
use anyhow::{anyhow, ensure, Result};
use log::{info, warn};
use marker_calib_core::{
    marker_corners, Camera, CameraId, Detection, MarkerId, PinholeCamera, Pt3, Real, Vec2,
    MARKER_CORNERS, POSE_DIM,
};
use marker_calib_init::NodeId;
use nalgebra::{DMatrix, DVector, RealField, SVector};
use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::collections::BTreeMap;

/// Residual rows contributed by one observation.
pub const TERM_RESIDUALS: usize = 2 * MARKER_CORNERS;
/// Local parameters of one observation: camera block then marker block.
pub(crate) const LOCAL_DIM: usize = 2 * POSE_DIM;

/// Default residual (pixels) for a corner with non-positive depth.
pub const DEFAULT_DEPTH_PENALTY: Real = 1e3;
/// Default number of consecutive evaluations with invalid depths before warning.
pub const DEFAULT_INVALID_DEPTH_WARN_AFTER: usize = 3;

/// One marker seen by one camera, with everything needed to reproject it.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationTerm {
    pub camera: CameraId,
    pub marker: MarkerId,
    pub model: PinholeCamera,
    /// Corner geometry in the marker frame.
    pub corners_local: [Pt3; MARKER_CORNERS],
    /// Detected corner pixels.
    pub corners_px: [Vec2; MARKER_CORNERS],
}

impl ObservationTerm {
    pub fn from_detection(det: &Detection, camera: &Camera, marker_size: Real) -> Result<Self> {
        ensure!(
            det.camera == camera.id,
            "detection of {} paired with {}",
            det.camera,
            camera.id
        );
        ensure!(
            marker_size.is_finite() && marker_size > 0.0,
            "marker size must be positive, got {marker_size}"
        );
        Ok(Self {
            camera: det.camera,
            marker: det.marker,
            model: camera.model,
            corners_local: marker_corners(marker_size),
            corners_px: det.corners,
        })
    }
}

/// Build one term per detection; all markers share `marker_size`.
pub fn observation_terms(
    cameras: &[Camera],
    detections: &[Detection],
    marker_size: Real,
) -> Result<Vec<ObservationTerm>> {
    detections
        .iter()
        .enumerate()
        .map(|(i, det)| {
            let camera = cameras
                .iter()
                .find(|c| c.id == det.camera)
                .ok_or_else(|| anyhow!("detection {i} references unknown {}", det.camera))?;
            ObservationTerm::from_detection(det, camera, marker_size)
        })
        .collect()
}

/// Residuals of one term for local parameters `[camera(6), marker(6)]`.
///
/// Returns the residual vector and the per-corner depth validity.
pub(crate) fn term_residuals<T: RealField>(
    cam: &[T],
    marker: &[T],
    term: &ObservationTerm,
    depth_penalty: Real,
) -> (SVector<T, TERM_RESIDUALS>, [bool; MARKER_CORNERS]) {
    let mut r = SVector::<T, TERM_RESIDUALS>::zeros();
    let mut valid = [true; MARKER_CORNERS];
    for (i, (p, uv)) in term
        .corners_local
        .iter()
        .zip(term.corners_px.iter())
        .enumerate()
    {
        let p_c = local_to_camera(cam, marker, p);
        match project_camera_point(&p_c, &term.model.intrinsics, &term.model.distortion) {
            Some(proj) => {
                r[2 * i] = proj.x.clone() - lit::<T>(uv.x);
                r[2 * i + 1] = proj.y.clone() - lit::<T>(uv.y);
            }
            None => {
                valid[i] = false;
                r[2 * i] = lit::<T>(depth_penalty);
                r[2 * i + 1] = lit::<T>(depth_penalty);
            }
        }
    }
    (r, valid)
}

/// Parameter offsets touched by one term.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TermBlocks {
    pub camera: usize,
    /// `None` for the reference marker.
    pub marker: Option<usize>,
}

/// Counts consecutive residual evaluations that hit invalid depths.
#[derive(Debug, Clone)]
struct InvalidDepthMonitor {
    warn_after: usize,
    streak: Cell<usize>,
    warned: Cell<bool>,
}

impl InvalidDepthMonitor {
    fn new(warn_after: usize) -> Self {
        Self {
            warn_after,
            streak: Cell::new(0),
            warned: Cell::new(false),
        }
    }

    fn record(&self, invalid: usize) {
        if invalid == 0 {
            self.streak.set(0);
            return;
        }
        let streak = self.streak.get() + 1;
        self.streak.set(streak);
        if streak >= self.warn_after.max(1) && !self.warned.get() {
            warn!(
                "{invalid} corners behind their camera for {streak} consecutive evaluations; \
                 check the initial poses or the detections"
            );
            self.warned.set(true);
        }
    }
}

/// Pixel reprojection statistics over corners with a valid depth.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReprojectionStats {
    /// RMS of the per-corner pixel distance.
    pub rms: Real,
    pub max: Real,
    pub per_camera_rms: BTreeMap<CameraId, Real>,
    pub corners: usize,
    pub invalid_corners: usize,
}

/// Reprojection cost over all observations.
#[derive(Debug, Clone)]
pub struct MarkerBundleProblem {
    layout: ParamLayout,
    terms: Vec<ObservationTerm>,
    blocks: Vec<TermBlocks>,
    kernel: RobustKernel,
    depth_penalty: Real,
    depth_monitor: InvalidDepthMonitor,
}

impl MarkerBundleProblem {
    /// Validate the terms against the layout and build the problem.
    pub fn new(
        layout: ParamLayout,
        terms: Vec<ObservationTerm>,
        kernel: RobustKernel,
        depth_penalty: Real,
    ) -> Result<Self> {
        ensure!(!terms.is_empty(), "need at least one observation");
        ensure!(layout.num_params() > 0, "parameter layout is empty");
        ensure!(kernel.is_valid(), "invalid robust kernel {kernel:?}");
        ensure!(
            depth_penalty.is_finite() && depth_penalty > 0.0,
            "depth penalty must be positive, got {depth_penalty}"
        );

        let mut blocks = Vec::with_capacity(terms.len());
        for (i, term) in terms.iter().enumerate() {
            let camera = layout
                .offset(NodeId::Camera(term.camera))
                .ok_or_else(|| anyhow!("term {i}: {} has no parameter block", term.camera))?;
            let marker_node = NodeId::Marker(term.marker);
            let marker = if layout.is_reference(marker_node) {
                None
            } else {
                let offset = layout
                    .offset(marker_node)
                    .ok_or_else(|| anyhow!("term {i}: {} has no parameter block", term.marker))?;
                Some(offset)
            };
            blocks.push(TermBlocks { camera, marker });
        }

        Ok(Self {
            layout,
            terms,
            blocks,
            kernel,
            depth_penalty,
            depth_monitor: InvalidDepthMonitor::new(DEFAULT_INVALID_DEPTH_WARN_AFTER),
        })
    }

    /// Warn once after `n` consecutive evaluations with invalid depths.
    pub fn with_invalid_depth_warn_after(mut self, n: usize) -> Self {
        self.depth_monitor = InvalidDepthMonitor::new(n);
        self
    }

    pub fn layout(&self) -> &ParamLayout {
        &self.layout
    }

    pub fn terms(&self) -> &[ObservationTerm] {
        &self.terms
    }

    pub fn kernel(&self) -> RobustKernel {
        self.kernel
    }

    pub fn depth_penalty(&self) -> Real {
        self.depth_penalty
    }

    /// Consecutive solver evaluations that contained an invalid depth.
    pub fn invalid_depth_streak(&self) -> usize {
        self.depth_monitor.streak.get()
    }

    pub(crate) fn term_blocks(&self) -> &[TermBlocks] {
        &self.blocks
    }

    /// Gather the local `[camera, marker]` parameters of one term.
    pub(crate) fn local_params(
        &self,
        x: &DVector<Real>,
        blocks: TermBlocks,
    ) -> SVector<Real, LOCAL_DIM> {
        let mut local = SVector::<Real, LOCAL_DIM>::zeros();
        for k in 0..POSE_DIM {
            local[k] = x[blocks.camera + k];
        }
        if let Some(m) = blocks.marker {
            for k in 0..POSE_DIM {
                local[POSE_DIM + k] = x[m + k];
            }
        }
        local
    }

    fn evaluate<F>(&self, x: &DVector<Real>, mut visit: F) -> DVector<Real>
    where
        F: FnMut(&ObservationTerm, &SVector<Real, TERM_RESIDUALS>, &[bool; MARKER_CORNERS]),
    {
        debug_assert_eq!(x.len(), self.num_params());
        let mut r = DVector::zeros(self.num_residuals());
        for (idx, (term, blocks)) in self.terms.iter().zip(self.blocks.iter()).enumerate() {
            let p = self.local_params(x, *blocks);
            let (cam, marker) = p.as_slice().split_at(POSE_DIM);
            let (r_term, valid) = term_residuals(cam, marker, term, self.depth_penalty);
            visit(term, &r_term, &valid);
            r.fixed_rows_mut::<TERM_RESIDUALS>(idx * TERM_RESIDUALS)
                .copy_from(&r_term);
        }
        r
    }

    /// Number of corners with non-positive depth at `x`.
    pub fn invalid_depth_count(&self, x: &DVector<Real>) -> usize {
        let mut invalid = 0;
        self.evaluate(x, |_, _, valid| {
            invalid += valid.iter().filter(|v| !**v).count();
        });
        invalid
    }

    /// Pixel error statistics at `x`; penalized corners are only counted.
    pub fn reprojection_stats(&self, x: &DVector<Real>) -> ReprojectionStats {
        let mut sum_sq = 0.0;
        let mut max: Real = 0.0;
        let mut corners = 0usize;
        let mut invalid_corners = 0usize;
        let mut per_camera: BTreeMap<CameraId, (Real, usize)> = BTreeMap::new();

        self.evaluate(x, |term, r, valid| {
            for (i, ok) in valid.iter().enumerate() {
                if !ok {
                    invalid_corners += 1;
                    continue;
                }
                let e2 = r[2 * i] * r[2 * i] + r[2 * i + 1] * r[2 * i + 1];
                sum_sq += e2;
                max = max.max(e2.sqrt());
                corners += 1;
                let entry = per_camera.entry(term.camera).or_insert((0.0, 0));
                entry.0 += e2;
                entry.1 += 1;
            }
        });

        let rms_of = |s: Real, n: usize| if n > 0 { (s / n as Real).sqrt() } else { 0.0 };
        ReprojectionStats {
            rms: rms_of(sum_sq, corners),
            max,
            per_camera_rms: per_camera
                .into_iter()
                .map(|(cam, (s, n))| (cam, rms_of(s, n)))
                .collect(),
            corners,
            invalid_corners,
        }
    }
}

impl NllsProblem for MarkerBundleProblem {
    fn num_params(&self) -> usize {
        self.layout.num_params()
    }

    fn num_residuals(&self) -> usize {
        self.terms.len() * TERM_RESIDUALS
    }

    fn residuals_unweighted(&self, x: &DVector<Real>) -> DVector<Real> {
        self.evaluate(x, |_, _, _| {})
    }

    fn jacobian_unweighted(&self, x: &DVector<Real>) -> DMatrix<Real> {
        jacobian_unweighted_ad(self, x)
    }

    fn robust_row_scales(&self, r: &DVector<Real>) -> DVector<Real> {
        let mut scales = DVector::from_element(r.len(), 1.0);
        if self.kernel == RobustKernel::None {
            return scales;
        }
        for c in 0..r.len() / 2 {
            let r2 = r[2 * c] * r[2 * c] + r[2 * c + 1] * r[2 * c + 1];
            let s = self.kernel.row_scale(r2);
            scales[2 * c] = s;
            scales[2 * c + 1] = s;
        }
        scales
    }

    /// Weighted residuals; also feeds the invalid-depth monitor.
    fn residuals(&self, x: &DVector<Real>) -> DVector<Real> {
        let mut invalid = 0;
        let mut r = self.evaluate(x, |_, _, valid| {
            invalid += valid.iter().filter(|v| !**v).count();
        });
        self.depth_monitor.record(invalid);
        let scales = self.robust_row_scales(&r);
        r.component_mul_assign(&scales);
        r
    }
}

/// Refined poses and solver diagnostics.
#[derive(Debug, Clone)]
pub struct MarkerBundleResult {
    pub poses: BundlePoses,
    /// Final parameter vector in [`ParamLayout`] order.
    pub params: DVector<Real>,
    pub report: SolveReport,
}

/// Refine `initial` poses by minimizing the reprojection cost with LM.
///
/// Corners left behind their camera at the returned poses turn the status
/// into [`SolveStatus::InvalidDepth`], whatever LM reported.
pub fn optimize_marker_bundle(
    problem: &MarkerBundleProblem,
    initial: &BundlePoses,
    options: &SolveOptions,
) -> Result<MarkerBundleResult> {
    options.validate()?;
    let x0 = problem.layout().pack(initial)?;
    info!(
        "marker bundle: {} observations, {} parameters, {} residuals",
        problem.terms().len(),
        problem.num_params(),
        problem.num_residuals()
    );

    let (params, mut report) = LmBackend.solve(problem, x0, options);
    let invalid = problem.invalid_depth_count(&params);
    if invalid > 0 {
        warn!(
            "marker bundle: {invalid} corners still behind their camera after refinement \
             (solver reported {:?})",
            report.status
        );
        report.status = SolveStatus::InvalidDepth;
    }
    info!(
        "marker bundle: cost {:.6e} -> {:.6e} after {} evaluations ({:?})",
        report.initial_cost, report.final_cost, report.evaluations, report.status
    );

    let poses = problem.layout().unpack(&params)?;
    Ok(MarkerBundleResult {
        poses,
        params,
        report,
    })
}
