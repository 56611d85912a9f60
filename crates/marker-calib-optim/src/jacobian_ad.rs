//! Per-observation Jacobian assembly using `num-dual`.
//!
//! Each observation depends only on its camera block and its marker block, so
//! autodiff runs on a local vector of `2 * POSE_DIM` parameters and the result
//! is scattered into the global matrix. The reference marker has no block:
//! its local half is held at zero (the identity) and never scattered.
//!
//! Robust IRLS weights are handled elsewhere and are never differentiated.

use crate::problems::marker_bundle::{
    term_residuals, MarkerBundleProblem, TermBlocks, LOCAL_DIM, TERM_RESIDUALS,
};
use crate::NllsProblem;
use marker_calib_core::POSE_DIM;
use nalgebra::{DMatrix, DVector, SMatrix, SVector};
use num_dual::{jacobian, DualSVec64};

fn scatter_jacobian(
    j_global: &mut DMatrix<f64>,
    j_term: &SMatrix<f64, TERM_RESIDUALS, LOCAL_DIM>,
    row_offset: usize,
    blocks: TermBlocks,
) {
    j_global
        .view_mut((row_offset, blocks.camera), (TERM_RESIDUALS, POSE_DIM))
        .copy_from(&j_term.fixed_view::<TERM_RESIDUALS, POSE_DIM>(0, 0));
    if let Some(marker) = blocks.marker {
        j_global
            .view_mut((row_offset, marker), (TERM_RESIDUALS, POSE_DIM))
            .copy_from(&j_term.fixed_view::<TERM_RESIDUALS, POSE_DIM>(0, POSE_DIM));
    }
}

/// Global unweighted Jacobian of the marker bundle residuals.
pub(crate) fn jacobian_unweighted_ad(
    problem: &MarkerBundleProblem,
    x: &DVector<f64>,
) -> DMatrix<f64> {
    debug_assert_eq!(x.len(), problem.num_params());
    let mut j_global = DMatrix::zeros(problem.num_residuals(), x.len());
    let penalty = problem.depth_penalty();

    for (idx, (term, blocks)) in problem
        .terms()
        .iter()
        .zip(problem.term_blocks())
        .enumerate()
    {
        let p0_local = problem.local_params(x, *blocks);
        let (_, j_term) = jacobian(
            |p: SVector<DualSVec64<LOCAL_DIM>, LOCAL_DIM>| {
                let (cam, marker) = p.as_slice().split_at(POSE_DIM);
                term_residuals(cam, marker, term, penalty).0
            },
            p0_local,
        );
        scatter_jacobian(&mut j_global, &j_term, idx * TERM_RESIDUALS, *blocks);
    }

    j_global
}
