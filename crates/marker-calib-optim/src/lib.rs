//! Non-linear refinement of camera and marker poses.
//!
//! The crate is built around the [`NllsProblem`] trait: a problem exposes a
//! dense residual vector and its Jacobian, and a [`NllsSolverBackend`] (here
//! [`LmBackend`], a Levenberg-Marquardt solver) drives it to a minimum.
//!
//! [`MarkerBundleProblem`] is the reprojection cost over every detected
//! marker corner. Its parameters are laid out by [`ParamLayout`]: one
//! `[rx, ry, rz, tx, ty, tz]` block per camera, then one per non-reference
//! marker. The reference marker is fixed at the identity and never appears in
//! the parameter vector.

mod backend_lm;
mod jacobian_ad;
mod layout;
pub mod math;
pub mod problems;
mod robust;
mod traits;

pub use backend_lm::LmBackend;
pub use layout::*;
pub use problems::marker_bundle::*;
pub use robust::RobustKernel;
pub use traits::*;
