//! Calibration problems built on [`crate::NllsProblem`].

pub mod marker_bundle;
