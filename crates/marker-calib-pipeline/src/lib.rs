//! End-to-end multi-camera fiducial marker calibration.
//!
//! [`run_marker_calibration`] takes cameras with known intrinsics and a list of
//! marker detections, bootstraps every pose by propagation through the
//! observation graph, refines them jointly with Levenberg-Marquardt, and
//! returns a serializable [`MarkerCalibReport`].
//!
//! ```no_run
//! use marker_calib_pipeline::{run_marker_calibration, MarkerCalibConfig, MarkerCalibInput};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! # let input: MarkerCalibInput = unimplemented!();
//! let report = run_marker_calibration(&input, &MarkerCalibConfig::default())?;
//! println!("final RMS: {:.3} px", report.final_rms);
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod input;
mod report;
mod run;

pub use config::*;
pub use error::*;
pub use input::*;
pub use report::*;
pub use run::*;
