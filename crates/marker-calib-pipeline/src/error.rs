use marker_calib_core::{CameraId, ModelError};
use marker_calib_init::InitError;
use thiserror::Error;

/// Errors raised by [`crate::run_marker_calibration`].
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The input is structurally invalid.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// The configuration holds an unusable value.
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    /// A camera's intrinsic matrix could not be read.
    #[error("{camera}: {source}")]
    Camera {
        camera: CameraId,
        #[source]
        source: ModelError,
    },
    /// The observation graph could not seed every pose.
    #[error(transparent)]
    Init(#[from] InitError),
    /// Building or solving the refinement problem failed.
    #[error("optimization failed: {0:#}")]
    Optim(anyhow::Error),
}
