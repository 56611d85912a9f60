//! Math shared by the residual functions.

pub mod projection;
