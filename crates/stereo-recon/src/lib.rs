//! Stereo 3D reconstruction.
//!
//! This crate ties the workspace together:
//! - re-exports of the stage crates (`core`, `chessboard`, `calib`,
//!   `disparity`, `cloud`);
//! - [`calibrate_stereo`]: checkerboard detection on image pairs followed by
//!   stereo calibration and rectification, or loading a trusted record;
//! - [`reconstruct`]: rectify a pair, match it and reproject to a point cloud;
//! - JSON configuration ([`CalibrateConfig`], [`ReconstructConfig`]);
//! - (feature `image`) decoding inputs and writing PNG/PLY artifacts.
//!
//! ## Quickstart
//!
//! ```no_run
//! use stereo_recon::calib::StereoRig;
//! use stereo_recon::{io, reconstruct, write_outputs, ReconstructConfig};
//!
//! # fn main() -> Result<(), stereo_recon::ReconstructError> {
//! let rig = StereoRig::load("calibration.json")?;
//! let left = io::load_image("left.png")?;
//! let right = io::load_image("right.png")?;
//! let config = ReconstructConfig::default();
//! let result = reconstruct(&rig, &left, &right, &config)?;
//! write_outputs(&result, "out", &config.outputs, &config.cloud)?;
//! # Ok(())
//! # }
//! ```

pub use stereo_recon_calib as calib;
pub use stereo_recon_chessboard as chessboard;
pub use stereo_recon_cloud as cloud;
pub use stereo_recon_core as core;
pub use stereo_recon_disparity as disparity;

mod config;
mod error;
mod pipeline;
mod resize;

#[cfg(feature = "image")]
pub mod io;

pub use config::{
    load_json, write_json, CalibrateConfig, ReconstructConfig, ReconstructOutputs, ResizeSpec,
};
pub use error::ReconstructError;
pub use pipeline::{
    calibrate_stereo, reconstruct, rig_from_source, CalibrationOutcome, Reconstruction,
};
pub use resize::resize_image;

#[cfg(feature = "image")]
pub use io::write_outputs;
