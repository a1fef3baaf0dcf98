//! Core types and utilities for stereo reconstruction.
//!
//! This crate is intentionally small and purely geometric. It holds the
//! lightweight image buffers, the pinhole + Brown-Conrady camera model,
//! calibration pattern geometry and homography estimation shared by the
//! calibration crate. It does *not* depend on any image codec.

mod camera;
mod error;
mod homography;
mod image;
mod io;
mod logger;
mod pattern;
mod pose;

pub use camera::{CameraModel, Distortion, DistortionModel, Intrinsics};
pub use error::CoreError;
pub use homography::{estimate_homography, Homography};
pub use image::{
    resize_bilinear, sample_bilinear, sample_bilinear_rgb, GrayImage, GrayImageView, Image,
    ImageSize, RgbImage,
};
pub use io::{read_json, write_atomic, write_json, JsonIoError};
pub use pattern::{CornerSet, ObjectPoints, PatternSpec};
pub use pose::{skew, Pose};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::{init, init_with_level, LogConfig};
