//! Camera calibration for a two-camera rig.
//!
//! - [`calibrate_camera`]: Zhang-style single camera calibration from planar
//!   pattern views, refined by Levenberg-Marquardt over intrinsics,
//!   distortion and per-view poses.
//! - [`stereo_calibrate`]: relative pose of the right camera with respect to
//!   the left, optionally re-solving both cameras jointly.
//! - [`stereo_rectify`] and [`RectifyMap`]: closed-form Bouguet
//!   rectification and the remap that applies it.
//! - [`StereoRig`]: the immutable result bundle, persisted as a
//!   [`CalibrationRecord`].
//!
//! ```no_run
//! use stereo_recon_calib::{stereo_calibrate, StereoCalibrationParams, StereoRig, DEFAULT_ALPHA};
//! # fn demo(
//! #     left: Vec<stereo_recon_core::CornerSet>,
//! #     right: Vec<stereo_recon_core::CornerSet>,
//! #     pattern: stereo_recon_core::PatternSpec,
//! # ) -> Result<(), Box<dyn std::error::Error>> {
//! let objects = vec![pattern.object_points(); left.len()];
//! let size = stereo_recon_core::ImageSize::new(640, 480);
//! let cal = stereo_calibrate(&left, &right, &objects, size, &StereoCalibrationParams::default())?;
//! let rig = StereoRig::from_calibration(&cal, DEFAULT_ALPHA)?;
//! rig.save("stereo_calibration.json")?;
//! # Ok(())
//! # }
//! ```

mod bundle;
mod error;
mod init;
mod lm;
mod mono;
mod record;
mod rectify;
mod rig;
mod stereo;

pub use error::{CalibrationError, RecordError, RectifyError};
pub use lm::{SolveReport, TermCriteria};
pub use mono::{calibrate_camera, MonoCalibration, MonoCalibrationParams};
pub use record::{CalibrationRecord, Mat34Rows, Mat3Rows, Mat4Rows, MonoCalibrationRecord};
pub use rectify::{stereo_rectify, Rectification, RectifyMap, Roi, DEFAULT_ALPHA};
pub use rig::{CalibrationSource, StereoRig};
pub use stereo::{
    essential_matrix, fundamental_matrix, stereo_calibrate, IntrinsicsMode, StereoCalibration,
    StereoCalibrationParams,
};
