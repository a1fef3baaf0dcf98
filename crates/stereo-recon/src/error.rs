use stereo_recon_calib::{CalibrationError, RecordError, RectifyError};
use stereo_recon_chessboard::ChessboardError;
use stereo_recon_cloud::CloudError;
use stereo_recon_core::{CoreError, ImageSize, JsonIoError};
use stereo_recon_disparity::DisparityError;

/// Errors of the end-to-end pipeline.
#[derive(thiserror::Error, Debug)]
pub enum ReconstructError {
    #[error("no calibration source given; pass a calibration record or calibrate first")]
    NoCalibration,

    #[error("only {usable} usable stereo pairs (need at least {required})")]
    NotEnoughPairs { usable: usize, required: usize },

    #[error("input is {got:?}, calibration expects {expected:?}")]
    ImageSizeMismatch { got: ImageSize, expected: ImageSize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Chessboard(#[from] ChessboardError),

    #[error(transparent)]
    Calibration(#[from] CalibrationError),

    #[error(transparent)]
    Rectify(#[from] RectifyError),

    #[error(transparent)]
    Record(#[from] RecordError),

    #[error(transparent)]
    Disparity(#[from] DisparityError),

    #[error(transparent)]
    Cloud(#[from] CloudError),

    #[error(transparent)]
    Json(#[from] JsonIoError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[cfg(feature = "image")]
    #[error(transparent)]
    Image(#[from] image::ImageError),
}
