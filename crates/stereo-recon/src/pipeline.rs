//! End-to-end stages: stereo calibration from image pairs and dense
//! reconstruction of one rectified pair.

use crate::resize::resize_image;
use crate::{CalibrateConfig, ReconstructConfig, ReconstructError};
use log::{info, warn};
use stereo_recon_calib::{
    stereo_calibrate, CalibrationSource, IntrinsicsMode, StereoCalibration, StereoRig,
};
use stereo_recon_chessboard::{detect_stereo_batch, ChessboardDetector, StereoBatchDetection};
use stereo_recon_cloud::{depth_visualization, reproject_to_3d, residual_visualization, PointCloud};
use stereo_recon_core::{CornerSet, Image, RgbImage};
use stereo_recon_disparity::DisparityMap;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Result of [`calibrate_stereo`].
#[derive(Debug, Clone)]
pub struct CalibrationOutcome {
    pub rig: StereoRig,
    pub detections: StereoBatchDetection,
    /// Present when the pose (and possibly intrinsics) were solved here.
    pub calibration: Option<StereoCalibration>,
}

/// Load the rig named by a source that needs no corner data.
pub fn rig_from_source(source: Option<&CalibrationSource>) -> Result<StereoRig, ReconstructError> {
    match source {
        None => Err(ReconstructError::NoCalibration),
        Some(CalibrationSource::TrustedRecord(path)) => {
            info!("using trusted calibration {}", path.display());
            Ok(StereoRig::load(path)?)
        }
        Some(_) => Err(ReconstructError::InvalidConfig(
            "calibration source needs corner detections; calibrate first".into(),
        )),
    }
}

/// Produce a rig from `source`.
///
/// A trusted record is loaded as is and the images are ignored. The other
/// sources detect the pattern on every pair and solve the calibration.
/// Without a source there is nothing to reconstruct with.
#[cfg_attr(feature = "tracing", instrument(level = "info", skip_all, fields(pairs = left.len())))]
pub fn calibrate_stereo(
    source: Option<&CalibrationSource>,
    left: &[Image],
    right: &[Image],
    config: &CalibrateConfig,
) -> Result<CalibrationOutcome, ReconstructError> {
    let source = source.ok_or(ReconstructError::NoCalibration)?;
    let intrinsics = match source {
        CalibrationSource::TrustedRecord(_) => {
            return Ok(CalibrationOutcome {
                rig: rig_from_source(Some(source))?,
                detections: StereoBatchDetection::default(),
                calibration: None,
            });
        }
        CalibrationSource::Solved => IntrinsicsMode::Solve,
        CalibrationSource::TrustedIntrinsics { left, right } => IntrinsicsMode::Fixed {
            left: left.clone(),
            right: right.clone(),
        },
    };

    let resize = config.resize.as_ref();
    let left: Vec<Image> = left
        .iter()
        .map(|img| resize_image(img, resize))
        .collect::<Result<_, _>>()?;
    let right: Vec<Image> = right
        .iter()
        .map(|img| resize_image(img, resize))
        .collect::<Result<_, _>>()?;
    let image_size = match left.first() {
        Some(img) => img.size(),
        None => return Err(stereo_recon_calib::CalibrationError::EmptyInput.into()),
    };
    if let Some(odd) = left.iter().chain(&right).find(|img| img.size() != image_size) {
        return Err(ReconstructError::ImageSizeMismatch {
            got: odd.size(),
            expected: image_size,
        });
    }

    let detector = ChessboardDetector::new(config.chessboard.clone())?;
    let detections = detect_stereo_batch(&detector, &left, &right)?;
    let usable = detections.usable.len();
    if usable < config.min_pairs.max(1) {
        return Err(ReconstructError::NotEnoughPairs {
            usable,
            required: config.min_pairs.max(1),
        });
    }

    let (left_corners, right_corners): (Vec<CornerSet>, Vec<CornerSet>) = detections
        .pairs()
        .map(|(l, r)| (l.clone(), r.clone()))
        .unzip();
    let objects = vec![config.pattern().object_points(); usable];
    let params = stereo_recon_calib::StereoCalibrationParams {
        intrinsics,
        ..config.stereo.clone()
    };
    let calibration = stereo_calibrate(&left_corners, &right_corners, &objects, image_size, &params)?;
    info!(
        "stereo calibration from {} pairs: rms {:.4} px, baseline {:.4}",
        usable,
        calibration.rms,
        calibration.translation.norm()
    );
    if calibration.rms > 1.0 {
        warn!("reprojection error {:.3} px is high", calibration.rms);
    }
    let rig = StereoRig::from_calibration(&calibration, config.alpha)?;
    Ok(CalibrationOutcome {
        rig,
        detections,
        calibration: Some(calibration),
    })
}

/// Everything computed from one stereo pair.
#[derive(Debug, Clone)]
pub struct Reconstruction {
    pub rectified_left: Image,
    pub rectified_right: Image,
    pub disparity: DisparityMap,
    pub cloud: PointCloud,
    pub depth_visualization: RgbImage,
    pub residual_visualization: RgbImage,
}

/// Rectify the pair with `rig`, match, and reproject.
#[cfg_attr(feature = "tracing", instrument(level = "info", skip_all))]
pub fn reconstruct(
    rig: &StereoRig,
    left: &Image,
    right: &Image,
    config: &ReconstructConfig,
) -> Result<Reconstruction, ReconstructError> {
    let left = resize_image(left, config.resize.as_ref())?;
    let right = resize_image(right, config.resize.as_ref())?;
    for img in [&left, &right] {
        if img.size() != rig.image_size() {
            return Err(ReconstructError::ImageSizeMismatch {
                got: img.size(),
                expected: rig.image_size(),
            });
        }
    }

    let (map_left, map_right) = rig.rectify_maps()?;
    let rectified_left = map_left.remap(&left)?;
    let rectified_right = map_right.remap(&right)?;
    let (gray_left, gray_right) = (rectified_left.to_gray(), rectified_right.to_gray());

    let matcher = config
        .matcher
        .matcher(config.disparity_params(), config.block_cost)?;
    let disparity = matcher.compute(&gray_left, &gray_right)?;
    info!(
        "{}: {} of {} pixels with disparity",
        matcher.name(),
        disparity.valid_count(),
        disparity.width * disparity.height
    );

    let mut cloud = reproject_to_3d(&disparity, &rig.rectification().q);
    if config.colorize {
        cloud = cloud.with_colors(&rectified_left)?;
    }
    let depth_visualization = depth_visualization(&disparity);
    let residual_visualization = residual_visualization(&gray_left, &gray_right)?;

    Ok(Reconstruction {
        rectified_left,
        rectified_right,
        disparity,
        cloud,
        depth_visualization,
        residual_visualization,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use stereo_recon_core::{GrayImage, PatternSpec};

    fn config() -> CalibrateConfig {
        CalibrateConfig::for_pattern(PatternSpec::new(6, 9, 0.025).expect("pattern"))
    }

    #[test]
    fn missing_source_is_no_calibration() {
        let err = calibrate_stereo(None, &[], &[], &config()).unwrap_err();
        assert!(matches!(err, ReconstructError::NoCalibration));
    }

    #[test]
    fn reconstruction_needs_a_record() {
        assert!(matches!(rig_from_source(None), Err(ReconstructError::NoCalibration)));
        assert!(matches!(
            rig_from_source(Some(&CalibrationSource::Solved)),
            Err(ReconstructError::InvalidConfig(_))
        ));
    }

    #[test]
    fn blank_images_give_no_usable_pairs() {
        let blank: Vec<Image> = (0..2).map(|_| GrayImage::new(320, 240).into()).collect();
        let err = calibrate_stereo(Some(&CalibrationSource::Solved), &blank, &blank, &config())
            .unwrap_err();
        assert!(
            matches!(err, ReconstructError::NotEnoughPairs { usable: 0, required: 3 }),
            "{err}"
        );
    }

    #[test]
    fn mixed_sizes_are_rejected() {
        let left: Vec<Image> = vec![GrayImage::new(320, 240).into()];
        let right: Vec<Image> = vec![GrayImage::new(300, 240).into()];
        let err = calibrate_stereo(Some(&CalibrationSource::Solved), &left, &right, &config())
            .unwrap_err();
        assert!(matches!(err, ReconstructError::ImageSizeMismatch { .. }), "{err}");
    }
}
