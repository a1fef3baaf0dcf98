//! False-color renderings of disparity and photometric residuals.

use crate::CloudError;
use rayon::prelude::*;
use stereo_recon_core::{GrayImage, RgbImage};
use stereo_recon_disparity::DisparityMap;

/// JET colormap: dark blue at 0 through cyan, yellow to dark red at 255.
pub fn jet(v: u8) -> [u8; 3] {
    let t = v as f32 / 255.0 * 4.0;
    let ramp = |center: f32| ((1.5 - (t - center).abs()).clamp(0.0, 1.0) * 255.0).round() as u8;
    [ramp(3.0), ramp(2.0), ramp(1.0)]
}

fn colorize(width: usize, height: usize, levels: &[Option<u8>]) -> RgbImage {
    let mut out = RgbImage::new(width, height);
    out.data
        .par_chunks_mut(3)
        .zip(levels.par_iter())
        .for_each(|(px, level)| {
            if let Some(v) = level {
                px.copy_from_slice(&jet(*v));
            }
        });
    out
}

/// Map finite values to `0..=255` by their min-max range; others stay `None`.
fn min_max_levels(values: &[f32]) -> Vec<Option<u8>> {
    let range = values
        .iter()
        .filter(|v| v.is_finite())
        .fold(None, |acc: Option<(f32, f32)>, &v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        });
    let Some((lo, hi)) = range else {
        return vec![None; values.len()];
    };
    let scale = if hi > lo { 255.0 / (hi - lo) } else { 0.0 };
    values
        .iter()
        .map(|&v| v.is_finite().then(|| ((v - lo) * scale).round().clamp(0.0, 255.0) as u8))
        .collect()
}

/// Min-max normalize the finite disparities to `0..=255` and apply [`jet`].
/// Invalid cells are black; a constant map renders at level 0.
pub fn depth_visualization(disparity: &DisparityMap) -> RgbImage {
    colorize(disparity.width, disparity.height, &min_max_levels(&disparity.data))
}

/// `|left - right|` per pixel, min-max normalized like
/// [`depth_visualization`], through [`jet`].
pub fn residual_visualization(left: &GrayImage, right: &GrayImage) -> Result<RgbImage, CloudError> {
    if left.size() != right.size() {
        return Err(CloudError::PairSizeMismatch {
            left_w: left.width,
            left_h: left.height,
            right_w: right.width,
            right_h: right.height,
        });
    }
    let residuals: Vec<f32> = left
        .data
        .iter()
        .zip(&right.data)
        .map(|(&a, &b)| a.abs_diff(b) as f32)
        .collect();
    Ok(colorize(left.width, left.height, &min_max_levels(&residuals)))
}
