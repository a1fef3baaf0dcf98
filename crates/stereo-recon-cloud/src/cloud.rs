use crate::CloudError;
use log::debug;
use nalgebra::Matrix4;
use rayon::prelude::*;
use stereo_recon_core::{Image, ImageSize};
use stereo_recon_disparity::DisparityMap;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Organized point cloud: one xyz cell per disparity pixel, row-major.
///
/// Cells without a valid disparity hold non-finite coordinates; they are
/// kept so the grid stays aligned with the rectified images and dropped
/// only when the cloud is written.
#[derive(Debug, Clone, PartialEq)]
pub struct PointCloud {
    pub width: usize,
    pub height: usize,
    pub points: Vec<[f32; 3]>,
    pub colors: Option<Vec<[u8; 3]>>,
}

impl PointCloud {
    pub fn size(&self) -> ImageSize {
        ImageSize::new(self.width, self.height)
    }

    #[inline]
    pub fn point(&self, x: usize, y: usize) -> [f32; 3] {
        self.points[y * self.width + x]
    }

    #[inline]
    pub fn color(&self, x: usize, y: usize) -> Option<[u8; 3]> {
        self.colors.as_ref().map(|c| c[y * self.width + x])
    }

    /// Attach colors from the rectified reference view. Gray images are
    /// replicated to three channels.
    pub fn with_colors(mut self, image: &Image) -> Result<Self, CloudError> {
        if image.width() != self.width || image.height() != self.height {
            return Err(CloudError::SizeMismatch {
                cloud_w: self.width,
                cloud_h: self.height,
                image_w: image.width(),
                image_h: image.height(),
            });
        }
        let rgb = image.to_rgb();
        self.colors = Some(
            rgb.data
                .chunks_exact(3)
                .map(|px| [px[0], px[1], px[2]])
                .collect(),
        );
        Ok(self)
    }

    pub fn finite_count(&self) -> usize {
        self.points.iter().filter(|p| is_finite(p)).count()
    }

    /// Finite points with their colors, in row-major order.
    pub fn iter_finite(&self) -> impl Iterator<Item = ([f32; 3], Option<[u8; 3]>)> + '_ {
        self.points
            .iter()
            .enumerate()
            .filter(|(_, p)| is_finite(p))
            .map(|(i, p)| (*p, self.colors.as_ref().map(|c| c[i])))
    }
}

#[inline]
pub(crate) fn is_finite(p: &[f32; 3]) -> bool {
    p.iter().all(|v| v.is_finite())
}

/// Reproject every disparity cell through the 4x4 matrix `q`:
/// `[X Y Z W]^T = Q [x y d 1]^T`, point = `(X, Y, Z) / W`.
///
/// Invalid disparities and cells with `W = 0` become NaN points.
#[cfg_attr(feature = "tracing", instrument(level = "debug", skip_all, fields(w = disparity.width, h = disparity.height)))]
pub fn reproject_to_3d(disparity: &DisparityMap, q: &Matrix4<f64>) -> PointCloud {
    let (w, h) = (disparity.width, disparity.height);
    let mut points = vec![[f32::NAN; 3]; w * h];
    if w > 0 {
        points.par_chunks_mut(w).enumerate().for_each(|(y, row)| {
            for (x, out) in row.iter_mut().enumerate() {
                let d = disparity.get(x, y);
                if !d.is_finite() {
                    continue;
                }
                let v = q * nalgebra::Vector4::new(x as f64, y as f64, d as f64, 1.0);
                if v[3] == 0.0 {
                    continue;
                }
                *out = [
                    (v[0] / v[3]) as f32,
                    (v[1] / v[3]) as f32,
                    (v[2] / v[3]) as f32,
                ];
            }
        });
    }
    let cloud = PointCloud {
        width: w,
        height: h,
        points,
        colors: None,
    };
    debug!("reprojected {} of {} cells", cloud.finite_count(), w * h);
    cloud
}
