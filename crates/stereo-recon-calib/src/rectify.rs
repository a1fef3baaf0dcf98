//! Bouguet rectification and the per-pixel maps that apply it.

use crate::RectifyError;
use log::debug;
use nalgebra::{Matrix3, Matrix3x4, Matrix4, Point2, Rotation3, Vector2, Vector3};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use stereo_recon_core::{
    sample_bilinear, sample_bilinear_rgb, CameraModel, GrayImage, Image, ImageSize, RgbImage,
};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Axis-aligned pixel rectangle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roi {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

impl Roi {
    pub fn area(&self) -> usize {
        self.width * self.height
    }

    pub fn contains(&self, x: usize, y: usize) -> bool {
        x >= self.x && y >= self.y && x < self.x + self.width && y < self.y + self.height
    }
}

/// Float rectangle as `(x0, y0, x1, y1)`.
#[derive(Clone, Copy, Debug)]
struct Bounds {
    x0: f64,
    y0: f64,
    x1: f64,
    y1: f64,
}

/// Output of [`stereo_rectify`].
#[derive(Clone, Debug, PartialEq)]
pub struct Rectification {
    /// Rotation from the original to the rectified left camera frame.
    pub r1: Matrix3<f64>,
    pub r2: Matrix3<f64>,
    /// Projection of the rectified left camera.
    pub p1: Matrix3x4<f64>,
    /// Projection of the rectified right camera; carries `Tx * f`.
    pub p2: Matrix3x4<f64>,
    /// Disparity-to-depth matrix.
    pub q: Matrix4<f64>,
    /// Regions of the rectified images where every pixel has a source.
    pub roi1: Roi,
    pub roi2: Roi,
    pub alpha: f64,
    /// Baseline is closer to the image y axis.
    pub vertical: bool,
}

impl Rectification {
    pub fn focal_length(&self) -> f64 {
        self.p1[(0, 0)]
    }

    /// Baseline along the rectified axis, in calibration units.
    pub fn baseline(&self) -> f64 {
        let axis = usize::from(self.vertical);
        -self.p2[(axis, 3)] / self.p2[(axis, axis)]
    }
}

/// Default `alpha` for [`stereo_rectify`]: keep every source pixel.
pub const DEFAULT_ALPHA: f64 = 1.0;

/// Distorted pixel -> undistorted, rotated by `r`, projected with `f`, `c`.
fn rectified_point(camera: &CameraModel, r: &Matrix3<f64>, f: f64, c: Vector2<f64>, p: &Point2<f64>) -> Vector2<f64> {
    let n = camera.undistort_point(p);
    let q = r * Vector3::new(n.x, n.y, 1.0);
    Vector2::new(f * q.x / q.z + c.x, f * q.y / q.z + c.y)
}

/// Inner (inscribed) and outer (bounding) rectangles of the rectified image
/// outline, sampled on a 9x9 grid over the source image.
fn rectangles(camera: &CameraModel, r: &Matrix3<f64>, f: f64, c: Vector2<f64>, size: ImageSize) -> (Bounds, Bounds) {
    const N: usize = 9;
    let mut inner = Bounds {
        x0: f64::MIN,
        y0: f64::MIN,
        x1: f64::MAX,
        y1: f64::MAX,
    };
    let mut outer = Bounds {
        x0: f64::MAX,
        y0: f64::MAX,
        x1: f64::MIN,
        y1: f64::MIN,
    };
    for j in 0..N {
        for i in 0..N {
            let src = Point2::new(
                i as f64 * size.width as f64 / (N - 1) as f64,
                j as f64 * size.height as f64 / (N - 1) as f64,
            );
            let p = rectified_point(camera, r, f, c, &src);
            outer.x0 = outer.x0.min(p.x);
            outer.x1 = outer.x1.max(p.x);
            outer.y0 = outer.y0.min(p.y);
            outer.y1 = outer.y1.max(p.y);
            if i == 0 {
                inner.x0 = inner.x0.max(p.x);
            }
            if i == N - 1 {
                inner.x1 = inner.x1.min(p.x);
            }
            if j == 0 {
                inner.y0 = inner.y0.max(p.y);
            }
            if j == N - 1 {
                inner.y1 = inner.y1.min(p.y);
            }
        }
    }
    (inner, outer)
}

/// Closed-form Bouguet rectification of a calibrated stereo pair.
///
/// `rotation`/`translation` map left camera coordinates into the right
/// camera. Both rectified views share one principal point (zero disparity at
/// infinity). `alpha` in `[0, 1]` blends between showing only valid pixels
/// (0) and keeping every source pixel (1); a negative value keeps the
/// unscaled focal length.
#[cfg_attr(feature = "tracing", instrument(level = "debug", skip(left, right)))]
pub fn stereo_rectify(
    left: &CameraModel,
    right: &CameraModel,
    rotation: &Matrix3<f64>,
    translation: &Vector3<f64>,
    image_size: ImageSize,
    alpha: f64,
) -> Result<Rectification, RectifyError> {
    if image_size.width == 0 || image_size.height == 0 {
        return Err(RectifyError::EmptyImage {
            width: image_size.width,
            height: image_size.height,
        });
    }
    if alpha.is_nan() || alpha > 1.0 {
        return Err(RectifyError::InvalidAlpha(alpha));
    }

    // Split the rotation evenly between the two cameras.
    let om = Rotation3::from_matrix_unchecked(*rotation).scaled_axis();
    let r_r = Rotation3::from_scaled_axis(om * -0.5).into_inner();
    let t = r_r * translation;

    let idx = if t.x.abs() > t.y.abs() { 0 } else { 1 };
    let c = t[idx];
    let nt = t.norm();
    if nt <= f64::EPSILON {
        return Err(RectifyError::ZeroBaseline);
    }
    let mut uu = Vector3::zeros();
    uu[idx] = if c > 0.0 { 1.0 } else { -1.0 };

    // Rotate the baseline onto the chosen image axis.
    let mut ww = t.cross(&uu);
    let nw = ww.norm();
    if nw > 0.0 {
        ww *= (c.abs() / nt).clamp(-1.0, 1.0).acos() / nw;
    }
    let w_r = Rotation3::from_scaled_axis(ww).into_inner();
    let r1 = w_r * r_r.transpose();
    let r2 = w_r * r_r;
    let t = r2 * translation;

    let (w, h) = (image_size.width as f64, image_size.height as f64);
    let other = idx ^ 1;
    let mut fc = 0.5
        * (left.intrinsics.matrix()[(other, other)] + right.intrinsics.matrix()[(other, other)]);

    // Principal points that center the undistorted image corners.
    let corners = [
        Point2::new(0.0, 0.0),
        Point2::new(w - 1.0, 0.0),
        Point2::new(0.0, h - 1.0),
        Point2::new(w - 1.0, h - 1.0),
    ];
    let mut cc = [Vector2::zeros(); 2];
    for (k, (camera, r)) in [(left, &r1), (right, &r2)].into_iter().enumerate() {
        let mean = corners
            .iter()
            .map(|p| rectified_point(camera, r, fc, Vector2::zeros(), p))
            .sum::<Vector2<f64>>()
            / corners.len() as f64;
        cc[k] = Vector2::new((w - 1.0) * 0.5, (h - 1.0) * 0.5) - mean;
    }
    let shared = (cc[0] + cc[1]) * 0.5;
    let (c1, c2) = (shared, shared);

    let (inner1, outer1) = rectangles(left, &r1, fc, c1, image_size);
    let (inner2, outer2) = rectangles(right, &r2, fc, c2, image_size);

    let mut s = 1.0;
    if alpha >= 0.0 {
        let fit = |c: Vector2<f64>, b: &Bounds| {
            [
                c.x / (c.x - b.x0),
                c.y / (c.y - b.y0),
                (w - c.x) / (b.x1 - c.x),
                (h - c.y) / (b.y1 - c.y),
            ]
        };
        let s0 = fit(c1, &inner1)
            .into_iter()
            .chain(fit(c2, &inner2))
            .fold(f64::MIN, f64::max);
        let s1 = fit(c1, &outer1)
            .into_iter()
            .chain(fit(c2, &outer2))
            .fold(f64::MAX, f64::min);
        s = s0 * (1.0 - alpha) + s1 * alpha;
        if !s.is_finite() || s <= 0.0 {
            return Err(RectifyError::SingularProjection);
        }
    }
    let tx = t[idx];
    fc *= s;

    let mut p1 = Matrix3x4::zeros();
    p1[(0, 0)] = fc;
    p1[(1, 1)] = fc;
    p1[(0, 2)] = c1.x;
    p1[(1, 2)] = c1.y;
    p1[(2, 2)] = 1.0;
    let mut p2 = p1;
    p2[(0, 2)] = c2.x;
    p2[(1, 2)] = c2.y;
    p2[(idx, 3)] = tx * fc;

    // Snap values within rounding noise of an integer before ceil/floor.
    const SNAP: f64 = 1e-6;
    let roi = |inner: &Bounds, c: Vector2<f64>| {
        let x0 = ((inner.x0 - c.x) * s + c.x - SNAP).ceil().max(0.0);
        let y0 = ((inner.y0 - c.y) * s + c.y - SNAP).ceil().max(0.0);
        let x1 = (x0 + ((inner.x1 - inner.x0) * s + SNAP).floor()).min(w);
        let y1 = (y0 + ((inner.y1 - inner.y0) * s + SNAP).floor()).min(h);
        Roi {
            x: x0 as usize,
            y: y0 as usize,
            width: (x1 - x0).max(0.0) as usize,
            height: (y1 - y0).max(0.0) as usize,
        }
    };
    let roi1 = roi(&inner1, c1);
    let roi2 = roi(&inner2, c2);

    let c_diff = if idx == 0 { c1.x - c2.x } else { c1.y - c2.y };
    let q = Matrix4::new(
        1.0, 0.0, 0.0, -c1.x, //
        0.0, 1.0, 0.0, -c1.y, //
        0.0, 0.0, 0.0, fc, //
        0.0, 0.0, -1.0 / tx, c_diff / tx,
    );
    debug!(
        "rectified f={:.3} c=({:.3}, {:.3}) scale {:.4}, roi1 {:?}, roi2 {:?}",
        fc, c1.x, c1.y, s, roi1, roi2
    );

    Ok(Rectification {
        r1,
        r2,
        p1,
        p2,
        q,
        roi1,
        roi2,
        alpha,
        vertical: idx == 1,
    })
}

/// Lookup from rectified pixels to distorted source pixels.
#[derive(Clone, Debug)]
pub struct RectifyMap {
    width: usize,
    height: usize,
    map_x: Vec<f32>,
    map_y: Vec<f32>,
}

impl RectifyMap {
    /// Build the map for one camera from its rectifying rotation and
    /// projection.
    pub fn new(
        camera: &CameraModel,
        rotation: &Matrix3<f64>,
        projection: &Matrix3x4<f64>,
        size: ImageSize,
    ) -> Result<Self, RectifyError> {
        if size.width == 0 || size.height == 0 {
            return Err(RectifyError::EmptyImage {
                width: size.width,
                height: size.height,
            });
        }
        let ar = projection.fixed_view::<3, 3>(0, 0) * rotation;
        let inv = ar.try_inverse().ok_or(RectifyError::SingularProjection)?;

        let (w, h) = (size.width, size.height);
        let mut map_x = vec![0.0f32; w * h];
        let mut map_y = vec![0.0f32; w * h];
        let k = &camera.intrinsics;
        map_x
            .par_chunks_mut(w)
            .zip(map_y.par_chunks_mut(w))
            .enumerate()
            .for_each(|(y, (row_x, row_y))| {
                for x in 0..w {
                    let ray = inv * Vector3::new(x as f64, y as f64, 1.0);
                    let (sx, sy) = if ray.z.abs() > f64::EPSILON {
                        let d = camera
                            .distortion
                            .distort(&Vector2::new(ray.x / ray.z, ray.y / ray.z));
                        (k.fx * d.x + k.cx, k.fy * d.y + k.cy)
                    } else {
                        (-1.0, -1.0)
                    };
                    row_x[x] = sx as f32;
                    row_y[x] = sy as f32;
                }
            });
        Ok(Self {
            width: w,
            height: h,
            map_x,
            map_y,
        })
    }

    pub fn size(&self) -> ImageSize {
        ImageSize::new(self.width, self.height)
    }

    /// Source pixel sampled for rectified pixel `(x, y)`.
    pub fn source(&self, x: usize, y: usize) -> Point2<f32> {
        let i = y * self.width + x;
        Point2::new(self.map_x[i], self.map_y[i])
    }

    fn check(&self, size: ImageSize) -> Result<(), RectifyError> {
        if size != self.size() {
            return Err(RectifyError::SizeMismatch {
                got_w: size.width,
                got_h: size.height,
                want_w: self.width,
                want_h: self.height,
            });
        }
        Ok(())
    }

    /// Bilinear remap; pixels mapping outside the source are black.
    pub fn remap_gray(&self, src: &GrayImage) -> Result<GrayImage, RectifyError> {
        self.check(src.size())?;
        let view = src.view();
        let mut out = GrayImage::new(self.width, self.height);
        out.data
            .par_chunks_mut(self.width)
            .enumerate()
            .for_each(|(y, row)| {
                for (x, px) in row.iter_mut().enumerate() {
                    let s = self.source(x, y);
                    *px = sample_bilinear(&view, s.x, s.y).round().clamp(0.0, 255.0) as u8;
                }
            });
        Ok(out)
    }

    pub fn remap_rgb(&self, src: &RgbImage) -> Result<RgbImage, RectifyError> {
        self.check(src.size())?;
        let mut out = RgbImage::new(self.width, self.height);
        out.data
            .par_chunks_mut(self.width * 3)
            .enumerate()
            .for_each(|(y, row)| {
                for (x, px) in row.chunks_exact_mut(3).enumerate() {
                    let s = self.source(x, y);
                    let rgb = sample_bilinear_rgb(src, s.x, s.y);
                    for (dst, v) in px.iter_mut().zip(rgb) {
                        *dst = v.round().clamp(0.0, 255.0) as u8;
                    }
                }
            });
        Ok(out)
    }

    pub fn remap(&self, src: &Image) -> Result<Image, RectifyError> {
        Ok(match src {
            Image::Gray(img) => Image::Gray(self.remap_gray(img)?),
            Image::Rgb(img) => Image::Rgb(self.remap_rgb(img)?),
        })
    }
}
