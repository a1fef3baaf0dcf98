//! Pinhole camera with Brown-Conrady (optionally rational) lens distortion.
//!
//! Distortion coefficients are always ordered
//! `[k1, k2, p1, p2, k3, k4, k5, k6]`: radial, tangential, then the higher
//! order radial terms. The rational terms `k4..k6` divide the radial
//! polynomial and are only present in [`DistortionModel::Rational`].

use crate::{CoreError, Pose};
use nalgebra::{Matrix3, Point2, Point3, Vector2};
use serde::{Deserialize, Serialize};

/// Focal lengths and principal point in pixels; skew is assumed zero.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Intrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
}

impl Intrinsics {
    pub fn new(fx: f64, fy: f64, cx: f64, cy: f64) -> Self {
        Self { fx, fy, cx, cy }
    }

    pub fn matrix(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.fx, 0.0, self.cx, //
            0.0, self.fy, self.cy, //
            0.0, 0.0, 1.0,
        )
    }

    /// Read focal lengths and principal point from a 3x3 camera matrix.
    pub fn from_matrix(k: &Matrix3<f64>) -> Self {
        Self::new(k[(0, 0)], k[(1, 1)], k[(0, 2)], k[(1, 2)])
    }

    /// Normalized image coordinates to pixels.
    #[inline]
    pub fn to_pixel(&self, n: &Vector2<f64>) -> Point2<f64> {
        Point2::new(self.fx * n.x + self.cx, self.fy * n.y + self.cy)
    }

    /// Pixels to normalized image coordinates.
    #[inline]
    pub fn to_normalized(&self, p: &Point2<f64>) -> Vector2<f64> {
        Vector2::new((p.x - self.cx) / self.fx, (p.y - self.cy) / self.fy)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DistortionModel {
    /// `[k1, k2, p1, p2, k3]`
    #[default]
    Standard,
    /// `[k1, k2, p1, p2, k3, k4, k5, k6]`
    Rational,
}

impl DistortionModel {
    pub fn num_coeffs(&self) -> usize {
        match self {
            DistortionModel::Standard => 5,
            DistortionModel::Rational => 8,
        }
    }
}

/// Lens distortion coefficients in `[k1, k2, p1, p2, k3, (k4, k5, k6)]` order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct Distortion {
    coeffs: Vec<f64>,
}

impl Distortion {
    /// Accepts 4 (k3 omitted), 5 or 8 coefficients.
    pub fn new(coeffs: Vec<f64>) -> Result<Self, CoreError> {
        match coeffs.len() {
            4 => {
                let mut padded = coeffs;
                padded.push(0.0);
                Ok(Self { coeffs: padded })
            }
            5 | 8 => Ok(Self { coeffs }),
            n => Err(CoreError::InvalidDistortionLength(n)),
        }
    }

    pub fn zero(model: DistortionModel) -> Self {
        Self {
            coeffs: vec![0.0; model.num_coeffs()],
        }
    }

    /// Take the first `model.num_coeffs()` values of `coeffs`, zero-filling
    /// any that are missing.
    pub fn from_slice(model: DistortionModel, coeffs: &[f64]) -> Self {
        let mut out = vec![0.0; model.num_coeffs()];
        for (dst, src) in out.iter_mut().zip(coeffs) {
            *dst = *src;
        }
        Self { coeffs: out }
    }

    pub fn model(&self) -> DistortionModel {
        if self.coeffs.len() == 8 {
            DistortionModel::Rational
        } else {
            DistortionModel::Standard
        }
    }

    pub fn coeffs(&self) -> &[f64] {
        &self.coeffs
    }

    /// Same coefficients re-expressed in another model (extra terms are
    /// zero-filled or dropped).
    pub fn with_model(&self, model: DistortionModel) -> Self {
        let mut coeffs = self.coeffs.clone();
        coeffs.resize(model.num_coeffs(), 0.0);
        Self { coeffs }
    }

    pub fn is_zero(&self) -> bool {
        self.coeffs.iter().all(|&c| c == 0.0)
    }

    #[inline]
    fn k(&self, i: usize) -> f64 {
        self.coeffs.get(i).copied().unwrap_or(0.0)
    }

    /// Apply distortion to an undistorted normalized point.
    #[inline]
    pub fn distort(&self, p: &Vector2<f64>) -> Vector2<f64> {
        let (k1, k2, p1, p2, k3) = (self.k(0), self.k(1), self.k(2), self.k(3), self.k(4));
        let (k4, k5, k6) = (self.k(5), self.k(6), self.k(7));
        let (x, y) = (p.x, p.y);
        let r2 = x * x + y * y;
        let r4 = r2 * r2;
        let r6 = r4 * r2;
        let radial = (1.0 + k1 * r2 + k2 * r4 + k3 * r6) / (1.0 + k4 * r2 + k5 * r4 + k6 * r6);
        let xy2 = 2.0 * x * y;
        Vector2::new(
            x * radial + p1 * xy2 + p2 * (r2 + 2.0 * x * x),
            y * radial + p1 * (r2 + 2.0 * y * y) + p2 * xy2,
        )
    }

    /// Invert [`Self::distort`] by fixed-point iteration.
    pub fn undistort(&self, d: &Vector2<f64>, iterations: usize) -> Vector2<f64> {
        if self.is_zero() {
            return *d;
        }
        let (k1, k2, p1, p2, k3) = (self.k(0), self.k(1), self.k(2), self.k(3), self.k(4));
        let (k4, k5, k6) = (self.k(5), self.k(6), self.k(7));
        let (x0, y0) = (d.x, d.y);
        let (mut x, mut y) = (x0, y0);
        for _ in 0..iterations {
            let r2 = x * x + y * y;
            let icdist = (1.0 + ((k6 * r2 + k5) * r2 + k4) * r2)
                / (1.0 + ((k3 * r2 + k2) * r2 + k1) * r2);
            if icdist < 0.0 {
                // Outside the invertible region of the model.
                return *d;
            }
            let dx = 2.0 * p1 * x * y + p2 * (r2 + 2.0 * x * x);
            let dy = p1 * (r2 + 2.0 * y * y) + 2.0 * p2 * x * y;
            x = (x0 - dx) * icdist;
            y = (y0 - dy) * icdist;
        }
        Vector2::new(x, y)
    }
}

impl TryFrom<Vec<f64>> for Distortion {
    type Error = CoreError;

    fn try_from(coeffs: Vec<f64>) -> Result<Self, Self::Error> {
        Distortion::new(coeffs)
    }
}

impl From<Distortion> for Vec<f64> {
    fn from(d: Distortion) -> Self {
        d.coeffs
    }
}

/// Intrinsics plus distortion of one calibrated camera.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraModel {
    pub intrinsics: Intrinsics,
    pub distortion: Distortion,
}

impl CameraModel {
    /// Iterations used when inverting the distortion model.
    pub const UNDISTORT_ITERATIONS: usize = 20;

    pub fn new(intrinsics: Intrinsics, distortion: Distortion) -> Self {
        Self {
            intrinsics,
            distortion,
        }
    }

    /// Ideal pinhole camera without distortion.
    pub fn pinhole(intrinsics: Intrinsics) -> Self {
        Self::new(intrinsics, Distortion::zero(DistortionModel::Standard))
    }

    /// Project a point given in camera coordinates to pixels. Returns `None`
    /// for points on or behind the image plane.
    #[inline]
    pub fn project_camera_point(&self, pc: &Point3<f64>) -> Option<Point2<f64>> {
        if pc.z <= f64::EPSILON {
            return None;
        }
        let n = Vector2::new(pc.x / pc.z, pc.y / pc.z);
        Some(self.intrinsics.to_pixel(&self.distortion.distort(&n)))
    }

    /// Project a pattern/world point observed from `pose` (world -> camera).
    #[inline]
    pub fn project(&self, pose: &Pose, pw: &Point3<f64>) -> Option<Point2<f64>> {
        self.project_camera_point(&pose.transform_point(pw))
    }

    /// Distorted pixel to undistorted normalized coordinates.
    pub fn undistort_point(&self, pixel: &Point2<f64>) -> Vector2<f64> {
        let n = self.intrinsics.to_normalized(pixel);
        self.distortion.undistort(&n, Self::UNDISTORT_ITERATIONS)
    }
}
