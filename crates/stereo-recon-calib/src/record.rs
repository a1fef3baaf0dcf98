//! On-disk calibration records with stable key names.
//!
//! Matrices are stored as row-major nested arrays. Derived stereo fields are
//! optional on input so that externally produced calibrations only need the
//! raw camera and pose data.

use crate::{MonoCalibration, RecordError, Roi, DEFAULT_ALPHA};
use nalgebra::{Matrix3, Matrix3x4, Matrix4, Vector3};
use serde::{Deserialize, Serialize};
use std::path::Path;
use stereo_recon_core::{read_json, write_json, CameraModel, Distortion, ImageSize, Intrinsics};

pub type Mat3Rows = [[f64; 3]; 3];
pub type Mat34Rows = [[f64; 4]; 3];
pub type Mat4Rows = [[f64; 4]; 4];

pub(crate) fn mat3_rows(m: &Matrix3<f64>) -> Mat3Rows {
    std::array::from_fn(|r| std::array::from_fn(|c| m[(r, c)]))
}

pub(crate) fn mat34_rows(m: &Matrix3x4<f64>) -> Mat34Rows {
    std::array::from_fn(|r| std::array::from_fn(|c| m[(r, c)]))
}

pub(crate) fn mat4_rows(m: &Matrix4<f64>) -> Mat4Rows {
    std::array::from_fn(|r| std::array::from_fn(|c| m[(r, c)]))
}

pub(crate) fn rows_mat3(rows: &Mat3Rows) -> Matrix3<f64> {
    Matrix3::from_fn(|r, c| rows[r][c])
}

pub(crate) fn rows_mat34(rows: &Mat34Rows) -> Matrix3x4<f64> {
    Matrix3x4::from_fn(|r, c| rows[r][c])
}

pub(crate) fn rows_mat4(rows: &Mat4Rows) -> Matrix4<f64> {
    Matrix4::from_fn(|r, c| rows[r][c])
}

/// Rebuild a camera from a 3x3 matrix and distortion list.
pub(crate) fn camera_from_fields(
    field: &'static str,
    k: &Mat3Rows,
    distortion: &[f64],
) -> Result<CameraModel, RecordError> {
    let intrinsics = Intrinsics::from_matrix(&rows_mat3(k));
    if !(intrinsics.fx > 0.0 && intrinsics.fy > 0.0) {
        return Err(RecordError::InvalidField {
            field,
            reason: format!("focal lengths must be positive (fx={}, fy={})", intrinsics.fx, intrinsics.fy),
        });
    }
    let distortion = Distortion::new(distortion.to_vec()).map_err(|e| RecordError::InvalidField {
        field,
        reason: e.to_string(),
    })?;
    Ok(CameraModel::new(intrinsics, distortion))
}

/// Single-camera calibration result.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MonoCalibrationRecord {
    #[serde(rename = "Camera_Matrix")]
    pub camera_matrix: Mat3Rows,
    #[serde(rename = "Distortion_Coefficients")]
    pub distortion: Vec<f64>,
    #[serde(rename = "Reprojection_Error")]
    pub reprojection_error: f64,
    #[serde(rename = "Image_Size")]
    pub image_size: ImageSize,
}

impl MonoCalibrationRecord {
    pub fn camera(&self) -> Result<CameraModel, RecordError> {
        camera_from_fields("Camera_Matrix", &self.camera_matrix, &self.distortion)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), RecordError> {
        Ok(write_json(self, path)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, RecordError> {
        Ok(read_json(path)?)
    }
}

impl From<&MonoCalibration> for MonoCalibrationRecord {
    fn from(cal: &MonoCalibration) -> Self {
        Self {
            camera_matrix: mat3_rows(&cal.camera.intrinsics.matrix()),
            distortion: cal.camera.distortion.coeffs().to_vec(),
            reprojection_error: cal.rms,
            image_size: cal.image_size,
        }
    }
}

fn default_alpha() -> f64 {
    DEFAULT_ALPHA
}

/// Stereo calibration and rectification, as written by `calibrate`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationRecord {
    #[serde(rename = "Camera1_Intrinsic")]
    pub camera1_intrinsic: Mat3Rows,
    #[serde(rename = "Camera1_Distortion")]
    pub camera1_distortion: Vec<f64>,
    #[serde(rename = "Camera2_Intrinsic")]
    pub camera2_intrinsic: Mat3Rows,
    #[serde(rename = "Camera2_Distortion")]
    pub camera2_distortion: Vec<f64>,
    #[serde(rename = "Rotation_Matrix")]
    pub rotation: Mat3Rows,
    #[serde(rename = "Translation_Vector")]
    pub translation: [f64; 3],
    #[serde(rename = "Essential_Matrix", default, skip_serializing_if = "Option::is_none")]
    pub essential: Option<Mat3Rows>,
    #[serde(rename = "Fundamental_Matrix", default, skip_serializing_if = "Option::is_none")]
    pub fundamental: Option<Mat3Rows>,
    #[serde(rename = "Rectification_R1", default, skip_serializing_if = "Option::is_none")]
    pub r1: Option<Mat3Rows>,
    #[serde(rename = "Rectification_R2", default, skip_serializing_if = "Option::is_none")]
    pub r2: Option<Mat3Rows>,
    #[serde(rename = "Projection_P1", default, skip_serializing_if = "Option::is_none")]
    pub p1: Option<Mat34Rows>,
    #[serde(rename = "Projection_P2", default, skip_serializing_if = "Option::is_none")]
    pub p2: Option<Mat34Rows>,
    #[serde(rename = "Disparity_Q", default, skip_serializing_if = "Option::is_none")]
    pub q: Option<Mat4Rows>,
    #[serde(rename = "Reprojection_Error", default)]
    pub reprojection_error: f64,
    #[serde(rename = "Image_Size")]
    pub image_size: ImageSize,
    #[serde(rename = "Valid_ROI1", default, skip_serializing_if = "Option::is_none")]
    pub roi1: Option<Roi>,
    #[serde(rename = "Valid_ROI2", default, skip_serializing_if = "Option::is_none")]
    pub roi2: Option<Roi>,
    #[serde(rename = "Rectification_Alpha", default = "default_alpha")]
    pub alpha: f64,
}

impl CalibrationRecord {
    pub fn left_camera(&self) -> Result<CameraModel, RecordError> {
        camera_from_fields("Camera1_Intrinsic", &self.camera1_intrinsic, &self.camera1_distortion)
    }

    pub fn right_camera(&self) -> Result<CameraModel, RecordError> {
        camera_from_fields("Camera2_Intrinsic", &self.camera2_intrinsic, &self.camera2_distortion)
    }

    pub fn rotation_matrix(&self) -> Matrix3<f64> {
        rows_mat3(&self.rotation)
    }

    pub fn translation_vector(&self) -> Vector3<f64> {
        Vector3::from(self.translation)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), RecordError> {
        Ok(write_json(self, path)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, RecordError> {
        Ok(read_json(path)?)
    }
}
