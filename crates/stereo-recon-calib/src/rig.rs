use crate::record::{
    mat34_rows, mat3_rows, mat4_rows, rows_mat3, rows_mat34, rows_mat4, CalibrationRecord,
};
use crate::{
    essential_matrix, fundamental_matrix, stereo_rectify, RecordError, Rectification,
    RectifyError, RectifyMap, StereoCalibration,
};
use log::{info, warn};
use nalgebra::{Matrix3, Rotation3, Vector3};
use std::path::{Path, PathBuf};
use stereo_recon_core::{CameraModel, ImageSize, Pose};

/// Relative tolerance when comparing stored derived fields to recomputed ones.
const RECORD_TOLERANCE: f64 = 1e-9;

/// Where a [`StereoRig`] comes from. There is no default source.
#[derive(Clone, Debug, PartialEq)]
pub enum CalibrationSource {
    /// Solve both cameras and the pose from detected corners.
    Solved,
    /// A calibration record produced elsewhere.
    TrustedRecord(PathBuf),
    /// Known cameras; only the relative pose is solved from corners.
    TrustedIntrinsics {
        left: CameraModel,
        right: CameraModel,
    },
}

impl CalibrationSource {
    /// Whether this source needs corner detections to produce a rig.
    pub fn needs_corners(&self) -> bool {
        !matches!(self, CalibrationSource::TrustedRecord(_))
    }
}

/// A calibrated, rectified stereo pair. Immutable once built.
#[derive(Clone, Debug, PartialEq)]
pub struct StereoRig {
    left: CameraModel,
    right: CameraModel,
    rotation: Matrix3<f64>,
    translation: Vector3<f64>,
    essential: Matrix3<f64>,
    fundamental: Matrix3<f64>,
    rectification: Rectification,
    image_size: ImageSize,
    reprojection_error: f64,
}

impl StereoRig {
    /// Derive E, F and the rectification from the raw calibration.
    pub fn new(
        left: CameraModel,
        right: CameraModel,
        rotation: Matrix3<f64>,
        translation: Vector3<f64>,
        image_size: ImageSize,
        alpha: f64,
        reprojection_error: f64,
    ) -> Result<Self, RectifyError> {
        let essential = essential_matrix(&rotation, &translation);
        let fundamental = fundamental_matrix(&left, &right, &essential);
        let rectification =
            stereo_rectify(&left, &right, &rotation, &translation, image_size, alpha)?;
        Ok(Self {
            left,
            right,
            rotation,
            translation,
            essential,
            fundamental,
            rectification,
            image_size,
            reprojection_error,
        })
    }

    pub fn from_calibration(cal: &StereoCalibration, alpha: f64) -> Result<Self, RectifyError> {
        Self::new(
            cal.left.clone(),
            cal.right.clone(),
            cal.rotation,
            cal.translation,
            cal.image_size,
            alpha,
            cal.rms,
        )
    }

    pub fn left(&self) -> &CameraModel {
        &self.left
    }

    pub fn right(&self) -> &CameraModel {
        &self.right
    }

    pub fn rotation(&self) -> &Matrix3<f64> {
        &self.rotation
    }

    pub fn translation(&self) -> &Vector3<f64> {
        &self.translation
    }

    pub fn relative_pose(&self) -> Pose {
        Pose::new(Rotation3::from_matrix_unchecked(self.rotation), self.translation)
    }

    pub fn essential(&self) -> &Matrix3<f64> {
        &self.essential
    }

    pub fn fundamental(&self) -> &Matrix3<f64> {
        &self.fundamental
    }

    pub fn rectification(&self) -> &Rectification {
        &self.rectification
    }

    pub fn image_size(&self) -> ImageSize {
        self.image_size
    }

    pub fn reprojection_error(&self) -> f64 {
        self.reprojection_error
    }

    pub fn baseline(&self) -> f64 {
        self.translation.norm()
    }

    /// Left and right rectification maps.
    pub fn rectify_maps(&self) -> Result<(RectifyMap, RectifyMap), RectifyError> {
        let r = &self.rectification;
        let (left, right) = rayon::join(
            || RectifyMap::new(&self.left, &r.r1, &r.p1, self.image_size),
            || RectifyMap::new(&self.right, &r.r2, &r.p2, self.image_size),
        );
        Ok((left?, right?))
    }

    pub fn to_record(&self) -> CalibrationRecord {
        let r = &self.rectification;
        CalibrationRecord {
            camera1_intrinsic: mat3_rows(&self.left.intrinsics.matrix()),
            camera1_distortion: self.left.distortion.coeffs().to_vec(),
            camera2_intrinsic: mat3_rows(&self.right.intrinsics.matrix()),
            camera2_distortion: self.right.distortion.coeffs().to_vec(),
            rotation: mat3_rows(&self.rotation),
            translation: [self.translation.x, self.translation.y, self.translation.z],
            essential: Some(mat3_rows(&self.essential)),
            fundamental: Some(mat3_rows(&self.fundamental)),
            r1: Some(mat3_rows(&r.r1)),
            r2: Some(mat3_rows(&r.r2)),
            p1: Some(mat34_rows(&r.p1)),
            p2: Some(mat34_rows(&r.p2)),
            q: Some(mat4_rows(&r.q)),
            reprojection_error: self.reprojection_error,
            image_size: self.image_size,
            roi1: Some(r.roi1),
            roi2: Some(r.roi2),
            alpha: r.alpha,
        }
    }

    /// Rebuild a rig from the raw fields of a record. Derived fields in the
    /// record are only compared against the recomputed ones.
    pub fn from_record(record: &CalibrationRecord) -> Result<Self, RecordError> {
        let left = record.left_camera()?;
        let right = record.right_camera()?;
        if record.translation.iter().any(|v| !v.is_finite()) {
            return Err(RecordError::InvalidField {
                field: "Translation_Vector",
                reason: "non-finite component".into(),
            });
        }
        let rotation = record.rotation_matrix();
        check_rotation(&rotation)?;
        let rig = Self::new(
            left,
            right,
            rotation,
            record.translation_vector(),
            record.image_size,
            record.alpha,
            record.reprojection_error,
        )?;
        rig.check_cached(record);
        Ok(rig)
    }

    fn check_cached(&self, record: &CalibrationRecord) {
        let r = &self.rectification;
        let mut stale = Vec::new();
        let stored3 = [
            ("Essential_Matrix", record.essential, &self.essential),
            ("Fundamental_Matrix", record.fundamental, &self.fundamental),
            ("Rectification_R1", record.r1, &r.r1),
            ("Rectification_R2", record.r2, &r.r2),
        ];
        for (name, stored, fresh) in stored3 {
            if stored.is_some_and(|m| !all_close(rows_mat3(&m).iter(), fresh.iter())) {
                stale.push(name);
            }
        }
        let stored34 = [
            ("Projection_P1", record.p1, &r.p1),
            ("Projection_P2", record.p2, &r.p2),
        ];
        for (name, stored, fresh) in stored34 {
            if stored.is_some_and(|m| !all_close(rows_mat34(&m).iter(), fresh.iter())) {
                stale.push(name);
            }
        }
        if record.q.is_some_and(|m| !all_close(rows_mat4(&m).iter(), r.q.iter())) {
            stale.push("Disparity_Q");
        }
        if record.roi1.is_some_and(|roi| roi != r.roi1) {
            stale.push("Valid_ROI1");
        }
        if record.roi2.is_some_and(|roi| roi != r.roi2) {
            stale.push("Valid_ROI2");
        }
        if !stale.is_empty() {
            warn!(
                "calibration record fields disagree with recomputed values, using recomputed: {}",
                stale.join(", ")
            );
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), RecordError> {
        let path = path.as_ref();
        self.to_record().save(path)?;
        info!("wrote calibration record {}", path.display());
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, RecordError> {
        let path = path.as_ref();
        let rig = Self::from_record(&CalibrationRecord::load(path)?)?;
        info!(
            "loaded calibration record {} (baseline {:.4}, f {:.2})",
            path.display(),
            rig.baseline(),
            rig.rectification.focal_length()
        );
        Ok(rig)
    }
}

fn all_close<'a>(
    a: impl Iterator<Item = &'a f64>,
    b: impl Iterator<Item = &'a f64>,
) -> bool {
    a.zip(b)
        .all(|(x, y)| (x - y).abs() <= RECORD_TOLERANCE * x.abs().max(y.abs()).max(1.0))
}

/// Deviation allowed from `R R^T = I` and `det R = 1`.
const ROTATION_TOL: f64 = 1e-6;

fn check_rotation(r: &Matrix3<f64>) -> Result<(), RecordError> {
    let invalid = |reason: String| RecordError::InvalidField {
        field: "Rotation_Matrix",
        reason,
    };
    if r.iter().any(|v| !v.is_finite()) {
        return Err(invalid("non-finite component".into()));
    }
    let orthogonality = (r * r.transpose() - Matrix3::identity()).norm();
    if orthogonality > ROTATION_TOL {
        return Err(invalid(format!("not orthonormal (|R R^T - I| = {orthogonality:.3e})")));
    }
    let det = r.determinant();
    if (det - 1.0).abs() > ROTATION_TOL {
        return Err(invalid(format!("determinant is {det}, expected 1")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use stereo_recon_core::{Distortion, Intrinsics};

    fn rig() -> StereoRig {
        let left = CameraModel::new(
            Intrinsics::new(712.5, 710.25, 318.0, 242.5),
            Distortion::new(vec![-0.12, 0.03, 0.0005, -0.0003, 0.0]).expect("coeffs"),
        );
        let right = CameraModel::pinhole(Intrinsics::new(705.0, 706.0, 322.0, 238.0));
        StereoRig::new(
            left,
            right,
            Rotation3::from_euler_angles(0.004, -0.012, 0.002).into_inner(),
            Vector3::new(-0.119, 0.0012, -0.0008),
            ImageSize::new(640, 480),
            1.0,
            0.31,
        )
        .expect("rig")
    }

    #[test]
    fn record_roundtrip_recomputes_identical_rig() {
        let rig = rig();
        let record = rig.to_record();
        let back = StereoRig::from_record(&record).expect("from record");
        assert_eq!(back, rig);
        assert_eq!(back.to_record(), record);
    }

    #[test]
    fn record_without_derived_fields_is_accepted() {
        let rig = rig();
        let mut record = rig.to_record();
        record.essential = None;
        record.fundamental = None;
        record.r1 = None;
        record.r2 = None;
        record.p1 = None;
        record.p2 = None;
        record.q = None;
        record.roi1 = None;
        record.roi2 = None;
        let back = StereoRig::from_record(&record).expect("from record");
        assert_eq!(back.rectification(), rig.rectification());
    }

    #[test]
    fn stale_derived_fields_are_replaced() {
        let rig = rig();
        let mut record = rig.to_record();
        if let Some(q) = record.q.as_mut() {
            q[2][3] = 1.0;
        }
        let back = StereoRig::from_record(&record).expect("from record");
        assert_eq!(back.rectification().q, rig.rectification().q);
    }

    #[test]
    fn invalid_distortion_length_is_a_field_error() {
        let mut record = rig().to_record();
        record.camera1_distortion = vec![0.0; 3];
        assert!(matches!(
            StereoRig::from_record(&record),
            Err(RecordError::InvalidField {
                field: "Camera1_Intrinsic",
                ..
            })
        ));
    }

    #[test]
    fn non_rotation_matrix_is_a_field_error() {
        let mut record = rig().to_record();
        record.rotation = [[2.0, 0.0, 0.0], [0.0, 0.5, 0.0], [0.0, 0.0, 3.0]];
        assert!(matches!(
            StereoRig::from_record(&record),
            Err(RecordError::InvalidField {
                field: "Rotation_Matrix",
                ..
            })
        ));

        // A reflection is orthonormal but not a rotation.
        record.rotation = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, -1.0]];
        assert!(StereoRig::from_record(&record).is_err());

        record.rotation[0][0] = f64::NAN;
        assert!(StereoRig::from_record(&record).is_err());
    }

    #[test]
    fn trusted_record_source_needs_no_corners() {
        assert!(!CalibrationSource::TrustedRecord(PathBuf::from("rig.json")).needs_corners());
        assert!(CalibrationSource::Solved.needs_corners());
    }
}
