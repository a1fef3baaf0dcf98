use crate::bundle::{
    block_residuals, camera_from_params, camera_param_count, push_camera_params,
    reprojection_residuals, rms, ViewBlocks, POSE_PARAMS,
};
use crate::lm::{SolveReport, TermCriteria};
use crate::mono::{calibrate_views, initial_poses, validate_views, MonoCalibrationParams};
use crate::CalibrationError;
use log::{debug, info};
use nalgebra::{DVector, Matrix3, Rotation3, Vector3};
use serde::{Deserialize, Serialize};
use std::ops::Range;
use stereo_recon_core::{
    skew, CameraModel, CornerSet, DistortionModel, ImageSize, ObjectPoints, Pose,
};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Where the per-camera intrinsics come from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default)]
pub enum IntrinsicsMode {
    /// Trusted cameras; only the relative pose is estimated.
    Fixed {
        left: CameraModel,
        right: CameraModel,
    },
    /// Calibrate each camera from the same corner data first.
    #[default]
    Solve,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StereoCalibrationParams {
    pub intrinsics: IntrinsicsMode,
    /// Also refine both cameras during the joint stereo solve.
    pub refine_intrinsics: bool,
    /// Used for the mono stage and for intrinsics refinement.
    pub mono: MonoCalibrationParams,
    pub criteria: TermCriteria,
}

impl Default for StereoCalibrationParams {
    fn default() -> Self {
        Self {
            intrinsics: IntrinsicsMode::Solve,
            refine_intrinsics: false,
            mono: MonoCalibrationParams::default(),
            criteria: TermCriteria::new(100, 1e-5),
        }
    }
}

#[derive(Clone, Debug)]
pub struct StereoCalibration {
    pub left: CameraModel,
    pub right: CameraModel,
    /// Rotation from left to right camera coordinates.
    pub rotation: Matrix3<f64>,
    /// Translation from left to right camera coordinates (`x_r = R x_l + T`).
    pub translation: Vector3<f64>,
    pub essential: Matrix3<f64>,
    pub fundamental: Matrix3<f64>,
    pub image_size: ImageSize,
    /// RMS over the points of both cameras, in pixels.
    pub rms: f64,
    /// `[left, right]` RMS per view.
    pub per_view_errors: Vec<[f64; 2]>,
    /// Mono RMS of each camera when intrinsics were solved here.
    pub mono_rms: Option<[f64; 2]>,
    pub report: SolveReport,
}

/// `E = [T]x R`
pub fn essential_matrix(rotation: &Matrix3<f64>, translation: &Vector3<f64>) -> Matrix3<f64> {
    skew(translation) * rotation
}

/// `F = K2^-T E K1^-1`, scaled so that `F[2][2] = 1` when it is non-zero.
pub fn fundamental_matrix(
    left: &CameraModel,
    right: &CameraModel,
    essential: &Matrix3<f64>,
) -> Matrix3<f64> {
    let k1_inv = left.intrinsics.matrix().try_inverse().unwrap_or_else(Matrix3::zeros);
    let k2_inv = right.intrinsics.matrix().try_inverse().unwrap_or_else(Matrix3::zeros);
    let f = k2_inv.transpose() * essential * k1_inv;
    let f33 = f[(2, 2)];
    if f33.abs() > f64::EPSILON {
        f / f33
    } else {
        f
    }
}

fn median(values: &mut [f64]) -> f64 {
    values.sort_by(f64::total_cmp);
    let n = values.len();
    if n % 2 == 1 {
        values[n / 2]
    } else {
        0.5 * (values[n / 2 - 1] + values[n / 2])
    }
}

/// Component-wise median of the per-view relative poses.
fn median_relative_pose(left: &[Pose], right: &[Pose]) -> Pose {
    let rel: Vec<[f64; 6]> = left
        .iter()
        .zip(right)
        .map(|(l, r)| r.compose(&l.inverse()).to_params())
        .collect();
    let mut params = [0.0; 6];
    for (i, p) in params.iter_mut().enumerate() {
        let mut column: Vec<f64> = rel.iter().map(|r| r[i]).collect();
        *p = median(&mut column);
    }
    Pose::from_params(&params)
}

/// Layout: `[relative pose | (left camera | right camera) | left poses...]`.
struct StereoBlocks<'a> {
    left_views: &'a [&'a CornerSet],
    right_views: &'a [&'a CornerSet],
    objects: &'a [ObjectPoints],
    left: &'a CameraModel,
    right: &'a CameraModel,
    /// Distortion model of the refined cameras, when refining.
    refine: Option<DistortionModel>,
    offsets: Vec<usize>,
}

impl<'a> StereoBlocks<'a> {
    fn new(
        left_views: &'a [&'a CornerSet],
        right_views: &'a [&'a CornerSet],
        objects: &'a [ObjectPoints],
        left: &'a CameraModel,
        right: &'a CameraModel,
        refine: Option<DistortionModel>,
    ) -> Self {
        let mut offsets = vec![0];
        for object in objects {
            let last = offsets[offsets.len() - 1];
            offsets.push(last + 4 * object.len());
        }
        Self {
            left_views,
            right_views,
            objects,
            left,
            right,
            refine,
            offsets,
        }
    }

    fn camera_params(&self) -> usize {
        self.refine.map_or(0, camera_param_count)
    }

    fn cameras(&self, x: &DVector<f64>) -> (CameraModel, CameraModel) {
        match self.refine {
            Some(model) => {
                let n = camera_param_count(model);
                let p = &x.as_slice()[POSE_PARAMS..];
                (
                    camera_from_params(&p[..n], model),
                    camera_from_params(&p[n..2 * n], model),
                )
            }
            None => (self.left.clone(), self.right.clone()),
        }
    }

    fn relative(&self, x: &DVector<f64>) -> Pose {
        Pose::from_params(&x.as_slice()[..POSE_PARAMS])
    }
}

impl ViewBlocks for StereoBlocks<'_> {
    fn num_globals(&self) -> usize {
        POSE_PARAMS + 2 * self.camera_params()
    }

    fn num_views(&self) -> usize {
        self.objects.len()
    }

    fn view_rows(&self, view: usize) -> Range<usize> {
        self.offsets[view]..self.offsets[view + 1]
    }

    fn eval_view(&self, x: &DVector<f64>, view: usize, out: &mut [f64]) {
        let (left, right) = self.cameras(x);
        let left_pose = self.pose(x, view);
        let right_pose = self.relative(x).compose(&left_pose);
        let object = &self.objects[view];
        let (l_out, r_out) = out.split_at_mut(2 * object.len());
        reprojection_residuals(&left, &left_pose, object, self.left_views[view].points(), l_out);
        reprojection_residuals(&right, &right_pose, object, self.right_views[view].points(), r_out);
    }
}

/// Solve the pose of the right camera relative to the left.
///
/// All three slices are indexed by view. With [`IntrinsicsMode::Solve`] each
/// camera is first calibrated on its own corners.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip(left, right, object_points, params), fields(views = left.len()))
)]
pub fn stereo_calibrate(
    left: &[CornerSet],
    right: &[CornerSet],
    object_points: &[ObjectPoints],
    image_size: ImageSize,
    params: &StereoCalibrationParams,
) -> Result<StereoCalibration, CalibrationError> {
    if left.len() != right.len() {
        return Err(CalibrationError::PointCountMismatch {
            view: left.len().min(right.len()),
            what: "right view list",
            expected: left.len(),
            got: right.len(),
        });
    }
    let left_views: Vec<&CornerSet> = left.iter().collect();
    let right_views: Vec<&CornerSet> = right.iter().collect();
    validate_views(&left_views, object_points, "left corner set")?;
    validate_views(&right_views, object_points, "right corner set")?;

    let (left_cam, right_cam, mono_rms) = match &params.intrinsics {
        IntrinsicsMode::Fixed { left, right } => (left.clone(), right.clone(), None),
        IntrinsicsMode::Solve => {
            let (l, r) = rayon::join(
                || calibrate_views(&left_views, object_points, image_size, &params.mono),
                || calibrate_views(&right_views, object_points, image_size, &params.mono),
            );
            let (l, r) = (l?, r?);
            info!("mono rms: left {:.4} px, right {:.4} px", l.rms, r.rms);
            (l.camera, r.camera, Some([l.rms, r.rms]))
        }
    };

    let left_poses = initial_poses(&left_cam, &left_views, object_points)?;
    let right_poses = initial_poses(&right_cam, &right_views, object_points)?;
    let relative = median_relative_pose(&left_poses, &right_poses);
    debug!(
        "initial relative pose: rvec {:?}, t {:?}",
        relative.rvec().as_slice(),
        relative.translation.as_slice()
    );

    let refine = params.refine_intrinsics.then_some(params.mono.distortion_model);
    let blocks = StereoBlocks::new(
        &left_views,
        &right_views,
        object_points,
        &left_cam,
        &right_cam,
        refine,
    );

    let mut x0 = Vec::with_capacity(blocks.num_globals() + POSE_PARAMS * left_poses.len());
    x0.extend_from_slice(&relative.to_params());
    if let Some(model) = refine {
        push_camera_params(&left_cam, model, &mut x0);
        push_camera_params(&right_cam, model, &mut x0);
    }
    for pose in &left_poses {
        x0.extend_from_slice(&pose.to_params());
    }
    let (x, report) = crate::lm::refine(&blocks, DVector::from_vec(x0), &params.criteria)?;
    if x.iter().any(|v| !v.is_finite()) {
        return Err(CalibrationError::NonConvergence(
            "stereo refinement produced non-finite parameters".into(),
        ));
    }

    let (left_cam, right_cam) = blocks.cameras(&x);
    let relative = blocks.relative(&x);
    let rotation = relative.rotation.into_inner();
    let translation = relative.translation;
    if translation.norm() <= f64::EPSILON {
        return Err(CalibrationError::NonConvergence("baseline collapsed to zero".into()));
    }

    let residuals = block_residuals(&blocks, &x);
    let residuals = residuals.as_slice();
    let per_view_errors = (0..blocks.num_views())
        .map(|v| {
            let rows = &residuals[blocks.view_rows(v)];
            let (l, r) = rows.split_at(rows.len() / 2);
            [rms(l), rms(r)]
        })
        .collect();
    let total = rms(residuals);

    let essential = essential_matrix(&rotation, &translation);
    let fundamental = fundamental_matrix(&left_cam, &right_cam, &essential);
    info!(
        "stereo calibration: {} views, rms {:.4} px, baseline {:.4} ({:?})",
        blocks.num_views(),
        total,
        translation.norm(),
        report.termination
    );

    Ok(StereoCalibration {
        left: left_cam,
        right: right_cam,
        rotation,
        translation,
        essential,
        fundamental,
        image_size,
        rms: total,
        per_view_errors,
        mono_rms,
        report,
    })
}

impl StereoCalibration {
    /// Left-to-right camera transform.
    pub fn relative_pose(&self) -> Pose {
        Pose::new(Rotation3::from_matrix_unchecked(self.rotation), self.translation)
    }
}
