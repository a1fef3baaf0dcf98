use crate::bundle::{
    block_residuals, camera_from_params, camera_param_count, push_camera_params,
    reprojection_residuals, rms, ViewBlocks, POSE_PARAMS,
};
use crate::lm::{refine, SolveReport, TermCriteria};
use crate::init::{centered_intrinsics, pose_from_homography, zhang_intrinsics};
use crate::CalibrationError;
use log::{debug, info};
use nalgebra::{DVector, Matrix3, Point2, Point3};
use serde::{Deserialize, Serialize};
use std::ops::Range;
use stereo_recon_core::{
    estimate_homography, CameraModel, CornerSet, Distortion, DistortionModel, ImageSize,
    Intrinsics, ObjectPoints, Pose,
};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Minimum correspondences per view for a homography.
pub(crate) const MIN_POINTS_PER_VIEW: usize = 4;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonoCalibrationParams {
    pub distortion_model: DistortionModel,
    pub criteria: TermCriteria,
}

impl Default for MonoCalibrationParams {
    fn default() -> Self {
        Self {
            distortion_model: DistortionModel::Standard,
            criteria: TermCriteria::default(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct MonoCalibration {
    pub camera: CameraModel,
    pub image_size: ImageSize,
    /// RMS reprojection error over all points, in pixels.
    pub rms: f64,
    pub per_view_errors: Vec<f64>,
    /// Pattern-to-camera pose of each view.
    pub poses: Vec<Pose>,
    pub report: SolveReport,
}

/// Check view/point cardinalities shared by mono and stereo calibration.
pub(crate) fn validate_views(
    views: &[&CornerSet],
    objects: &[ObjectPoints],
    what: &'static str,
) -> Result<(), CalibrationError> {
    if views.is_empty() {
        return Err(CalibrationError::EmptyInput);
    }
    if views.len() != objects.len() {
        return Err(CalibrationError::PointCountMismatch {
            view: views.len().min(objects.len()),
            what: "view list",
            expected: objects.len(),
            got: views.len(),
        });
    }
    for (i, (corners, object)) in views.iter().zip(objects).enumerate() {
        if corners.len() != object.len() {
            return Err(CalibrationError::PointCountMismatch {
                view: i,
                what,
                expected: object.len(),
                got: corners.len(),
            });
        }
        if object.len() < MIN_POINTS_PER_VIEW {
            return Err(CalibrationError::TooFewPoints {
                view: i,
                got: object.len(),
                min: MIN_POINTS_PER_VIEW,
            });
        }
        if object.iter().any(|p| p.z.abs() > 1e-9) {
            return Err(CalibrationError::DegenerateInitialization(format!(
                "view {} object points are not on the Z = 0 plane",
                i
            )));
        }
    }
    Ok(())
}

fn plane_coords(object: &[Point3<f64>]) -> Vec<Point2<f64>> {
    object.iter().map(|p| Point2::new(p.x, p.y)).collect()
}

/// Pattern-plane to pixel homographies, one per view.
fn view_homographies(
    views: &[&CornerSet],
    objects: &[ObjectPoints],
) -> Result<Vec<Matrix3<f64>>, CalibrationError> {
    views
        .iter()
        .zip(objects)
        .enumerate()
        .map(|(i, (corners, object))| {
            estimate_homography(&plane_coords(object), corners.points())
                .map(|h| h.h)
                .ok_or_else(|| {
                    CalibrationError::DegenerateInitialization(format!("view {} homography failed", i))
                })
        })
        .collect()
}

/// Pose of each view for a known camera: undistort the corners, then
/// decompose the normalized homography.
pub(crate) fn initial_poses(
    camera: &CameraModel,
    views: &[&CornerSet],
    objects: &[ObjectPoints],
) -> Result<Vec<Pose>, CalibrationError> {
    let unit = Intrinsics::new(1.0, 1.0, 0.0, 0.0);
    views
        .iter()
        .zip(objects)
        .enumerate()
        .map(|(i, (corners, object))| {
            let normalized: Vec<Point2<f64>> = corners
                .points()
                .iter()
                .map(|p| Point2::from(camera.undistort_point(p)))
                .collect();
            estimate_homography(&plane_coords(object), &normalized)
                .and_then(|h| pose_from_homography(&unit, &h.h))
                .ok_or_else(|| {
                    CalibrationError::DegenerateInitialization(format!("view {} pose failed", i))
                })
        })
        .collect()
}

struct MonoBlocks<'a> {
    views: &'a [&'a CornerSet],
    objects: &'a [ObjectPoints],
    model: DistortionModel,
    offsets: Vec<usize>,
}

impl<'a> MonoBlocks<'a> {
    fn new(views: &'a [&'a CornerSet], objects: &'a [ObjectPoints], model: DistortionModel) -> Self {
        let mut offsets = vec![0];
        for object in objects {
            let last = offsets[offsets.len() - 1];
            offsets.push(last + 2 * object.len());
        }
        Self {
            views,
            objects,
            model,
            offsets,
        }
    }
}

impl ViewBlocks for MonoBlocks<'_> {
    fn num_globals(&self) -> usize {
        camera_param_count(self.model)
    }

    fn num_views(&self) -> usize {
        self.views.len()
    }

    fn view_rows(&self, view: usize) -> Range<usize> {
        self.offsets[view]..self.offsets[view + 1]
    }

    fn eval_view(&self, x: &DVector<f64>, view: usize, out: &mut [f64]) {
        let camera = camera_from_params(&x.as_slice()[..self.num_globals()], self.model);
        let pose = self.pose(x, view);
        reprojection_residuals(
            &camera,
            &pose,
            &self.objects[view],
            self.views[view].points(),
            out,
        );
    }
}

/// Calibrate one camera from planar pattern views.
///
/// `image_points[i]` must hold the detections of `object_points[i]`, point
/// for point. The result always carries the achieved RMS; judging whether it
/// is good enough is left to the caller.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip(image_points, object_points, params), fields(views = image_points.len()))
)]
pub fn calibrate_camera(
    image_points: &[CornerSet],
    object_points: &[ObjectPoints],
    image_size: ImageSize,
    params: &MonoCalibrationParams,
) -> Result<MonoCalibration, CalibrationError> {
    let views: Vec<&CornerSet> = image_points.iter().collect();
    calibrate_views(&views, object_points, image_size, params)
}

pub(crate) fn calibrate_views(
    views: &[&CornerSet],
    objects: &[ObjectPoints],
    image_size: ImageSize,
    params: &MonoCalibrationParams,
) -> Result<MonoCalibration, CalibrationError> {
    validate_views(views, objects, "corner set")?;
    let model = params.distortion_model;

    let homographies = view_homographies(views, objects)?;
    let intrinsics = if homographies.len() >= 3 {
        zhang_intrinsics(&homographies).or_else(|| centered_intrinsics(&homographies, image_size))
    } else {
        centered_intrinsics(&homographies, image_size)
    }
    .ok_or_else(|| CalibrationError::DegenerateInitialization("no valid focal length".into()))?;
    debug!(
        "initial intrinsics fx={:.2} fy={:.2} cx={:.2} cy={:.2}",
        intrinsics.fx, intrinsics.fy, intrinsics.cx, intrinsics.cy
    );

    let initial = CameraModel::new(intrinsics, Distortion::zero(model));
    let poses = initial_poses(&initial, views, objects)?;

    let blocks = MonoBlocks::new(views, objects, model);
    let mut x0 = Vec::with_capacity(blocks.num_globals() + POSE_PARAMS * views.len());
    push_camera_params(&initial, model, &mut x0);
    for pose in &poses {
        x0.extend_from_slice(&pose.to_params());
    }
    let (x, report) = refine(&blocks, DVector::from_vec(x0), &params.criteria)?;

    let camera = camera_from_params(&x.as_slice()[..blocks.num_globals()], model);
    let k = &camera.intrinsics;
    if !(k.fx > 0.0 && k.fy > 0.0) || x.iter().any(|v| !v.is_finite()) {
        return Err(CalibrationError::NonConvergence(format!(
            "refinement left invalid intrinsics fx={} fy={}",
            k.fx, k.fy
        )));
    }

    let residuals = block_residuals(&blocks, &x);
    let residuals = residuals.as_slice();
    let per_view_errors: Vec<f64> = (0..views.len())
        .map(|v| rms(&residuals[blocks.view_rows(v)]))
        .collect();
    let poses = (0..views.len()).map(|v| blocks.pose(&x, v)).collect();
    let total = rms(residuals);
    info!(
        "mono calibration: {} views, rms {:.4} px ({:?} after {} evaluations)",
        views.len(),
        total,
        report.termination,
        report.evaluations
    );

    Ok(MonoCalibration {
        camera,
        image_size,
        rms: total,
        per_view_errors,
        poses,
        report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use stereo_recon_core::PatternSpec;

    #[test]
    fn empty_and_mismatched_input_are_errors() {
        let params = MonoCalibrationParams::default();
        let size = ImageSize::new(640, 480);
        assert!(matches!(
            calibrate_camera(&[], &[], size, &params),
            Err(CalibrationError::EmptyInput)
        ));

        let pattern = PatternSpec::new(3, 4, 0.02).expect("pattern");
        let corners = CornerSet::new(2, 2, vec![Point2::origin(); 4]).expect("corners");
        let err = calibrate_camera(&[corners], &[pattern.object_points()], size, &params).unwrap_err();
        assert!(matches!(
            err,
            CalibrationError::PointCountMismatch {
                view: 0,
                expected: 12,
                got: 4,
                ..
            }
        ));
    }
}
