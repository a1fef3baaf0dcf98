use nalgebra::{Matrix3, Vector3};
use stereo_recon::calib::{CalibrationSource, StereoRig};
use stereo_recon::core::{CameraModel, GrayImage, Image, ImageSize, Intrinsics};
use stereo_recon::disparity::DisparityParams;
use stereo_recon::{io, reconstruct, rig_from_source, write_outputs, ReconstructConfig, ReconstructError};

const FOCAL: f64 = 500.0;
const BASELINE: f64 = 0.1;

fn noise(x: usize, y: usize) -> u8 {
    let mut h = (x as u32).wrapping_mul(374_761_393) ^ (y as u32).wrapping_mul(668_265_263);
    h = (h ^ (h >> 13)).wrapping_mul(1_274_126_177);
    (((h ^ (h >> 16)) % 200) + 28) as u8
}

fn ideal_rig(width: usize, height: usize) -> StereoRig {
    let cam = CameraModel::pinhole(Intrinsics::new(
        FOCAL,
        FOCAL,
        (width as f64 - 1.0) / 2.0,
        (height as f64 - 1.0) / 2.0,
    ));
    StereoRig::new(
        cam.clone(),
        cam,
        Matrix3::identity(),
        Vector3::new(-BASELINE, 0.0, 0.0),
        ImageSize::new(width, height),
        1.0,
        0.0,
    )
    .expect("rig")
}

fn shifted_pair(width: usize, height: usize, shift: usize) -> (Image, Image) {
    let left = GrayImage::from_fn(width, height, |x, y| noise(x + 40, y));
    let right = GrayImage::from_fn(width, height, |x, y| noise(x + 40 + shift, y));
    (left.into(), right.into())
}

fn config() -> ReconstructConfig {
    ReconstructConfig {
        disparity: Some(DisparityParams {
            num_disparities: 16,
            block_size: 5,
            ..DisparityParams::default()
        }),
        ..ReconstructConfig::default()
    }
}

#[test]
fn shifted_pair_reconstructs_a_fronto_parallel_plane() {
    let rig = ideal_rig(640, 480);
    let (left, right) = shifted_pair(640, 480, 8);
    let result = reconstruct(&rig, &left, &right, &config()).expect("reconstruct");

    let disp = &result.disparity;
    let valid: Vec<f32> = disp.data.iter().copied().filter(|d| d.is_finite()).collect();
    assert!(valid.len() * 10 >= (640 - 16) * 480 * 9, "{} valid", valid.len());
    assert!(valid.iter().all(|d| (d - 8.0).abs() <= 1.0));

    let expected = (BASELINE * FOCAL / 8.0) as f32;
    let mut depths: Vec<f32> = result.cloud.iter_finite().map(|(p, _)| p[2]).collect();
    assert_eq!(depths.len(), valid.len());
    depths.sort_by(f32::total_cmp);
    let median = depths[depths.len() / 2];
    assert!((median - expected).abs() < 0.02 * expected, "median {median}");
    let bound = (BASELINE * FOCAL) as f32;
    assert!(depths.iter().all(|&z| z >= 0.99 * bound / 9.0 && z <= 1.01 * bound / 7.0));

    assert_eq!(result.cloud.size(), disp.size());
    assert!(result.cloud.colors.is_some());
    assert_eq!(result.depth_visualization.size(), disp.size());
}

#[test]
fn trusted_record_drives_the_written_outputs() {
    let dir = tempfile::tempdir().expect("tempdir");
    let record = dir.path().join("calibration.json");
    let rig = ideal_rig(200, 120);
    rig.save(&record).expect("save record");

    let loaded = rig_from_source(Some(&CalibrationSource::TrustedRecord(record))).expect("load");
    assert_eq!(loaded, rig);

    let (left, right) = shifted_pair(200, 120, 6);
    let cfg = config();
    let result = reconstruct(&loaded, &left, &right, &cfg).expect("reconstruct");
    let out = dir.path().join("out");
    let files = write_outputs(&result, &out, &cfg.outputs, &cfg.cloud).expect("write");
    let names: Vec<_> = files
        .iter()
        .filter_map(|p| p.file_name()?.to_str().map(String::from))
        .collect();
    assert_eq!(
        names,
        [
            "rectified_left.png",
            "rectified_right.png",
            "depth_map.png",
            "residual_map.png",
            "point_cloud.ply"
        ]
    );

    let depth = io::load_image(out.join("depth_map.png")).expect("depth png");
    assert_eq!(depth.size(), ImageSize::new(200, 120));
    assert_eq!(depth.channels(), 3);

    let ply = std::fs::read_to_string(out.join("point_cloud.ply")).expect("ply");
    let declared = format!("element vertex {}\n", result.cloud.finite_count());
    assert!(ply.contains(&declared));
    assert!(ply.contains("property uchar red\n"));
}

#[test]
fn pair_must_match_the_calibrated_size() {
    let rig = ideal_rig(200, 120);
    let (left, right) = shifted_pair(100, 60, 3);
    let err = reconstruct(&rig, &left, &right, &config()).unwrap_err();
    assert!(matches!(err, ReconstructError::ImageSizeMismatch { .. }), "{err}");
}
