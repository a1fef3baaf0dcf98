use approx::assert_relative_eq;
use nalgebra::{Matrix3, Vector3};
use std::fs;
use stereo_recon_calib::StereoRig;
use stereo_recon_cloud::{reproject_to_3d, PointCloudFormat, WriteOptions};
use stereo_recon_core::{CameraModel, GrayImage, ImageSize, Intrinsics};
use stereo_recon_disparity::DisparityMap;

fn ideal_rig() -> StereoRig {
    let cam = CameraModel::pinhole(Intrinsics::new(700.0, 700.0, 320.0, 240.0));
    StereoRig::new(
        cam.clone(),
        cam,
        Matrix3::identity(),
        Vector3::new(-0.12, 0.0, 0.0),
        ImageSize::new(640, 480),
        0.0,
        0.0,
    )
    .expect("rig")
}

#[test]
fn constant_disparity_gives_constant_depth() {
    let rig = ideal_rig();
    let rect = rig.rectification();
    let mut disp = DisparityMap::new(640, 480);
    for y in 100..300 {
        for x in 200..400 {
            disp.set(x, y, 8.0);
        }
    }
    let cloud = reproject_to_3d(&disp, &rect.q);
    let expected = rig.baseline() * rect.focal_length() / 8.0;
    assert_eq!(cloud.finite_count(), 200 * 200);
    for (p, _) in cloud.iter_finite() {
        assert_relative_eq!(p[2] as f64, expected, max_relative = 1e-5);
    }
    assert!(!cloud.point(10, 10)[2].is_finite());
}

#[test]
fn written_ply_matches_the_finite_points() {
    let rig = ideal_rig();
    let mut disp = DisparityMap::new(64, 48);
    for y in 0..48 {
        for x in (y % 3)..64 {
            disp.set(x, y, 4.0 + (x % 5) as f32);
        }
    }
    let gray = GrayImage::from_fn(64, 48, |x, y| (x * 3 + y) as u8);
    let cloud = reproject_to_3d(&disp, &rig.rectification().q)
        .with_colors(&gray.into())
        .expect("colors");

    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir
        .path()
        .join(format!("point_cloud.{}", PointCloudFormat::Ply.extension()));
    let written = cloud.write(&path, &WriteOptions::default()).expect("write");
    assert_eq!(written, cloud.finite_count());

    let text = fs::read_to_string(&path).expect("read back");
    let (header, body) = text.split_once("end_header\n").expect("header");
    assert!(header.contains(&format!("element vertex {written}\n")));
    let lines: Vec<_> = body.lines().collect();
    assert_eq!(lines.len(), written);
    for line in lines {
        let fields: Vec<_> = line.split(' ').collect();
        assert_eq!(fields.len(), 6, "{line}");
        for v in &fields[..3] {
            assert!(v.parse::<f32>().expect("float").is_finite());
        }
        for c in &fields[3..] {
            c.parse::<u8>().expect("color");
        }
    }
}
