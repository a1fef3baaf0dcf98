use nalgebra::{Matrix3, Point2, Vector3};
use stereo_recon_chessboard::{
    detect_stereo_batch, ChessboardDetector, ChessboardParams, CornerRecord,
};
use stereo_recon_core::{CornerSet, GrayImage, Image, PatternSpec, RgbImage};

const SQUARE: f64 = 36.0;

fn board_to_image() -> Matrix3<f64> {
    Matrix3::new(0.95, 0.08, 140.0, -0.05, 0.98, 90.0, 1e-4, 5e-5, 1.0)
}

fn apply(h: &Matrix3<f64>, u: f64, v: f64) -> Point2<f64> {
    let p = h * Vector3::new(u, v, 1.0);
    Point2::new(p.x / p.z, p.y / p.z)
}

/// Checkerboard with `rows x cols` inner corners seen through `h`,
/// on a white background, 4x4 supersampled.
fn render(pattern: &PatternSpec, h: &Matrix3<f64>, width: usize, height: usize) -> GrayImage {
    let inv = h.try_inverse().expect("invertible");
    let (cols, rows) = (pattern.cols as f64, pattern.rows as f64);
    GrayImage::from_fn(width, height, |x, y| {
        let mut acc: f64 = 0.0;
        for sy in 0..4 {
            for sx in 0..4 {
                let px = x as f64 + (sx as f64 + 0.5) / 4.0 - 0.5;
                let py = y as f64 + (sy as f64 + 0.5) / 4.0 - 0.5;
                let b = apply(&inv, px, py);
                let (i, j) = ((b.x / SQUARE).floor(), (b.y / SQUARE).floor());
                let inside = i >= -1.0 && i <= cols - 1.0 && j >= -1.0 && j <= rows - 1.0;
                let dark = inside && (i as i64 + j as i64).rem_euclid(2) == 0;
                acc += if dark { 25.0 } else { 230.0 };
            }
        }
        (acc / 16.0).round() as u8
    })
}

fn truth(pattern: &PatternSpec, h: &Matrix3<f64>) -> Vec<Point2<f64>> {
    (0..pattern.rows)
        .flat_map(|r| (0..pattern.cols).map(move |c| (r, c)))
        .map(|(r, c)| apply(h, c as f64 * SQUARE, r as f64 * SQUARE))
        .collect()
}

fn assert_matches_truth(corners: &CornerSet, expected: &[Point2<f64>]) {
    assert_eq!(corners.len(), expected.len());
    for (k, (got, want)) in corners.points().iter().zip(expected).enumerate() {
        let err = (got - want).norm();
        assert!(err < 0.5, "corner {} off by {:.3} px: {:?} vs {:?}", k, err, got, want);
    }
}

fn pattern() -> PatternSpec {
    PatternSpec::new(5, 7, SQUARE).expect("pattern")
}

#[test]
fn detects_perspective_board_in_row_major_order() {
    let pattern = pattern();
    let h = board_to_image();
    let img = render(&pattern, &h, 520, 400);

    let detector = ChessboardDetector::new(ChessboardParams::for_pattern(pattern)).expect("detector");
    let corners = detector.detect(&img).expect("valid input").expect("board found");
    assert!(corners.matches(&pattern));
    assert_matches_truth(&corners, &truth(&pattern, &h));
}

#[test]
fn inverted_contrast_keeps_ordering() {
    let pattern = pattern();
    let h = board_to_image();
    let mut img = render(&pattern, &h, 520, 400);
    img.data.iter_mut().for_each(|v| *v = 255 - *v);

    let detector = ChessboardDetector::new(ChessboardParams::for_pattern(pattern)).expect("detector");
    let corners = detector.detect(&img).expect("valid input").expect("board found");
    assert_matches_truth(&corners, &truth(&pattern, &h));
}

#[test]
fn coarse_detection_on_color_input_refines_at_full_resolution() {
    let pattern = pattern();
    let h = board_to_image();
    let gray = render(&pattern, &h, 520, 400);
    let rgb = Image::from(RgbImage::from_gray(&gray));

    let mut params = ChessboardParams::for_pattern(pattern);
    params.coarse_scale = 0.5;
    let detector = ChessboardDetector::new(params).expect("detector");
    let corners = detector.detect_image(&rgb).expect("valid input").expect("board found");
    assert_matches_truth(&corners, &truth(&pattern, &h));
}

#[test]
fn larger_pattern_than_visible_is_not_found() {
    let visible = pattern();
    let img = render(&visible, &board_to_image(), 520, 400);
    let wanted = PatternSpec::new(6, 9, SQUARE).expect("pattern");
    let detector = ChessboardDetector::new(ChessboardParams::for_pattern(wanted)).expect("detector");
    assert!(detector.detect(&img).expect("valid input").is_none());
}

#[test]
fn stereo_batch_reports_usable_pairs() {
    let pattern = pattern();
    let h = board_to_image();
    let board = Image::from(render(&pattern, &h, 520, 400));
    let blank = Image::from(GrayImage::from_fn(520, 400, |_, _| 128));

    let left = vec![board.clone(), board.clone(), blank.clone()];
    let right = vec![board.clone(), blank, board];
    let detector = ChessboardDetector::new(ChessboardParams::for_pattern(pattern)).expect("detector");
    let batch = detect_stereo_batch(&detector, &left, &right).expect("batch");

    assert_eq!(batch.usable, vec![0]);
    assert_eq!(batch.left.found, 2);
    assert_eq!(batch.right.found, 2);
    assert_eq!(batch.pairs().count(), 1);
    assert_eq!(CornerRecord::from_stereo(&batch).len(), 4 * pattern.corner_count());
}
