use stereo_recon_core::GrayImage;
use stereo_recon_disparity::{
    BlockCost, BlockMatcher, DisparityParams, MatcherKind, QualityWindows, RawDisparity,
    SemiGlobalMatcher, StereoMatcher,
};

fn noise(x: usize, y: usize, seed: u32) -> u8 {
    let mut h = (x as u32).wrapping_mul(374_761_393)
        ^ (y as u32).wrapping_mul(668_265_263)
        ^ seed.wrapping_mul(2_246_822_519);
    h = (h ^ (h >> 13)).wrapping_mul(1_274_126_177);
    (((h ^ (h >> 16)) % 200) + 28) as u8
}

/// Left/right pair of a fronto-parallel textured plane at disparity `shift`.
fn shifted_pair(w: usize, h: usize, shift: usize) -> (GrayImage, GrayImage) {
    let left = GrayImage::from_fn(w, h, |x, y| noise(x + 64, y, 1));
    let right = GrayImage::from_fn(w, h, |x, y| noise(x + 64 + shift, y, 1));
    (left, right)
}

fn flip(img: &GrayImage) -> GrayImage {
    GrayImage::from_fn(img.width, img.height, |x, y| img.get(img.width - 1 - x, y))
}

fn sgm_params() -> DisparityParams {
    DisparityParams {
        num_disparities: 16,
        block_size: 5,
        ..DisparityParams::default()
    }
}

#[test]
fn semi_global_recovers_constant_shift() {
    let (left, right) = shifted_pair(640, 480, 8);
    let sgm = SemiGlobalMatcher::new(sgm_params()).expect("matcher");
    let disp = sgm.compute(&left, &right).expect("disparity");

    let mut valid = 0usize;
    for y in 0..disp.height {
        for x in 0..disp.width {
            let d = disp.get(x, y);
            if d.is_finite() {
                valid += 1;
                assert!((d - 8.0).abs() <= 1.0, "({x}, {y}): {d}");
            }
        }
    }
    // Everything right of the 16 px search band should match.
    let matchable = (640 - 16) * 480;
    assert!(valid * 10 >= matchable * 9, "{valid} of {matchable}");
    assert!(!disp.is_valid(10, 200));
}

#[test]
fn semi_global_quality_presets_have_no_border_outliers() {
    let (left, right) = shifted_pair(640, 480, 8);
    for quality in [1, 3, 5] {
        let params =
            DisparityParams::for_quality(MatcherKind::SemiGlobal, quality, &QualityWindows::default());
        let sgm = SemiGlobalMatcher::new(params).expect("matcher");
        let disp = sgm.compute(&left, &right).expect("disparity");

        let mut valid = 0usize;
        for y in 0..disp.height {
            for x in 0..disp.width {
                let d = disp.get(x, y);
                if d.is_finite() {
                    valid += 1;
                    assert!((d - 8.0).abs() <= 1.0, "quality {quality} ({x}, {y}): {d}");
                }
            }
        }
        assert!(valid > 0, "quality {quality}");
        assert!(!disp.is_valid(639, 240), "quality {quality}");
    }
}

#[test]
fn block_matching_recovers_constant_shift() {
    let (left, right) = shifted_pair(320, 120, 11);
    let params = DisparityParams {
        num_disparities: 32,
        block_size: 15,
        uniqueness_ratio: MatcherKind::BlockMatching.default_uniqueness_ratio(),
        ..DisparityParams::default()
    };
    let bm = BlockMatcher::new(params, BlockCost::Sad).expect("matcher");
    let disp = bm.compute(&left, &right).expect("disparity");
    let (lo, hi) = disp.range().expect("some valid pixels");
    assert!(lo >= 10.0 && hi <= 12.0, "range {lo}..{hi}");
    assert!(disp.valid_count() > 20_000, "{}", disp.valid_count());
}

#[test]
fn semi_global_separates_a_foreground_square() {
    let (w, h) = (200, 120);
    let (fg, bg) = (12usize, 4usize);
    let inside = |x: usize, y: usize| (80..140).contains(&x) && (30..90).contains(&y);
    let left = GrayImage::from_fn(w, h, |x, y| {
        if inside(x, y) {
            noise(x, y, 7)
        } else {
            noise(x, y, 3)
        }
    });
    let right = GrayImage::from_fn(w, h, |x, y| {
        if inside(x + fg, y) {
            noise(x + fg, y, 7)
        } else {
            noise(x + bg, y, 3)
        }
    });
    let sgm = SemiGlobalMatcher::new(DisparityParams {
        num_disparities: 16,
        block_size: 3,
        ..DisparityParams::default()
    })
    .expect("matcher");
    let disp = sgm.compute(&left, &right).expect("disparity");

    let mut checked = 0usize;
    let mut good = 0usize;
    for y in 0..h {
        for x in 24..w - 3 {
            // Stay clear of the depth edges and the occluded strip.
            let near_edge = (72..92).contains(&x) || (128..148).contains(&x);
            let near_row = (26..34).contains(&y) || (86..94).contains(&y);
            if near_edge || ((80..140).contains(&x) && near_row) {
                continue;
            }
            let truth = if inside(x, y) { fg } else { bg } as f32;
            checked += 1;
            if (disp.get(x, y) - truth).abs() <= 1.0 {
                good += 1;
            }
        }
    }
    assert!(good * 100 >= checked * 90, "{good} of {checked}");
}

#[test]
fn surviving_pixels_agree_with_the_right_view() {
    let (left, right) = shifted_pair(160, 64, 6);
    let sgm = SemiGlobalMatcher::new(sgm_params()).expect("matcher");
    let from_left = sgm.compute(&left, &right).expect("left view");
    // Matching the mirrored pair with roles swapped gives the right view.
    let from_right = sgm.compute(&flip(&right), &flip(&left)).expect("right view");

    let max_diff = sgm.params().disp12_max_diff as f32;
    let mut compared = 0;
    for y in 0..from_left.height {
        for x in 0..from_left.width {
            let d = from_left.get(x, y);
            if !d.is_finite() {
                continue;
            }
            let xr = x as i64 - d.round() as i64;
            if xr < 0 {
                continue;
            }
            let mirrored = from_left.width - 1 - xr as usize;
            let dr = from_right.get(mirrored, y);
            if dr.is_finite() {
                compared += 1;
                assert!((d - dr).abs() <= max_diff + 1.0, "({x}, {y}): {d} vs {dr}");
            }
        }
    }
    assert!(compared > 5_000, "{compared}");
}

#[test]
fn results_do_not_depend_on_thread_count() {
    let (left, right) = shifted_pair(200, 80, 5);
    let matchers: Vec<Box<dyn StereoMatcher>> = vec![
        Box::new(SemiGlobalMatcher::new(sgm_params()).expect("sgm")),
        Box::new(
            BlockMatcher::new(
                DisparityParams {
                    block_size: 9,
                    ..sgm_params()
                },
                BlockCost::Ssd,
            )
            .expect("bm"),
        ),
    ];
    fn run(threads: usize, m: &dyn StereoMatcher, left: &GrayImage, right: &GrayImage) -> RawDisparity {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .expect("pool")
            .install(|| m.match_raw(left, right).expect("match"))
    }
    for m in &matchers {
        let single = run(1, m.as_ref(), &left, &right);
        assert_eq!(single, run(4, m.as_ref(), &left, &right), "{}", m.name());
        assert_eq!(single, m.match_raw(&left, &right).expect("match"));
    }
}

#[test]
fn parameters_round_trip_through_json() {
    let params = DisparityParams {
        min_disparity: -8,
        p1: Some(200),
        ..DisparityParams::default()
    };
    let json = serde_json::to_string(&params).expect("serialize");
    let back: DisparityParams = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(back, params);

    let partial: DisparityParams =
        serde_json::from_str(r#"{"num_disparities": 64}"#).expect("partial");
    assert_eq!(partial.num_disparities, 64);
    assert_eq!(partial.block_size, DisparityParams::default().block_size);
}
