use criterion::{black_box, criterion_group, criterion_main, Criterion};
use stereo_recon_core::GrayImage;
use stereo_recon_disparity::{
    filter_speckles, BlockCost, BlockMatcher, DisparityParams, SemiGlobalMatcher, StereoMatcher,
};

fn noise(x: usize, y: usize) -> u8 {
    let mut h = (x as u32).wrapping_mul(374_761_393) ^ (y as u32).wrapping_mul(668_265_263);
    h = (h ^ (h >> 13)).wrapping_mul(1_274_126_177);
    (((h ^ (h >> 16)) % 200) + 28) as u8
}

fn pair(w: usize, h: usize, shift: usize) -> (GrayImage, GrayImage) {
    (
        GrayImage::from_fn(w, h, |x, y| noise(x + 32, y)),
        GrayImage::from_fn(w, h, |x, y| noise(x + 32 + shift, y)),
    )
}

fn bench_block_matching(c: &mut Criterion) {
    let (left, right) = pair(640, 480, 20);
    let params = DisparityParams {
        num_disparities: 64,
        block_size: 15,
        ..DisparityParams::default()
    };
    let bm = BlockMatcher::new(params, BlockCost::Sad).expect("matcher");
    c.bench_function("block_matching_640x480_64d", |b| {
        b.iter(|| bm.match_raw(black_box(&left), black_box(&right)).expect("match"))
    });
}

fn bench_semi_global(c: &mut Criterion) {
    let (left, right) = pair(640, 480, 20);
    let params = DisparityParams {
        num_disparities: 64,
        block_size: 5,
        ..DisparityParams::default()
    };
    let sgm = SemiGlobalMatcher::new(params).expect("matcher");
    let mut group = c.benchmark_group("semi_global");
    group.sample_size(10);
    group.bench_function("640x480_64d", |b| {
        b.iter(|| sgm.match_raw(black_box(&left), black_box(&right)).expect("match"))
    });
    group.finish();
}

fn bench_speckles(c: &mut Criterion) {
    let (left, right) = pair(640, 480, 20);
    let params = DisparityParams {
        num_disparities: 32,
        block_size: 3,
        ..DisparityParams::default()
    };
    let raw = SemiGlobalMatcher::new(params)
        .expect("matcher")
        .match_raw(&left, &right)
        .expect("match");
    c.bench_function("speckles_640x480", |b| {
        b.iter(|| {
            let mut disp = raw.clone();
            filter_speckles(black_box(&mut disp), 100, 32 * 16)
        })
    });
}

criterion_group!(benches, bench_block_matching, bench_semi_global, bench_speckles);
criterion_main!(benches);
