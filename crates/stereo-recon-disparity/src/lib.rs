//! Dense disparity estimation for rectified stereo pairs.
//!
//! Two strategies share one parameter set and one post-filter chain:
//!
//! - [`BlockMatcher`]: SAD/SSD window matching on x-Sobel prefiltered images
//!   with texture and uniqueness checks.
//! - [`SemiGlobalMatcher`]: block-summed pixel costs aggregated along 8
//!   paths with the P1/P2 smoothness penalties.
//!
//! Both produce 16x fixed-point disparities ([`RawDisparity`]), reject
//! pixels failing the left-right consistency check and drop small speckles
//! before rescaling to a [`DisparityMap`] with NaN for invalid cells. All
//! arithmetic is integer, so results do not depend on the thread count.
//!
//! ```no_run
//! use stereo_recon_disparity::{BlockCost, DisparityParams, MatcherKind, QualityWindows};
//! # fn demo(left: &stereo_recon_core::GrayImage, right: &stereo_recon_core::GrayImage)
//! #     -> Result<(), stereo_recon_disparity::DisparityError> {
//! let kind = MatcherKind::SemiGlobal;
//! let params = DisparityParams::for_quality(kind, 3, &QualityWindows::default());
//! let disparity = kind.matcher(params, BlockCost::Sad)?.compute(left, right)?;
//! println!("{} valid pixels", disparity.valid_count());
//! # Ok(())
//! # }
//! ```

mod block_matching;
mod error;
mod map;
mod matcher;
mod params;
mod postfilter;
mod prefilter;
mod sgm;

pub use block_matching::BlockMatcher;
pub use error::DisparityError;
pub use map::{DisparityMap, RawDisparity, DISP_SCALE, DISP_SHIFT};
pub use matcher::StereoMatcher;
pub use params::{BlockCost, DisparityParams, MatcherKind, QualityWindows, MAX_PENALTY};
pub use postfilter::filter_speckles;
pub use prefilter::xsobel_capped;
pub use sgm::SemiGlobalMatcher;
