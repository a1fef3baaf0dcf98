use crate::postfilter::filter_speckles;
use crate::{
    BlockCost, BlockMatcher, DisparityError, DisparityMap, DisparityParams, MatcherKind,
    RawDisparity, SemiGlobalMatcher, DISP_SCALE,
};
use log::debug;
use stereo_recon_core::GrayImage;

/// A dense stereo correspondence strategy over rectified, row-aligned images.
pub trait StereoMatcher: Send + Sync {
    fn name(&self) -> &'static str;

    fn params(&self) -> &DisparityParams;

    /// 16x fixed-point disparity of the left image, left-right checked but
    /// not speckle filtered.
    fn match_raw(&self, left: &GrayImage, right: &GrayImage) -> Result<RawDisparity, DisparityError>;

    /// Full pipeline: match, remove speckles, rescale to pixels.
    fn compute(&self, left: &GrayImage, right: &GrayImage) -> Result<DisparityMap, DisparityError> {
        let mut raw = self.match_raw(left, right)?;
        let p = self.params();
        let removed = filter_speckles(&mut raw, p.speckle_window_size, p.speckle_range * DISP_SCALE);
        debug!("{}: removed {} speckle pixels", self.name(), removed);
        Ok(raw.to_disparity_map())
    }
}

pub(crate) fn check_pair(left: &GrayImage, right: &GrayImage) -> Result<(), DisparityError> {
    if left.is_empty() || right.is_empty() {
        return Err(DisparityError::EmptyImage);
    }
    if left.size() != right.size() {
        return Err(DisparityError::SizeMismatch {
            left_w: left.width,
            left_h: left.height,
            right_w: right.width,
            right_h: right.height,
        });
    }
    Ok(())
}

impl MatcherKind {
    /// Build the matcher this kind names. `cost` only applies to block matching.
    pub fn matcher(
        &self,
        params: DisparityParams,
        cost: BlockCost,
    ) -> Result<Box<dyn StereoMatcher>, DisparityError> {
        Ok(match self {
            MatcherKind::BlockMatching => Box::new(BlockMatcher::new(params, cost)?),
            MatcherKind::SemiGlobal => Box::new(SemiGlobalMatcher::new(params)?),
        })
    }
}
