use crate::DisparityError;
use serde::{Deserialize, Serialize};

/// Matching strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatcherKind {
    /// Local window matching on the prefiltered images.
    BlockMatching,
    /// Semi-global matching along 8 paths.
    #[default]
    SemiGlobal,
}

impl MatcherKind {
    /// Default uniqueness margin in percent.
    pub fn default_uniqueness_ratio(&self) -> u32 {
        match self {
            MatcherKind::BlockMatching => 15,
            MatcherKind::SemiGlobal => 10,
        }
    }
}

/// Window cost of the block matcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockCost {
    /// Sum of absolute differences.
    #[default]
    Sad,
    /// Sum of squared differences.
    Ssd,
}

/// Block sizes per quality band: `[q <= 2, q <= 4, q > 4]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct QualityWindows {
    pub semi_global: [usize; 3],
    pub block_matching: [usize; 3],
}

impl Default for QualityWindows {
    fn default() -> Self {
        Self {
            semi_global: [3, 5, 7],
            block_matching: [15, 21, 25],
        }
    }
}

impl QualityWindows {
    pub fn block_size(&self, kind: MatcherKind, quality: u32) -> usize {
        let band = match quality {
            0..=2 => 0,
            3..=4 => 1,
            _ => 2,
        };
        match kind {
            MatcherKind::SemiGlobal => self.semi_global[band],
            MatcherKind::BlockMatching => self.block_matching[band],
        }
    }
}

/// Largest semi-global penalty; path costs are accumulated in `u16`.
pub const MAX_PENALTY: u32 = u16::MAX as u32;

/// Parameters shared by both matchers.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DisparityParams {
    pub min_disparity: i32,
    /// Search range; rounded up to a multiple of 16.
    pub num_disparities: usize,
    /// Odd side of the matching window.
    pub block_size: usize,
    /// Maximum left-right disagreement in whole pixels; negative disables the check.
    pub disp12_max_diff: i32,
    /// Largest connected region (in pixels) removed as a speckle; 0 disables.
    pub speckle_window_size: usize,
    /// Maximum disparity step inside one speckle region, in pixels.
    pub speckle_range: i32,
    /// Clamp of the x-Sobel prefilter.
    pub prefilter_cap: i32,
    /// Margin in percent by which the best cost must beat the others.
    pub uniqueness_ratio: u32,
    /// Block matching only: minimum summed gradient in the window.
    pub texture_threshold: u32,
    /// Semi-global penalty for a disparity change of 1; defaults to `8 * bs^2`.
    pub p1: Option<u32>,
    /// Semi-global penalty for larger changes; defaults to `32 * bs^2`.
    pub p2: Option<u32>,
}

impl Default for DisparityParams {
    fn default() -> Self {
        Self {
            min_disparity: 0,
            num_disparities: 96,
            block_size: 5,
            disp12_max_diff: 1,
            speckle_window_size: 100,
            speckle_range: 32,
            prefilter_cap: 63,
            uniqueness_ratio: 10,
            texture_threshold: 10,
            p1: None,
            p2: None,
        }
    }
}

impl DisparityParams {
    /// Defaults for `kind` with the block size picked from the quality level.
    pub fn for_quality(kind: MatcherKind, quality: u32, windows: &QualityWindows) -> Self {
        Self {
            block_size: windows.block_size(kind, quality),
            uniqueness_ratio: kind.default_uniqueness_ratio(),
            ..Self::default()
        }
    }

    pub fn disparity_count(&self) -> usize {
        self.num_disparities.div_ceil(16) * 16
    }

    /// Largest searched disparity (inclusive).
    pub fn max_disparity(&self) -> i32 {
        self.min_disparity + self.disparity_count() as i32 - 1
    }

    /// Single-channel penalties `(P1, P2)`, with `P1 < P2 <= MAX_PENALTY`.
    pub fn penalties(&self) -> (u32, u32) {
        let area = (self.block_size * self.block_size) as u32;
        let p1 = self.p1.unwrap_or(8 * area).min(MAX_PENALTY - 1);
        let p2 = self.p2.unwrap_or(32 * area).clamp(p1 + 1, MAX_PENALTY);
        (p1, p2)
    }

    pub fn validate(&self) -> Result<(), DisparityError> {
        let invalid = |msg: String| Err(DisparityError::InvalidParameter(msg));
        if self.num_disparities == 0 {
            return invalid("num_disparities must be positive".into());
        }
        if self.block_size == 0 || self.block_size % 2 == 0 || self.block_size > 255 {
            return invalid(format!("block_size must be odd and in 1..=255 (got {})", self.block_size));
        }
        if !(1..=63).contains(&self.prefilter_cap) {
            return invalid(format!("prefilter_cap must be in 1..=63 (got {})", self.prefilter_cap));
        }
        if self.uniqueness_ratio > 100 {
            return invalid(format!("uniqueness_ratio must be <= 100 (got {})", self.uniqueness_ratio));
        }
        if self.speckle_range < 0 {
            return invalid(format!("speckle_range must be >= 0 (got {})", self.speckle_range));
        }
        if let Some(p1) = self.p1.filter(|&p1| p1 >= MAX_PENALTY) {
            return invalid(format!("p1 must be < {MAX_PENALTY} (got {p1})"));
        }
        if let Some(p2) = self.p2.filter(|&p2| p2 > MAX_PENALTY) {
            return invalid(format!("p2 must be <= {MAX_PENALTY} (got {p2})"));
        }
        if let (Some(p1), Some(p2)) = (self.p1, self.p2) {
            if p2 <= p1 {
                return invalid(format!("p2 must exceed p1 (got p1={p1}, p2={p2})"));
            }
        }
        if self.max_disparity() > i16::MAX as i32 / 16 || self.min_disparity < i16::MIN as i32 / 16 + 1 {
            return invalid("disparity range does not fit 16x fixed point".into());
        }
        Ok(())
    }
}
