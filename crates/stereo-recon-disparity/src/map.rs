use stereo_recon_core::ImageSize;

/// Fractional bits of [`RawDisparity`] values.
pub const DISP_SHIFT: u32 = 4;
/// `1 << DISP_SHIFT`.
pub const DISP_SCALE: i32 = 1 << DISP_SHIFT;

/// Disparity in 16x fixed point, as produced by the matchers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDisparity {
    pub width: usize,
    pub height: usize,
    pub data: Vec<i16>,
}

impl RawDisparity {
    /// Marker for cells without a disparity.
    pub const INVALID: i16 = i16::MIN;

    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![Self::INVALID; width * height],
        }
    }

    pub fn size(&self) -> ImageSize {
        ImageSize::new(self.width, self.height)
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> i16 {
        self.data[y * self.width + x]
    }

    pub fn row(&self, y: usize) -> &[i16] {
        &self.data[y * self.width..(y + 1) * self.width]
    }

    pub fn valid_count(&self) -> usize {
        self.data.iter().filter(|&&d| d != Self::INVALID).count()
    }

    /// Rescale to disparity units; invalid cells become NaN.
    pub fn to_disparity_map(&self) -> DisparityMap {
        DisparityMap {
            width: self.width,
            height: self.height,
            data: self
                .data
                .iter()
                .map(|&d| {
                    if d == Self::INVALID {
                        f32::NAN
                    } else {
                        d as f32 / DISP_SCALE as f32
                    }
                })
                .collect(),
        }
    }
}

/// Disparity in pixels; invalid cells hold NaN.
#[derive(Debug, Clone, PartialEq)]
pub struct DisparityMap {
    pub width: usize,
    pub height: usize,
    pub data: Vec<f32>,
}

impl DisparityMap {
    /// A map with every cell invalid.
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![f32::NAN; width * height],
        }
    }

    /// Constant disparity over the whole grid.
    pub fn filled(width: usize, height: usize, value: f32) -> Self {
        Self {
            width,
            height,
            data: vec![value; width * height],
        }
    }

    pub fn size(&self) -> ImageSize {
        ImageSize::new(self.width, self.height)
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.data[y * self.width + x]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, value: f32) {
        self.data[y * self.width + x] = value;
    }

    #[inline]
    pub fn is_valid(&self, x: usize, y: usize) -> bool {
        self.get(x, y).is_finite()
    }

    pub fn valid_count(&self) -> usize {
        self.data.iter().filter(|d| d.is_finite()).count()
    }

    /// Minimum and maximum over finite cells.
    pub fn range(&self) -> Option<(f32, f32)> {
        self.data
            .iter()
            .filter(|d| d.is_finite())
            .fold(None, |acc, &d| match acc {
                None => Some((d, d)),
                Some((lo, hi)) => Some((lo.min(d), hi.max(d))),
            })
    }
}
