use stereo_recon_core::CoreError;

/// Input errors of the detector. Not finding the pattern is not an error.
#[derive(thiserror::Error, Debug)]
pub enum ChessboardError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("image {width}x{height} is too small for a {rows}x{cols} pattern")]
    ImageTooSmall {
        width: usize,
        height: usize,
        rows: usize,
        cols: usize,
    },

    #[error("adaptive threshold block size must be odd and >= 3 (got {0})")]
    InvalidBlockSize(usize),

    #[error("coarse scale must lie in (0, 1] (got {0})")]
    InvalidScale(f32),

    #[error("left and right batches differ in length ({left} vs {right})")]
    BatchLengthMismatch { left: usize, right: usize },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
