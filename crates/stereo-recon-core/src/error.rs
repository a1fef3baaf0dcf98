/// Errors produced when constructing core value types.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    #[error("invalid image buffer length (expected {expected} bytes, got {got})")]
    InvalidImageBuffer { expected: usize, got: usize },

    #[error("invalid image dimensions (width={width}, height={height})")]
    InvalidImageDimensions { width: usize, height: usize },

    #[error("distortion vector must hold 4, 5 or 8 coefficients (got {0})")]
    InvalidDistortionLength(usize),

    #[error("invalid pattern {rows}x{cols} with square size {square_size}")]
    InvalidPattern {
        rows: usize,
        cols: usize,
        square_size: f64,
    },

    #[error("corner set holds {got} points, pattern expects {expected}")]
    CornerCountMismatch { expected: usize, got: usize },
}
