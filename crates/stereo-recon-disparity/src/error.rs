#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DisparityError {
    #[error("left image is {left_w}x{left_h} but right image is {right_w}x{right_h}")]
    SizeMismatch {
        left_w: usize,
        left_h: usize,
        right_w: usize,
        right_h: usize,
    },

    #[error("input image is empty")]
    EmptyImage,

    #[error("invalid matcher parameter: {0}")]
    InvalidParameter(String),
}
