use std::io;

#[derive(thiserror::Error, Debug)]
pub enum CloudError {
    #[error("image is {image_w}x{image_h}, point cloud is {cloud_w}x{cloud_h}")]
    SizeMismatch {
        cloud_w: usize,
        cloud_h: usize,
        image_w: usize,
        image_h: usize,
    },

    #[error("left image is {left_w}x{left_h}, right image is {right_w}x{right_h}")]
    PairSizeMismatch {
        left_w: usize,
        left_h: usize,
        right_w: usize,
        right_h: usize,
    },

    #[error("depth range [{min}, {max}] is empty or not finite")]
    InvalidDepthRange { min: f32, max: f32 },

    #[error(transparent)]
    Io(#[from] io::Error),
}
