use stereo_recon_core::{CoreError, JsonIoError};

#[derive(thiserror::Error, Debug)]
pub enum CalibrationError {
    #[error("no calibration views supplied")]
    EmptyInput,

    #[error("view {view}: {what} has {got} entries, expected {expected}")]
    PointCountMismatch {
        view: usize,
        what: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("view {view} has only {got} points (need at least {min})")]
    TooFewPoints { view: usize, got: usize, min: usize },

    #[error("degenerate initialization: {0}")]
    DegenerateInitialization(String),

    #[error("optimization did not converge: {0}")]
    NonConvergence(String),

    #[error(transparent)]
    Core(#[from] CoreError),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum RectifyError {
    #[error("baseline is zero")]
    ZeroBaseline,

    #[error("rectification alpha must be in [0, 1] or negative for the default (got {0})")]
    InvalidAlpha(f64),

    #[error("image size {width}x{height} is empty")]
    EmptyImage { width: usize, height: usize },

    #[error("rectifying projection is singular")]
    SingularProjection,

    #[error("source image is {got_w}x{got_h}, map expects {want_w}x{want_h}")]
    SizeMismatch {
        got_w: usize,
        got_h: usize,
        want_w: usize,
        want_h: usize,
    },
}

#[derive(thiserror::Error, Debug)]
pub enum RecordError {
    #[error(transparent)]
    Io(#[from] JsonIoError),

    #[error("record field {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error(transparent)]
    Rectify(#[from] RectifyError),
}
