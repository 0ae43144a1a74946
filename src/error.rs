use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub(crate) enum SimError {
    #[error("action index {index} is out of range for an action space of {len}")]
    InvalidAction { index: usize, len: usize },
}

#[derive(Debug, Error, PartialEq)]
pub(crate) enum ConfigError {
    #[error("learning rate must be in (0, 1], got {0}")]
    LearningRate(f64),
    #[error("discount must be in [0, 1], got {0}")]
    Discount(f64),
    #[error("epsilon must be in [0, 1], got {0}")]
    Epsilon(f64),
    #[error("{0} must be at least 1")]
    ZeroLimit(&'static str),
    #[error("frame rate must be positive, got {0}")]
    FrameRate(f64),
}
