/* crate use */
use thiserror::Error;

/// Everything that can abort an inference run.
#[derive(Error, Debug)]
pub enum InferError {
    #[error("column {site} of the sample panel is invariant")]
    InvariantSite { site: usize },

    #[error("bad {what} shape: expected {expected}, got {got}")]
    ShapeMismatch {
        what: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("{what} out of range: {value}")]
    OutOfRange { what: &'static str, value: f64 },

    #[error("copying likelihoods vanished at site {site}")]
    MatchingCollapse { site: usize },
}
