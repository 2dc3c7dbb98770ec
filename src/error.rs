//! Configuration errors raised while assembling a network or congruence model.
//!
//! Numerical failures (singular systems, iteration budget) are not errors:
//! they end an estimation run in a terminal [`crate::adjustment::EstimationState`].
//! Statistical outcomes such as a rejected global test are plain results.

use thiserror::Error;

use crate::point::Dimension;

/// Problems detected before the first iteration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unsupported dimension {0}, expected 1, 2 or 3")]
    UnsupportedDimension(usize),

    #[error("dimension mismatch for {id}: expected {expected:?}, found {found:?}")]
    DimensionMismatch {
        id: String,
        expected: Dimension,
        found: Dimension,
    },

    #[error("point {id} has {found} coordinate components, expected {expected}")]
    ComponentCount {
        id: String,
        expected: usize,
        found: usize,
    },

    #[error("unknown point {0}")]
    UnknownPoint(String),

    #[error("duplicate point {0}")]
    DuplicatePoint(String),

    #[error("observation {index} ({kind}) is not supported in a {dimension:?} network")]
    UnsupportedObservation {
        index: usize,
        kind: String,
        dimension: Dimension,
    },

    #[error("observation {0} connects a point with itself")]
    DegenerateObservation(usize),

    #[error("restriction {restriction} is not supported by a {dimension:?} strain model")]
    UnsupportedRestriction {
        restriction: String,
        dimension: Dimension,
    },

    #[error("unit {unit} cannot express a {kind} value")]
    UnitMismatch { unit: String, kind: String },

    #[error("point {0} has no position and approximation is disabled")]
    MissingPosition(String),

    #[error("network has no unknown parameters")]
    NoUnknowns,

    #[error("I/O error for {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}
