#![doc = include_str!("../README.md")]

// Network model and estimation.
pub mod adjustment;
pub mod approximation;
pub mod observation;
pub mod parameter;
pub mod point;
pub mod reduction;

// Testing and deformation analysis.
pub mod congruence;
pub mod statistic;

// Input, output and shared helpers.
pub mod angle;
pub mod config;
pub mod error;
pub mod report;
pub mod unit;

// --- High-level re-exports -------------------------------------------------

pub use crate::adjustment::{
    EstimationParameters, EstimationState, Estimator, NetworkAdjustment, NetworkBuilder,
    NetworkModel,
};
pub use crate::congruence::{CongruenceAnalysis, CongruenceAnalysisGroup, EpochSolution};
pub use crate::error::ConfigError;
pub use crate::report::{AdjustmentReport, CongruenceReport};

// --- Prelude ---------------------------------------------------------------

/// Types needed to set up and run an adjustment.
pub mod prelude {
    pub use crate::adjustment::{
        EstimationParameters, EstimationState, Estimator, NetworkAdjustment, NetworkBuilder,
    };
    pub use crate::congruence::{CongruenceAnalysis, CongruenceAnalysisGroup, Restriction};
    pub use crate::error::ConfigError;
    pub use crate::observation::{Observation, ObservationKind};
    pub use crate::point::{Dimension, Point, PointRole};
    pub use crate::statistic::TestStatisticDefinition;
}
