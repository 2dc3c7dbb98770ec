//! Least-squares adjustment.
//!
//! The [`Estimator`] solves any [`Model`] iteratively; [`NetworkModel`] is the
//! geodetic network, the strain models of [`crate::congruence`] are the other
//! implementors.

mod datum;
mod engine;
mod model;
mod network;
mod state;
mod variance;

pub use datum::{datum_matrix, DatumPoint, RankDefect};
pub use engine::{EstimationParameters, EstimationType, Estimator, Solution};
pub use model::{Cofactor, Linearization, Model};
pub use network::{
    NetworkAdjustment, NetworkBuilder, NetworkModel, ObservationResult,
    StochasticCoordinateResult,
};
pub use state::EstimationState;
pub use variance::{VarianceComponent, VarianceComponentType};
