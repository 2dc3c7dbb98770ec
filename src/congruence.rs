//! Congruence (deformation) analysis between two adjusted epochs.
//!
//! An [`EpochSolution`] carries the adjusted coordinates of one epoch with
//! their cofactor block, Ω and redundancy. [`CongruenceAnalysis`] pairs the
//! points of two epochs by ID inside [`CongruenceAnalysisGroup`]s, tests each
//! displacement against zero and, where a group has free strain parameters,
//! against the displacement predicted by its fitted [`StrainModel`].

mod analysis;
mod epoch;
mod group;
mod point_pair;
mod strain;

pub use analysis::CongruenceAnalysis;
pub use epoch::EpochSolution;
pub use group::{CongruenceAnalysisGroup, StrainAnalysisResult, StrainParameterResult};
pub use point_pair::{CongruenceAnalysisPointPair, TestedAgainst};
pub use strain::{Restriction, StrainModel};
