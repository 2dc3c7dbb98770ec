//! JSON input files of the batch tools.
//!
//! [`project`] describes one network adjustment, [`congruence`] pairs two
//! adjusted projects for a deformation analysis.

pub mod congruence;
pub mod project;

pub use congruence::CongruenceConfig;
pub use project::ProjectConfig;
