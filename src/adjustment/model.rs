use nalgebra::{DMatrix, DVector};

use super::variance::VarianceComponentType;

/// A priori cofactors of the observations.
#[derive(Clone, Debug, PartialEq)]
pub enum Cofactor {
    /// Uncorrelated observations. Non-positive entries carry no weight.
    Diagonal(DVector<f64>),
    /// Fully populated, symmetric positive definite block.
    Full(DMatrix<f64>),
}

impl Cofactor {
    pub fn len(&self) -> usize {
        match self {
            Cofactor::Diagonal(q) => q.len(),
            Cofactor::Full(q) => q.nrows(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Observation equations linearized at the current parameters.
#[derive(Clone, Debug)]
pub struct Linearization {
    /// Design matrix `A`, one row per observation.
    pub jacobian: DMatrix<f64>,
    /// `l = observed − computed`; angular rows already wrapped.
    pub misclosure: DVector<f64>,
}

/// Functional and stochastic model consumed by the estimator.
pub trait Model {
    fn parameter_count(&self) -> usize;

    fn observation_count(&self) -> usize;

    fn linearize(&self) -> Linearization;

    fn cofactor(&self) -> Cofactor;

    /// Adds the correction `dx` to the parameters.
    fn update(&mut self, dx: &DVector<f64>);

    /// Datum conditions `G` (parameters × defect) of a free network.
    fn datum_constraints(&self) -> Option<DMatrix<f64>> {
        None
    }

    /// Variance component of every observation row. Empty when the model
    /// only reports the global component.
    fn variance_component_types(&self) -> Vec<VarianceComponentType> {
        Vec::new()
    }
}
