use serde::Serialize;

use super::point_pair::CongruenceAnalysisPointPair;
use super::strain::{Restriction, StrainModel};
use crate::adjustment::EstimationState;
use crate::error::ConfigError;
use crate::parameter::ParameterKind;
use crate::point::Dimension;

/// Test of one strain parameter against its identity value.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StrainParameterResult {
    pub kind: ParameterKind,
    pub value: f64,
    pub std: f64,
    /// `value − identity`.
    pub gross_error: f64,
    pub t_prio: f64,
    pub t_post: f64,
    pub p_prio: f64,
    pub p_post: f64,
    pub minimal_detectable_bias: f64,
    /// Held at identity by a restriction.
    pub restricted: bool,
    pub significant: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct StrainAnalysisResult {
    pub state: EstimationState,
    pub iterations: usize,
    pub omega: f64,
    pub redundancy: f64,
    pub center: [f64; 3],
    pub parameters: Vec<StrainParameterResult>,
}

/// Point pairs of one dimension with their strain model.
///
/// Common pairs are only tested; strain-analysable pairs also feed the
/// strain fit. A point ID appears at most once across both sets.
#[derive(Clone, Debug)]
pub struct CongruenceAnalysisGroup {
    id: String,
    dimension: Dimension,
    common: Vec<CongruenceAnalysisPointPair>,
    analysable: Vec<CongruenceAnalysisPointPair>,
    strain: StrainModel,
    strain_result: Option<StrainAnalysisResult>,
}

impl CongruenceAnalysisGroup {
    pub fn new(id: impl Into<String>, dimension: usize) -> Result<Self, ConfigError> {
        let dimension = Dimension::try_from(dimension)?;
        Ok(Self {
            id: id.into(),
            dimension,
            common: Vec::new(),
            analysable: Vec::new(),
            strain: StrainModel::new(dimension),
            strain_result: None,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn dimension(&self) -> Dimension {
        self.dimension
    }

    pub fn contains(&self, id: &str) -> bool {
        self.pairs().any(|p| p.id == id)
    }

    /// Adds a pair; `false` for a dimension mismatch or a repeated point ID.
    pub fn add(&mut self, pair: CongruenceAnalysisPointPair, analysable: bool) -> bool {
        if pair.dimension != self.dimension || self.contains(&pair.id) {
            return false;
        }
        if analysable {
            self.analysable.push(pair);
        } else {
            self.common.push(pair);
        }
        true
    }

    pub fn add_restriction(&mut self, restriction: Restriction) -> Result<(), ConfigError> {
        self.strain.add_restriction(restriction)
    }

    pub fn remove_restriction(&mut self, restriction: Restriction) -> bool {
        self.strain.remove_restriction(restriction)
    }

    pub fn restrictions(&self) -> &[Restriction] {
        self.strain.restrictions()
    }

    pub fn common_pairs(&self) -> &[CongruenceAnalysisPointPair] {
        &self.common
    }

    pub fn analysable_pairs(&self) -> &[CongruenceAnalysisPointPair] {
        &self.analysable
    }

    /// All pairs, analysable first.
    pub fn pairs(&self) -> impl Iterator<Item = &CongruenceAnalysisPointPair> {
        self.analysable.iter().chain(self.common.iter())
    }

    pub fn len(&self) -> usize {
        self.common.len() + self.analysable.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn strain(&self) -> &StrainModel {
        &self.strain
    }

    pub fn strain_result(&self) -> Option<&StrainAnalysisResult> {
        self.strain_result.as_ref()
    }

    pub(crate) fn set_strain_result(&mut self, result: Option<StrainAnalysisResult>) {
        self.strain_result = result;
    }

    pub(crate) fn split_mut(
        &mut self,
    ) -> (
        &mut [CongruenceAnalysisPointPair],
        &mut [CongruenceAnalysisPointPair],
        &mut StrainModel,
    ) {
        (&mut self.analysable, &mut self.common, &mut self.strain)
    }
}
