use serde::Serialize;

use crate::point::Dimension;
use crate::statistic::ConfidenceRegion;

/// Reference the displacement of a pair was last tested against.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TestedAgainst {
    #[default]
    Zero,
    StrainModel,
}

/// Homologous points of two epochs and the test of their displacement.
///
/// Vector fields hold one entry per axis of the dimension (z only in 1D).
#[derive(Clone, Debug, Serialize)]
pub struct CongruenceAnalysisPointPair {
    pub id: String,
    pub dimension: Dimension,
    pub first: [f64; 3],
    pub second: [f64; 3],
    pub displacement: Vec<f64>,
    pub std: Vec<f64>,
    pub t_prio: f64,
    pub t_post: f64,
    pub p_prio: f64,
    pub p_post: f64,
    pub confidence: Option<ConfidenceRegion>,
    pub gross_error: Vec<f64>,
    pub minimal_detectable_bias: Vec<f64>,
    pub tested_against: TestedAgainst,
    significant: bool,
}

impl CongruenceAnalysisPointPair {
    pub fn new(id: impl Into<String>, dimension: Dimension, first: [f64; 3], second: [f64; 3]) -> Self {
        let displacement = dimension
            .axes()
            .iter()
            .map(|a| second[a.index()] - first[a.index()])
            .collect();
        let dim = dimension.value();
        Self {
            id: id.into(),
            dimension,
            first,
            second,
            displacement,
            std: vec![0.0; dim],
            t_prio: 0.0,
            t_post: 0.0,
            p_prio: 1.0,
            p_post: 1.0,
            confidence: None,
            gross_error: vec![0.0; dim],
            minimal_detectable_bias: vec![0.0; dim],
            tested_against: TestedAgainst::Zero,
            significant: false,
        }
    }

    /// Displacement as a full `[x, y, z]` array.
    pub fn displacement_xyz(&self) -> [f64; 3] {
        let mut d = [0.0; 3];
        for (axis, v) in self.dimension.axes().iter().zip(&self.displacement) {
            d[axis.index()] = *v;
        }
        d
    }

    pub fn is_significant(&self) -> bool {
        self.significant
    }

    pub fn set_significant(&mut self, significant: bool) {
        self.significant = significant;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn displacement_uses_axes_of_dimension() {
        let pair = CongruenceAnalysisPointPair::new("P", Dimension::One, [5.0, 6.0, 10.0], [7.0, 9.0, 10.5]);
        assert_eq!(pair.displacement, vec![0.5]);
        assert_eq!(pair.displacement_xyz(), [0.0, 0.0, 0.5]);
        assert!(!pair.is_significant());

        let mut planar = CongruenceAnalysisPointPair::new("Q", Dimension::Two, [1.0, 2.0, 0.0], [1.5, 1.0, 3.0]);
        assert_eq!(planar.displacement, vec![0.5, -1.0]);
        planar.set_significant(true);
        assert!(planar.is_significant());
    }
}
