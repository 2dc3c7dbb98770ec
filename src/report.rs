//! Serializable summaries of an adjustment and a congruence analysis.
//!
//! Point coordinates and observation values are converted back into the
//! units of the project's [`UnitTable`]; congruence results stay in model
//! units (metre, radian).

use nalgebra::DMatrix;
use serde::Serialize;

use crate::adjustment::{
    EstimationState, NetworkAdjustment, ObservationResult, StochasticCoordinateResult,
    VarianceComponent,
};
use crate::approximation::ApproximationSummary;
use crate::congruence::{
    CongruenceAnalysis, CongruenceAnalysisPointPair, Restriction, StrainAnalysisResult,
};
use crate::parameter::UnknownParameter;
use crate::point::{Dimension, PointRole};
use crate::statistic::{ConfidenceRegion, GlobalTest, TestStatistic, TestStatisticParameters};
use crate::unit::{MeasurementKind, UnitTable};

#[derive(Clone, Debug, Serialize)]
pub struct PointReport {
    pub id: String,
    pub role: PointRole,
    /// Components of the valid axes.
    pub coordinates: Vec<f64>,
    pub std: Vec<f64>,
    pub confidence: Option<ConfidenceRegion>,
}

#[derive(Clone, Debug, Serialize)]
pub struct AdjustmentReport {
    pub state: EstimationState,
    pub state_id: i32,
    pub dimension: Dimension,
    pub iterations: usize,
    pub redundancy: f64,
    pub omega: f64,
    pub variance_of_unit_weight: f64,
    pub datum_defect: usize,
    pub global_test: Option<GlobalTest>,
    pub variance_components: Vec<VarianceComponent>,
    pub approximation: ApproximationSummary,
    pub points: Vec<PointReport>,
    pub observations: Vec<ObservationResult>,
    pub stochastic: Vec<StochasticCoordinateResult>,
    pub parameters: Vec<UnknownParameter>,
}

impl AdjustmentReport {
    pub fn new(adjustment: &NetworkAdjustment, units: &UnitTable) -> Self {
        let model = adjustment.model();
        let estimator = adjustment.estimator();
        let solution = estimator.solution();
        let dimension = model.dimension();
        let length = |v: f64| units.from_model(MeasurementKind::Length, v);
        let length_std = |v: f64| units.uncertainty_from_model(MeasurementKind::Length, v);

        let factor = solution.map_or(1.0, |s| s.dispersion_factor(estimator.params()));
        let mut parameters = TestStatisticParameters::new(TestStatistic::from_definition(
            estimator.test_statistic(),
            solution.map_or(1, |s| s.redundancy.max(1.0).round() as usize),
        ));
        let quantile = parameters
            .parameter_set(dimension.value() as f64, f64::INFINITY, false)
            .quantile;

        let points = model
            .points()
            .points()
            .iter()
            .map(|p| {
                let axes = dimension.axes();
                let columns: Option<Vec<usize>> =
                    axes.iter().map(|a| model.column(p.id(), *a)).collect();
                let confidence = columns.zip(estimator.qxx()).and_then(|(cols, qxx)| {
                    let block = DMatrix::from_fn(cols.len(), cols.len(), |i, j| {
                        factor * qxx[(cols[i], cols[j])]
                    });
                    ConfidenceRegion::new(&block, quantile)
                });
                PointReport {
                    id: p.id().to_string(),
                    role: p.role(),
                    coordinates: axes.iter().map(|a| length(p.coordinate(*a))).collect(),
                    std: axes.iter().map(|a| length_std(p.sigma_aposteriori(*a))).collect(),
                    confidence,
                }
            })
            .collect();

        let observations = adjustment
            .observation_results()
            .into_iter()
            .map(|mut r| {
                let kind = r.kind.measurement_kind();
                r.observed = units.from_model(kind, r.observed);
                r.adjusted = units.from_model(kind, r.adjusted);
                r.residual = units.uncertainty_from_model(kind, r.residual);
                r.sigma = units.uncertainty_from_model(kind, r.sigma);
                r
            })
            .collect();

        let stochastic = adjustment
            .stochastic_results()
            .into_iter()
            .map(|mut r| {
                r.apriori = length(r.apriori);
                r.residual = length_std(r.residual);
                r
            })
            .collect();

        Self {
            state: estimator.state(),
            state_id: estimator.state().id(),
            dimension,
            iterations: solution.map_or(0, |s| s.iterations),
            redundancy: solution.map_or(0.0, |s| s.redundancy),
            omega: solution.map_or(0.0, |s| s.omega),
            variance_of_unit_weight: solution.map_or(1.0, |s| s.variance_of_unit_weight),
            datum_defect: solution.map_or(0, |s| s.datum_defect),
            global_test: solution.map(|s| s.global_test.clone()),
            variance_components: solution.map_or_else(Vec::new, |s| s.variance_components.clone()),
            approximation: model.approximation_summary().clone(),
            points,
            observations,
            stochastic,
            parameters: model.parameters().to_vec(),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct CongruenceGroupReport {
    pub id: String,
    pub dimension: Dimension,
    pub restrictions: Vec<Restriction>,
    pub pairs: Vec<CongruenceAnalysisPointPair>,
    pub significant: Vec<String>,
    pub strain: Option<StrainAnalysisResult>,
}

#[derive(Clone, Debug, Serialize)]
pub struct CongruenceReport {
    pub variance_of_unit_weight: f64,
    pub degrees_of_freedom: f64,
    pub groups: Vec<CongruenceGroupReport>,
}

impl CongruenceReport {
    pub fn new(analysis: &CongruenceAnalysis) -> Self {
        let groups = analysis
            .groups()
            .iter()
            .map(|g| CongruenceGroupReport {
                id: g.id().to_string(),
                dimension: g.dimension(),
                restrictions: g.restrictions().to_vec(),
                pairs: g.pairs().cloned().collect(),
                significant: g
                    .pairs()
                    .filter(|p| p.is_significant())
                    .map(|p| p.id.clone())
                    .collect(),
                strain: g.strain_result().cloned(),
            })
            .collect();
        Self {
            variance_of_unit_weight: analysis.variance_of_unit_weight(),
            degrees_of_freedom: analysis.degrees_of_freedom(),
            groups,
        }
    }
}
