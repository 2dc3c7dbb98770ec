use log::{debug, info, warn};
use nalgebra::{Cholesky, DMatrix, DVector};
use std::time::Instant;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use super::epoch::EpochSolution;
use super::group::{CongruenceAnalysisGroup, StrainAnalysisResult, StrainParameterResult};
use super::point_pair::{CongruenceAnalysisPointPair, TestedAgainst};
use super::strain::StrainModel;
use crate::adjustment::{EstimationParameters, EstimationState, Estimator};
use crate::angle;
use crate::error::ConfigError;
use crate::parameter::ParameterKind;
use crate::point::Dimension;
use crate::statistic::{
    self, clamp_test_statistic, distribution, ConfidenceRegion, TestStatistic,
    TestStatisticDefinition, TestStatisticParameterSet, TestStatisticParameters,
};

/// Rows of a `group` axis block inside a point block of an `epoch` network.
fn axis_rows(epoch: Dimension, group: Dimension) -> Option<Vec<usize>> {
    group
        .axes()
        .iter()
        .map(|a| epoch.axes().iter().position(|b| b == a))
        .collect()
}

/// Both epochs, read-only while pairs are evaluated.
#[derive(Clone, Copy)]
struct Epochs<'a> {
    first: &'a EpochSolution,
    second: &'a EpochSolution,
}

impl Epochs<'_> {
    /// `C1[a,b] + C2[a,b]` restricted to `rows`.
    fn joint_block(&self, a: &str, b: &str, rows: &[usize]) -> Option<DMatrix<f64>> {
        let c1 = self.first.cross_block(a, b)?;
        let c2 = self.second.cross_block(a, b)?;
        let n = rows.len();
        Some(DMatrix::from_fn(n, n, |i, j| {
            c1[(rows[i], rows[j])] + c2[(rows[i], rows[j])]
        }))
    }
}

/// Decision parameters shared by all pairs of one dimension.
#[derive(Clone, Copy, Debug)]
struct PairTestContext {
    /// Pooled σ̂² of both epochs.
    variance: f64,
    /// Variance factor of the reported dispersion.
    dispersion_factor: f64,
    degrees_of_freedom: f64,
    prio: TestStatisticParameterSet,
    post: TestStatisticParameterSet,
    apply_variance_of_unit_weight: bool,
}

fn invert(q: &DMatrix<f64>) -> Option<DMatrix<f64>> {
    if let Some(c) = Cholesky::new(q.clone()) {
        return Some(c.inverse());
    }
    let eps = statistic::SQRT_EPS * q.amax();
    q.clone().pseudo_inverse(eps).ok()
}

/// Tests the deviation `e` with cofactor `q` and stores the result in `pair`.
fn test_pair(
    pair: &mut CongruenceAnalysisPointPair,
    e: &DVector<f64>,
    q: &DMatrix<f64>,
    ctx: &PairTestContext,
    against: TestedAgainst,
) {
    let dim = e.len() as f64;
    let dispersion = q * ctx.dispersion_factor;
    pair.tested_against = against;
    pair.std = dispersion.diagonal().iter().map(|v| v.max(0.0).sqrt()).collect();
    pair.gross_error = e.iter().copied().collect();
    pair.confidence = ConfidenceRegion::new(&dispersion, ctx.prio.quantile);
    pair.minimal_detectable_bias = statistic::mdb_vector(&dispersion, ctx.prio.noncentrality_parameter)
        .map(|v| v.iter().copied().collect())
        .unwrap_or_else(|| vec![0.0; e.len()]);

    let Some(q_inv) = invert(q) else {
        warn!("Singular displacement dispersion for point {}", pair.id);
        pair.t_prio = 0.0;
        pair.t_post = 0.0;
        pair.p_prio = 1.0;
        pair.p_post = 1.0;
        pair.set_significant(false);
        return;
    };

    pair.t_prio = clamp_test_statistic(e.dot(&(&q_inv * e)) / dim);
    pair.t_post = if ctx.variance > 0.0 {
        clamp_test_statistic(pair.t_prio / ctx.variance)
    } else {
        0.0
    };
    pair.p_prio = distribution::f_sf(pair.t_prio, dim, f64::INFINITY);
    pair.p_post = distribution::f_sf(pair.t_post, dim, ctx.degrees_of_freedom);

    let significant = if ctx.apply_variance_of_unit_weight {
        pair.t_post > ctx.post.quantile
    } else {
        pair.t_prio > ctx.prio.quantile
    };
    pair.set_significant(significant);
}

fn for_each_pair<F>(pairs: &mut [CongruenceAnalysisPointPair], f: F)
where
    F: Fn(usize, &mut CongruenceAnalysisPointPair) + Send + Sync,
{
    #[cfg(feature = "parallel")]
    {
        pairs.par_iter_mut().enumerate().for_each(|(k, pair)| f(k, pair));
    }
    #[cfg(not(feature = "parallel"))]
    {
        pairs.iter_mut().enumerate().for_each(|(k, pair)| f(k, pair));
    }
}

/// Deformation analysis between two adjusted epochs.
///
/// Every pair is first tested against zero displacement. Groups with free
/// strain parameters are then fitted and all their pairs re-tested against
/// the displacement the fitted strain predicts.
pub struct CongruenceAnalysis {
    first: EpochSolution,
    second: EpochSolution,
    groups: Vec<CongruenceAnalysisGroup>,
    estimation: EstimationParameters,
    test_statistic: TestStatisticDefinition,
}

impl CongruenceAnalysis {
    pub fn new(first: EpochSolution, second: EpochSolution) -> Result<Self, ConfigError> {
        if first.dimension() != second.dimension() {
            return Err(ConfigError::DimensionMismatch {
                id: "second epoch".to_string(),
                expected: first.dimension(),
                found: second.dimension(),
            });
        }
        Ok(Self {
            first,
            second,
            groups: Vec::new(),
            estimation: EstimationParameters::default(),
            test_statistic: TestStatisticDefinition::default(),
        })
    }

    pub fn with_estimation_parameters(mut self, estimation: EstimationParameters) -> Self {
        self.estimation = estimation;
        self
    }

    pub fn with_test_statistic(mut self, definition: TestStatisticDefinition) -> Self {
        self.test_statistic = definition;
        self
    }

    pub fn first(&self) -> &EpochSolution {
        &self.first
    }

    pub fn second(&self) -> &EpochSolution {
        &self.second
    }

    /// IDs present in both epochs, in first-epoch order.
    pub fn common_ids(&self) -> Vec<String> {
        self.first
            .ids()
            .iter()
            .filter(|id| self.second.contains(id))
            .cloned()
            .collect()
    }

    /// Builds the pair of `id` for a group of `dimension`.
    pub fn point_pair(
        &self,
        id: &str,
        dimension: Dimension,
    ) -> Result<CongruenceAnalysisPointPair, ConfigError> {
        let first = self
            .first
            .coordinates(id)
            .ok_or_else(|| ConfigError::UnknownPoint(id.to_string()))?;
        let second = self
            .second
            .coordinates(id)
            .ok_or_else(|| ConfigError::UnknownPoint(id.to_string()))?;
        Ok(CongruenceAnalysisPointPair::new(id, dimension, first, second))
    }

    /// Adds a group; its dimension must be a subset of the epoch axes.
    pub fn add_group(&mut self, group: CongruenceAnalysisGroup) -> Result<(), ConfigError> {
        if axis_rows(self.first.dimension(), group.dimension()).is_none() {
            return Err(ConfigError::DimensionMismatch {
                id: group.id().to_string(),
                expected: self.first.dimension(),
                found: group.dimension(),
            });
        }
        if let Some(missing) = group.pairs().find(|p| !self.first.contains(&p.id) || !self.second.contains(&p.id)) {
            return Err(ConfigError::UnknownPoint(missing.id.clone()));
        }
        self.groups.push(group);
        Ok(())
    }

    pub fn groups(&self) -> &[CongruenceAnalysisGroup] {
        &self.groups
    }

    pub fn groups_mut(&mut self) -> &mut [CongruenceAnalysisGroup] {
        &mut self.groups
    }

    /// `f1 + f2`.
    pub fn degrees_of_freedom(&self) -> f64 {
        self.first.redundancy() + self.second.redundancy()
    }

    /// Pooled `σ̂² = (Ω1 + Ω2) / (f1 + f2)`, or 1 without redundancy.
    pub fn variance_of_unit_weight(&self) -> f64 {
        let f = self.degrees_of_freedom();
        if f > 0.0 {
            (self.first.omega() + self.second.omega()) / f
        } else {
            1.0
        }
    }

    /// Tests every pair and fits the strain model of each group.
    pub fn analyse(&mut self) {
        let start = Instant::now();
        let variance = self.variance_of_unit_weight();
        let dof = self.degrees_of_freedom();
        let dof_post = if dof > 0.0 { dof } else { f64::INFINITY };
        let hypotheses = self.groups.iter().map(|g| g.len()).sum::<usize>().max(1);
        let mut parameters = TestStatisticParameters::new(TestStatistic::from_definition(
            &self.test_statistic,
            hypotheses,
        ));
        let apply = self.estimation.uses_variance_of_unit_weight();
        let dispersion_factor = if apply {
            variance
        } else {
            self.estimation.variance_of_unit_weight_prio
        };
        let epochs = Epochs {
            first: &self.first,
            second: &self.second,
        };
        let epoch_dimension = self.first.dimension();

        for group in &mut self.groups {
            let Some(rows) = axis_rows(epoch_dimension, group.dimension()) else {
                continue;
            };
            let dim = group.dimension().value() as f64;
            let ctx = PairTestContext {
                variance,
                dispersion_factor,
                degrees_of_freedom: dof_post,
                prio: parameters.parameter_set(dim, f64::INFINITY, false),
                post: parameters.parameter_set(dim, dof_post, false),
                apply_variance_of_unit_weight: apply,
            };
            let scalar = ScalarTestContext {
                variance,
                dispersion_factor,
                degrees_of_freedom: dof_post,
                prio: parameters.parameter_set(1.0, f64::INFINITY, false),
                post: parameters.parameter_set(1.0, dof_post, false),
                apply_variance_of_unit_weight: apply,
            };

            let (analysable, common, strain) = group.split_mut();
            let test_against_zero = |_: usize, pair: &mut CongruenceAnalysisPointPair| {
                let Some(q) = epochs.joint_block(&pair.id, &pair.id, &rows) else {
                    return;
                };
                let d = DVector::from_vec(pair.displacement.clone());
                test_pair(pair, &d, &q, &ctx, TestedAgainst::Zero);
            };
            for_each_pair(analysable, &test_against_zero);
            for_each_pair(common, &test_against_zero);

            let result = fit_strain(
                strain,
                analysable,
                common,
                epochs,
                &rows,
                &ctx,
                &scalar,
                &self.estimation,
                &self.test_statistic,
            );
            if let Some(r) = &result {
                info!(
                    "Strain analysis of group {} finished with state {}",
                    group.id(),
                    r.state
                );
            }
            group.set_strain_result(result);
        }

        let significant = self
            .groups
            .iter()
            .flat_map(|g| g.pairs())
            .filter(|p| p.is_significant())
            .count();
        debug!(
            "Congruence analysis of {} groups: {significant} significant pairs, σ̂² = {variance:.4}, {:.3} ms",
            self.groups.len(),
            start.elapsed().as_secs_f64() * 1000.0
        );
    }
}

/// One-dimensional decision parameters for strain parameters.
struct ScalarTestContext {
    variance: f64,
    dispersion_factor: f64,
    degrees_of_freedom: f64,
    prio: TestStatisticParameterSet,
    post: TestStatisticParameterSet,
    apply_variance_of_unit_weight: bool,
}

#[allow(clippy::too_many_arguments)]
fn fit_strain(
    strain: &mut StrainModel,
    analysable: &mut [CongruenceAnalysisPointPair],
    common: &mut [CongruenceAnalysisPointPair],
    epochs: Epochs<'_>,
    rows: &[usize],
    ctx: &PairTestContext,
    scalar: &ScalarTestContext,
    estimation: &EstimationParameters,
    definition: &TestStatisticDefinition,
) -> Option<StrainAnalysisResult> {
    let dim = rows.len();
    let unknowns = strain.free_parameter_count();
    if unknowns == 0 || analysable.len() * dim < unknowns {
        debug!(
            "Strain model skipped: {} unknowns, {} analysable pairs",
            unknowns,
            analysable.len()
        );
        return None;
    }

    let n = analysable.len() * dim;
    let mut cofactor = DMatrix::zeros(n, n);
    for (i, a) in analysable.iter().enumerate() {
        for (j, b) in analysable.iter().enumerate() {
            let block = epochs.joint_block(&a.id, &b.id, rows)?;
            cofactor.view_mut((i * dim, j * dim), (dim, dim)).copy_from(&block);
        }
    }
    strain.set_observations(
        analysable.iter().map(|p| p.first).collect(),
        analysable.iter().map(|p| p.displacement_xyz()).collect(),
        cofactor.clone(),
    );

    let mut estimator = Estimator::new(estimation.clone()).with_test_statistic(definition.clone());
    let state = estimator.estimate(strain);
    let iterations = estimator.solution().map_or(0, |s| s.iterations);
    let mut result = StrainAnalysisResult {
        state,
        iterations,
        omega: estimator.solution().map_or(0.0, |s| s.omega),
        redundancy: estimator.solution().map_or(0.0, |s| s.redundancy),
        center: strain.center(),
        parameters: Vec::new(),
    };
    if state != EstimationState::Converged {
        warn!("Strain model did not converge: {state}");
        return Some(result);
    }
    let qxx = estimator.qxx()?.clone();

    result.parameters = strain
        .parameter_kinds()
        .iter()
        .zip(strain.values())
        .map(|(&kind, &value)| {
            let value = if kind.is_angle() { angle::signed(value) } else { value };
            let nabla = value - kind.identity_value();
            match strain.column(kind) {
                Some(c) => strain_parameter(kind, value, nabla, qxx[(c, c)], scalar),
                None => StrainParameterResult {
                    kind,
                    value,
                    std: 0.0,
                    gross_error: nabla,
                    t_prio: 0.0,
                    t_post: 0.0,
                    p_prio: 1.0,
                    p_post: 1.0,
                    minimal_detectable_bias: 0.0,
                    restricted: true,
                    significant: false,
                },
            }
        })
        .collect();

    // residual displacements with their cofactor: Qvv for fitted pairs,
    // Qdd plus the prediction dispersion for the others
    let model: &StrainModel = strain;
    let residual = |pair: &CongruenceAnalysisPointPair| {
        let predicted = model.predict(pair.first);
        let j = model.prediction_jacobian(pair.first);
        let e = DVector::from_iterator(
            dim,
            pair.displacement.iter().zip(&predicted).map(|(d, p)| d - p),
        );
        (e, &j * &qxx * j.transpose())
    };
    for_each_pair(analysable, |k, pair| {
        let (e, jqj) = residual(pair);
        let c = cofactor.view((k * dim, k * dim), (dim, dim)).into_owned();
        test_pair(pair, &e, &(c - jqj), ctx, TestedAgainst::StrainModel);
    });
    for_each_pair(common, |_, pair| {
        let Some(q) = epochs.joint_block(&pair.id, &pair.id, rows) else {
            return;
        };
        let (e, jqj) = residual(pair);
        test_pair(pair, &e, &(q + jqj), ctx, TestedAgainst::StrainModel);
    });

    Some(result)
}

fn strain_parameter(
    kind: ParameterKind,
    value: f64,
    nabla: f64,
    qxx: f64,
    ctx: &ScalarTestContext,
) -> StrainParameterResult {
    let qxx = qxx.max(0.0);
    let std = (ctx.dispersion_factor * qxx).sqrt();
    let (t_prio, t_post) = if qxx > 0.0 {
        let t_prio = clamp_test_statistic(nabla * nabla / qxx);
        let t_post = if ctx.variance > 0.0 {
            clamp_test_statistic(t_prio / ctx.variance)
        } else {
            0.0
        };
        (t_prio, t_post)
    } else {
        (0.0, 0.0)
    };
    let significant = if ctx.apply_variance_of_unit_weight {
        t_post > ctx.post.quantile
    } else {
        t_prio > ctx.prio.quantile
    };
    StrainParameterResult {
        kind,
        value,
        std,
        gross_error: nabla,
        t_prio,
        t_post,
        p_prio: distribution::chi_square_sf(t_prio, 1.0),
        p_post: distribution::f_sf(t_post, 1.0, ctx.degrees_of_freedom),
        minimal_detectable_bias: nabla.signum()
            * (ctx.prio.noncentrality_parameter * ctx.dispersion_factor * qxx).sqrt(),
        restricted: false,
        significant,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::congruence::Restriction;

    fn approx_eq(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() < tol
    }

    fn epoch(coordinates: &[(&str, [f64; 3])], sigma: f64) -> EpochSolution {
        let n = coordinates.len() * 2;
        EpochSolution::new(
            Dimension::Two,
            coordinates.iter().map(|(id, _)| id.to_string()).collect(),
            coordinates.iter().map(|(_, c)| *c).collect(),
            DMatrix::identity(n, n) * sigma * sigma,
            0.0,
            0.0,
        )
    }

    fn grid() -> Vec<(&'static str, [f64; 3])> {
        vec![
            ("A", [0.0, 0.0, 0.0]),
            ("B", [100.0, 0.0, 0.0]),
            ("C", [100.0, 100.0, 0.0]),
            ("D", [0.0, 100.0, 0.0]),
            ("E", [50.0, 40.0, 0.0]),
        ]
    }

    fn analysis(second: Vec<(&'static str, [f64; 3])>) -> CongruenceAnalysis {
        let estimation = EstimationParameters {
            apply_variance_of_unit_weight: false,
            ..Default::default()
        };
        CongruenceAnalysis::new(epoch(&grid(), 1e-3), epoch(&second, 1e-3))
            .expect("epochs")
            .with_estimation_parameters(estimation)
    }

    #[test]
    fn stable_points_are_not_significant() {
        let mut analysis = analysis(grid());
        let mut group = CongruenceAnalysisGroup::new("g", 2).expect("group");
        for id in analysis.common_ids() {
            assert!(group.add(analysis.point_pair(&id, Dimension::Two).expect("pair"), false));
        }
        analysis.add_group(group).expect("group");
        analysis.analyse();
        let group = &analysis.groups()[0];
        assert!(group.pairs().all(|p| !p.is_significant() && p.t_prio == 0.0));
        assert!(group.strain_result().is_none());
    }

    #[test]
    fn moved_point_is_detected() {
        let mut second = grid();
        second[4].1[0] += 0.02;
        let mut analysis = analysis(second);
        let mut group = CongruenceAnalysisGroup::new("g", 2).expect("group");
        for id in analysis.common_ids() {
            assert!(group.add(analysis.point_pair(&id, Dimension::Two).expect("pair"), false));
        }
        analysis.add_group(group).expect("group");
        analysis.analyse();
        let group = &analysis.groups()[0];
        let moved = group.pairs().find(|p| p.id == "E").expect("E");
        // (0.02² / 2e-6) / 2
        assert!(approx_eq(moved.t_prio, 100.0, 1e-6));
        assert!(moved.is_significant());
        assert!(group.pairs().filter(|p| p.id != "E").all(|p| !p.is_significant()));
    }

    #[test]
    fn translated_network_is_explained_by_strain() {
        let second: Vec<_> = grid()
            .into_iter()
            .map(|(id, c)| (id, [c[0] + 0.05, c[1] - 0.03, 0.0]))
            .collect();
        let mut analysis = analysis(second);
        let mut group = CongruenceAnalysisGroup::new("g", 2).expect("group");
        for id in analysis.common_ids() {
            let pair = analysis.point_pair(&id, Dimension::Two).expect("pair");
            assert!(group.add(pair, id != "E"));
        }
        for r in [
            Restriction::FixedRotationZ,
            Restriction::FixedShearZ,
            Restriction::FixedScaleX,
            Restriction::FixedScaleY,
        ] {
            group.add_restriction(r).expect("supported");
        }
        analysis.add_group(group).expect("group");
        analysis.analyse();

        let group = &analysis.groups()[0];
        let result = group.strain_result().expect("strain");
        assert_eq!(result.state, EstimationState::Converged);
        let tx = &result.parameters[0];
        assert!(approx_eq(tx.value, 0.05, 1e-9));
        assert!(tx.significant);
        assert!(result.parameters[2].restricted);
        for pair in group.pairs() {
            assert_eq!(pair.tested_against, TestedAgainst::StrainModel);
            assert!(!pair.is_significant());
        }
    }

    #[test]
    fn group_outside_epoch_axes_is_rejected() {
        let mut analysis = analysis(grid());
        let group = CongruenceAnalysisGroup::new("h", 1).expect("group");
        assert!(matches!(
            analysis.add_group(group),
            Err(ConfigError::DimensionMismatch { .. })
        ));
    }
}
