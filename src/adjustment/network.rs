//! Geodetic network model for the Gauss-Markov estimator.
//!
//! # Overview
//! [`NetworkBuilder`] validates points and observations, seeds missing
//! approximate coordinates and applies the configured reductions.
//! The resulting [`NetworkModel`] implements [`Model`]:
//!
//! - one column per coordinate of every unknown point, then one column per
//!   group unknown (orientation, scale, zero-point offset, refraction);
//! - one row per observation, then one pseudo-observation row per weighted
//!   coordinate of a stochastic point;
//! - datum conditions when no point is fixed or stochastic (free network).
//!
//! [`NetworkAdjustment`] couples the model with an [`Estimator`] and copies
//! the a posteriori uncertainties back onto the points.

use log::{debug, warn};
use nalgebra::{DMatrix, DVector};
use serde::Serialize;
use std::collections::HashMap;

use super::datum::{datum_matrix, DatumPoint, RankDefect};
use super::engine::{Estimator, Solution};
use super::model::{Cofactor, Linearization, Model};
use super::state::EstimationState;
use super::variance::VarianceComponentType;
use crate::angle;
use crate::approximation::{seed_approximations, ApproximationSummary};
use crate::congruence::EpochSolution;
use crate::error::ConfigError;
use crate::observation::{GroupParameters, Observation, ObservationKind};
use crate::parameter::{ParameterKind, UnknownParameter};
use crate::point::{Axis, Dimension, Point, PointBundle, PointRole};
use crate::reduction::ObservationModel;
use crate::statistic::LocalTest;

/// Shortest horizontal distance for which directions and zenith angles are
/// linearized.
const MIN_DISTANCE: f64 = 1e-9;

/// Collects and validates the input of a network adjustment.
#[derive(Clone, Debug)]
pub struct NetworkBuilder {
    dimension: Dimension,
    points: PointBundle,
    observations: Vec<Observation>,
    observation_model: ObservationModel,
    groups: HashMap<String, GroupParameters>,
    approximation: bool,
}

impl NetworkBuilder {
    pub fn new(dimension: Dimension) -> Self {
        Self {
            dimension,
            points: PointBundle::with_dimension(dimension),
            observations: Vec::new(),
            observation_model: ObservationModel::default(),
            groups: HashMap::new(),
            approximation: true,
        }
    }

    /// Adds a point; an existing ID is joined with the stored point.
    pub fn add_point(&mut self, point: Point) -> Result<(), ConfigError> {
        if point.dimension() != self.dimension {
            return Err(ConfigError::DimensionMismatch {
                id: point.id().to_string(),
                expected: self.dimension,
                found: point.dimension(),
            });
        }
        self.points.add(point)
    }

    pub fn add_observation(&mut self, observation: Observation) {
        self.observations.push(observation);
    }

    pub fn set_group_parameters(&mut self, group: impl Into<String>, parameters: GroupParameters) {
        self.groups.insert(group.into(), parameters);
    }

    pub fn set_observation_model(&mut self, model: ObservationModel) {
        self.observation_model = model;
    }

    /// Enables seeding of points without a position (default: on).
    pub fn set_approximation(&mut self, enabled: bool) {
        self.approximation = enabled;
    }

    pub fn points_mut(&mut self) -> &mut PointBundle {
        &mut self.points
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (index, obs) in self.observations.iter().enumerate() {
            if !obs.kind.supports(self.dimension) {
                return Err(ConfigError::UnsupportedObservation {
                    index,
                    kind: format!("{:?}", obs.kind),
                    dimension: self.dimension,
                });
            }
            for id in [&obs.start, &obs.end] {
                if !self.points.contains(id) {
                    return Err(ConfigError::UnknownPoint(id.clone()));
                }
            }
            if obs.start == obs.end {
                return Err(ConfigError::DegenerateObservation(index));
            }
        }
        Ok(())
    }

    pub fn build(mut self) -> Result<NetworkModel, ConfigError> {
        self.validate()?;

        let approximation = if self.approximation {
            seed_approximations(&mut self.points, &self.observations)
        } else {
            if let Some(p) = self.points.points().iter().find(|p| !p.has_approximation()) {
                return Err(ConfigError::MissingPosition(p.id().to_string()));
            }
            ApproximationSummary::default()
        };

        let mut model = NetworkModel {
            dimension: self.dimension,
            points: self.points,
            observations: self.observations,
            reduced: Vec::new(),
            observation_model: self.observation_model,
            parameters: Vec::new(),
            point_columns: HashMap::new(),
            group_columns: HashMap::new(),
            pseudo_observations: Vec::new(),
            datum: None,
            approximation,
        };
        model.reduce_observations();
        model.add_point_parameters();
        model.add_group_parameters(&self.groups);
        if model.parameters.is_empty() {
            return Err(ConfigError::NoUnknowns);
        }
        model.detect_datum(&self.groups);
        debug!(
            "Network: {} points, {} observations, {} pseudo-observations, {} unknowns, datum defect {}",
            model.points.len(),
            model.observations.len(),
            model.pseudo_observations.len(),
            model.parameters.len(),
            model.datum.as_ref().map_or(0, |(d, _)| d.count())
        );
        Ok(model)
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct GroupColumns {
    orientation: Option<usize>,
    scale: Option<usize>,
    zero_point_offset: Option<usize>,
    refraction: Option<usize>,
}

/// Weighted a priori coordinate of a stochastic point.
#[derive(Clone, Debug)]
struct PseudoObservation {
    point: String,
    axis: Axis,
    column: usize,
    value: f64,
    sigma: f64,
}

/// Linearized row: sparse partials and the computed observation.
struct Equation {
    partials: Vec<(usize, f64)>,
    computed: f64,
}

#[derive(Clone, Debug)]
pub struct NetworkModel {
    dimension: Dimension,
    points: PointBundle,
    observations: Vec<Observation>,
    /// Observed values after reduction, model units.
    reduced: Vec<f64>,
    observation_model: ObservationModel,
    parameters: Vec<UnknownParameter>,
    point_columns: HashMap<String, [Option<usize>; 3]>,
    group_columns: HashMap<String, GroupColumns>,
    pseudo_observations: Vec<PseudoObservation>,
    datum: Option<(RankDefect, Vec<String>)>,
    approximation: ApproximationSummary,
}

impl NetworkModel {
    pub fn dimension(&self) -> Dimension {
        self.dimension
    }

    pub fn points(&self) -> &PointBundle {
        &self.points
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    /// Observed values after reduction, aligned with [`Self::observations`].
    pub fn reduced_values(&self) -> &[f64] {
        &self.reduced
    }

    pub fn parameters(&self) -> &[UnknownParameter] {
        &self.parameters
    }

    pub fn approximation_summary(&self) -> &ApproximationSummary {
        &self.approximation
    }

    /// Rank defect and datum point IDs of a free network.
    pub fn datum(&self) -> Option<(&RankDefect, &[String])> {
        self.datum.as_ref().map(|(d, ids)| (d, ids.as_slice()))
    }

    pub fn is_free(&self) -> bool {
        self.datum.is_some()
    }

    pub fn column(&self, id: &str, axis: Axis) -> Option<usize> {
        self.point_columns.get(id)?[axis.index()]
    }

    fn reduce_observations(&mut self) {
        let mut reduced = Vec::with_capacity(self.observations.len());
        for obs in &self.observations {
            let value = match (self.points.get(&obs.start), self.points.get(&obs.end)) {
                (Some(s), Some(e)) => match obs.kind {
                    ObservationKind::HorizontalDistance => {
                        self.observation_model.reduce_horizontal_distance(obs.value, s, e)
                    }
                    ObservationKind::Direction => {
                        self.observation_model.reduce_direction(obs.value, s, e)
                    }
                    _ => obs.value,
                },
                _ => obs.value,
            };
            reduced.push(value);
        }
        self.reduced = reduced;
    }

    fn add_point_parameters(&mut self) {
        for point in self.points.points() {
            if !point.role().is_unknown() {
                continue;
            }
            let mut columns = [None; 3];
            for &axis in self.dimension.axes() {
                let column = self.parameters.len();
                let kind = match axis {
                    Axis::X => ParameterKind::CoordinateX,
                    Axis::Y => ParameterKind::CoordinateY,
                    Axis::Z => ParameterKind::CoordinateZ,
                };
                self.parameters.push(UnknownParameter::new(
                    kind,
                    point.id(),
                    column,
                    point.coordinate(axis),
                ));
                columns[axis.index()] = Some(column);

                if point.role() == PointRole::Stochastic && point.sigma_apriori(axis) > 0.0 {
                    self.pseudo_observations.push(PseudoObservation {
                        point: point.id().to_string(),
                        axis,
                        column,
                        value: point.approximate(axis),
                        sigma: point.sigma_apriori(axis),
                    });
                }
            }
            self.point_columns.insert(point.id().to_string(), columns);
        }
    }

    fn add_group_parameters(&mut self, config: &HashMap<String, GroupParameters>) {
        let mut order: Vec<&str> = Vec::new();
        for obs in &self.observations {
            if !order.contains(&obs.group.as_str()) {
                order.push(obs.group.as_str());
            }
        }
        let order: Vec<String> = order.into_iter().map(str::to_string).collect();

        for group in order {
            let members: Vec<usize> = (0..self.observations.len())
                .filter(|&i| self.observations[i].group == group)
                .collect();
            let has = |kind: ObservationKind| members.iter().any(|&i| self.observations[i].kind == kind);
            let has_direction = has(ObservationKind::Direction);
            let has_zenith = has(ObservationKind::ZenithAngle);
            let has_distance = members.iter().any(|&i| self.observations[i].kind.is_distance());
            let flags = config.get(&group).cloned().unwrap_or_default();
            let mut columns = GroupColumns::default();

            if has_direction {
                let omega = self.orientation_approximation(&members);
                columns.orientation = Some(self.push_parameter(ParameterKind::Orientation, &group, omega));
            }
            if has_distance && flags.scale {
                columns.scale = Some(self.push_parameter(ParameterKind::Scale, &group, 1.0));
            }
            if has_distance && flags.zero_point_offset {
                columns.zero_point_offset =
                    Some(self.push_parameter(ParameterKind::ZeroPointOffset, &group, 0.0));
            }
            if has_zenith && flags.refraction {
                columns.refraction =
                    Some(self.push_parameter(ParameterKind::RefractionCoefficient, &group, 0.0));
            }
            self.group_columns.insert(group, columns);
        }
    }

    fn push_parameter(&mut self, kind: ParameterKind, owner: &str, value0: f64) -> usize {
        let column = self.parameters.len();
        self.parameters
            .push(UnknownParameter::new(kind, owner, column, value0));
        column
    }

    /// Mean of `t − r` over the directions of one group.
    fn orientation_approximation(&self, members: &[usize]) -> f64 {
        let mut first = None;
        let mut sum = 0.0;
        let mut count = 0usize;
        for &i in members {
            let obs = &self.observations[i];
            if obs.kind != ObservationKind::Direction {
                continue;
            }
            let (Some(s), Some(e)) = (self.points.get(&obs.start), self.points.get(&obs.end)) else {
                continue;
            };
            let omega = angle::normalize(angle::azimuth(s.x(), s.y(), e.x(), e.y()) - self.reduced[i]);
            let reference = *first.get_or_insert(omega);
            sum += angle::wrapped_difference(omega, reference);
            count += 1;
        }
        match first {
            Some(reference) => angle::normalize(reference + sum / count as f64),
            None => 0.0,
        }
    }

    fn detect_datum(&mut self, groups: &HashMap<String, GroupParameters>) {
        let constrained = self
            .points
            .points()
            .iter()
            .any(|p| matches!(p.role(), PointRole::Reference | PointRole::Stochastic));
        if constrained {
            return;
        }
        let flagged: Vec<String> = self
            .points
            .points()
            .iter()
            .filter(|p| p.role() == PointRole::Datum)
            .map(|p| p.id().to_string())
            .collect();
        let ids = if flagged.is_empty() {
            self.points
                .points()
                .iter()
                .filter(|p| p.role().is_unknown())
                .map(|p| p.id().to_string())
                .collect()
        } else {
            flagged
        };
        let defect = RankDefect::detect(self.dimension, &self.observations, groups);
        debug!("Free network: defect {defect:?} over {} datum points", ids.len());
        self.datum = Some((defect, ids));
    }

    fn value(&self, column: Option<usize>, default: f64) -> f64 {
        column.map_or(default, |c| self.parameters[c].value)
    }

    fn point_partials(&self, partials: &mut Vec<(usize, f64)>, id: &str, d: [f64; 3]) {
        if let Some(columns) = self.point_columns.get(id) {
            for (column, value) in columns.iter().zip(d) {
                if let Some(c) = column {
                    partials.push((*c, value));
                }
            }
        }
    }

    fn equation(&self, obs: &Observation, start: &Point, end: &Point) -> Equation {
        let group = self.group_columns.get(&obs.group).copied().unwrap_or_default();
        let dx = end.x() - start.x();
        let dy = end.y() - start.y();
        let dz = end.z() + obs.target_height - start.z() - obs.instrument_height;
        let sh = dx.hypot(dy);
        let mut partials = Vec::with_capacity(8);

        let computed = match obs.kind {
            ObservationKind::Direction => {
                let omega = self.value(group.orientation, 0.0);
                if sh > MIN_DISTANCE {
                    let s2 = sh * sh;
                    self.point_partials(&mut partials, start.id(), [dy / s2, -dx / s2, 0.0]);
                    self.point_partials(&mut partials, end.id(), [-dy / s2, dx / s2, 0.0]);
                }
                if let Some(c) = group.orientation {
                    partials.push((c, -1.0));
                }
                angle::normalize(angle::azimuth(start.x(), start.y(), end.x(), end.y()) - omega)
            }
            ObservationKind::HorizontalDistance | ObservationKind::SlopeDistance => {
                let m = self.value(group.scale, 1.0);
                let c = self.value(group.zero_point_offset, 0.0);
                let s = if obs.kind == ObservationKind::SlopeDistance {
                    sh.hypot(dz)
                } else {
                    sh
                };
                if s > MIN_DISTANCE {
                    let f = 1.0 / (s * m);
                    let dzf = if obs.kind == ObservationKind::SlopeDistance {
                        dz * f
                    } else {
                        0.0
                    };
                    self.point_partials(&mut partials, start.id(), [-dx * f, -dy * f, -dzf]);
                    self.point_partials(&mut partials, end.id(), [dx * f, dy * f, dzf]);
                }
                if let Some(col) = group.scale {
                    partials.push((col, -(s - c) / (m * m)));
                }
                if let Some(col) = group.zero_point_offset {
                    partials.push((col, -1.0 / m));
                }
                (s - c) / m
            }
            ObservationKind::ZenithAngle => {
                let r = self.observation_model.earth_radius();
                let curvature = if self.observation_model.applies_earth_curvature() {
                    1.0
                } else {
                    0.0
                };
                let k = self.value(group.refraction, 0.0);
                let w = dz - curvature * sh * sh / (2.0 * r);
                let rho2 = sh * sh + w * w;
                if sh > MIN_DISTANCE && rho2 > 0.0 {
                    let horizontal = (w / sh + curvature * sh / r) / rho2 - k / (2.0 * r * sh);
                    let vertical = -sh / rho2;
                    self.point_partials(
                        &mut partials,
                        start.id(),
                        [-dx * horizontal, -dy * horizontal, -vertical],
                    );
                    self.point_partials(
                        &mut partials,
                        end.id(),
                        [dx * horizontal, dy * horizontal, vertical],
                    );
                }
                if let Some(col) = group.refraction {
                    partials.push((col, -sh / (2.0 * r)));
                }
                sh.atan2(w) - k * sh / (2.0 * r)
            }
            ObservationKind::HeightDifference => {
                self.point_partials(&mut partials, start.id(), [0.0, 0.0, -1.0]);
                self.point_partials(&mut partials, end.id(), [0.0, 0.0, 1.0]);
                dz
            }
        };
        Equation { partials, computed }
    }

    fn misclosure(kind: ObservationKind, observed: f64, computed: f64) -> f64 {
        match kind {
            ObservationKind::Direction => angle::wrapped_difference(observed, computed),
            ObservationKind::ZenithAngle => angle::reduce_zenith_face(observed, computed) - computed,
            _ => observed - computed,
        }
    }

    fn datum_points(&self, ids: &[String]) -> Vec<DatumPoint> {
        ids.iter()
            .filter_map(|id| {
                let p = self.points.get(id)?;
                let columns = *self.point_columns.get(id)?;
                Some(DatumPoint {
                    coordinates: p.coordinates(),
                    columns,
                })
            })
            .collect()
    }

    /// Writes parameter dispersion back onto parameters and points.
    fn apply_dispersion(&mut self, solution: &Solution) {
        for (param, &std) in self.parameters.iter_mut().zip(solution.parameter_std.iter()) {
            param.std = std;
            let axis = match param.kind {
                ParameterKind::CoordinateX => Axis::X,
                ParameterKind::CoordinateY => Axis::Y,
                ParameterKind::CoordinateZ => Axis::Z,
                _ => continue,
            };
            if let Some(point) = self.points.get_mut(&param.owner) {
                point.set_sigma_aposteriori(axis, std);
            }
        }
    }
}

impl Model for NetworkModel {
    fn parameter_count(&self) -> usize {
        self.parameters.len()
    }

    fn observation_count(&self) -> usize {
        self.observations.len() + self.pseudo_observations.len()
    }

    fn linearize(&self) -> Linearization {
        let rows = self.observation_count();
        let mut jacobian = DMatrix::zeros(rows, self.parameters.len());
        let mut misclosure = DVector::zeros(rows);

        for (row, obs) in self.observations.iter().enumerate() {
            let (Some(start), Some(end)) = (self.points.get(&obs.start), self.points.get(&obs.end)) else {
                continue;
            };
            let eq = self.equation(obs, start, end);
            for (column, value) in eq.partials {
                jacobian[(row, column)] += value;
            }
            misclosure[row] = Self::misclosure(obs.kind, self.reduced[row], eq.computed);
        }

        let offset = self.observations.len();
        for (k, pseudo) in self.pseudo_observations.iter().enumerate() {
            let row = offset + k;
            jacobian[(row, pseudo.column)] = 1.0;
            misclosure[row] = pseudo.value - self.parameters[pseudo.column].value;
        }

        Linearization {
            jacobian,
            misclosure,
        }
    }

    fn cofactor(&self) -> Cofactor {
        let q = self
            .observations
            .iter()
            .map(|o| if o.sigma > 0.0 { o.sigma * o.sigma } else { 0.0 })
            .chain(self.pseudo_observations.iter().map(|p| p.sigma * p.sigma));
        Cofactor::Diagonal(DVector::from_iterator(self.observation_count(), q))
    }

    fn variance_component_types(&self) -> Vec<VarianceComponentType> {
        let stochastic = VarianceComponentType::stochastic_point(self.dimension);
        self.observations
            .iter()
            .map(|o| VarianceComponentType::from_observation_kind(o.kind))
            .chain(self.pseudo_observations.iter().map(|_| stochastic))
            .collect()
    }

    fn update(&mut self, dx: &DVector<f64>) {
        for (param, delta) in self.parameters.iter_mut().zip(dx.iter()) {
            param.value += delta;
            let axis = match param.kind {
                ParameterKind::Orientation => {
                    param.value = angle::normalize(param.value);
                    continue;
                }
                ParameterKind::CoordinateX => Axis::X,
                ParameterKind::CoordinateY => Axis::Y,
                ParameterKind::CoordinateZ => Axis::Z,
                _ => continue,
            };
            if let Some(point) = self.points.get_mut(&param.owner) {
                point.set_coordinate(axis, param.value);
            }
        }
    }

    fn datum_constraints(&self) -> Option<DMatrix<f64>> {
        let (defect, ids) = self.datum.as_ref()?;
        let g = datum_matrix(defect, self.parameters.len(), &self.datum_points(ids));
        (g.ncols() > 0).then_some(g)
    }
}

/// Adjusted observation with its residual and outlier test.
#[derive(Clone, Debug, Serialize)]
pub struct ObservationResult {
    pub kind: ObservationKind,
    pub start: String,
    pub end: String,
    pub group: String,
    /// Reduced observed value, model units.
    pub observed: f64,
    pub adjusted: f64,
    pub residual: f64,
    pub sigma: f64,
    pub test: LocalTest,
}

/// Residual and test of one stochastic coordinate.
#[derive(Clone, Debug, Serialize)]
pub struct StochasticCoordinateResult {
    pub point: String,
    pub axis: Axis,
    pub apriori: f64,
    pub residual: f64,
    pub test: LocalTest,
}

/// A network model driven by its estimator.
pub struct NetworkAdjustment {
    model: NetworkModel,
    estimator: Estimator,
}

impl NetworkAdjustment {
    pub fn new(model: NetworkModel, estimator: Estimator) -> Self {
        Self { model, estimator }
    }

    pub fn model(&self) -> &NetworkModel {
        &self.model
    }

    pub fn estimator(&self) -> &Estimator {
        &self.estimator
    }

    pub fn estimator_mut(&mut self) -> &mut Estimator {
        &mut self.estimator
    }

    pub fn solution(&self) -> Option<&Solution> {
        self.estimator.solution()
    }

    pub fn adjust(&mut self) -> EstimationState {
        let state = self.estimator.estimate(&mut self.model);
        if let Some(solution) = self.estimator.solution() {
            self.model.apply_dispersion(solution);
        } else if state != EstimationState::Converged {
            warn!("Network adjustment ended in state {state}");
        }
        state
    }

    /// Residuals and local tests of the observations; empty before convergence.
    pub fn observation_results(&self) -> Vec<ObservationResult> {
        let Some(solution) = self.estimator.solution() else {
            return Vec::new();
        };
        self.model
            .observations
            .iter()
            .enumerate()
            .map(|(i, obs)| {
                let observed = self.model.reduced[i];
                let residual = solution.residuals[i];
                let adjusted = if obs.kind == ObservationKind::Direction {
                    angle::normalize(observed + residual)
                } else {
                    observed + residual
                };
                ObservationResult {
                    kind: obs.kind,
                    start: obs.start.clone(),
                    end: obs.end.clone(),
                    group: obs.group.clone(),
                    observed,
                    adjusted,
                    residual,
                    sigma: obs.sigma,
                    test: solution.local_tests[i],
                }
            })
            .collect()
    }

    /// Residuals and tests of the stochastic point pseudo-observations.
    pub fn stochastic_results(&self) -> Vec<StochasticCoordinateResult> {
        let Some(solution) = self.estimator.solution() else {
            return Vec::new();
        };
        let offset = self.model.observations.len();
        self.model
            .pseudo_observations
            .iter()
            .enumerate()
            .map(|(k, pseudo)| StochasticCoordinateResult {
                point: pseudo.point.clone(),
                axis: pseudo.axis,
                apriori: pseudo.value,
                residual: solution.residuals[offset + k],
                test: solution.local_tests[offset + k],
            })
            .collect()
    }

    /// Coordinates and cofactor block of the unknown points, as input for a
    /// congruence analysis. `None` before convergence.
    pub fn epoch_solution(&self) -> Option<EpochSolution> {
        let solution = self.estimator.solution()?;
        let qxx = self.estimator.qxx()?;
        let axes = self.model.dimension.axes();

        let mut ids = Vec::new();
        let mut coordinates = Vec::new();
        let mut columns = Vec::new();
        for point in self.model.points.points() {
            let Some(cols) = self.model.point_columns.get(point.id()) else {
                continue;
            };
            ids.push(point.id().to_string());
            coordinates.push(point.coordinates());
            columns.extend(axes.iter().filter_map(|a| cols[a.index()]));
        }
        let cofactor = DMatrix::from_fn(columns.len(), columns.len(), |i, j| qxx[(columns[i], columns[j])]);

        Some(EpochSolution::new(
            self.model.dimension,
            ids,
            coordinates,
            cofactor,
            solution.omega,
            solution.redundancy,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adjustment::EstimationParameters;

    fn approx_eq(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() < tol
    }

    fn levelling() -> NetworkBuilder {
        let mut builder = NetworkBuilder::new(Dimension::One);
        builder
            .add_point(Point::new("A", Dimension::One, PointRole::Reference, &[100.0]).expect("A"))
            .expect("add");
        builder
            .add_point(Point::new("B", Dimension::One, PointRole::New, &[101.0]).expect("B"))
            .expect("add");
        builder
            .add_point(Point::new("C", Dimension::One, PointRole::New, &[102.0]).expect("C"))
            .expect("add");
        for (s, e, dh) in [("A", "B", 1.003), ("B", "C", 0.998), ("A", "C", 2.004)] {
            builder.add_observation(Observation::new(ObservationKind::HeightDifference, s, e, dh, 0.001));
        }
        builder
    }

    #[test]
    fn levelling_loop_distributes_misclosure() {
        let model = levelling().build().expect("valid network");
        assert_eq!(model.parameters().len(), 2);
        assert!(!model.is_free());
        let mut adjustment = NetworkAdjustment::new(model, Estimator::new(EstimationParameters::default()));
        assert_eq!(adjustment.adjust(), EstimationState::Converged);
        // loop misclosure 1.003 + 0.998 − 2.004 = −0.003 spread evenly
        let b = adjustment.model().points().get("B").expect("B").z();
        let c = adjustment.model().points().get("C").expect("C").z();
        assert!(approx_eq(b, 101.004, 1e-9));
        assert!(approx_eq(c, 102.003, 1e-9));
        let results = adjustment.observation_results();
        assert!(results.iter().all(|r| approx_eq(r.residual.abs(), 0.001, 1e-9)));
        assert!(adjustment.model().points().get("B").expect("B").sigma_aposteriori(Axis::Z) > 0.0);
    }

    #[test]
    fn unknown_point_is_rejected() {
        let mut builder = levelling();
        builder.add_observation(Observation::new(ObservationKind::HeightDifference, "A", "X", 1.0, 0.001));
        assert!(matches!(builder.build(), Err(ConfigError::UnknownPoint(id)) if id == "X"));
    }

    #[test]
    fn planar_observation_in_height_network_is_rejected() {
        let mut builder = levelling();
        builder.add_observation(Observation::new(ObservationKind::Direction, "A", "B", 1.0, 1e-5));
        assert!(matches!(
            builder.build(),
            Err(ConfigError::UnsupportedObservation { index: 3, .. })
        ));
    }

    #[test]
    fn mixed_dimensions_are_rejected() {
        let mut builder = levelling();
        let p = Point::new("P", Dimension::Two, PointRole::New, &[0.0, 0.0]).expect("P");
        assert!(matches!(builder.add_point(p), Err(ConfigError::DimensionMismatch { .. })));
    }

    #[test]
    fn stochastic_point_adds_pseudo_observation() {
        let mut builder = NetworkBuilder::new(Dimension::One);
        let mut a = Point::new("A", Dimension::One, PointRole::Stochastic, &[100.0]).expect("A");
        a.set_sigma_apriori(Axis::Z, 0.002);
        builder.add_point(a).expect("add");
        builder
            .add_point(Point::new("B", Dimension::One, PointRole::New, &[101.0]).expect("B"))
            .expect("add");
        builder.add_observation(Observation::new(ObservationKind::HeightDifference, "A", "B", 1.0, 0.001));
        let model = builder.build().expect("valid");
        assert_eq!(model.observation_count(), 2);
        assert!(!model.is_free());
        let mut adjustment = NetworkAdjustment::new(model, Estimator::new(EstimationParameters::default()));
        assert_eq!(adjustment.adjust(), EstimationState::Converged);
        let b = adjustment.model().points().get("B").expect("B");
        assert!(approx_eq(b.z(), 101.0, 1e-9));
    }

    #[test]
    fn variance_components_follow_observation_kinds() {
        let mut builder = levelling();
        let mut d = Point::new("D", Dimension::One, PointRole::Stochastic, &[103.0]).expect("D");
        d.set_sigma_apriori(Axis::Z, 0.002);
        builder.add_point(d).expect("add");
        builder.add_observation(Observation::new(ObservationKind::HeightDifference, "C", "D", 0.999, 0.001));
        let mut adjustment = NetworkAdjustment::new(
            builder.build().expect("valid network"),
            Estimator::new(EstimationParameters::default()),
        );
        assert_eq!(adjustment.adjust(), EstimationState::Converged);

        let solution = adjustment.solution().expect("solution");
        let components = &solution.variance_components;
        let kinds: Vec<_> = components.iter().map(|c| c.kind).collect();
        assert_eq!(
            kinds,
            vec![
                VarianceComponentType::Global,
                VarianceComponentType::Levelling,
                VarianceComponentType::StochasticPoint1D
            ]
        );
        assert_eq!(components[1].observations, 4);
        assert_eq!(components[2].observations, 1);
        let redundancy: f64 = components[1..].iter().map(|c| c.redundancy).sum();
        let omega: f64 = components[1..].iter().map(|c| c.omega).sum();
        assert!(approx_eq(redundancy, solution.redundancy, 1e-9));
        assert!(approx_eq(omega, solution.omega, 1e-9));
    }

    #[test]
    fn simulation_keeps_approximations_and_reports_apriori_std() {
        let params = EstimationParameters {
            estimation_type: crate::adjustment::EstimationType::Simulation,
            ..Default::default()
        };
        let mut adjustment = NetworkAdjustment::new(
            levelling().build().expect("valid network"),
            Estimator::new(params),
        );
        assert_eq!(adjustment.adjust(), EstimationState::Converged);
        let b = adjustment.model().points().get("B").expect("B");
        assert!(approx_eq(b.z(), 101.0, 0.0));
        // Qxx = σ²/3 · [[2, 1], [1, 2]] for the loop A-B-C
        assert!(approx_eq(b.sigma_aposteriori(Axis::Z), (2.0f64 / 3.0).sqrt() * 1e-3, 1e-12));

        let solution = adjustment.solution().expect("solution");
        assert!(approx_eq(solution.redundancy, 1.0, 0.0));
        assert_eq!(solution.omega, 0.0);
        let results = adjustment.observation_results();
        assert!(results.iter().all(|r| r.residual == 0.0 && r.test.t_prio == 0.0));
        assert!(results.iter().all(|r| approx_eq(r.test.redundancy, 1.0 / 3.0, 1e-9)));
        assert!(results.iter().all(|r| r.test.minimal_detectable_bias > 0.0));
    }
}
