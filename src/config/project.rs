use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::adjustment::{
    EstimationParameters, Estimator, NetworkAdjustment, NetworkBuilder, NetworkModel,
};
use crate::error::ConfigError;
use crate::observation::{GroupParameters, Observation, ObservationKind};
use crate::point::{Dimension, Point, PointRole, TransformationParameterSet};
use crate::reduction::{
    EllipsoidKind, ObservationModel, PrincipalPoint, Projection, Reduction, ReductionTask,
};
use crate::statistic::TestStatisticDefinition;
use crate::unit::{MeasurementKind, UnitTable};

/// One adjustment project: network, reductions and estimation settings.
///
/// Values are given in the units of [`Self::units`] and converted to model
/// units by [`Self::network`].
#[derive(Clone, Debug, Deserialize)]
pub struct ProjectConfig {
    pub dimension: usize,
    #[serde(default)]
    pub units: UnitTable,
    pub points: Vec<PointConfig>,
    #[serde(default)]
    pub observations: Vec<ObservationConfig>,
    /// Additional unknowns per observation group.
    #[serde(default)]
    pub groups: HashMap<String, GroupParameters>,
    #[serde(default)]
    pub reduction: ReductionConfig,
    #[serde(default)]
    pub projection: Projection,
    /// Applied to the point coordinates before the adjustment.
    #[serde(default)]
    pub transformation: TransformationParameterSet,
    #[serde(default)]
    pub estimation: EstimationParameters,
    #[serde(default)]
    pub test_statistic: TestStatisticDefinition,
    #[serde(default)]
    pub approximation: ApproximationConfig,
}

#[derive(Clone, Debug, Deserialize)]
pub struct PointConfig {
    pub id: String,
    #[serde(default)]
    pub role: PointRole,
    /// Components of the valid axes; omitted for points still to be seeded.
    #[serde(default)]
    pub coordinates: Option<Vec<f64>>,
    /// A priori std per axis of a stochastic point.
    #[serde(default)]
    pub sigma: Option<Vec<f64>>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ObservationConfig {
    pub kind: ObservationKind,
    pub start: String,
    pub end: String,
    pub value: f64,
    pub sigma: f64,
    #[serde(default)]
    pub instrument_height: f64,
    #[serde(default)]
    pub target_height: f64,
    /// Defaults to the start point.
    #[serde(default)]
    pub group: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct ReductionConfig {
    pub ellipsoid: EllipsoidKind,
    /// Latitude and longitude in angle units.
    pub principal_point: PrincipalPoint,
    pub tasks: Vec<ReductionTask>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ApproximationConfig {
    pub enabled: bool,
}

impl Default for ApproximationConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

pub fn load_config(path: &Path) -> Result<ProjectConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })
}

impl ProjectConfig {
    pub fn network_dimension(&self) -> Result<Dimension, ConfigError> {
        Dimension::try_from(self.dimension)
    }

    fn point(&self, config: &PointConfig, dimension: Dimension) -> Result<Point, ConfigError> {
        let mut point = match &config.coordinates {
            Some(components) => {
                let components: Vec<f64> = components
                    .iter()
                    .map(|c| self.units.to_model(MeasurementKind::Length, *c))
                    .collect();
                Point::new(&config.id, dimension, config.role, &components)?
            }
            None => Point::without_position(&config.id, dimension, config.role),
        };
        if let Some(sigma) = &config.sigma {
            if sigma.len() != dimension.value() {
                return Err(ConfigError::ComponentCount {
                    id: config.id.clone(),
                    expected: dimension.value(),
                    found: sigma.len(),
                });
            }
            for (axis, s) in dimension.axes().iter().zip(sigma) {
                let s = self.units.uncertainty_to_model(MeasurementKind::Length, *s);
                point.set_sigma_apriori(*axis, s);
            }
        }
        Ok(point)
    }

    fn observation(&self, config: &ObservationConfig) -> Observation {
        let kind = config.kind.measurement_kind();
        let height = |h: f64| self.units.to_model(MeasurementKind::Length, h);
        let observation = Observation::new(
            config.kind,
            &config.start,
            &config.end,
            self.units.to_model(kind, config.value),
            self.units.uncertainty_to_model(kind, config.sigma),
        )
        .with_heights(height(config.instrument_height), height(config.target_height));
        match &config.group {
            Some(group) => observation.with_group(group),
            None => observation,
        }
    }

    fn observation_model(&self) -> ObservationModel {
        let principal_point = PrincipalPoint {
            latitude: self
                .units
                .to_model(MeasurementKind::Angle, self.reduction.principal_point.latitude),
            longitude: self
                .units
                .to_model(MeasurementKind::Angle, self.reduction.principal_point.longitude),
            height: self
                .units
                .to_model(MeasurementKind::Length, self.reduction.principal_point.height),
        };
        let mut reduction = Reduction::new(self.reduction.ellipsoid.into(), principal_point);
        for task in &self.reduction.tasks {
            reduction.add_task(*task);
        }
        ObservationModel::new(reduction, self.projection.clone())
    }

    /// Collects the network input in model units.
    pub fn builder(&self) -> Result<NetworkBuilder, ConfigError> {
        let dimension = self.network_dimension()?;
        let mut builder = NetworkBuilder::new(dimension);
        for config in &self.points {
            builder.add_point(self.point(config, dimension)?)?;
        }
        if !self.transformation.is_identity() {
            let points = builder.points_mut();
            points.set_transformation(self.transformation.clone());
            points.apply_transformation();
        }
        for config in &self.observations {
            builder.add_observation(self.observation(config));
        }
        for (group, parameters) in &self.groups {
            builder.set_group_parameters(group, parameters.clone());
        }
        builder.set_observation_model(self.observation_model());
        builder.set_approximation(self.approximation.enabled);
        Ok(builder)
    }

    pub fn network(&self) -> Result<NetworkModel, ConfigError> {
        self.builder()?.build()
    }

    /// Network with an estimator configured from the project settings.
    pub fn adjustment(&self) -> Result<NetworkAdjustment, ConfigError> {
        let estimator = Estimator::new(self.estimation.clone())
            .with_test_statistic(self.test_statistic.clone());
        Ok(NetworkAdjustment::new(self.network()?, estimator))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unit::Unit;

    fn approx_eq(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() < tol
    }

    const LEVELLING: &str = r#"{
        "dimension": 1,
        "units": { "length": "millimeter" },
        "points": [
            { "id": "A", "role": "reference", "coordinates": [100000.0] },
            { "id": "B", "coordinates": [101000.0] }
        ],
        "observations": [
            { "kind": "height_difference", "start": "A", "end": "B", "value": 1004.0, "sigma": 1.0 }
        ],
        "estimation": { "max_iterations": 10 }
    }"#;

    #[test]
    fn project_values_are_converted_to_model_units() {
        let config: ProjectConfig = serde_json::from_str(LEVELLING).expect("valid project");
        assert_eq!(config.units.unit(MeasurementKind::Length), Unit::Millimeter);
        assert_eq!(config.estimation.max_iterations, 10);
        assert!(config.approximation.enabled);

        let network = config.network().expect("network");
        assert!(approx_eq(network.reduced_values()[0], 1.004, 1e-12));
        assert!(approx_eq(network.observations()[0].sigma, 1e-3, 1e-15));
        let b = network.points().get("B").expect("B");
        assert!(approx_eq(b.z(), 101.0, 1e-9));
    }

    #[test]
    fn project_adjustment_uses_configured_estimation() {
        let config: ProjectConfig = serde_json::from_str(LEVELLING).expect("valid project");
        let mut adjustment = config.adjustment().expect("adjustment");
        assert_eq!(adjustment.estimator().params().max_iterations, 10);
        assert_eq!(adjustment.adjust(), crate::adjustment::EstimationState::Converged);
        let b = adjustment.model().points().get("B").expect("B");
        assert!(approx_eq(b.z(), 101.004, 1e-9));
    }

    #[test]
    fn simulation_is_selected_by_the_estimation_section() {
        let json = LEVELLING.replace(
            "\"max_iterations\": 10",
            "\"max_iterations\": 10, \"estimation_type\": \"simulation\"",
        );
        let config: ProjectConfig = serde_json::from_str(&json).expect("valid project");
        assert_eq!(
            config.estimation.estimation_type,
            crate::adjustment::EstimationType::Simulation
        );
        let mut adjustment = config.adjustment().expect("adjustment");
        assert_eq!(adjustment.adjust(), crate::adjustment::EstimationState::Converged);
        let b = adjustment.model().points().get("B").expect("B");
        assert!(approx_eq(b.z(), 101.0, 1e-9));
        assert!(approx_eq(b.sigma_aposteriori(crate::point::Axis::Z), 1e-3, 1e-12));
    }

    #[test]
    fn wrong_unit_kind_is_rejected() {
        let json = LEVELLING.replace("\"millimeter\"", "\"degree\"");
        assert!(serde_json::from_str::<ProjectConfig>(&json).is_err());
    }

    #[test]
    fn unsupported_dimension_is_reported() {
        let json = LEVELLING.replace("\"dimension\": 1", "\"dimension\": 4");
        let config: ProjectConfig = serde_json::from_str(&json).expect("parses");
        assert!(matches!(
            config.network(),
            Err(ConfigError::UnsupportedDimension(4))
        ));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        assert!(matches!(
            load_config(Path::new("/nonexistent/project.json")),
            Err(ConfigError::Io { .. })
        ));
    }
}
