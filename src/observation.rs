//! Terrestrial observation types.

use serde::{Deserialize, Serialize};

use crate::point::Dimension;
use crate::unit::MeasurementKind;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObservationKind {
    /// Horizontal direction; every group shares one orientation unknown.
    Direction,
    HorizontalDistance,
    SlopeDistance,
    ZenithAngle,
    HeightDifference,
}

impl ObservationKind {
    pub fn measurement_kind(self) -> MeasurementKind {
        match self {
            ObservationKind::Direction | ObservationKind::ZenithAngle => MeasurementKind::Angle,
            ObservationKind::HorizontalDistance
            | ObservationKind::SlopeDistance
            | ObservationKind::HeightDifference => MeasurementKind::Length,
        }
    }

    pub fn is_angle(self) -> bool {
        self.measurement_kind() == MeasurementKind::Angle
    }

    pub fn is_distance(self) -> bool {
        matches!(
            self,
            ObservationKind::HorizontalDistance | ObservationKind::SlopeDistance
        )
    }

    /// Whether a network of `dimension` can model this observation.
    pub fn supports(self, dimension: Dimension) -> bool {
        match dimension {
            Dimension::One => self == ObservationKind::HeightDifference,
            Dimension::Two => matches!(
                self,
                ObservationKind::Direction | ObservationKind::HorizontalDistance
            ),
            Dimension::Three => true,
        }
    }
}

/// A single measured value between two points.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub kind: ObservationKind,
    pub start: String,
    pub end: String,
    /// Model units: radians or metres.
    pub value: f64,
    /// A priori standard deviation; non-positive values mean "no constraint".
    pub sigma: f64,
    #[serde(default)]
    pub instrument_height: f64,
    #[serde(default)]
    pub target_height: f64,
    /// Observations of one group share additional unknowns (orientation,
    /// scale, zero-point offset, refraction).
    #[serde(default)]
    pub group: String,
}

impl Observation {
    pub fn new(
        kind: ObservationKind,
        start: impl Into<String>,
        end: impl Into<String>,
        value: f64,
        sigma: f64,
    ) -> Self {
        let start = start.into();
        let group = start.clone();
        Self {
            kind,
            start,
            end: end.into(),
            value,
            sigma,
            instrument_height: 0.0,
            target_height: 0.0,
            group,
        }
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    pub fn with_heights(mut self, instrument_height: f64, target_height: f64) -> Self {
        self.instrument_height = instrument_height;
        self.target_height = target_height;
        self
    }
}

/// Additional unknowns estimated for one observation group.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupParameters {
    /// Distance scale `m` in `s_obs = (s − c)/m`.
    pub scale: bool,
    /// Distance zero-point offset `c`.
    pub zero_point_offset: bool,
    /// Refraction coefficient of zenith angles.
    pub refraction: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_defaults_to_station() {
        let obs = Observation::new(ObservationKind::Direction, "S1", "T1", 0.5, 1e-4);
        assert_eq!(obs.group, "S1");
        assert_eq!(obs.with_group("set-2").group, "set-2");
    }

    #[test]
    fn support_per_dimension() {
        assert!(ObservationKind::HeightDifference.supports(Dimension::One));
        assert!(!ObservationKind::Direction.supports(Dimension::One));
        assert!(ObservationKind::HorizontalDistance.supports(Dimension::Two));
        assert!(!ObservationKind::ZenithAngle.supports(Dimension::Two));
        assert!(ObservationKind::ZenithAngle.supports(Dimension::Three));
    }
}
