//! Variance components: Ω and redundancy split by observation type.
//!
//! Each component yields its own `σ̂²ᵢ = Ωᵢ / rᵢ`. A component far from 1
//! while the others are close to it points at mis-scaled a priori
//! uncertainties of that observation type.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::observation::ObservationKind;
use crate::point::Dimension;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VarianceComponentType {
    Global,
    Levelling,
    Direction,
    HorizontalDistance,
    SlopeDistance,
    ZenithAngle,
    #[serde(rename = "stochastic_point_1d")]
    StochasticPoint1D,
    #[serde(rename = "stochastic_point_2d")]
    StochasticPoint2D,
    #[serde(rename = "stochastic_point_3d")]
    StochasticPoint3D,
}

impl VarianceComponentType {
    /// Stable numeric identifier.
    pub fn id(self) -> i32 {
        match self {
            VarianceComponentType::Global => 0,
            VarianceComponentType::Levelling => 10,
            VarianceComponentType::Direction => 20,
            VarianceComponentType::HorizontalDistance => 30,
            VarianceComponentType::SlopeDistance => 40,
            VarianceComponentType::ZenithAngle => 50,
            VarianceComponentType::StochasticPoint1D => 101,
            VarianceComponentType::StochasticPoint2D => 102,
            VarianceComponentType::StochasticPoint3D => 103,
        }
    }

    pub fn from_observation_kind(kind: ObservationKind) -> Self {
        match kind {
            ObservationKind::HeightDifference => VarianceComponentType::Levelling,
            ObservationKind::Direction => VarianceComponentType::Direction,
            ObservationKind::HorizontalDistance => VarianceComponentType::HorizontalDistance,
            ObservationKind::SlopeDistance => VarianceComponentType::SlopeDistance,
            ObservationKind::ZenithAngle => VarianceComponentType::ZenithAngle,
        }
    }

    /// Component of the coordinate pseudo-observations of stochastic points.
    pub fn stochastic_point(dimension: Dimension) -> Self {
        match dimension {
            Dimension::One => VarianceComponentType::StochasticPoint1D,
            Dimension::Two => VarianceComponentType::StochasticPoint2D,
            Dimension::Three => VarianceComponentType::StochasticPoint3D,
        }
    }
}

/// Share of one observation type in the weighted square sum.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct VarianceComponent {
    pub kind: VarianceComponentType,
    /// Observations with a positive weight.
    pub observations: usize,
    /// Sum of the redundancy numbers.
    pub redundancy: f64,
    pub omega: f64,
    /// `Ω / r`, or 0 without redundancy.
    pub variance_of_unit_weight: f64,
}

impl VarianceComponent {
    pub fn new(kind: VarianceComponentType, observations: usize, redundancy: f64, omega: f64) -> Self {
        let variance_of_unit_weight = if redundancy > 0.0 { omega / redundancy } else { 0.0 };
        Self {
            kind,
            observations,
            redundancy,
            omega,
            variance_of_unit_weight,
        }
    }

    /// Groups `(type, Ω contribution, redundancy number)` rows into components,
    /// ordered by type.
    pub fn split(rows: &[(VarianceComponentType, f64, f64)]) -> Vec<Self> {
        let mut sums: BTreeMap<VarianceComponentType, (usize, f64, f64)> = BTreeMap::new();
        for &(kind, omega, redundancy) in rows {
            let sum = sums.entry(kind).or_insert((0, 0.0, 0.0));
            sum.0 += 1;
            sum.1 += redundancy;
            sum.2 += omega;
        }
        sums.into_iter()
            .map(|(kind, (n, r, omega))| Self::new(kind, n, r, omega))
            .collect()
    }
}
