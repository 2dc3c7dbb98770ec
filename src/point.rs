//! Network points and point bundles.
//!
//! A [`Point`] stores its coordinates in a fixed `[x, y, z]` array and carries a
//! [`Dimension`] tag selecting the valid axes: height networks use `z` only,
//! planar networks `x` (north) and `y` (east), spatial networks all three.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

mod bundle;

pub use bundle::{PointBundle, TransformationParameterSet};

/// Network dimension. Fixed for a point once it is created.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "usize", into = "usize")]
pub enum Dimension {
    One,
    Two,
    Three,
}

impl Dimension {
    pub fn value(self) -> usize {
        match self {
            Dimension::One => 1,
            Dimension::Two => 2,
            Dimension::Three => 3,
        }
    }

    /// Coordinate axes that carry values at this dimension.
    pub fn axes(self) -> &'static [Axis] {
        match self {
            Dimension::One => &[Axis::Z],
            Dimension::Two => &[Axis::X, Axis::Y],
            Dimension::Three => &[Axis::X, Axis::Y, Axis::Z],
        }
    }

    pub fn has_axis(self, axis: Axis) -> bool {
        self.axes().contains(&axis)
    }
}

impl TryFrom<usize> for Dimension {
    type Error = ConfigError;

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Dimension::One),
            2 => Ok(Dimension::Two),
            3 => Ok(Dimension::Three),
            other => Err(ConfigError::UnsupportedDimension(other)),
        }
    }
}

impl From<Dimension> for usize {
    fn from(dimension: Dimension) -> Self {
        dimension.value()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    #[inline]
    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }
}

/// How a point takes part in the adjustment.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointRole {
    /// Fixed coordinates, no unknowns.
    Reference,
    /// Unknown coordinates tied to their a priori values by pseudo-observations.
    Stochastic,
    /// Unknown coordinates that define the datum of a free network.
    Datum,
    /// Unknown coordinates.
    #[default]
    New,
}

impl PointRole {
    pub fn is_unknown(self) -> bool {
        !matches!(self, PointRole::Reference)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Point {
    id: String,
    dimension: Dimension,
    role: PointRole,
    approximate: [f64; 3],
    coordinates: [f64; 3],
    sigma_apriori: [f64; 3],
    sigma_aposteriori: [f64; 3],
    has_approximation: bool,
}

impl Point {
    /// Creates a point from the components of its valid axes.
    ///
    /// `components` must hold exactly `dimension.value()` entries, in axis order.
    pub fn new(
        id: impl Into<String>,
        dimension: Dimension,
        role: PointRole,
        components: &[f64],
    ) -> Result<Self, ConfigError> {
        let id = id.into();
        if components.len() != dimension.value() {
            return Err(ConfigError::ComponentCount {
                id,
                expected: dimension.value(),
                found: components.len(),
            });
        }
        let mut coordinates = [0.0; 3];
        for (axis, value) in dimension.axes().iter().zip(components) {
            coordinates[axis.index()] = *value;
        }
        Ok(Self {
            id,
            dimension,
            role,
            approximate: coordinates,
            coordinates,
            sigma_apriori: [0.0; 3],
            sigma_aposteriori: [0.0; 3],
            has_approximation: true,
        })
    }

    /// Creates a point whose position is still unknown and must be seeded
    /// before the adjustment (e.g. by forward intersection).
    pub fn without_position(id: impl Into<String>, dimension: Dimension, role: PointRole) -> Self {
        Self {
            id: id.into(),
            dimension,
            role,
            approximate: [0.0; 3],
            coordinates: [0.0; 3],
            sigma_apriori: [0.0; 3],
            sigma_aposteriori: [0.0; 3],
            has_approximation: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn dimension(&self) -> Dimension {
        self.dimension
    }

    pub fn role(&self) -> PointRole {
        self.role
    }

    pub fn set_role(&mut self, role: PointRole) {
        self.role = role;
    }

    pub fn has_approximation(&self) -> bool {
        self.has_approximation
    }

    #[inline]
    pub fn x(&self) -> f64 {
        self.coordinates[0]
    }

    #[inline]
    pub fn y(&self) -> f64 {
        self.coordinates[1]
    }

    #[inline]
    pub fn z(&self) -> f64 {
        self.coordinates[2]
    }

    #[inline]
    pub fn coordinate(&self, axis: Axis) -> f64 {
        self.coordinates[axis.index()]
    }

    pub fn set_coordinate(&mut self, axis: Axis, value: f64) {
        if self.dimension.has_axis(axis) {
            self.coordinates[axis.index()] = value;
        }
    }

    /// Full coordinate array; invalid axes stay at zero.
    pub fn coordinates(&self) -> [f64; 3] {
        self.coordinates
    }

    /// Components of the valid axes in axis order.
    pub fn components(&self) -> Vec<f64> {
        self.dimension
            .axes()
            .iter()
            .map(|axis| self.coordinates[axis.index()])
            .collect()
    }

    pub fn approximate(&self, axis: Axis) -> f64 {
        self.approximate[axis.index()]
    }

    /// Replaces the approximate position and resets the current coordinates to it.
    pub fn set_approximate(&mut self, coordinates: [f64; 3]) {
        for axis in self.dimension.axes() {
            let i = axis.index();
            self.approximate[i] = coordinates[i];
            self.coordinates[i] = coordinates[i];
        }
        self.has_approximation = true;
    }

    pub fn sigma_apriori(&self, axis: Axis) -> f64 {
        self.sigma_apriori[axis.index()]
    }

    pub fn set_sigma_apriori(&mut self, axis: Axis, sigma: f64) {
        self.sigma_apriori[axis.index()] = sigma;
    }

    pub fn sigma_aposteriori(&self, axis: Axis) -> f64 {
        self.sigma_aposteriori[axis.index()]
    }

    pub fn set_sigma_aposteriori(&mut self, axis: Axis, sigma: f64) {
        self.sigma_aposteriori[axis.index()] = sigma;
    }

    /// Horizontal distance to `other`.
    pub fn distance_2d(&self, other: &Point) -> f64 {
        (other.x() - self.x()).hypot(other.y() - self.y())
    }

    /// Spatial distance to `other` over the axes both points carry.
    pub fn distance_3d(&self, other: &Point) -> f64 {
        let dz = if self.dimension.has_axis(Axis::Z) && other.dimension.has_axis(Axis::Z) {
            other.z() - self.z()
        } else {
            0.0
        };
        self.distance_2d(other).hypot(dz)
    }
}
