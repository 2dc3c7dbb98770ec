//! Reduction and projection of field measurements.
//!
//! # Overview
//! Raw observations refer to the instrument's local horizon. Before the
//! estimator compares them with plane coordinates, a network may reduce them:
//!
//! - **Height** reduces horizontal distances to the reference height,
//!   `s · R/(R + h0)`.
//! - **Distance** applies the Gauss-Krüger/UTM scale,
//!   `m0 · (1 + (yS² + yS·yE + yE²)/(6R²)) · s`.
//! - **Direction** adds the arc-to-chord correction
//!   `−(xE − xS)(2yS + yE)/(6R²m0²)`.
//! - **EarthCurvature** lowers zenith targets by `sH²/(2R)`.
//!
//! A correction runs only when its task is active *and* the projection type
//! asks for it. `R` is the conformal-sphere radius at the principal point.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::angle;
use crate::point::{Axis, Point};

mod ellipsoid;
mod projection;

pub use ellipsoid::{Ellipsoid, EllipsoidKind};
pub use projection::{Projection, ProjectionType};

/// Easting range that marks zone-prefixed Gauss-Krüger/UTM coordinates.
const EASTING_RANGE: (f64, f64) = (1_100_000.0, 59_800_000.0);
const FALSE_EASTING: f64 = 500_000.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReductionTask {
    Distance,
    Height,
    Direction,
    EarthCurvature,
}

/// Geographic position of the network's principal point.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PrincipalPoint {
    /// Radians.
    pub latitude: f64,
    /// Radians.
    pub longitude: f64,
    pub height: f64,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Reduction {
    pub ellipsoid: Ellipsoid,
    pub principal_point: PrincipalPoint,
    tasks: HashSet<ReductionTask>,
}

impl Reduction {
    pub fn new(ellipsoid: Ellipsoid, principal_point: PrincipalPoint) -> Self {
        Self {
            ellipsoid,
            principal_point,
            tasks: HashSet::new(),
        }
    }

    pub fn add_task(&mut self, task: ReductionTask) -> bool {
        self.tasks.insert(task)
    }

    pub fn remove_task(&mut self, task: ReductionTask) -> bool {
        self.tasks.remove(&task)
    }

    pub fn applies(&self, task: ReductionTask) -> bool {
        self.tasks.contains(&task)
    }

    pub fn tasks(&self) -> impl Iterator<Item = &ReductionTask> {
        self.tasks.iter()
    }

    /// Local earth radius used by every curvature-dependent correction.
    pub fn earth_radius(&self) -> f64 {
        self.ellipsoid
            .conformal_radius(self.principal_point.latitude)
    }
}

/// Reduction plus projection: decides which correction applies to an observation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ObservationModel {
    pub reduction: Reduction,
    pub projection: Projection,
}

impl ObservationModel {
    pub fn new(reduction: Reduction, projection: Projection) -> Self {
        Self {
            reduction,
            projection,
        }
    }

    pub fn earth_radius(&self) -> f64 {
        self.reduction.earth_radius()
    }

    /// Whether zenith angles carry the earth-curvature term.
    pub fn applies_earth_curvature(&self) -> bool {
        self.reduction.applies(ReductionTask::EarthCurvature)
    }

    /// Reduces an observed horizontal distance between `start` and `end`.
    pub fn reduce_horizontal_distance(&self, distance: f64, start: &Point, end: &Point) -> f64 {
        let r = self.earth_radius();
        let mut reduced = distance;

        if self.reduction.applies(ReductionTask::Height) && self.projection.is_height_reduction() {
            let h0 = reference_height(start, end, self.projection.reference_height);
            reduced *= r / (r + h0);
        }

        if self.reduction.applies(ReductionTask::Distance)
            && (self.projection.is_gauss_krueger() || self.projection.is_utm())
        {
            if let (Some(ys), Some(ye)) = (zone_easting(start.y()), zone_easting(end.y())) {
                let m0 = self.projection.projection_type.central_scale();
                let k = (ys * ys + ys * ye + ye * ye) / (6.0 * r * r);
                reduced *= m0 * (1.0 + k);
            }
        }
        reduced
    }

    /// Applies the arc-to-chord correction to an observed direction.
    pub fn reduce_direction(&self, direction: f64, start: &Point, end: &Point) -> f64 {
        if !(self.reduction.applies(ReductionTask::Direction)
            && self.projection.is_direction_reduction())
        {
            return direction;
        }
        let (Some(ys), Some(ye)) = (zone_easting(start.y()), zone_easting(end.y())) else {
            return direction;
        };
        let r = self.earth_radius();
        let m0 = self.projection.projection_type.central_scale();
        let k = -(end.x() - start.x()) * (2.0 * ys + ye) / (6.0 * r * r * m0 * m0);
        angle::normalize(direction + k)
    }
}

/// Strips the zone prefix and false easting; `None` outside the zone range.
fn zone_easting(y: f64) -> Option<f64> {
    if (EASTING_RANGE.0..=EASTING_RANGE.1).contains(&y) {
        Some(((y / 1e6) % 1.0) * 1e6 - FALSE_EASTING)
    } else {
        None
    }
}

fn reference_height(start: &Point, end: &Point, fallback: f64) -> f64 {
    let hs = start.dimension().has_axis(Axis::Z).then(|| start.z());
    let he = end.dimension().has_axis(Axis::Z).then(|| end.z());
    match (hs, he) {
        (Some(a), Some(b)) => 0.5 * (a + b),
        (Some(a), None) | (None, Some(a)) => a,
        (None, None) => fallback,
    }
}
