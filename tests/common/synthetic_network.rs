use geodetic_adjustment::angle;
use geodetic_adjustment::observation::{Observation, ObservationKind};

pub const DIRECTION_SIGMA: f64 = 1e-5;
pub const DISTANCE_SIGMA: f64 = 1e-3;

/// Planar point with its true position.
#[derive(Clone, Copy, Debug)]
pub struct Station {
    pub id: &'static str,
    pub x: f64,
    pub y: f64,
}

pub const fn station(id: &'static str, x: f64, y: f64) -> Station {
    Station { id, x, y }
}

/// Noise-free directions from `from` to every target, reduced by the
/// station's orientation.
pub fn directions(from: Station, targets: &[Station], orientation: f64) -> Vec<Observation> {
    targets
        .iter()
        .filter(|t| t.id != from.id)
        .map(|t| {
            let r = angle::normalize(angle::azimuth(from.x, from.y, t.x, t.y) - orientation);
            Observation::new(ObservationKind::Direction, from.id, t.id, r, DIRECTION_SIGMA)
        })
        .collect()
}

/// Noise-free horizontal distances from `from` to every target.
pub fn distances(from: Station, targets: &[Station]) -> Vec<Observation> {
    targets
        .iter()
        .filter(|t| t.id != from.id)
        .map(|t| {
            let s = (t.x - from.x).hypot(t.y - from.y);
            Observation::new(ObservationKind::HorizontalDistance, from.id, t.id, s, DISTANCE_SIGMA)
        })
        .collect()
}

/// Directions and distances between all stations, one orientation per
/// station derived from its index.
pub fn full_planar_observations(stations: &[Station]) -> Vec<Observation> {
    let mut observations = Vec::new();
    for (i, s) in stations.iter().enumerate() {
        observations.extend(directions(*s, stations, 0.4 + 1.3 * i as f64));
        observations.extend(distances(*s, stations));
    }
    observations
}

/// Deterministic offset of a few centimetres, used to spoil approximations.
pub fn perturbation(i: usize) -> (f64, f64) {
    let k = i as f64 + 1.0;
    (0.03 * (1.7 * k).sin(), -0.02 * (2.3 * k).cos())
}

pub fn distance(a: [f64; 3], b: [f64; 3]) -> f64 {
    (b[0] - a[0]).hypot(b[1] - a[1])
}
