//! Approximate coordinates for points that enter the adjustment without a
//! position.
//!
//! The estimator linearizes around the current coordinates and needs a seed
//! inside its convergence radius. Positions are derived in rounds:
//!
//! 1. horizontal positions by forward intersection from direction groups at
//!    two positioned stations that also observe each other,
//! 2. heights by propagating height differences from positioned stations,
//! 3. anything still unknown falls back to the bundle centroid.
//!
//! Points solved in one round serve as fixed points in the next.

use log::{debug, warn};
use serde::Serialize;
use std::collections::HashMap;

use crate::observation::{Observation, ObservationKind};
use crate::point::{Axis, Dimension, PointBundle};

mod forward_intersection;

pub use forward_intersection::{ForwardIntersectionEntry, ForwardIntersectionSet, PairKey};

const MAX_ROUNDS: usize = 16;

/// What the seeding pass achieved.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ApproximationSummary {
    pub intersected: Vec<String>,
    pub levelled: Vec<String>,
    pub centroid_fallback: Vec<String>,
}

/// Directions of one group, measured at one station.
struct DirectionSet<'a> {
    station: &'a str,
    targets: HashMap<&'a str, f64>,
}

fn direction_sets(observations: &[Observation]) -> Vec<DirectionSet<'_>> {
    let mut sets: Vec<DirectionSet<'_>> = Vec::new();
    let mut by_group: HashMap<(&str, &str), usize> = HashMap::new();
    for obs in observations
        .iter()
        .filter(|o| o.kind == ObservationKind::Direction)
    {
        let key = (obs.group.as_str(), obs.start.as_str());
        let i = *by_group.entry(key).or_insert_with(|| {
            sets.push(DirectionSet {
                station: obs.start.as_str(),
                targets: HashMap::new(),
            });
            sets.len() - 1
        });
        // first reading of a target within a set wins
        sets[i].targets.entry(obs.end.as_str()).or_insert(obs.value);
    }
    sets
}

fn is_positioned(points: &PointBundle, id: &str) -> bool {
    points.get(id).is_some_and(|p| p.has_approximation())
}

/// One forward-intersection round. Returns the IDs that received a position.
fn intersect_round(points: &mut PointBundle, sets: &[DirectionSet<'_>]) -> Vec<String> {
    let mut intersections = ForwardIntersectionSet::new();
    for (i, set_a) in sets.iter().enumerate() {
        if !is_positioned(points, set_a.station) {
            continue;
        }
        for set_b in &sets[i + 1..] {
            if set_b.station == set_a.station || !is_positioned(points, set_b.station) {
                continue;
            }
            let (Some(&r_ab), Some(&r_ba)) = (
                set_a.targets.get(set_b.station),
                set_b.targets.get(set_a.station),
            ) else {
                continue;
            };
            for (&target, &r_an) in &set_a.targets {
                if is_positioned(points, target) || !points.contains(target) {
                    continue;
                }
                if let Some(&r_bn) = set_b.targets.get(target) {
                    intersections.add(set_a.station, set_b.station, target, r_ab, r_an, r_ba, r_bn);
                }
            }
        }
    }
    if intersections.is_empty() {
        return Vec::new();
    }

    let solved = intersections.adjust(points);
    let mut ids = Vec::with_capacity(solved.len());
    for p in solved.points() {
        if let Some(target) = points.get_mut(p.id()) {
            let mut c = target.coordinates();
            c[0] = p.x();
            c[1] = p.y();
            target.set_approximate(c);
            ids.push(p.id().to_string());
        }
    }
    ids
}

/// One height-propagation round for networks that carry heights.
fn level_round(
    points: &mut PointBundle,
    observations: &[Observation],
    heights: &mut HashMap<String, f64>,
) -> Vec<String> {
    let mut ids = Vec::new();
    for obs in observations
        .iter()
        .filter(|o| o.kind == ObservationKind::HeightDifference)
    {
        let known_start = heights.get(&obs.start).copied();
        let known_end = heights.get(&obs.end).copied();
        let (id, z) = match (known_start, known_end) {
            (Some(zs), None) => (
                &obs.end,
                zs + obs.instrument_height + obs.value - obs.target_height,
            ),
            (None, Some(ze)) => (
                &obs.start,
                ze + obs.target_height - obs.value - obs.instrument_height,
            ),
            _ => continue,
        };
        heights.insert(id.clone(), z);
        ids.push(id.clone());
        if let Some(p) = points.get_mut(id) {
            p.set_coordinate(Axis::Z, z);
        }
    }
    ids
}

/// Seeds every unpositioned point of `points` from `observations`.
pub fn seed_approximations(
    points: &mut PointBundle,
    observations: &[Observation],
) -> ApproximationSummary {
    let mut summary = ApproximationSummary::default();
    let Some(dimension) = points.dimension() else {
        return summary;
    };

    let pending: Vec<String> = points
        .points()
        .iter()
        .filter(|p| !p.has_approximation())
        .map(|p| p.id().to_string())
        .collect();
    if pending.is_empty() {
        return summary;
    }

    if dimension != Dimension::One {
        let sets = direction_sets(observations);
        for round in 0..MAX_ROUNDS {
            let solved = intersect_round(points, &sets);
            debug!("Approximation round {round}: {} points intersected", solved.len());
            if solved.is_empty() {
                break;
            }
            summary.intersected.extend(solved);
        }
    }

    if dimension.has_axis(Axis::Z) {
        let mut heights: HashMap<String, f64> = points
            .points()
            .iter()
            .filter(|p| p.has_approximation() && !pending.iter().any(|id| id == p.id()))
            .map(|p| (p.id().to_string(), p.z()))
            .collect();
        for _ in 0..MAX_ROUNDS {
            let solved = level_round(points, observations, &mut heights);
            if solved.is_empty() {
                break;
            }
            summary.levelled.extend(solved);
        }
        for id in &summary.levelled {
            if let Some(p) = points.get_mut(id) {
                if p.has_approximation() || dimension == Dimension::One {
                    let c = p.coordinates();
                    p.set_approximate(c);
                }
            }
        }
    }

    let fallback = points.centroid().unwrap_or([0.0; 3]);
    for p in points.points_mut() {
        if !p.has_approximation() {
            warn!(
                "No approximation for {}, starting from the network centroid",
                p.id()
            );
            let mut c = fallback;
            if summary.levelled.iter().any(|id| id == p.id()) {
                c[2] = p.z();
            }
            p.set_approximate(c);
            summary.centroid_fallback.push(p.id().to_string());
        }
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::angle;
    use crate::point::{Point, PointRole};

    fn direction(from: &Point, to: (f64, f64), station: &str, o: f64) -> Observation {
        let t = angle::azimuth(from.x(), from.y(), to.0, to.1);
        Observation::new(ObservationKind::Direction, station, "", angle::normalize(t - o), 1e-5)
    }

    #[test]
    fn seeds_new_point_from_two_stations() {
        let mut points = PointBundle::new();
        let a = Point::new("A", Dimension::Two, PointRole::Reference, &[0.0, 0.0]).expect("A");
        let b = Point::new("B", Dimension::Two, PointRole::Reference, &[0.0, 100.0]).expect("B");
        let n = (70.0, 30.0);
        let mut observations = Vec::new();
        let mut push = |from: &Point, to_id: &str, to: (f64, f64), o: f64| {
            let mut obs = direction(from, to, from.id(), o);
            obs.end = to_id.to_string();
            observations.push(obs);
        };
        push(&a, "B", (b.x(), b.y()), 0.4);
        push(&a, "N", n, 0.4);
        push(&b, "A", (a.x(), a.y()), 2.0);
        push(&b, "N", n, 2.0);
        points.add(a).expect("add");
        points.add(b).expect("add");
        points
            .add(Point::without_position("N", Dimension::Two, PointRole::New))
            .expect("add");

        let summary = seed_approximations(&mut points, &observations);
        assert_eq!(summary.intersected, vec!["N".to_string()]);
        assert!(summary.centroid_fallback.is_empty());
        let p = points.get("N").expect("N");
        assert!((p.x() - n.0).abs() < 1e-9);
        assert!((p.y() - n.1).abs() < 1e-9);
    }

    #[test]
    fn levels_heights_and_falls_back_to_centroid() {
        let mut points = PointBundle::new();
        points
            .add(Point::new("H1", Dimension::One, PointRole::Reference, &[100.0]).expect("H1"))
            .expect("add");
        points
            .add(Point::without_position("H2", Dimension::One, PointRole::New))
            .expect("add");
        points
            .add(Point::without_position("H3", Dimension::One, PointRole::New))
            .expect("add");
        let observations = vec![Observation::new(
            ObservationKind::HeightDifference,
            "H2",
            "H1",
            -2.5,
            1e-3,
        )];
        let summary = seed_approximations(&mut points, &observations);
        assert_eq!(summary.levelled, vec!["H2".to_string()]);
        assert_eq!(summary.centroid_fallback, vec!["H3".to_string()]);
        assert!((points.get("H2").expect("H2").z() - 102.5).abs() < 1e-12);
    }
}
