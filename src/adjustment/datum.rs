use nalgebra::DMatrix;
use serde::Serialize;
use std::collections::HashMap;

use crate::observation::{GroupParameters, Observation, ObservationKind};
use crate::point::Dimension;

/// Datum parameters a free network cannot determine from its observations.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RankDefect {
    pub translation_x: bool,
    pub translation_y: bool,
    pub translation_z: bool,
    pub rotation_x: bool,
    pub rotation_y: bool,
    pub rotation_z: bool,
    pub scale: bool,
}

impl RankDefect {
    /// Derives the defect from the observation types of the network.
    pub fn detect(
        dimension: Dimension,
        observations: &[Observation],
        groups: &HashMap<String, GroupParameters>,
    ) -> Self {
        let has = |kind: ObservationKind| observations.iter().any(|o| o.kind == kind);
        let distance_groups: Vec<&str> = observations
            .iter()
            .filter(|o| o.kind.is_distance())
            .map(|o| o.group.as_str())
            .collect();

        match dimension {
            Dimension::One => RankDefect {
                translation_z: true,
                ..Default::default()
            },
            Dimension::Two => {
                let free_scale = distance_groups
                    .iter()
                    .all(|g| groups.get(*g).is_some_and(|p| p.scale));
                RankDefect {
                    translation_x: true,
                    translation_y: true,
                    rotation_z: true,
                    scale: free_scale,
                    ..Default::default()
                }
            }
            Dimension::Three => {
                let tilt = !has(ObservationKind::ZenithAngle)
                    && !has(ObservationKind::HeightDifference);
                RankDefect {
                    translation_x: true,
                    translation_y: true,
                    translation_z: true,
                    rotation_x: tilt,
                    rotation_y: tilt,
                    rotation_z: true,
                    scale: distance_groups.is_empty(),
                }
            }
        }
    }

    pub fn count(&self) -> usize {
        [
            self.translation_x,
            self.translation_y,
            self.translation_z,
            self.rotation_x,
            self.rotation_y,
            self.rotation_z,
            self.scale,
        ]
        .iter()
        .filter(|&&b| b)
        .count()
    }
}

/// Coordinate columns and current position of one datum point.
#[derive(Clone, Copy, Debug)]
pub struct DatumPoint {
    pub coordinates: [f64; 3],
    /// Parameter column of x, y and z, where present.
    pub columns: [Option<usize>; 3],
}

/// Builds the datum condition matrix `G` (parameters × defect) from
/// centroid-reduced datum point coordinates. Columns have unit length.
pub fn datum_matrix(defect: &RankDefect, parameter_count: usize, points: &[DatumPoint]) -> DMatrix<f64> {
    let n = points.len().max(1) as f64;
    let mut centroid = [0.0; 3];
    for p in points {
        for (c, v) in centroid.iter_mut().zip(p.coordinates) {
            *c += v / n;
        }
    }

    let mut columns: Vec<Vec<(usize, f64)>> = Vec::new();
    let mut push = |entries: Vec<(usize, f64)>| {
        if !entries.is_empty() {
            columns.push(entries);
        }
    };
    let reduced = |p: &DatumPoint| {
        [
            p.coordinates[0] - centroid[0],
            p.coordinates[1] - centroid[1],
            p.coordinates[2] - centroid[2],
        ]
    };

    for (axis, active) in [
        (0, defect.translation_x),
        (1, defect.translation_y),
        (2, defect.translation_z),
    ] {
        if active {
            push(points.iter().filter_map(|p| p.columns[axis].map(|c| (c, 1.0))).collect());
        }
    }

    // small rotation about one axis: (a, b) -> (−b, a) in the rotated plane
    for (a, b, active) in [
        (1, 2, defect.rotation_x),
        (2, 0, defect.rotation_y),
        (0, 1, defect.rotation_z),
    ] {
        if !active {
            continue;
        }
        let mut entries = Vec::new();
        for p in points {
            let r = reduced(p);
            if let Some(c) = p.columns[a] {
                entries.push((c, -r[b]));
            }
            if let Some(c) = p.columns[b] {
                entries.push((c, r[a]));
            }
        }
        push(entries);
    }

    if defect.scale {
        let mut entries = Vec::new();
        for p in points {
            let r = reduced(p);
            for axis in 0..3 {
                if let Some(c) = p.columns[axis] {
                    entries.push((c, r[axis]));
                }
            }
        }
        push(entries);
    }

    let mut g = DMatrix::zeros(parameter_count, columns.len());
    for (k, entries) in columns.iter().enumerate() {
        for &(row, value) in entries {
            g[(row, k)] = value;
        }
        let norm = g.column(k).norm();
        if norm > 0.0 {
            g.column_mut(k).scale_mut(1.0 / norm);
        }
    }
    g
}
