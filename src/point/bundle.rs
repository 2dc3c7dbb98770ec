use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::{Dimension, Point};
use crate::error::ConfigError;

/// Similarity transformation from a bundle's local frame into the network frame.
///
/// `global = t + scale · Rx(rx)·Ry(ry)·Rz(rz) · local`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformationParameterSet {
    pub translation: [f64; 3],
    /// Rotations about x, y and z in radians.
    pub rotation: [f64; 3],
    pub scale: f64,
}

impl Default for TransformationParameterSet {
    fn default() -> Self {
        Self {
            translation: [0.0; 3],
            rotation: [0.0; 3],
            scale: 1.0,
        }
    }
}

impl TransformationParameterSet {
    pub fn is_identity(&self) -> bool {
        *self == Self::default()
    }

    pub fn rotation_matrix(&self) -> Matrix3<f64> {
        let [rx, ry, rz] = self.rotation;
        let (sx, cx) = rx.sin_cos();
        let (sy, cy) = ry.sin_cos();
        let (sz, cz) = rz.sin_cos();
        let r_x = Matrix3::new(1.0, 0.0, 0.0, 0.0, cx, -sx, 0.0, sx, cx);
        let r_y = Matrix3::new(cy, 0.0, sy, 0.0, 1.0, 0.0, -sy, 0.0, cy);
        let r_z = Matrix3::new(cz, -sz, 0.0, sz, cz, 0.0, 0.0, 0.0, 1.0);
        r_x * r_y * r_z
    }

    pub fn apply(&self, local: [f64; 3]) -> [f64; 3] {
        let p = self.rotation_matrix() * Vector3::from(local) * self.scale
            + Vector3::from(self.translation);
        [p.x, p.y, p.z]
    }
}

/// Order-preserving collection of points sharing one dimension.
///
/// Adding a point whose ID is already present joins it with the stored point:
/// the coordinates become the running mean of all joined positions.
#[derive(Clone, Debug, Default)]
pub struct PointBundle {
    dimension: Option<Dimension>,
    points: Vec<Point>,
    index: HashMap<String, usize>,
    joins: Vec<usize>,
    transformation: TransformationParameterSet,
}

impl PointBundle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dimension(dimension: Dimension) -> Self {
        Self {
            dimension: Some(dimension),
            ..Self::default()
        }
    }

    /// Dimension of the bundle, fixed by the first point.
    pub fn dimension(&self) -> Option<Dimension> {
        self.dimension
    }

    /// Inserts or joins a point. Fails if its dimension differs from the bundle's.
    pub fn add(&mut self, point: Point) -> Result<(), ConfigError> {
        let dimension = *self.dimension.get_or_insert(point.dimension());
        if point.dimension() != dimension {
            return Err(ConfigError::DimensionMismatch {
                id: point.id().to_string(),
                expected: dimension,
                found: point.dimension(),
            });
        }

        if let Some(&i) = self.index.get(point.id()) {
            let joined = &mut self.points[i];
            if !point.has_approximation() {
                return Ok(());
            }
            if !joined.has_approximation() {
                joined.set_approximate(point.coordinates());
                self.joins[i] = 1;
                return Ok(());
            }
            let n = self.joins[i] as f64;
            let mut mean = joined.coordinates();
            for axis in dimension.axes() {
                let k = axis.index();
                mean[k] = (n * mean[k] + point.coordinates()[k]) / (n + 1.0);
            }
            joined.set_approximate(mean);
            self.joins[i] += 1;
            return Ok(());
        }

        self.index.insert(point.id().to_string(), self.points.len());
        self.joins.push(usize::from(point.has_approximation()));
        self.points.push(point);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&Point> {
        self.index.get(id).map(|&i| &self.points[i])
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Point> {
        self.index.get(id).map(|&i| &mut self.points[i])
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn points_mut(&mut self) -> &mut [Point] {
        &mut self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Number of positions averaged into the point `id`.
    pub fn join_count(&self, id: &str) -> usize {
        self.index.get(id).map_or(0, |&i| self.joins[i])
    }

    /// Mean coordinates of all points that carry a position.
    pub fn centroid(&self) -> Option<[f64; 3]> {
        let mut sum = [0.0; 3];
        let mut n = 0usize;
        for p in self.points.iter().filter(|p| p.has_approximation()) {
            let c = p.coordinates();
            for k in 0..3 {
                sum[k] += c[k];
            }
            n += 1;
        }
        if n == 0 {
            return None;
        }
        Some(sum.map(|s| s / n as f64))
    }

    pub fn transformation(&self) -> &TransformationParameterSet {
        &self.transformation
    }

    pub fn set_transformation(&mut self, transformation: TransformationParameterSet) {
        self.transformation = transformation;
    }

    /// Moves every positioned point into the network frame and resets the
    /// attached transformation to the identity.
    pub fn apply_transformation(&mut self) {
        if self.transformation.is_identity() {
            return;
        }
        for p in self.points.iter_mut().filter(|p| p.has_approximation()) {
            let global = self.transformation.apply(p.coordinates());
            p.set_approximate(global);
        }
        self.transformation = TransformationParameterSet::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::point::PointRole;

    fn approx_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn point2(id: &str, x: f64, y: f64) -> Point {
        Point::new(id, Dimension::Two, PointRole::New, &[x, y]).expect("valid point")
    }

    #[test]
    fn join_averages_coordinates() {
        let mut bundle = PointBundle::new();
        bundle.add(point2("A", 0.0, 0.0)).expect("add");
        bundle.add(point2("B", 10.0, 0.0)).expect("add");
        bundle.add(point2("A", 2.0, 4.0)).expect("join");
        bundle.add(point2("A", 4.0, 2.0)).expect("join");
        assert_eq!(bundle.len(), 2);
        let a = bundle.get("A").expect("A present");
        assert!(approx_eq(a.x(), 2.0));
        assert!(approx_eq(a.y(), 2.0));
        assert_eq!(bundle.join_count("A"), 3);
        assert_eq!(bundle.points()[0].id(), "A");
    }

    #[test]
    fn dimension_is_fixed_by_first_point() {
        let mut bundle = PointBundle::new();
        bundle.add(point2("A", 0.0, 0.0)).expect("add");
        let h = Point::new("H", Dimension::One, PointRole::New, &[1.0]).expect("valid");
        assert!(bundle.add(h).is_err());
        assert_eq!(bundle.dimension(), Some(Dimension::Two));
    }

    #[test]
    fn centroid_skips_unpositioned_points() {
        let mut bundle = PointBundle::new();
        bundle.add(point2("A", 0.0, 0.0)).expect("add");
        bundle.add(point2("B", 4.0, 2.0)).expect("add");
        bundle
            .add(Point::without_position("N", Dimension::Two, PointRole::New))
            .expect("add");
        let c = bundle.centroid().expect("centroid");
        assert!(approx_eq(c[0], 2.0));
        assert!(approx_eq(c[1], 1.0));
    }

    #[test]
    fn transformation_moves_points_into_network_frame() {
        let mut bundle = PointBundle::new();
        bundle.add(point2("A", 1.0, 0.0)).expect("add");
        bundle.set_transformation(TransformationParameterSet {
            translation: [100.0, 200.0, 0.0],
            rotation: [0.0, 0.0, std::f64::consts::FRAC_PI_2],
            scale: 2.0,
        });
        bundle.apply_transformation();
        let a = bundle.get("A").expect("A present");
        assert!(approx_eq(a.x(), 100.0));
        assert!(approx_eq(a.y(), 202.0));
        assert!(bundle.transformation().is_identity());
    }
}
