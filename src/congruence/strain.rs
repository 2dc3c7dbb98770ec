//! Strain equations relating the displacements of two epochs.
//!
//! The displacement of a point `X` between the epochs is modelled as
//! `d = t + (A(p) − I)(X − c)` with the centroid `c` of the fitted points:
//!
//! - 1D: `A = mz`;
//! - 2D: `A = [[mx cos r, −my sin(r+s)], [mx sin r, my cos(r+s)]]` with
//!   rotation `r` and shear `s`;
//! - 3D: `A = Rx·Ry·Rz·S·diag(mx, my, mz)` with the shear matrix
//!   `S = [[1, sz, sy], [0, 1, sx], [0, 0, 1]]`.
//!
//! Restricted parameters are held at their identity values; identical scales
//! share one unknown.

use nalgebra::{DMatrix, DVector, Matrix3, Vector3};
use serde::{Deserialize, Serialize};

use crate::adjustment::{Cofactor, Linearization, Model};
use crate::error::ConfigError;
use crate::parameter::ParameterKind;
use crate::point::Dimension;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Restriction {
    FixedTranslationX,
    FixedTranslationY,
    FixedTranslationZ,
    FixedRotationX,
    FixedRotationY,
    FixedRotationZ,
    FixedShearX,
    FixedShearY,
    FixedShearZ,
    FixedScaleX,
    FixedScaleY,
    FixedScaleZ,
    IdentScalesXY,
    IdentScalesXZ,
    IdentScalesYZ,
}

impl Restriction {
    pub fn is_supported(self, dimension: Dimension) -> bool {
        use Restriction::*;
        match dimension {
            Dimension::One => matches!(self, FixedTranslationZ | FixedScaleZ),
            Dimension::Two => matches!(
                self,
                FixedTranslationX
                    | FixedTranslationY
                    | FixedRotationZ
                    | FixedShearZ
                    | FixedScaleX
                    | FixedScaleY
                    | IdentScalesXY
            ),
            Dimension::Three => true,
        }
    }

    /// Parameter held fixed by this restriction; `None` for scale identities.
    fn fixed_parameter(self) -> Option<ParameterKind> {
        use Restriction::*;
        let kind = match self {
            FixedTranslationX => ParameterKind::StrainTranslationX,
            FixedTranslationY => ParameterKind::StrainTranslationY,
            FixedTranslationZ => ParameterKind::StrainTranslationZ,
            FixedRotationX => ParameterKind::StrainRotationX,
            FixedRotationY => ParameterKind::StrainRotationY,
            FixedRotationZ => ParameterKind::StrainRotationZ,
            FixedShearX => ParameterKind::StrainShearX,
            FixedShearY => ParameterKind::StrainShearY,
            FixedShearZ => ParameterKind::StrainShearZ,
            FixedScaleX => ParameterKind::StrainScaleX,
            FixedScaleY => ParameterKind::StrainScaleY,
            FixedScaleZ => ParameterKind::StrainScaleZ,
            IdentScalesXY | IdentScalesXZ | IdentScalesYZ => return None,
        };
        Some(kind)
    }

    /// Restrictions that contradict this one and are dropped when it is added.
    fn conflicts(self) -> &'static [Restriction] {
        use Restriction::*;
        match self {
            FixedScaleX => &[IdentScalesXY, IdentScalesXZ],
            FixedScaleY => &[IdentScalesXY, IdentScalesYZ],
            FixedScaleZ => &[IdentScalesXZ, IdentScalesYZ],
            IdentScalesXY => &[FixedScaleX, FixedScaleY],
            IdentScalesXZ => &[FixedScaleX, FixedScaleZ],
            IdentScalesYZ => &[FixedScaleY, FixedScaleZ],
            _ => &[],
        }
    }
}

fn parameter_kinds(dimension: Dimension) -> &'static [ParameterKind] {
    use ParameterKind::*;
    match dimension {
        Dimension::One => &[StrainTranslationZ, StrainScaleZ],
        Dimension::Two => &[
            StrainTranslationX,
            StrainTranslationY,
            StrainRotationZ,
            StrainShearZ,
            StrainScaleX,
            StrainScaleY,
        ],
        Dimension::Three => &[
            StrainTranslationX,
            StrainTranslationY,
            StrainTranslationZ,
            StrainRotationX,
            StrainRotationY,
            StrainRotationZ,
            StrainShearX,
            StrainShearY,
            StrainShearZ,
            StrainScaleX,
            StrainScaleY,
            StrainScaleZ,
        ],
    }
}

fn translation_axis(kind: ParameterKind) -> Option<usize> {
    match kind {
        ParameterKind::StrainTranslationX => Some(0),
        ParameterKind::StrainTranslationY => Some(1),
        ParameterKind::StrainTranslationZ => Some(2),
        _ => None,
    }
}

fn scale_axis(kind: ParameterKind) -> Option<usize> {
    match kind {
        ParameterKind::StrainScaleX => Some(0),
        ParameterKind::StrainScaleY => Some(1),
        ParameterKind::StrainScaleZ => Some(2),
        _ => None,
    }
}

fn rot_x(a: f64) -> (Matrix3<f64>, Matrix3<f64>) {
    let (s, c) = a.sin_cos();
    (
        Matrix3::new(1.0, 0.0, 0.0, 0.0, c, -s, 0.0, s, c),
        Matrix3::new(0.0, 0.0, 0.0, 0.0, -s, -c, 0.0, c, -s),
    )
}

fn rot_y(a: f64) -> (Matrix3<f64>, Matrix3<f64>) {
    let (s, c) = a.sin_cos();
    (
        Matrix3::new(c, 0.0, s, 0.0, 1.0, 0.0, -s, 0.0, c),
        Matrix3::new(-s, 0.0, c, 0.0, 0.0, 0.0, -c, 0.0, -s),
    )
}

fn rot_z(a: f64) -> (Matrix3<f64>, Matrix3<f64>) {
    let (s, c) = a.sin_cos();
    (
        Matrix3::new(c, -s, 0.0, s, c, 0.0, 0.0, 0.0, 1.0),
        Matrix3::new(-s, -c, 0.0, c, -s, 0.0, 0.0, 0.0, 0.0),
    )
}

fn unit(row: usize, col: usize) -> Matrix3<f64> {
    let mut e = Matrix3::zeros();
    e[(row, col)] = 1.0;
    e
}

/// Strain equations of one congruence group, fitted with the shared estimator.
#[derive(Clone, Debug)]
pub struct StrainModel {
    dimension: Dimension,
    restrictions: Vec<Restriction>,
    values: Vec<f64>,
    columns: Vec<Option<usize>>,
    column_count: usize,
    center: [f64; 3],
    points: Vec<[f64; 3]>,
    displacements: Vec<[f64; 3]>,
    cofactor: DMatrix<f64>,
}

impl StrainModel {
    pub fn new(dimension: Dimension) -> Self {
        let kinds = parameter_kinds(dimension);
        let mut model = Self {
            dimension,
            restrictions: Vec::new(),
            values: kinds.iter().map(|k| k.identity_value()).collect(),
            columns: vec![None; kinds.len()],
            column_count: 0,
            center: [0.0; 3],
            points: Vec::new(),
            displacements: Vec::new(),
            cofactor: DMatrix::zeros(0, 0),
        };
        model.assign_columns();
        model
    }

    pub fn dimension(&self) -> Dimension {
        self.dimension
    }

    pub fn restrictions(&self) -> &[Restriction] {
        &self.restrictions
    }

    pub fn is_restricted(&self, restriction: Restriction) -> bool {
        self.restrictions.contains(&restriction)
    }

    /// Adds a restriction and drops the ones it contradicts.
    pub fn add_restriction(&mut self, restriction: Restriction) -> Result<(), ConfigError> {
        if !restriction.is_supported(self.dimension) {
            return Err(ConfigError::UnsupportedRestriction {
                restriction: format!("{restriction:?}"),
                dimension: self.dimension,
            });
        }
        if self.is_restricted(restriction) {
            return Ok(());
        }
        let conflicts = restriction.conflicts();
        self.restrictions.retain(|r| !conflicts.contains(r));
        self.restrictions.push(restriction);

        // XZ and YZ already imply XY
        if [
            Restriction::IdentScalesXY,
            Restriction::IdentScalesXZ,
            Restriction::IdentScalesYZ,
        ]
        .iter()
        .all(|r| self.restrictions.contains(r))
        {
            self.restrictions.retain(|r| *r != Restriction::IdentScalesXY);
        }
        self.assign_columns();
        Ok(())
    }

    pub fn remove_restriction(&mut self, restriction: Restriction) -> bool {
        let before = self.restrictions.len();
        self.restrictions.retain(|r| *r != restriction);
        let removed = self.restrictions.len() != before;
        if removed {
            self.assign_columns();
        }
        removed
    }

    fn assign_columns(&mut self) {
        let fixed: Vec<ParameterKind> = self
            .restrictions
            .iter()
            .filter_map(|r| r.fixed_parameter())
            .collect();

        // union of identical scales, rooted at the lowest axis
        let mut root = [0usize, 1, 2];
        let find = |root: &[usize; 3], mut a: usize| {
            while root[a] != a {
                a = root[a];
            }
            a
        };
        for r in &self.restrictions {
            let (a, b) = match r {
                Restriction::IdentScalesXY => (0, 1),
                Restriction::IdentScalesXZ => (0, 2),
                Restriction::IdentScalesYZ => (1, 2),
                _ => continue,
            };
            let (ra, rb) = (find(&root, a), find(&root, b));
            root[ra.max(rb)] = ra.min(rb);
        }

        let mut scale_columns = [None; 3];
        let mut count = 0;
        for (i, &kind) in parameter_kinds(self.dimension).iter().enumerate() {
            self.columns[i] = if fixed.contains(&kind) {
                None
            } else if let Some(axis) = scale_axis(kind) {
                let r = find(&root, axis);
                match scale_columns[r] {
                    Some(c) => Some(c),
                    None => {
                        scale_columns[r] = Some(count);
                        count += 1;
                        Some(count - 1)
                    }
                }
            } else {
                count += 1;
                Some(count - 1)
            };
        }
        self.column_count = count;
    }

    /// Number of estimated unknowns after restrictions.
    pub fn free_parameter_count(&self) -> usize {
        self.column_count
    }

    pub fn parameter_kinds(&self) -> &'static [ParameterKind] {
        parameter_kinds(self.dimension)
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn value(&self, kind: ParameterKind) -> Option<f64> {
        let i = self.parameter_kinds().iter().position(|k| *k == kind)?;
        Some(self.values[i])
    }

    /// Design-matrix column of a parameter; `None` if it is restricted.
    pub fn column(&self, kind: ParameterKind) -> Option<usize> {
        let i = self.parameter_kinds().iter().position(|k| *k == kind)?;
        self.columns[i]
    }

    pub fn center(&self) -> [f64; 3] {
        self.center
    }

    /// Sets the fitted points (epoch-1 coordinates), their displacements and
    /// the joint displacement cofactor; resets the parameters to identity.
    pub fn set_observations(
        &mut self,
        points: Vec<[f64; 3]>,
        displacements: Vec<[f64; 3]>,
        cofactor: DMatrix<f64>,
    ) {
        let n = points.len().max(1) as f64;
        let mut center = [0.0; 3];
        for p in &points {
            for (c, v) in center.iter_mut().zip(p) {
                *c += v / n;
            }
        }
        self.center = center;
        self.points = points;
        self.displacements = displacements;
        self.cofactor = cofactor;
        self.values = self
            .parameter_kinds()
            .iter()
            .map(|k| k.identity_value())
            .collect();
    }

    fn v(&self, kind: ParameterKind) -> f64 {
        self.value(kind).unwrap_or_else(|| kind.identity_value())
    }

    /// `A` and `∂A/∂p` for every parameter (zero for translations).
    fn transformation(&self) -> (Matrix3<f64>, Vec<Matrix3<f64>>) {
        use ParameterKind::*;
        let kinds = self.parameter_kinds();
        let mut partials = vec![Matrix3::zeros(); kinds.len()];
        let at = |kind: ParameterKind| kinds.iter().position(|k| *k == kind);

        let a = match self.dimension {
            Dimension::One => {
                if let Some(i) = at(StrainScaleZ) {
                    partials[i] = unit(2, 2);
                }
                Matrix3::from_diagonal(&Vector3::new(1.0, 1.0, self.v(StrainScaleZ)))
            }
            Dimension::Two => {
                let (r, s) = (self.v(StrainRotationZ), self.v(StrainShearZ));
                let (mx, my) = (self.v(StrainScaleX), self.v(StrainScaleY));
                let (sr, cr) = r.sin_cos();
                let (srs, crs) = (r + s).sin_cos();
                let embed = |a11: f64, a12: f64, a21: f64, a22: f64, a33: f64| {
                    Matrix3::new(a11, a12, 0.0, a21, a22, 0.0, 0.0, 0.0, a33)
                };
                if let Some(i) = at(StrainRotationZ) {
                    partials[i] = embed(-mx * sr, -my * crs, mx * cr, -my * srs, 0.0);
                }
                if let Some(i) = at(StrainShearZ) {
                    partials[i] = embed(0.0, -my * crs, 0.0, -my * srs, 0.0);
                }
                if let Some(i) = at(StrainScaleX) {
                    partials[i] = embed(cr, 0.0, sr, 0.0, 0.0);
                }
                if let Some(i) = at(StrainScaleY) {
                    partials[i] = embed(0.0, -srs, 0.0, crs, 0.0);
                }
                embed(mx * cr, -my * srs, mx * sr, my * crs, 1.0)
            }
            Dimension::Three => {
                let (rx, drx) = rot_x(self.v(StrainRotationX));
                let (ry, dry) = rot_y(self.v(StrainRotationY));
                let (rz, drz) = rot_z(self.v(StrainRotationZ));
                let shear = Matrix3::new(
                    1.0,
                    self.v(StrainShearZ),
                    self.v(StrainShearY),
                    0.0,
                    1.0,
                    self.v(StrainShearX),
                    0.0,
                    0.0,
                    1.0,
                );
                let scale = Matrix3::from_diagonal(&Vector3::new(
                    self.v(StrainScaleX),
                    self.v(StrainScaleY),
                    self.v(StrainScaleZ),
                ));
                let r = rx * ry * rz;
                let sm = shear * scale;
                let pairs = [
                    (StrainRotationX, drx * ry * rz * sm),
                    (StrainRotationY, rx * dry * rz * sm),
                    (StrainRotationZ, rx * ry * drz * sm),
                    (StrainShearX, r * unit(1, 2) * scale),
                    (StrainShearY, r * unit(0, 2) * scale),
                    (StrainShearZ, r * unit(0, 1) * scale),
                    (StrainScaleX, r * shear * unit(0, 0)),
                    (StrainScaleY, r * shear * unit(1, 1)),
                    (StrainScaleZ, r * shear * unit(2, 2)),
                ];
                for (kind, m) in pairs {
                    if let Some(i) = at(kind) {
                        partials[i] = m;
                    }
                }
                r * sm
            }
        };
        (a, partials)
    }

    fn reduced(&self, point: [f64; 3]) -> Vector3<f64> {
        Vector3::new(
            point[0] - self.center[0],
            point[1] - self.center[1],
            point[2] - self.center[2],
        )
    }

    fn predict_with(&self, a: &Matrix3<f64>, point: [f64; 3]) -> Vec<f64> {
        let mut t = Vector3::zeros();
        for (i, &kind) in self.parameter_kinds().iter().enumerate() {
            if let Some(axis) = translation_axis(kind) {
                t[axis] = self.values[i];
            }
        }
        let d = t + (a - Matrix3::identity()) * self.reduced(point);
        self.dimension.axes().iter().map(|ax| d[ax.index()]).collect()
    }

    fn jacobian_with(&self, partials: &[Matrix3<f64>], point: [f64; 3]) -> DMatrix<f64> {
        let axes = self.dimension.axes();
        let r = self.reduced(point);
        let mut j = DMatrix::zeros(axes.len(), self.column_count);
        for (i, &kind) in self.parameter_kinds().iter().enumerate() {
            let Some(col) = self.columns[i] else {
                continue;
            };
            let derivative = match translation_axis(kind) {
                Some(axis) => {
                    let mut e = Vector3::zeros();
                    e[axis] = 1.0;
                    e
                }
                None => partials[i] * r,
            };
            for (row, ax) in axes.iter().enumerate() {
                j[(row, col)] += derivative[ax.index()];
            }
        }
        j
    }

    /// Displacement predicted at `point` (epoch-1 coordinates).
    pub fn predict(&self, point: [f64; 3]) -> Vec<f64> {
        let (a, _) = self.transformation();
        self.predict_with(&a, point)
    }

    /// Partials of [`Self::predict`] with respect to the free parameters.
    pub fn prediction_jacobian(&self, point: [f64; 3]) -> DMatrix<f64> {
        let (_, partials) = self.transformation();
        self.jacobian_with(&partials, point)
    }
}

impl Model for StrainModel {
    fn parameter_count(&self) -> usize {
        self.column_count
    }

    fn observation_count(&self) -> usize {
        self.points.len() * self.dimension.value()
    }

    fn linearize(&self) -> Linearization {
        let dim = self.dimension.value();
        let rows = self.observation_count();
        let (a, partials) = self.transformation();
        let mut jacobian = DMatrix::zeros(rows, self.column_count);
        let mut misclosure = DVector::zeros(rows);
        for (k, (point, observed)) in self.points.iter().zip(&self.displacements).enumerate() {
            let predicted = self.predict_with(&a, *point);
            jacobian
                .view_mut((k * dim, 0), (dim, self.column_count))
                .copy_from(&self.jacobian_with(&partials, *point));
            for (row, ax) in self.dimension.axes().iter().enumerate() {
                misclosure[k * dim + row] = observed[ax.index()] - predicted[row];
            }
        }
        Linearization {
            jacobian,
            misclosure,
        }
    }

    fn cofactor(&self) -> Cofactor {
        Cofactor::Full(self.cofactor.clone())
    }

    fn update(&mut self, dx: &DVector<f64>) {
        for (value, column) in self.values.iter_mut().zip(&self.columns) {
            if let Some(c) = column {
                *value += dx[*c];
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adjustment::{EstimationParameters, EstimationState, Estimator};

    fn approx_eq(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() < tol
    }

    #[test]
    fn unsupported_restriction_is_rejected() {
        let mut model = StrainModel::new(Dimension::One);
        assert!(model.add_restriction(Restriction::FixedTranslationZ).is_ok());
        assert!(matches!(
            model.add_restriction(Restriction::FixedRotationZ),
            Err(ConfigError::UnsupportedRestriction { .. })
        ));
    }

    #[test]
    fn fixed_and_identical_scales_exclude_each_other() {
        let mut model = StrainModel::new(Dimension::Three);
        model.add_restriction(Restriction::IdentScalesXY).expect("supported");
        model.add_restriction(Restriction::IdentScalesXZ).expect("supported");
        assert_eq!(model.free_parameter_count(), 10);
        model.add_restriction(Restriction::FixedScaleX).expect("supported");
        assert!(!model.is_restricted(Restriction::IdentScalesXY));
        assert!(!model.is_restricted(Restriction::IdentScalesXZ));
        model.add_restriction(Restriction::IdentScalesXY).expect("supported");
        assert!(!model.is_restricted(Restriction::FixedScaleX));
    }

    #[test]
    fn all_identical_scales_collapse() {
        let mut model = StrainModel::new(Dimension::Three);
        for r in [
            Restriction::IdentScalesXY,
            Restriction::IdentScalesXZ,
            Restriction::IdentScalesYZ,
        ] {
            model.add_restriction(r).expect("supported");
        }
        assert_eq!(
            model.restrictions(),
            &[Restriction::IdentScalesXZ, Restriction::IdentScalesYZ]
        );
        // one shared scale
        assert_eq!(model.free_parameter_count(), 10);
        assert_eq!(
            model.column(ParameterKind::StrainScaleX),
            model.column(ParameterKind::StrainScaleZ)
        );
    }

    fn fit(model: &mut StrainModel, truth: &StrainModel, points: &[[f64; 3]]) -> EstimationState {
        let displacements: Vec<[f64; 3]> = points
            .iter()
            .map(|p| {
                let d = truth.predict(*p);
                let mut full = [0.0; 3];
                for (ax, v) in truth.dimension().axes().iter().zip(d) {
                    full[ax.index()] = v;
                }
                full
            })
            .collect();
        let n = points.len() * model.dimension().value();
        model.set_observations(points.to_vec(), displacements, DMatrix::identity(n, n) * 1e-6);
        Estimator::new(EstimationParameters::default()).estimate(model)
    }

    #[test]
    fn planar_affine_deformation_is_recovered() {
        let points = [
            [0.0, 0.0, 0.0],
            [100.0, 0.0, 0.0],
            [100.0, 100.0, 0.0],
            [0.0, 100.0, 0.0],
            [50.0, 30.0, 0.0],
        ];
        let mut truth = StrainModel::new(Dimension::Two);
        truth.set_observations(points.to_vec(), Vec::new(), DMatrix::zeros(0, 0));
        truth.values = vec![0.01, -0.02, 2e-5, -1e-5, 1.0 + 3e-5, 1.0 - 2e-5];

        let mut model = StrainModel::new(Dimension::Two);
        assert_eq!(fit(&mut model, &truth, &points), EstimationState::Converged);
        for (estimated, expected) in model.values().iter().zip(&truth.values) {
            assert!(approx_eq(*estimated, *expected, 1e-9));
        }
    }

    #[test]
    fn spatial_deformation_with_restrictions_is_recovered() {
        let points = [
            [0.0, 0.0, 0.0],
            [100.0, 0.0, 5.0],
            [100.0, 100.0, 10.0],
            [0.0, 100.0, -4.0],
            [50.0, 30.0, 40.0],
            [20.0, 70.0, 25.0],
        ];
        let mut truth = StrainModel::new(Dimension::Three);
        truth.set_observations(points.to_vec(), Vec::new(), DMatrix::zeros(0, 0));
        truth.values = vec![
            0.01, -0.02, 0.005, 1e-5, -2e-5, 3e-5, 0.0, 0.0, 0.0, 1.0 + 1e-5, 1.0 + 1e-5, 1.0 + 1e-5,
        ];

        let mut model = StrainModel::new(Dimension::Three);
        for r in [
            Restriction::FixedShearX,
            Restriction::FixedShearY,
            Restriction::FixedShearZ,
            Restriction::IdentScalesXY,
            Restriction::IdentScalesYZ,
        ] {
            model.add_restriction(r).expect("supported");
        }
        assert_eq!(model.free_parameter_count(), 7);
        assert_eq!(fit(&mut model, &truth, &points), EstimationState::Converged);
        for (estimated, expected) in model.values().iter().zip(&truth.values) {
            assert!(approx_eq(*estimated, *expected, 1e-9));
        }
    }

    #[test]
    fn height_model_has_offset_and_scale() {
        let mut model = StrainModel::new(Dimension::One);
        model.set_observations(
            vec![[0.0, 0.0, 10.0], [0.0, 0.0, 20.0]],
            vec![[0.0, 0.0, 0.001], [0.0, 0.0, 0.003]],
            DMatrix::identity(2, 2),
        );
        assert_eq!(
            Estimator::new(EstimationParameters::default()).estimate(&mut model),
            EstimationState::Converged
        );
        let tz = model.value(ParameterKind::StrainTranslationZ).unwrap_or_default();
        let mz = model.value(ParameterKind::StrainScaleZ).unwrap_or_default();
        assert!(approx_eq(tz, 0.002, 1e-12));
        assert!(approx_eq(mz, 1.0002, 1e-12));
    }
}
