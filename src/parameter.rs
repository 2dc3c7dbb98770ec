//! Scalar estimation unknowns.

use serde::Serialize;

/// What an [`UnknownParameter`] stands for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterKind {
    CoordinateX,
    CoordinateY,
    CoordinateZ,
    Orientation,
    Scale,
    ZeroPointOffset,
    RefractionCoefficient,
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
}

impl ParameterKind {
    /// Angular parameters are kept in [0, 2π) or as small signed angles.
    pub fn is_angle(self) -> bool {
        matches!(
            self,
            ParameterKind::Orientation
                | ParameterKind::StrainRotationX
                | ParameterKind::StrainRotationY
                | ParameterKind::StrainRotationZ
                | ParameterKind::StrainShearX
                | ParameterKind::StrainShearY
                | ParameterKind::StrainShearZ
        )
    }

    /// Value the parameter takes when the model has no effect.
    pub fn identity_value(self) -> f64 {
        match self {
            ParameterKind::Scale
            | ParameterKind::StrainScaleX
            | ParameterKind::StrainScaleY
            | ParameterKind::StrainScaleZ => 1.0,
            _ => 0.0,
        }
    }
}

/// One column of the design matrix.
#[derive(Clone, Debug, Serialize)]
pub struct UnknownParameter {
    pub kind: ParameterKind,
    /// Owner of the parameter, e.g. a point ID or an observation group ID.
    pub owner: String,
    pub column: usize,
    pub value0: f64,
    pub value: f64,
    pub std: f64,
}

impl UnknownParameter {
    pub fn new(kind: ParameterKind, owner: impl Into<String>, column: usize, value0: f64) -> Self {
        Self {
            kind,
            owner: owner.into(),
            column,
            value0,
            value: value0,
            std: 0.0,
        }
    }
}
