//! One conversion table for every measurement kind.
//!
//! Values enter the library in the units of a project file and are converted
//! to the model units (radian, metre, unitless scale) exactly once, through
//! [`UnitTable`]. Reports convert back through the same table.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::f64::consts::PI;

use crate::error::ConfigError;

/// Kind of quantity a value expresses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeasurementKind {
    Angle,
    Length,
    Scale,
    Vector,
}

impl MeasurementKind {
    fn model_unit(self) -> Unit {
        match self {
            MeasurementKind::Angle => Unit::Radian,
            MeasurementKind::Length | MeasurementKind::Vector => Unit::Meter,
            MeasurementKind::Scale => Unit::Unitless,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Unit {
    Radian,
    Degree,
    Gradian,
    Milliradian,
    /// Artillery mil, 6400 per full circle.
    Mil,
    Meter,
    Millimeter,
    Micrometer,
    Kilometer,
    Unitless,
    /// Scale deviation from one in parts per million.
    PartsPerMillionWrtOne,
    /// Scale in parts per million.
    PartsPerMillionWrtZero,
}

impl Unit {
    /// Measurement kinds this unit can express.
    pub fn supports(self, kind: MeasurementKind) -> bool {
        match self {
            Unit::Radian | Unit::Degree | Unit::Gradian | Unit::Milliradian | Unit::Mil => {
                kind == MeasurementKind::Angle
            }
            Unit::Meter | Unit::Millimeter | Unit::Micrometer | Unit::Kilometer => {
                matches!(kind, MeasurementKind::Length | MeasurementKind::Vector)
            }
            Unit::Unitless | Unit::PartsPerMillionWrtOne | Unit::PartsPerMillionWrtZero => {
                kind == MeasurementKind::Scale
            }
        }
    }

    /// Multiplicative factor from this unit into the model unit.
    fn factor(self) -> f64 {
        match self {
            Unit::Radian | Unit::Meter | Unit::Unitless => 1.0,
            Unit::Degree => PI / 180.0,
            Unit::Gradian => PI / 200.0,
            Unit::Milliradian => 1e-3,
            Unit::Mil => PI / 3200.0,
            Unit::Millimeter => 1e-3,
            Unit::Micrometer => 1e-6,
            Unit::Kilometer => 1e3,
            Unit::PartsPerMillionWrtOne | Unit::PartsPerMillionWrtZero => 1e-6,
        }
    }

    /// Additive offset applied after scaling (only ppm-w.r.t.-one has one).
    fn offset(self) -> f64 {
        match self {
            Unit::PartsPerMillionWrtOne => 1.0,
            _ => 0.0,
        }
    }
}

/// Conversion table keyed by [`MeasurementKind`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "HashMap<MeasurementKind, Unit>", into = "HashMap<MeasurementKind, Unit>")]
pub struct UnitTable {
    units: HashMap<MeasurementKind, Unit>,
}

impl Default for UnitTable {
    fn default() -> Self {
        let mut units = HashMap::new();
        units.insert(MeasurementKind::Angle, Unit::Radian);
        units.insert(MeasurementKind::Length, Unit::Meter);
        units.insert(MeasurementKind::Scale, Unit::Unitless);
        units.insert(MeasurementKind::Vector, Unit::Meter);
        Self { units }
    }
}

impl TryFrom<HashMap<MeasurementKind, Unit>> for UnitTable {
    type Error = ConfigError;

    fn try_from(map: HashMap<MeasurementKind, Unit>) -> Result<Self, Self::Error> {
        let mut table = UnitTable::default();
        for (kind, unit) in map {
            table.set(kind, unit)?;
        }
        Ok(table)
    }
}

impl From<UnitTable> for HashMap<MeasurementKind, Unit> {
    fn from(table: UnitTable) -> Self {
        table.units
    }
}

impl UnitTable {
    /// Assigns `unit` to `kind`, rejecting units of another kind.
    pub fn set(&mut self, kind: MeasurementKind, unit: Unit) -> Result<(), ConfigError> {
        if !unit.supports(kind) {
            return Err(ConfigError::UnitMismatch {
                unit: format!("{unit:?}"),
                kind: format!("{kind:?}"),
            });
        }
        self.units.insert(kind, unit);
        Ok(())
    }

    pub fn unit(&self, kind: MeasurementKind) -> Unit {
        self.units
            .get(&kind)
            .copied()
            .unwrap_or_else(|| kind.model_unit())
    }

    /// Converts a value given in the table's unit into model units.
    pub fn to_model(&self, kind: MeasurementKind, value: f64) -> f64 {
        let unit = self.unit(kind);
        value * unit.factor() + unit.offset()
    }

    /// Converts a model value back into the table's unit.
    pub fn from_model(&self, kind: MeasurementKind, value: f64) -> f64 {
        let unit = self.unit(kind);
        (value - unit.offset()) / unit.factor()
    }

    /// Converts an uncertainty; offsets do not apply to spreads.
    pub fn uncertainty_to_model(&self, kind: MeasurementKind, sigma: f64) -> f64 {
        sigma * self.unit(kind).factor()
    }

    pub fn uncertainty_from_model(&self, kind: MeasurementKind, sigma: f64) -> f64 {
        sigma / self.unit(kind).factor()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    #[test]
    fn gradian_converts_to_radian() {
        let mut table = UnitTable::default();
        table
            .set(MeasurementKind::Angle, Unit::Gradian)
            .expect("gradian is an angle unit");
        assert!(approx_eq(table.to_model(MeasurementKind::Angle, 200.0), PI));
        assert!(approx_eq(table.from_model(MeasurementKind::Angle, PI / 2.0), 100.0));
    }

    #[test]
    fn ppm_wrt_one_has_offset_but_sigma_does_not() {
        let mut table = UnitTable::default();
        table
            .set(MeasurementKind::Scale, Unit::PartsPerMillionWrtOne)
            .expect("ppm is a scale unit");
        assert!(approx_eq(table.to_model(MeasurementKind::Scale, 10.0), 1.00001));
        assert!(approx_eq(
            table.uncertainty_to_model(MeasurementKind::Scale, 10.0),
            1e-5
        ));
    }

    #[test]
    fn unit_of_wrong_kind_is_rejected() {
        let mut table = UnitTable::default();
        assert!(table.set(MeasurementKind::Length, Unit::Degree).is_err());
        assert_eq!(table.unit(MeasurementKind::Length), Unit::Meter);
    }

    #[test]
    fn table_deserializes_from_map() {
        let table: UnitTable =
            serde_json::from_str(r#"{"angle":"degree","length":"millimeter"}"#)
                .expect("valid table");
        assert_eq!(table.unit(MeasurementKind::Angle), Unit::Degree);
        assert_eq!(table.unit(MeasurementKind::Length), Unit::Millimeter);
        assert_eq!(table.unit(MeasurementKind::Scale), Unit::Unitless);
        assert!(serde_json::from_str::<UnitTable>(r#"{"angle":"meter"}"#).is_err());
    }
}
