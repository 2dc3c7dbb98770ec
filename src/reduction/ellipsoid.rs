use serde::{Deserialize, Serialize};

/// Named reference ellipsoids.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EllipsoidKind {
    /// Mean earth sphere, R = 6371 km.
    #[default]
    Sphere,
    Wgs84,
    Grs80,
    Bessel1941,
    Krassowski,
    Hayford,
}

/// Rotational ellipsoid given by its major semi-axis and flattening.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "EllipsoidKind", into = "EllipsoidKind")]
pub struct Ellipsoid {
    kind: EllipsoidKind,
    major_axis: f64,
    flattening: f64,
}

impl From<EllipsoidKind> for Ellipsoid {
    fn from(kind: EllipsoidKind) -> Self {
        let (a, inv_f) = match kind {
            EllipsoidKind::Sphere => (6_371_000.0, f64::INFINITY),
            EllipsoidKind::Wgs84 => (6_378_137.0, 298.257_223_563),
            EllipsoidKind::Grs80 => (6_378_137.0, 298.257_222_101),
            EllipsoidKind::Bessel1941 => (6_377_397.155, 299.152_812_8),
            EllipsoidKind::Krassowski => (6_378_245.0, 298.3),
            EllipsoidKind::Hayford => (6_378_388.0, 297.0),
        };
        Self {
            kind,
            major_axis: a,
            flattening: 1.0 / inv_f,
        }
    }
}

impl From<Ellipsoid> for EllipsoidKind {
    fn from(ellipsoid: Ellipsoid) -> Self {
        ellipsoid.kind
    }
}

impl Default for Ellipsoid {
    fn default() -> Self {
        EllipsoidKind::default().into()
    }
}

impl Ellipsoid {
    pub fn kind(&self) -> EllipsoidKind {
        self.kind
    }

    pub fn major_axis(&self) -> f64 {
        self.major_axis
    }

    pub fn minor_axis(&self) -> f64 {
        self.major_axis * (1.0 - self.flattening)
    }

    /// First numerical eccentricity squared.
    pub fn eccentricity_squared(&self) -> f64 {
        self.flattening * (2.0 - self.flattening)
    }

    /// Radius of the conformal (Gaussian) sphere at geodetic latitude `phi`.
    pub fn conformal_radius(&self, phi: f64) -> f64 {
        let e2 = self.eccentricity_squared();
        let s = phi.sin();
        self.major_axis * (1.0 - e2).sqrt() / (1.0 - e2 * s * s)
    }
}
