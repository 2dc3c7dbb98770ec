use serde::{Deserialize, Serialize};

/// Plane projection and height-reduction scheme of a network.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectionType {
    #[default]
    None,
    HeightReduction,
    GaussKrueger,
    Utm,
    DirectionReduction,
    HeightGaussKrueger,
    HeightUtm,
    DirectionGaussKrueger,
    DirectionUtm,
    DirectionHeight,
    DirectionHeightGaussKrueger,
    DirectionHeightUtm,
}

impl ProjectionType {
    pub fn is_height_reduction(self) -> bool {
        matches!(
            self,
            ProjectionType::HeightReduction
                | ProjectionType::DirectionHeight
                | ProjectionType::HeightGaussKrueger
                | ProjectionType::HeightUtm
                | ProjectionType::DirectionHeightGaussKrueger
                | ProjectionType::DirectionHeightUtm
        )
    }

    pub fn is_gauss_krueger(self) -> bool {
        matches!(
            self,
            ProjectionType::GaussKrueger
                | ProjectionType::HeightGaussKrueger
                | ProjectionType::DirectionGaussKrueger
                | ProjectionType::DirectionHeightGaussKrueger
        )
    }

    pub fn is_utm(self) -> bool {
        matches!(
            self,
            ProjectionType::Utm
                | ProjectionType::HeightUtm
                | ProjectionType::DirectionUtm
                | ProjectionType::DirectionHeightUtm
        )
    }

    pub fn is_direction_reduction(self) -> bool {
        matches!(
            self,
            ProjectionType::DirectionReduction
                | ProjectionType::DirectionGaussKrueger
                | ProjectionType::DirectionUtm
                | ProjectionType::DirectionHeight
                | ProjectionType::DirectionHeightGaussKrueger
                | ProjectionType::DirectionHeightUtm
        )
    }

    /// Scale factor on the central meridian.
    pub fn central_scale(self) -> f64 {
        if self.is_utm() {
            0.9996
        } else {
            1.0
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Projection {
    #[serde(rename = "type")]
    pub projection_type: ProjectionType,
    /// Height used by the height reduction when the endpoints carry no heights.
    pub reference_height: f64,
}

impl Projection {
    pub fn new(projection_type: ProjectionType) -> Self {
        Self {
            projection_type,
            reference_height: 0.0,
        }
    }

    pub fn is_height_reduction(&self) -> bool {
        self.projection_type.is_height_reduction()
    }

    pub fn is_gauss_krueger(&self) -> bool {
        self.projection_type.is_gauss_krueger()
    }

    pub fn is_utm(&self) -> bool {
        self.projection_type.is_utm()
    }

    pub fn is_direction_reduction(&self) -> bool {
        self.projection_type.is_direction_reduction()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composite_types_combine_predicates() {
        let t = ProjectionType::DirectionHeightUtm;
        assert!(t.is_direction_reduction());
        assert!(t.is_height_reduction());
        assert!(t.is_utm());
        assert!(!t.is_gauss_krueger());
        assert_eq!(t.central_scale(), 0.9996);

        let none = ProjectionType::None;
        assert!(!none.is_direction_reduction() && !none.is_height_reduction());
        assert_eq!(none.central_scale(), 1.0);
    }
}
