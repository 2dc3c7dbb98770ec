use nalgebra::DMatrix;
use std::collections::HashMap;

use crate::point::Dimension;

/// Adjusted coordinates of one epoch together with their cofactor block.
///
/// `cofactor` is ordered point by point, each point contributing one row per
/// axis of the dimension.
#[derive(Clone, Debug)]
pub struct EpochSolution {
    dimension: Dimension,
    ids: Vec<String>,
    index: HashMap<String, usize>,
    coordinates: Vec<[f64; 3]>,
    cofactor: DMatrix<f64>,
    omega: f64,
    redundancy: f64,
}

impl EpochSolution {
    pub fn new(
        dimension: Dimension,
        ids: Vec<String>,
        coordinates: Vec<[f64; 3]>,
        cofactor: DMatrix<f64>,
        omega: f64,
        redundancy: f64,
    ) -> Self {
        let index = ids.iter().enumerate().map(|(i, id)| (id.clone(), i)).collect();
        Self {
            dimension,
            ids,
            index,
            coordinates,
            cofactor,
            omega,
            redundancy,
        }
    }

    pub fn dimension(&self) -> Dimension {
        self.dimension
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn omega(&self) -> f64 {
        self.omega
    }

    pub fn redundancy(&self) -> f64 {
        self.redundancy
    }

    pub fn cofactor(&self) -> &DMatrix<f64> {
        &self.cofactor
    }

    pub fn index(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn coordinates(&self, id: &str) -> Option<[f64; 3]> {
        self.index(id).map(|i| self.coordinates[i])
    }

    /// Cofactor block between two points of this epoch.
    pub fn cross_block(&self, a: &str, b: &str) -> Option<DMatrix<f64>> {
        let dim = self.dimension.value();
        let (i, j) = (self.index(a)?, self.index(b)?);
        Some(self.cofactor.view((i * dim, j * dim), (dim, dim)).into_owned())
    }

    /// Cofactor block of a single point.
    pub fn point_block(&self, id: &str) -> Option<DMatrix<f64>> {
        self.cross_block(id, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_follow_point_order() {
        let cofactor = DMatrix::from_fn(4, 4, |i, j| (i * 4 + j) as f64);
        let epoch = EpochSolution::new(
            Dimension::Two,
            vec!["A".into(), "B".into()],
            vec![[0.0; 3], [1.0, 2.0, 0.0]],
            cofactor,
            1.0,
            2.0,
        );
        let b = epoch.point_block("B").expect("B");
        assert_eq!(b[(0, 0)], 10.0);
        assert_eq!(b[(1, 1)], 15.0);
        let ab = epoch.cross_block("A", "B").expect("AB");
        assert_eq!(ab[(0, 1)], 3.0);
        assert!(epoch.point_block("C").is_none());
        assert_eq!(epoch.coordinates("B"), Some([1.0, 2.0, 0.0]));
    }
}
