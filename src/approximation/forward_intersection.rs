use log::warn;
use std::collections::HashMap;
use std::f64::consts::PI;

use crate::angle;
use crate::point::{Dimension, Point, PointBundle, PointRole};

/// Largest coordinate disagreement between the two triangle solutions for a
/// sample to be accepted.
const AGREEMENT_TOLERANCE: f64 = 0.1;
const MIN_SIN: f64 = 1e-10;

/// Orientation-independent identity of two fixed points: the IDs in
/// lexicographic order.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PairKey {
    first: String,
    second: String,
}

impl PairKey {
    /// Builds the key and reports whether the arguments had to be swapped.
    pub fn canonical(a: &str, b: &str) -> (Self, bool) {
        if a <= b {
            (
                Self {
                    first: a.to_string(),
                    second: b.to_string(),
                },
                false,
            )
        } else {
            (
                Self {
                    first: b.to_string(),
                    second: a.to_string(),
                },
                true,
            )
        }
    }

    pub fn first(&self) -> &str {
        &self.first
    }

    pub fn second(&self) -> &str {
        &self.second
    }
}

/// Intersection angles of one new point seen from one fixed pair.
#[derive(Clone, Debug)]
pub struct ForwardIntersectionEntry {
    pair: PairKey,
    new_id: String,
    alpha: Vec<f64>,
    beta: Vec<f64>,
}

impl ForwardIntersectionEntry {
    fn new(pair: PairKey, new_id: String) -> Self {
        Self {
            pair,
            new_id,
            alpha: Vec::new(),
            beta: Vec::new(),
        }
    }

    fn push(&mut self, alpha: f64, beta: f64) {
        self.alpha.push(angle::normalize(alpha));
        self.beta.push(angle::normalize(beta));
    }

    pub fn pair(&self) -> &PairKey {
        &self.pair
    }

    pub fn new_id(&self) -> &str {
        &self.new_id
    }

    pub fn samples(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.alpha.iter().copied().zip(self.beta.iter().copied())
    }

    /// Intersects every sample and returns the accepted candidate closest to
    /// the component-wise median. `None` if a fixed point is missing or no
    /// sample passes the agreement check.
    pub fn adjust(&self, known: &PointBundle) -> Option<[f64; 2]> {
        let a = known.get(self.pair.first())?;
        let b = known.get(self.pair.second())?;
        if !a.has_approximation() || !b.has_approximation() {
            return None;
        }
        let (xa, ya, xb, yb) = (a.x(), a.y(), b.x(), b.y());
        let s_ab = (xb - xa).hypot(yb - ya);
        let t_ab = (yb - ya).atan2(xb - xa);

        let mut candidates: Vec<[f64; 2]> = Vec::with_capacity(self.alpha.len());
        for (alpha, beta) in self.samples() {
            let sin_ab = (alpha + beta).sin();
            if sin_ab.abs() < MIN_SIN {
                continue;
            }
            let s_an = s_ab * beta.sin() / sin_ab;
            let s_bn = s_ab * alpha.sin() / sin_ab;

            let t_an = t_ab - alpha;
            let t_bn = PI + t_ab + beta;

            let from_a = [xa + s_an * t_an.cos(), ya + s_an * t_an.sin()];
            let from_b = [xb + s_bn * t_bn.cos(), yb + s_bn * t_bn.sin()];

            if (from_a[0] - from_b[0]).abs() < AGREEMENT_TOLERANCE
                && (from_a[1] - from_b[1]).abs() < AGREEMENT_TOLERANCE
            {
                candidates.push([
                    0.5 * (from_a[0] + from_b[0]),
                    0.5 * (from_a[1] + from_b[1]),
                ]);
            }
        }

        if candidates.is_empty() {
            warn!(
                "Forward intersection of {} from {}/{}: no sample passed the agreement check",
                self.new_id,
                self.pair.first(),
                self.pair.second()
            );
            return None;
        }

        let mid = candidates.len() / 2;
        let mut xs: Vec<f64> = candidates.iter().map(|c| c[0]).collect();
        let mut ys: Vec<f64> = candidates.iter().map(|c| c[1]).collect();
        xs.sort_by(f64::total_cmp);
        ys.sort_by(f64::total_cmp);
        let median = [xs[mid], ys[mid]];

        candidates
            .into_iter()
            .min_by(|p, q| {
                let dp = (p[0] - median[0]).hypot(p[1] - median[1]);
                let dq = (q[0] - median[0]).hypot(q[1] - median[1]);
                dp.total_cmp(&dq)
            })
    }
}

/// Accumulates intersection samples keyed by (fixed pair, new point).
///
/// Insertion order of pairs and new points is preserved.
#[derive(Clone, Debug, Default)]
pub struct ForwardIntersectionSet {
    entries: Vec<ForwardIntersectionEntry>,
    index: HashMap<(PairKey, String), usize>,
}

impl ForwardIntersectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one sample from directions measured at the fixed points A and B.
    ///
    /// `r_ab`, `r_an` are directions at A towards B and N; `r_ba`, `r_bn` are
    /// the directions at B towards A and N. Calling with A and B exchanged (and
    /// the directions exchanged accordingly) updates the same entry.
    #[allow(clippy::too_many_arguments)]
    pub fn add(
        &mut self,
        fix_a: &str,
        fix_b: &str,
        new_id: &str,
        r_ab: f64,
        r_an: f64,
        r_ba: f64,
        r_bn: f64,
    ) {
        let (pair, swapped) = PairKey::canonical(fix_a, fix_b);
        let (r_ab, r_an, r_ba, r_bn) = if swapped {
            (r_ba, r_bn, r_ab, r_an)
        } else {
            (r_ab, r_an, r_ba, r_bn)
        };
        let alpha = r_ab - r_an;
        let beta = r_bn - r_ba;

        let key = (pair, new_id.to_string());
        let i = match self.index.get(&key) {
            Some(&i) => i,
            None => {
                let i = self.entries.len();
                self.entries
                    .push(ForwardIntersectionEntry::new(key.0.clone(), key.1.clone()));
                self.index.insert(key, i);
                i
            }
        };
        self.entries[i].push(alpha, beta);
    }

    pub fn entries(&self) -> &[ForwardIntersectionEntry] {
        &self.entries
    }

    pub fn entry(&self, fix_a: &str, fix_b: &str, new_id: &str) -> Option<&ForwardIntersectionEntry> {
        let (pair, _) = PairKey::canonical(fix_a, fix_b);
        self.index
            .get(&(pair, new_id.to_string()))
            .map(|&i| &self.entries[i])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Intersects all entries. A new point seen from several pairs is joined
    /// (averaged) in the returned bundle.
    pub fn adjust(&self, known: &PointBundle) -> PointBundle {
        let mut solved = PointBundle::with_dimension(Dimension::Two);
        for entry in &self.entries {
            if let Some([x, y]) = entry.adjust(known) {
                if let Ok(p) = Point::new(entry.new_id(), Dimension::Two, PointRole::New, &[x, y]) {
                    if let Err(err) = solved.add(p) {
                        warn!("Intersected point {} not stored: {err}", entry.new_id());
                    }
                }
            }
        }
        solved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() < tol
    }

    fn known(points: &[(&str, f64, f64)]) -> PointBundle {
        let mut bundle = PointBundle::new();
        for &(id, x, y) in points {
            bundle
                .add(Point::new(id, Dimension::Two, PointRole::Reference, &[x, y]).expect("point"))
                .expect("add");
        }
        bundle
    }

    /// Directions with an arbitrary station orientation `o`.
    fn dir(from: (f64, f64), to: (f64, f64), o: f64) -> f64 {
        angle::normalize(angle::azimuth(from.0, from.1, to.0, to.1) - o)
    }

    #[test]
    fn noise_free_intersection_reproduces_point() {
        let a = (0.0, 0.0);
        let b = (0.0, 100.0);
        let n = (80.0, 40.0);
        let (oa, ob) = (0.3, 5.9);
        let mut set = ForwardIntersectionSet::new();
        set.add("A", "B", "N", dir(a, b, oa), dir(a, n, oa), dir(b, a, ob), dir(b, n, ob));
        let bundle = known(&[("A", a.0, a.1), ("B", b.0, b.1)]);
        let p = set.entries()[0].adjust(&bundle).expect("intersection");
        assert!(approx_eq(p[0], n.0, 1e-9));
        assert!(approx_eq(p[1], n.1, 1e-9));
    }

    #[test]
    fn point_on_other_side_is_found() {
        let a = (0.0, 0.0);
        let b = (0.0, 100.0);
        let n = (-60.0, 70.0);
        let mut set = ForwardIntersectionSet::new();
        set.add("A", "B", "N", dir(a, b, 0.0), dir(a, n, 0.0), dir(b, a, 1.0), dir(b, n, 1.0));
        let bundle = known(&[("A", a.0, a.1), ("B", b.0, b.1)]);
        let p = set.entries()[0].adjust(&bundle).expect("intersection");
        assert!(approx_eq(p[0], n.0, 1e-9));
        assert!(approx_eq(p[1], n.1, 1e-9));
    }

    #[test]
    fn point_seen_from_two_pairs_is_joined() {
        let a = (0.0, 0.0);
        let b = (0.0, 100.0);
        let c = (120.0, 90.0);
        let n = (70.0, 30.0);
        let (oa, ob, oc) = (0.3, 5.9, 2.2);
        let mut set = ForwardIntersectionSet::new();
        set.add("A", "B", "N", dir(a, b, oa), dir(a, n, oa), dir(b, a, ob), dir(b, n, ob));
        set.add("A", "C", "N", dir(a, c, oa), dir(a, n, oa), dir(c, a, oc), dir(c, n, oc));
        assert_eq!(set.len(), 2);

        let bundle = known(&[("A", a.0, a.1), ("B", b.0, b.1), ("C", c.0, c.1)]);
        let solved = set.adjust(&bundle);
        assert_eq!(solved.len(), 1);
        let p = solved.get("N").expect("N");
        assert!(approx_eq(p.x(), n.0, 1e-9));
        assert!(approx_eq(p.y(), n.1, 1e-9));
    }

    #[test]
    fn reversed_pair_shares_canonical_entry() {
        let mut set = ForwardIntersectionSet::new();
        set.add("B", "A", "N", 0.1, 0.2, 0.3, 0.4);
        set.add("A", "B", "N", 0.3, 0.4, 0.1, 0.2);
        assert_eq!(set.len(), 1);
        let entry = set.entry("A", "B", "N").expect("entry");
        assert_eq!(entry.pair().first(), "A");
        let samples: Vec<_> = entry.samples().collect();
        assert_eq!(samples.len(), 2);
        assert!(approx_eq(samples[0].0, samples[1].0, 1e-15));
        assert!(approx_eq(samples[0].1, samples[1].1, 1e-15));
        assert!(set.entry("B", "A", "N").is_some());
    }

    #[test]
    fn degenerate_sample_is_skipped() {
        let mut set = ForwardIntersectionSet::new();
        // alpha = beta = 0: the rays coincide with the base line
        set.add("A", "B", "N", 1.0, 1.0, 2.0, 2.0);
        let bundle = known(&[("A", 0.0, 0.0), ("B", 0.0, 100.0)]);
        assert!(set.entries()[0].adjust(&bundle).is_none());
    }

    #[test]
    fn gross_sample_is_outvoted_by_median() {
        let a = (0.0, 0.0);
        let b = (0.0, 100.0);
        let n = (50.0, 50.0);
        let mut set = ForwardIntersectionSet::new();
        for eps in [0.0, 1e-7, -1e-7] {
            set.add("A", "B", "N", dir(a, b, 0.0), dir(a, n, 0.0) + eps, dir(b, a, 0.0), dir(b, n, 0.0));
        }
        set.add("A", "B", "N", dir(a, b, 0.0), dir(a, n, 0.0) + 0.01, dir(b, a, 0.0), dir(b, n, 0.0));
        let bundle = known(&[("A", a.0, a.1), ("B", b.0, b.1)]);
        let p = set.entries()[0].adjust(&bundle).expect("intersection");
        assert!(approx_eq(p[0], n.0, 1e-4));
        assert!(approx_eq(p[1], n.1, 1e-4));
    }

    #[test]
    fn missing_fixed_point_yields_nothing() {
        let mut set = ForwardIntersectionSet::new();
        set.add("A", "C", "N", 0.1, 0.2, 0.3, 0.4);
        let bundle = known(&[("A", 0.0, 0.0)]);
        assert!(set.adjust(&bundle).is_empty());
    }
}
