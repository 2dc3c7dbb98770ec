//! Statistical testing of adjustment results.
//!
//! # Overview
//! - [`distribution`] evaluates the χ², F and normal families, including the
//!   noncentral variants needed for the power of a test.
//! - [`TestStatistic`] turns α and β into decision parameters per degrees of
//!   freedom (B-method, Šidák, or unadjusted), cached in
//!   [`TestStatisticParameters`].
//! - [`GlobalTest`] checks the variance of unit weight; [`local_test`]
//!   evaluates a single observation (or pseudo-observation) for a gross error.
//! - [`ConfidenceRegion`] describes the dispersion of a point or
//!   displacement.
//!
//! Test values below `sqrt(ε)` are numerically zero and reported as exactly
//! `0.0`.

use serde::Serialize;

pub mod distribution;

mod confidence;
mod test_statistic;

pub use confidence::{helmert_ellipse, mdb_vector, ConfidenceRegion};
pub use test_statistic::{
    TestStatistic, TestStatisticDefinition, TestStatisticParameterSet, TestStatisticParameters,
    TestStatisticType,
};

/// `sqrt(f64::EPSILON)`.
pub const SQRT_EPS: f64 = 1.490_116_119_384_765_6e-8;

/// Maps test values below `sqrt(ε)` to exactly zero.
#[inline]
pub fn clamp_test_statistic(t: f64) -> f64 {
    if t < SQRT_EPS {
        0.0
    } else {
        t
    }
}

/// Test of the a posteriori variance of unit weight against its a priori value.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GlobalTest {
    pub omega: f64,
    pub redundancy: f64,
    pub variance_of_unit_weight: f64,
    /// `σ̂² / σ0²`.
    pub test_statistic: f64,
    pub quantile: f64,
    pub p_value: f64,
    pub rejected: bool,
}

impl GlobalTest {
    pub fn evaluate(
        omega: f64,
        redundancy: f64,
        sigma0_squared: f64,
        parameters: &mut TestStatisticParameters,
    ) -> Self {
        if redundancy <= 0.0 {
            return Self {
                omega,
                redundancy,
                variance_of_unit_weight: 1.0,
                test_statistic: 0.0,
                quantile: f64::INFINITY,
                p_value: 1.0,
                rejected: false,
            };
        }
        let variance = omega / redundancy;
        let t = clamp_test_statistic(variance / sigma0_squared);
        let set = parameters.parameter_set(redundancy, f64::INFINITY, true);
        Self {
            omega,
            redundancy,
            variance_of_unit_weight: variance,
            test_statistic: t,
            quantile: set.quantile,
            p_value: distribution::f_sf(t, redundancy, f64::INFINITY),
            rejected: t > set.quantile,
        }
    }
}

/// Outlier test of one observation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct LocalTest {
    /// Redundancy number `r_i = (Qvv·P)_ii`.
    pub redundancy: f64,
    pub gross_error: f64,
    pub minimal_detectable_bias: f64,
    pub t_prio: f64,
    pub t_post: f64,
    pub p_prio: f64,
    pub p_post: f64,
    pub significant: bool,
}

/// Inputs of [`local_test`] shared by every observation of one adjustment.
#[derive(Clone, Copy, Debug)]
pub struct LocalTestContext {
    pub omega: f64,
    pub redundancy: f64,
    pub prio: TestStatisticParameterSet,
    pub post: TestStatisticParameterSet,
    pub apply_variance_of_unit_weight: bool,
}

impl LocalTestContext {
    pub fn new(
        omega: f64,
        redundancy: f64,
        apply_variance_of_unit_weight: bool,
        parameters: &mut TestStatisticParameters,
    ) -> Self {
        let prio = parameters.parameter_set(1.0, f64::INFINITY, false);
        let post = parameters.parameter_set(1.0, (redundancy - 1.0).max(1.0), false);
        Self {
            omega,
            redundancy,
            prio,
            post,
            apply_variance_of_unit_weight,
        }
    }
}

/// Evaluates observation `i` from `w = (P·v)_i`, `d = (P·Qvv·P)_ii` and its
/// redundancy number. Uncontrolled observations (`d ≈ 0`) get zero test
/// values and an infinite MDB.
pub fn local_test(w: f64, d: f64, redundancy_number: f64, ctx: &LocalTestContext) -> LocalTest {
    if d <= SQRT_EPS * SQRT_EPS || redundancy_number < SQRT_EPS {
        return LocalTest {
            redundancy: redundancy_number.max(0.0),
            minimal_detectable_bias: f64::INFINITY,
            p_prio: 1.0,
            p_post: 1.0,
            ..LocalTest::default()
        };
    }

    let t_prio = clamp_test_statistic(w * w / d);
    let dof_post = ctx.redundancy - 1.0;
    let sigma2_excluded = if dof_post > 0.0 {
        (ctx.omega - t_prio) / dof_post
    } else {
        0.0
    };
    let t_post = if sigma2_excluded > SQRT_EPS {
        clamp_test_statistic(t_prio / sigma2_excluded)
    } else {
        0.0
    };

    let p_prio = distribution::chi_square_sf(t_prio, 1.0);
    let p_post = if dof_post > 0.0 {
        distribution::f_sf(t_post, 1.0, dof_post)
    } else {
        1.0
    };

    let significant = if ctx.apply_variance_of_unit_weight {
        t_post > 0.0 && t_post > ctx.post.quantile
    } else {
        t_prio > 0.0 && t_prio > ctx.prio.quantile
    };

    LocalTest {
        redundancy: redundancy_number,
        gross_error: -w / d,
        minimal_detectable_bias: (ctx.prio.noncentrality_parameter / d).sqrt(),
        t_prio,
        t_post,
        p_prio,
        p_post,
        significant,
    }
}
