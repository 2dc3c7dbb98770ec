use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::distribution;

const DEFAULT_PROBABILITY_VALUE: f64 = 0.1;
const DEFAULT_POWER_OF_TEST: f64 = 80.0;

/// Strategy for deriving significance level, power and noncentrality of the
/// individual tests.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatisticType {
    /// Shared noncentrality parameter (B-method of testing).
    #[default]
    Baarda,
    /// Šidák correction over the number of independent hypotheses.
    Sidak,
    /// Every test uses the configured α and β as is.
    None,
}

/// User-facing test configuration; α and β in percent.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TestStatisticDefinition {
    pub method: TestStatisticType,
    pub probability_value: f64,
    pub power_of_test: f64,
    /// Interpret `probability_value` as family-wise (global) error rate.
    pub familywise_error_rate: bool,
}

impl Default for TestStatisticDefinition {
    fn default() -> Self {
        Self {
            method: TestStatisticType::Baarda,
            probability_value: DEFAULT_PROBABILITY_VALUE,
            power_of_test: DEFAULT_POWER_OF_TEST,
            familywise_error_rate: false,
        }
    }
}

impl TestStatisticDefinition {
    /// Significance level as a fraction; out-of-range values fall back to the default.
    pub fn alpha(&self) -> f64 {
        let p = if self.probability_value > 0.0 && self.probability_value < 100.0 {
            self.probability_value
        } else {
            DEFAULT_PROBABILITY_VALUE
        };
        p * 0.01
    }

    /// Power of test as a fraction; out-of-range values fall back to the default.
    pub fn beta(&self) -> f64 {
        let p = if self.power_of_test > 0.0 && self.power_of_test < 100.0 {
            self.power_of_test
        } else {
            DEFAULT_POWER_OF_TEST
        };
        p * 0.01
    }
}

/// Decision parameters of a test on F(f1, f2). Probabilities are fractions.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct TestStatisticParameterSet {
    pub numerator_dof: f64,
    pub denominator_dof: f64,
    pub global: bool,
    pub quantile: f64,
    pub noncentrality_parameter: f64,
    pub probability_value: f64,
    pub power_of_test: f64,
    pub log_p: f64,
}

impl TestStatisticParameterSet {
    pub fn new(numerator_dof: f64, denominator_dof: f64, global: bool) -> Self {
        Self {
            numerator_dof,
            denominator_dof,
            global,
            quantile: 0.0,
            noncentrality_parameter: 0.0,
            probability_value: 0.0,
            power_of_test: 0.0,
            log_p: 0.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum TestStatistic {
    Baarda {
        n1: f64,
        m1: f64,
        alpha: f64,
        beta: f64,
        ncp: f64,
    },
    Sidak {
        hypotheses: usize,
        alpha_local: f64,
        alpha_global: f64,
        beta: f64,
        ncp: f64,
    },
    Unadjusted {
        alpha: f64,
        beta: f64,
    },
}

fn clamp_probability(alpha: f64) -> f64 {
    if alpha <= 0.0 {
        f64::EPSILON
    } else if alpha >= 1.0 {
        1.0 - f64::EPSILON.sqrt()
    } else {
        alpha
    }
}

fn log_p(quantile: f64, n: f64, m: f64) -> f64 {
    distribution::f_sf(quantile, n, m).ln()
}

impl TestStatistic {
    /// B-method with reference test F(n1, m1).
    pub fn baarda(n1: f64, m1: f64, alpha: f64, beta: f64) -> Self {
        let ncp = distribution::noncentrality_parameter(n1, m1, alpha, beta);
        TestStatistic::Baarda {
            n1,
            m1,
            alpha,
            beta,
            ncp,
        }
    }

    pub fn sidak(hypotheses: usize, alpha: f64, beta: f64, alpha_is_global: bool) -> Self {
        let h = hypotheses as f64;
        let (alpha_local, alpha_global, ncp) = if hypotheses == 0 {
            (alpha, alpha, distribution::noncentrality_parameter(1.0, f64::INFINITY, alpha, beta))
        } else if alpha_is_global {
            (
                1.0 - (1.0 - alpha).powf(1.0 / h),
                alpha,
                distribution::noncentrality_parameter(h, f64::INFINITY, alpha, beta),
            )
        } else {
            (
                alpha,
                1.0 - (1.0 - alpha).powf(h),
                distribution::noncentrality_parameter(1.0, f64::INFINITY, alpha, beta),
            )
        };
        TestStatistic::Sidak {
            hypotheses,
            alpha_local,
            alpha_global,
            beta,
            ncp,
        }
    }

    pub fn unadjusted(alpha: f64, beta: f64) -> Self {
        TestStatistic::Unadjusted { alpha, beta }
    }

    /// Builds the statistic for a network with `hypotheses` independent tests
    /// (usually the redundancy).
    pub fn from_definition(definition: &TestStatisticDefinition, hypotheses: usize) -> Self {
        let (alpha, beta) = (definition.alpha(), definition.beta());
        match definition.method {
            TestStatisticType::Baarda => Self::baarda(1.0, f64::INFINITY, alpha, beta),
            TestStatisticType::Sidak => {
                Self::sidak(hypotheses, alpha, beta, definition.familywise_error_rate)
            }
            TestStatisticType::None => Self::unadjusted(alpha, beta),
        }
    }

    /// Fills quantile, λ, α, β and log p of `set`.
    pub fn adjust(&self, set: &mut TestStatisticParameterSet) {
        let n2 = set.numerator_dof;
        let m2 = set.denominator_dof;
        match *self {
            TestStatistic::Baarda {
                n1,
                m1,
                alpha,
                beta,
                ncp,
            } => {
                let reference = n1 == n2 && m1 == m2;
                let quantile = if reference {
                    distribution::f_quantile(n2, m2, alpha)
                } else {
                    distribution::quantile_via_ncp(n2, m2, ncp, beta)
                };
                let probability = if reference {
                    alpha
                } else {
                    distribution::f_sf(quantile, n2, m2)
                };
                set.quantile = quantile;
                set.noncentrality_parameter = ncp;
                set.power_of_test = beta;
                set.probability_value = clamp_probability(probability);
                set.log_p = log_p(quantile, n2, m2);
            }
            TestStatistic::Sidak {
                hypotheses,
                alpha_local,
                alpha_global,
                ncp,
                ..
            } => {
                let alpha = if set.global || n2 >= hypotheses as f64 {
                    alpha_global
                } else {
                    alpha_local
                };
                let quantile = distribution::f_quantile(n2, m2, alpha);
                set.quantile = quantile;
                set.noncentrality_parameter = ncp;
                set.probability_value = alpha;
                set.power_of_test = distribution::power_of_test(quantile, n2, m2, ncp);
                set.log_p = log_p(quantile, n2, m2);
            }
            TestStatistic::Unadjusted { alpha, beta } => {
                let quantile = distribution::f_quantile(n2, m2, alpha);
                set.quantile = quantile;
                set.noncentrality_parameter =
                    distribution::noncentrality_parameter(n2, m2, alpha, beta);
                set.probability_value = alpha;
                set.power_of_test = beta;
                set.log_p = log_p(quantile, n2, m2);
            }
        }
    }
}

/// Lazily evaluated parameter sets, cached per degrees of freedom.
#[derive(Clone, Debug)]
pub struct TestStatisticParameters {
    statistic: TestStatistic,
    cache: HashMap<(u64, u64, bool), TestStatisticParameterSet>,
}

impl TestStatisticParameters {
    pub fn new(statistic: TestStatistic) -> Self {
        Self {
            statistic,
            cache: HashMap::new(),
        }
    }

    pub fn statistic(&self) -> &TestStatistic {
        &self.statistic
    }

    pub fn parameter_set(&mut self, f1: f64, f2: f64, global: bool) -> TestStatisticParameterSet {
        let statistic = &self.statistic;
        *self
            .cache
            .entry((f1.to_bits(), f2.to_bits(), global))
            .or_insert_with(|| {
                let mut set = TestStatisticParameterSet::new(f1, f2, global);
                statistic.adjust(&mut set);
                set
            })
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() < tol
    }

    #[test]
    fn definition_defaults_and_range_checks() {
        let def = TestStatisticDefinition::default();
        assert!(approx_eq(def.alpha(), 0.001, 1e-15));
        assert!(approx_eq(def.beta(), 0.8, 1e-15));
        let bad = TestStatisticDefinition {
            probability_value: 120.0,
            power_of_test: -1.0,
            ..Default::default()
        };
        assert!(approx_eq(bad.alpha(), 0.001, 1e-15));
        assert!(approx_eq(bad.beta(), 0.8, 1e-15));
    }

    #[test]
    fn baarda_reference_test_keeps_alpha() {
        let statistic = TestStatistic::baarda(1.0, f64::INFINITY, 0.001, 0.8);
        let mut params = TestStatisticParameters::new(statistic);
        let set = params.parameter_set(1.0, f64::INFINITY, false);
        assert!(approx_eq(set.probability_value, 0.001, 1e-15));
        assert!(approx_eq(set.quantile, 10.827_566_170_662_733, 1e-6));
        assert!(approx_eq(set.noncentrality_parameter, 17.07, 0.02));
        assert!(approx_eq(set.power_of_test, 0.8, 1e-15));
    }

    #[test]
    fn baarda_multidimensional_test_shares_power() {
        let statistic = TestStatistic::baarda(1.0, f64::INFINITY, 0.001, 0.8);
        let mut params = TestStatisticParameters::new(statistic);
        let set = params.parameter_set(3.0, f64::INFINITY, false);
        // same λ, same β; α grows with the dimension
        assert!(set.probability_value > 0.001);
        let power = distribution::power_of_test(set.quantile, 3.0, f64::INFINITY, set.noncentrality_parameter);
        assert!(approx_eq(power, 0.8, 1e-6));
    }

    #[test]
    fn sidak_splits_family_wise_alpha() {
        let statistic = TestStatistic::sidak(10, 0.05, 0.8, true);
        let TestStatistic::Sidak { alpha_local, .. } = statistic else {
            panic!("sidak expected");
        };
        assert!(approx_eq(1.0 - (1.0 - alpha_local).powi(10), 0.05, 1e-12));
        let mut params = TestStatisticParameters::new(statistic);
        let local = params.parameter_set(1.0, f64::INFINITY, false);
        let global = params.parameter_set(10.0, f64::INFINITY, true);
        assert!(approx_eq(local.probability_value, alpha_local, 1e-15));
        assert!(approx_eq(global.probability_value, 0.05, 1e-15));
    }

    #[test]
    fn parameter_sets_are_cached() {
        let mut params = TestStatisticParameters::new(TestStatistic::unadjusted(0.05, 0.8));
        let a = params.parameter_set(2.0, 20.0, false);
        let b = params.parameter_set(2.0, 20.0, false);
        assert_eq!(a, b);
        assert_eq!(params.len(), 1);
        assert!(approx_eq(a.quantile, 3.492_828_476_735_62, 1e-6));
    }
}
