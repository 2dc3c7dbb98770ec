//! Iterative Gauss-Markov estimator.
//!
//! Each iteration linearizes the [`Model`], accumulates the weighted normal
//! equations `N = AᵀPA`, `n = AᵀPl`, borders them with the datum conditions of
//! a free network and solves for the correction `dx = Qxx·n`. After
//! convergence the residuals, the variance of unit weight and the global and
//! local tests are derived from the final linearization.
//!
//! A [`EstimationType::Simulation`] run is a pre-analysis of a planned
//! network: it solves the normal equations once at the approximate values,
//! leaves the parameters untouched and evaluates the a priori dispersion,
//! the redundancy numbers and the minimal detectable biases.

use log::{debug, info, warn};
use nalgebra::{Cholesky, DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use super::model::{Cofactor, Model};
use super::state::EstimationState;
use super::variance::{VarianceComponent, VarianceComponentType};
use crate::statistic::{
    self, GlobalTest, LocalTest, LocalTestContext, TestStatistic, TestStatisticDefinition,
    TestStatisticParameters,
};

/// Smallest pivot of the equilibrated normal equations, relative to the
/// largest, that is still treated as regular.
const PIVOT_TOLERANCE: f64 = 1e-13;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimationType {
    #[default]
    LeastSquares,
    /// Pre-analysis without observed values.
    Simulation,
}

/// Parameters controlling the iteration.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct EstimationParameters {
    pub estimation_type: EstimationType,
    pub max_iterations: usize,
    /// Convergence threshold on `max |dx|`.
    pub threshold: f64,
    /// Scale the dispersion and the local tests with σ̂² instead of σ0².
    pub apply_variance_of_unit_weight: bool,
    /// A priori variance of unit weight σ0².
    pub variance_of_unit_weight_prio: f64,
}

impl Default for EstimationParameters {
    fn default() -> Self {
        Self {
            estimation_type: EstimationType::LeastSquares,
            max_iterations: 100,
            threshold: statistic::SQRT_EPS,
            apply_variance_of_unit_weight: true,
            variance_of_unit_weight_prio: 1.0,
        }
    }
}

impl EstimationParameters {
    /// Whether σ̂² scales the dispersion and decides the local tests. A
    /// simulation has no residuals and always uses σ0².
    pub fn uses_variance_of_unit_weight(&self) -> bool {
        self.apply_variance_of_unit_weight && self.estimation_type != EstimationType::Simulation
    }
}

/// Results of a converged run.
#[derive(Clone, Debug)]
pub struct Solution {
    pub iterations: usize,
    pub max_correction: f64,
    pub observation_count: usize,
    /// Observations with a positive weight.
    pub active_observations: usize,
    pub parameter_count: usize,
    pub datum_defect: usize,
    pub redundancy: f64,
    /// Weighted square sum of residuals `vᵀPv`.
    pub omega: f64,
    /// σ̂², or 1 without redundancy.
    pub variance_of_unit_weight: f64,
    pub residuals: DVector<f64>,
    pub parameter_std: DVector<f64>,
    pub global_test: GlobalTest,
    pub local_tests: Vec<LocalTest>,
    /// The global component first, then one per observation type.
    pub variance_components: Vec<VarianceComponent>,
}

impl Solution {
    /// Variance factor that scales `Qxx` into the reported dispersion.
    pub fn dispersion_factor(&self, params: &EstimationParameters) -> f64 {
        if params.uses_variance_of_unit_weight() {
            self.variance_of_unit_weight
        } else {
            params.variance_of_unit_weight_prio
        }
    }
}

enum Weights {
    Diagonal(DVector<f64>),
    Full(DMatrix<f64>),
}

impl Weights {
    fn from_cofactor(cofactor: Cofactor) -> Option<Self> {
        match cofactor {
            Cofactor::Diagonal(q) => Some(Weights::Diagonal(
                q.map(|qii| if qii > 0.0 { 1.0 / qii } else { 0.0 }),
            )),
            Cofactor::Full(q) => Cholesky::new(q).map(|c| Weights::Full(c.inverse())),
        }
    }

    fn active_count(&self) -> usize {
        match self {
            Weights::Diagonal(p) => p.iter().filter(|&&pi| pi > 0.0).count(),
            Weights::Full(p) => p.nrows(),
        }
    }

    fn is_active(&self, row: usize) -> bool {
        match self {
            Weights::Diagonal(p) => p[row] > 0.0,
            Weights::Full(_) => true,
        }
    }

    /// `P·A`.
    fn apply(&self, a: &DMatrix<f64>) -> DMatrix<f64> {
        match self {
            Weights::Diagonal(p) => {
                let mut pa = a.clone();
                for (i, mut row) in pa.row_iter_mut().enumerate() {
                    row *= p[i];
                }
                pa
            }
            Weights::Full(p) => p * a,
        }
    }

    fn apply_vec(&self, v: &DVector<f64>) -> DVector<f64> {
        match self {
            Weights::Diagonal(p) => p.component_mul(v),
            Weights::Full(p) => p * v,
        }
    }
}

type StateCallback = Box<dyn FnMut(EstimationState, EstimationState) + Send>;

/// Gauss-Markov estimator shared by network and deformation models.
pub struct Estimator {
    params: EstimationParameters,
    test_statistic: TestStatisticDefinition,
    state: EstimationState,
    on_state_change: Option<StateCallback>,
    interrupt: Arc<AtomicBool>,
    qxx: Option<DMatrix<f64>>,
    solution: Option<Solution>,
}

impl Estimator {
    pub fn new(params: EstimationParameters) -> Self {
        Self {
            params,
            test_statistic: TestStatisticDefinition::default(),
            state: EstimationState::NotInitialised,
            on_state_change: None,
            interrupt: Arc::new(AtomicBool::new(false)),
            qxx: None,
            solution: None,
        }
    }

    pub fn with_test_statistic(mut self, definition: TestStatisticDefinition) -> Self {
        self.test_statistic = definition;
        self
    }

    /// Registers a callback receiving `(old, new)` on every state change.
    pub fn on_state_change<F>(&mut self, callback: F)
    where
        F: FnMut(EstimationState, EstimationState) + Send + 'static,
    {
        self.on_state_change = Some(Box::new(callback));
    }

    /// Shared flag; setting it stops the run before the next iteration.
    pub fn interrupt_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupt)
    }

    pub fn params(&self) -> &EstimationParameters {
        &self.params
    }

    pub fn test_statistic(&self) -> &TestStatisticDefinition {
        &self.test_statistic
    }

    pub fn state(&self) -> EstimationState {
        self.state
    }

    /// Cofactor matrix of the parameters from the last iteration.
    pub fn qxx(&self) -> Option<&DMatrix<f64>> {
        self.qxx.as_ref()
    }

    pub fn solution(&self) -> Option<&Solution> {
        self.solution.as_ref()
    }

    /// Correlation coefficient of parameters `i` and `j`.
    pub fn correlation(&self, i: usize, j: usize) -> Option<f64> {
        let q = self.qxx.as_ref()?;
        if i >= q.nrows() || j >= q.nrows() {
            return None;
        }
        let denom = (q[(i, i)] * q[(j, j)]).sqrt();
        (denom > 0.0).then(|| q[(i, j)] / denom)
    }

    /// Releases the cofactor matrix.
    pub fn clear_matrices(&mut self) {
        self.qxx = None;
    }

    fn set_state(&mut self, state: EstimationState) {
        let old = self.state;
        self.state = state;
        if old != state {
            if let Some(callback) = self.on_state_change.as_mut() {
                callback(old, state);
            }
        }
    }

    fn finish(&mut self, state: EstimationState) -> EstimationState {
        self.set_state(state);
        info!("Estimation finished: {state}");
        state
    }

    /// Weights, normal equations and their inverse at the current linearization.
    /// `None` (after a warning) if either system is singular.
    fn solve_normal_equations<M: Model + ?Sized>(
        model: &M,
        iteration: usize,
    ) -> Option<(DMatrix<f64>, DVector<f64>)> {
        let lin = model.linearize();
        let Some(weights) = Weights::from_cofactor(model.cofactor()) else {
            warn!("Observation cofactor matrix is not positive definite");
            return None;
        };
        let pa = weights.apply(&lin.jacobian);
        let normal = lin.jacobian.tr_mul(&pa);
        let rhs = pa.tr_mul(&lin.misclosure);

        let datum = model.datum_constraints();
        let Some(qxx) = invert_normal_equations(&normal, datum.as_ref()) else {
            warn!("Normal equations are singular in iteration {iteration}");
            return None;
        };
        Some((qxx, rhs))
    }

    /// Runs the iteration until convergence or a terminal failure.
    pub fn estimate<M: Model + ?Sized>(&mut self, model: &mut M) -> EstimationState {
        let start = Instant::now();
        self.solution = None;
        self.set_state(EstimationState::Running);

        let u = model.parameter_count();
        if u == 0 || model.observation_count() == 0 {
            warn!("Estimation skipped: {u} parameters, {} observations", model.observation_count());
            return self.finish(EstimationState::NotInitialised);
        }
        if self.params.estimation_type == EstimationType::Simulation {
            return self.simulate(model);
        }

        let mut converged_after = None;
        let mut max_correction = f64::INFINITY;
        for iteration in 0..self.params.max_iterations {
            if self.interrupt.swap(false, Ordering::SeqCst) {
                return self.finish(EstimationState::Interrupted);
            }

            let Some((qxx, rhs)) = Self::solve_normal_equations(model, iteration) else {
                return self.finish(EstimationState::SingularMatrix);
            };
            let dx = &qxx * rhs;
            max_correction = dx.amax();
            if !max_correction.is_finite() {
                warn!("Non-finite correction in iteration {iteration}");
                return self.finish(EstimationState::SingularMatrix);
            }
            model.update(&dx);
            self.qxx = Some(qxx);
            debug!("Iteration {iteration}: max |dx| = {max_correction:.3e}");

            if max_correction < self.params.threshold {
                converged_after = Some(iteration + 1);
                break;
            }
        }

        let Some(iterations) = converged_after else {
            warn!(
                "No convergence after {} iterations (max |dx| = {max_correction:.3e})",
                self.params.max_iterations
            );
            return self.finish(EstimationState::MaxIterationsExceeded);
        };

        let datum_defect = model.datum_constraints().map_or(0, |g| g.ncols());
        match self.evaluate(model, iterations, max_correction, datum_defect) {
            Some(solution) => {
                debug!(
                    "Estimation converged after {iterations} iterations in {:.3} ms",
                    start.elapsed().as_secs_f64() * 1e3
                );
                self.solution = Some(solution);
                self.finish(EstimationState::Converged)
            }
            None => self.finish(EstimationState::SingularMatrix),
        }
    }

    /// Pre-analysis at the approximate values; the model is not updated.
    fn simulate<M: Model + ?Sized>(&mut self, model: &M) -> EstimationState {
        if self.interrupt.swap(false, Ordering::SeqCst) {
            return self.finish(EstimationState::Interrupted);
        }
        let Some((qxx, _)) = Self::solve_normal_equations(model, 0) else {
            return self.finish(EstimationState::SingularMatrix);
        };
        self.qxx = Some(qxx);
        let datum_defect = model.datum_constraints().map_or(0, |g| g.ncols());
        match self.evaluate(model, 0, 0.0, datum_defect) {
            Some(solution) => {
                self.solution = Some(solution);
                self.finish(EstimationState::Converged)
            }
            None => self.finish(EstimationState::SingularMatrix),
        }
    }

    /// Residuals, variance of unit weight and tests at the converged parameters.
    fn evaluate<M: Model + ?Sized>(
        &self,
        model: &M,
        iterations: usize,
        max_correction: f64,
        datum_defect: usize,
    ) -> Option<Solution> {
        let qxx = self.qxx.as_ref()?;
        let lin = model.linearize();
        let weights = Weights::from_cofactor(model.cofactor())?;
        let a = &lin.jacobian;
        let n = a.nrows();
        let u = a.ncols();
        let v = if self.params.estimation_type == EstimationType::Simulation {
            DVector::zeros(n)
        } else {
            -&lin.misclosure
        };
        let pv = weights.apply_vec(&v);
        let omega = v.dot(&pv);

        let active = weights.active_count();
        let redundancy = active as f64 - u as f64 + datum_defect as f64;
        let variance = if redundancy > 0.0 { omega / redundancy } else { 1.0 };
        let sigma2 = if self.params.uses_variance_of_unit_weight() {
            variance
        } else {
            self.params.variance_of_unit_weight_prio
        };
        let parameter_std = qxx.diagonal().map(|q| (sigma2 * q.max(0.0)).sqrt());

        let hypotheses = redundancy.max(1.0).round() as usize;
        let mut parameters = TestStatisticParameters::new(TestStatistic::from_definition(
            &self.test_statistic,
            hypotheses,
        ));
        let global_test = GlobalTest::evaluate(
            omega,
            redundancy,
            self.params.variance_of_unit_weight_prio,
            &mut parameters,
        );

        // redundancy numbers r_i and d_i = (P·Qvv·P)_ii from A·Qxx·Aᵀ, the
        // cofactor of the adjusted observations
        let aq = a * qxx;
        let mut redundancy_numbers = vec![0.0; n];
        let mut d = vec![0.0; n];
        match &weights {
            Weights::Diagonal(p) => {
                for i in 0..n {
                    if !weights.is_active(i) {
                        continue;
                    }
                    let m_ii = aq.row(i).dot(&a.row(i));
                    redundancy_numbers[i] = 1.0 - p[i] * m_ii;
                    d[i] = p[i] * redundancy_numbers[i];
                }
            }
            Weights::Full(p) => {
                let mp = aq * a.transpose() * p;
                let pmp = p * &mp;
                for i in 0..n {
                    redundancy_numbers[i] = 1.0 - mp[(i, i)];
                    d[i] = p[(i, i)] - pmp[(i, i)];
                }
            }
        }

        let mut local_tests = vec![LocalTest::default(); n];
        if redundancy > 0.0 {
            let ctx = LocalTestContext::new(
                omega,
                redundancy,
                self.params.uses_variance_of_unit_weight(),
                &mut parameters,
            );
            for i in (0..n).filter(|&i| weights.is_active(i)) {
                local_tests[i] = statistic::local_test(pv[i], d[i], redundancy_numbers[i], &ctx);
            }
        }

        let mut variance_components = vec![VarianceComponent::new(
            VarianceComponentType::Global,
            active,
            redundancy,
            omega,
        )];
        let types = model.variance_component_types();
        if types.len() == n {
            let rows: Vec<_> = (0..n)
                .filter(|&i| weights.is_active(i))
                .map(|i| (types[i], v[i] * pv[i], redundancy_numbers[i]))
                .collect();
            variance_components.extend(VarianceComponent::split(&rows));
        }

        Some(Solution {
            iterations,
            max_correction,
            observation_count: n,
            active_observations: active,
            parameter_count: u,
            datum_defect,
            redundancy,
            omega,
            variance_of_unit_weight: variance,
            residuals: v,
            parameter_std,
            global_test,
            local_tests,
            variance_components,
        })
    }
}

/// Inverts `N`, bordered by the datum conditions `G` when given, and returns
/// the parameter block of the inverse. `None` if the system is singular.
///
/// The system is equilibrated to a unit diagonal before the LU decomposition
/// so the pivot check is independent of the observation weights.
pub(crate) fn invert_normal_equations(
    normal: &DMatrix<f64>,
    datum: Option<&DMatrix<f64>>,
) -> Option<DMatrix<f64>> {
    let u = normal.nrows();
    let d = datum.map_or(0, |g| g.ncols());
    let dim = u + d;

    let mut scale = DVector::from_iterator(
        dim,
        (0..dim).map(|i| {
            if i < u && normal[(i, i)] > 0.0 {
                1.0 / normal[(i, i)].sqrt()
            } else {
                1.0
            }
        }),
    );

    let mut m = DMatrix::zeros(dim, dim);
    m.view_mut((0, 0), (u, u)).copy_from(normal);
    if let Some(g) = datum {
        for k in 0..d {
            let norm = (0..u)
                .map(|i| (g[(i, k)] * scale[i]).powi(2))
                .sum::<f64>()
                .sqrt();
            if norm > 0.0 {
                scale[u + k] = 1.0 / norm;
            }
        }
        m.view_mut((0, u), (u, d)).copy_from(g);
        m.view_mut((u, 0), (d, u)).copy_from(&g.transpose());
    }
    for j in 0..dim {
        for i in 0..dim {
            m[(i, j)] *= scale[i] * scale[j];
        }
    }

    let lu = m.lu();
    let pivots = lu.u().diagonal().map(f64::abs);
    let largest = pivots.max();
    if largest.is_nan() || largest <= 0.0 || pivots.min() <= PIVOT_TOLERANCE * largest {
        return None;
    }
    let inverse = lu.try_inverse()?;

    let mut q = inverse.view((0, 0), (u, u)).into_owned();
    for j in 0..u {
        for i in 0..u {
            q[(i, j)] *= scale[i] * scale[j];
        }
    }
    Some(q)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adjustment::model::Linearization;
    use std::sync::Mutex;

    fn approx_eq(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() < tol
    }

    /// Straight line `y = a + b·t` observed at several epochs.
    struct LineFit {
        t: Vec<f64>,
        y: Vec<f64>,
        sigma: f64,
        params: DVector<f64>,
    }

    impl Model for LineFit {
        fn parameter_count(&self) -> usize {
            2
        }

        fn observation_count(&self) -> usize {
            self.t.len()
        }

        fn linearize(&self) -> Linearization {
            let n = self.t.len();
            let mut jacobian = DMatrix::zeros(n, 2);
            let mut misclosure = DVector::zeros(n);
            for i in 0..n {
                jacobian[(i, 0)] = 1.0;
                jacobian[(i, 1)] = self.t[i];
                misclosure[i] = self.y[i] - (self.params[0] + self.params[1] * self.t[i]);
            }
            Linearization {
                jacobian,
                misclosure,
            }
        }

        fn cofactor(&self) -> Cofactor {
            Cofactor::Diagonal(DVector::from_element(self.t.len(), self.sigma * self.sigma))
        }

        fn update(&mut self, dx: &DVector<f64>) {
            self.params += dx;
        }
    }

    fn line() -> LineFit {
        LineFit {
            t: vec![0.0, 1.0, 2.0, 3.0, 4.0],
            y: vec![1.01, 2.98, 5.02, 6.99, 9.0],
            sigma: 0.02,
            params: DVector::zeros(2),
        }
    }

    #[test]
    fn linear_model_converges_in_two_iterations() {
        let mut model = line();
        let mut estimator = Estimator::new(EstimationParameters::default());
        assert_eq!(estimator.estimate(&mut model), EstimationState::Converged);
        let solution = estimator.solution().expect("solution");
        assert!(solution.iterations <= 2);
        assert!(approx_eq(model.params[0], 1.002, 1e-9));
        assert!(approx_eq(model.params[1], 1.999, 1e-9));
        assert!(approx_eq(solution.redundancy, 3.0, 0.0));
        let r_sum: f64 = solution.local_tests.iter().map(|t| t.redundancy).sum();
        assert!(approx_eq(r_sum, 3.0, 1e-9));
    }

    #[test]
    fn rerun_of_converged_model_takes_one_iteration() {
        let mut model = line();
        let mut estimator = Estimator::new(EstimationParameters::default());
        estimator.estimate(&mut model);
        let before = model.params.clone();
        assert_eq!(estimator.estimate(&mut model), EstimationState::Converged);
        assert_eq!(estimator.solution().expect("solution").iterations, 1);
        assert!((&model.params - before).amax() < 1e-12);
    }

    #[test]
    fn state_changes_reach_callback() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut estimator = Estimator::new(EstimationParameters::default());
        estimator.on_state_change(move |old, new| {
            if let Ok(mut v) = sink.lock() {
                v.push((old, new));
            }
        });
        estimator.estimate(&mut line());
        let seen = seen.lock().expect("lock");
        assert_eq!(
            *seen,
            vec![
                (EstimationState::NotInitialised, EstimationState::Running),
                (EstimationState::Running, EstimationState::Converged),
            ]
        );
    }

    #[test]
    fn interrupt_stops_before_first_iteration() {
        let mut estimator = Estimator::new(EstimationParameters::default());
        estimator.interrupt_handle().store(true, Ordering::SeqCst);
        assert_eq!(estimator.estimate(&mut line()), EstimationState::Interrupted);
        // the flag is consumed
        assert_eq!(estimator.estimate(&mut line()), EstimationState::Converged);
    }

    #[test]
    fn rank_deficient_system_is_singular() {
        let mut model = line();
        model.t = vec![2.0; 5];
        let mut estimator = Estimator::new(EstimationParameters::default());
        assert_eq!(estimator.estimate(&mut model), EstimationState::SingularMatrix);
    }

    #[test]
    fn datum_conditions_regularize_defect() {
        // two unknowns, one observed difference: defect 1 removed by x0 + x1 = 0
        let normal = DMatrix::from_row_slice(2, 2, &[1.0, -1.0, -1.0, 1.0]);
        assert!(invert_normal_equations(&normal, None).is_none());
        let g = DMatrix::from_row_slice(2, 1, &[1.0, 1.0]);
        let q = invert_normal_equations(&normal, Some(&g)).expect("regular");
        assert!(approx_eq(q[(0, 0)], 0.25, 1e-12));
        assert!(approx_eq(q[(0, 1)], -0.25, 1e-12));
    }

    #[test]
    fn clear_matrices_releases_cofactors() {
        let mut estimator = Estimator::new(EstimationParameters::default());
        estimator.estimate(&mut line());
        assert!(estimator.qxx().is_some());
        assert!(estimator.correlation(0, 1).expect("correlation") < 0.0);
        estimator.clear_matrices();
        assert!(estimator.qxx().is_none());
    }

    #[test]
    fn exhausted_iteration_budget_keeps_last_iterate() {
        let mut model = line();
        let params = EstimationParameters {
            max_iterations: 1,
            ..Default::default()
        };
        let mut estimator = Estimator::new(params);
        let state = estimator.estimate(&mut model);
        assert_eq!(state, EstimationState::MaxIterationsExceeded);
        assert_eq!(state.id(), 3);
        // the single step of a linear model already lands on the solution
        assert!(approx_eq(model.params[0], 1.002, 1e-9));
        assert!(approx_eq(model.params[1], 1.999, 1e-9));
        assert!(estimator.solution().is_none());
        assert!(estimator.qxx().is_some());
    }

    #[test]
    fn simulation_leaves_parameters_and_uses_apriori_variance() {
        let params = EstimationParameters {
            estimation_type: EstimationType::Simulation,
            ..Default::default()
        };
        assert!(!params.uses_variance_of_unit_weight());
        let mut model = line();
        let mut estimator = Estimator::new(params);
        assert_eq!(estimator.estimate(&mut model), EstimationState::Converged);
        assert_eq!(model.params.amax(), 0.0);

        let simulated = estimator.solution().expect("solution").clone();
        assert_eq!(simulated.iterations, 0);
        assert_eq!(simulated.omega, 0.0);
        assert!(approx_eq(simulated.redundancy, 3.0, 0.0));
        assert!(!simulated.global_test.rejected);
        assert!(simulated.local_tests.iter().all(|t| t.t_prio == 0.0 && !t.significant));
        assert!(simulated
            .local_tests
            .iter()
            .all(|t| t.minimal_detectable_bias.is_finite() && t.minimal_detectable_bias > 0.0));

        // same dispersion as an adjustment scaled with σ0²
        let mut adjusted = Estimator::new(EstimationParameters {
            apply_variance_of_unit_weight: false,
            ..Default::default()
        });
        adjusted.estimate(&mut line());
        let reference = adjusted.solution().expect("solution");
        assert!((&simulated.parameter_std - &reference.parameter_std).amax() < 1e-12);
        for (s, r) in simulated.local_tests.iter().zip(&reference.local_tests) {
            assert!(approx_eq(s.redundancy, r.redundancy, 1e-12));
            assert!(approx_eq(s.minimal_detectable_bias, r.minimal_detectable_bias, 1e-9));
        }
    }

    /// Line fit whose first two rows are levelled, the rest directions.
    struct TypedLineFit(LineFit);

    impl Model for TypedLineFit {
        fn parameter_count(&self) -> usize {
            self.0.parameter_count()
        }

        fn observation_count(&self) -> usize {
            self.0.observation_count()
        }

        fn linearize(&self) -> Linearization {
            self.0.linearize()
        }

        fn cofactor(&self) -> Cofactor {
            self.0.cofactor()
        }

        fn update(&mut self, dx: &DVector<f64>) {
            self.0.update(dx)
        }

        fn variance_component_types(&self) -> Vec<VarianceComponentType> {
            (0..self.0.t.len())
                .map(|i| {
                    if i < 2 {
                        VarianceComponentType::Levelling
                    } else {
                        VarianceComponentType::Direction
                    }
                })
                .collect()
        }
    }

    #[test]
    fn variance_components_partition_the_global_one() {
        let mut estimator = Estimator::new(EstimationParameters::default());
        estimator.estimate(&mut line());
        let untyped = &estimator.solution().expect("solution").variance_components;
        assert_eq!(untyped.len(), 1);
        assert_eq!(untyped[0].kind, VarianceComponentType::Global);

        assert_eq!(
            estimator.estimate(&mut TypedLineFit(line())),
            EstimationState::Converged
        );
        let solution = estimator.solution().expect("solution");
        let components = &solution.variance_components;
        let kinds: Vec<_> = components.iter().map(|c| c.kind).collect();
        assert_eq!(
            kinds,
            vec![
                VarianceComponentType::Global,
                VarianceComponentType::Levelling,
                VarianceComponentType::Direction
            ]
        );
        let global = &components[0];
        assert!(approx_eq(global.omega, solution.omega, 1e-12));
        assert!(approx_eq(global.variance_of_unit_weight, solution.variance_of_unit_weight, 1e-12));
        let omega: f64 = components[1..].iter().map(|c| c.omega).sum();
        let redundancy: f64 = components[1..].iter().map(|c| c.redundancy).sum();
        assert!(approx_eq(omega, solution.omega, 1e-9));
        assert!(approx_eq(redundancy, 3.0, 1e-9));
        assert_eq!(components[1].observations, 2);
        assert_eq!(components[2].observations, 3);
        for c in &components[1..] {
            assert!(approx_eq(c.variance_of_unit_weight, c.omega / c.redundancy, 1e-12));
        }
    }
}
