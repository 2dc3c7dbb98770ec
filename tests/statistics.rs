mod common;

use geodetic_adjustment::adjustment::VarianceComponentType;
use geodetic_adjustment::prelude::*;
use geodetic_adjustment::unit::UnitTable;
use geodetic_adjustment::AdjustmentReport;

const HEIGHTS: [(&str, f64); 4] = [("A", 100.0), ("B", 101.2), ("C", 99.7), ("D", 102.5)];
const BLUNDER: f64 = 0.02;

fn levelling_loop(blunder: f64) -> NetworkAdjustment {
    let mut builder = NetworkBuilder::new(Dimension::One);
    for (i, &(id, h)) in HEIGHTS.iter().enumerate() {
        let role = if i == 0 { PointRole::Reference } else { PointRole::New };
        // Approximations are off by a few millimetres.
        let approx = h + if i == 0 { 0.0 } else { 0.003 * i as f64 };
        builder
            .add_point(Point::new(id, Dimension::One, role, &[approx]).expect("point"))
            .expect("height point");
    }
    for i in 0..HEIGHTS.len() {
        for j in i + 1..HEIGHTS.len() {
            let (from, hf) = HEIGHTS[i];
            let (to, ht) = HEIGHTS[j];
            let error = if (from, to) == ("B", "C") { blunder } else { 0.0 };
            builder.add_observation(Observation::new(
                ObservationKind::HeightDifference,
                from,
                to,
                ht - hf + error,
                0.001,
            ));
        }
    }
    let params = EstimationParameters {
        apply_variance_of_unit_weight: false,
        ..Default::default()
    };
    NetworkAdjustment::new(builder.build().expect("network"), Estimator::new(params))
}

#[test]
fn consistent_loop_passes_the_global_test() {
    let _ = env_logger::builder().is_test(true).try_init();

    let mut adjustment = levelling_loop(0.0);
    assert_eq!(adjustment.adjust(), EstimationState::Converged);
    let solution = adjustment.solution().expect("solution");
    assert!((solution.redundancy - 3.0).abs() < 1e-9);
    assert!(!solution.global_test.rejected);
    for result in adjustment.observation_results() {
        assert!(result.residual.abs() < 1e-9);
        assert!((result.test.redundancy - 0.5).abs() < 1e-9);
        assert!(!result.test.significant);
    }
}

#[test]
fn blunder_is_flagged_by_the_local_test() {
    let _ = env_logger::builder().is_test(true).try_init();

    let mut adjustment = levelling_loop(BLUNDER);
    assert_eq!(adjustment.adjust(), EstimationState::Converged);
    let solution = adjustment.solution().expect("solution");
    assert!(solution.global_test.rejected);
    assert!((solution.omega - 200.0).abs() < 1e-6);

    let results = adjustment.observation_results();
    let worst = results
        .iter()
        .max_by(|a, b| a.test.t_prio.total_cmp(&b.test.t_prio))
        .expect("observations");
    assert_eq!((worst.start.as_str(), worst.end.as_str()), ("B", "C"));
    assert!(worst.test.significant);
    assert!((worst.residual.abs() - BLUNDER / 2.0).abs() < 1e-9);
    assert!(worst.test.minimal_detectable_bias.abs() > 0.0);
}

#[test]
fn report_lists_variance_components() {
    let _ = env_logger::builder().is_test(true).try_init();

    let mut adjustment = levelling_loop(BLUNDER);
    assert_eq!(adjustment.adjust(), EstimationState::Converged);
    let report = AdjustmentReport::new(&adjustment, &UnitTable::default());
    let kinds: Vec<_> = report.variance_components.iter().map(|c| c.kind).collect();
    assert_eq!(kinds, vec![VarianceComponentType::Global, VarianceComponentType::Levelling]);
    let levelling = &report.variance_components[1];
    assert_eq!(levelling.observations, 6);
    assert!((levelling.omega - 200.0).abs() < 1e-6);
    assert!((levelling.variance_of_unit_weight - 200.0 / 3.0).abs() < 1e-6);

    let json = serde_json::to_value(&report).expect("serializable");
    assert_eq!(json["variance_components"][1]["kind"], "levelling");
}
