use geodetic_adjustment::config::{congruence, project};
use geodetic_adjustment::{CongruenceAnalysis, CongruenceReport, EpochSolution, EstimationState};
use std::env;
use std::path::{Path, PathBuf};

fn main() {
    if let Err(err) = run() {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn adjust_epoch(path: &Path) -> Result<(project::ProjectConfig, EpochSolution), String> {
    let config = project::load_config(path).map_err(|e| e.to_string())?;
    let mut adjustment = config
        .adjustment()
        .map_err(|e| format!("Invalid project {}: {e}", path.display()))?;
    let state = adjustment.adjust();
    if state != EstimationState::Converged {
        return Err(format!("Adjustment of {} ended in state {state}", path.display()));
    }
    let epoch = adjustment
        .epoch_solution()
        .ok_or_else(|| format!("No epoch solution for {}", path.display()))?;
    Ok((config, epoch))
}

fn run() -> Result<(), String> {
    let mut args = env::args();
    let program = args.next().unwrap_or_else(|| "congruence".to_string());
    let path = args
        .next()
        .map(PathBuf::from)
        .ok_or_else(|| format!("Usage: {program} <congruence.json>"))?;

    let config = congruence::load_config(&path).map_err(|e| e.to_string())?;
    let (first_config, first) = adjust_epoch(&config.first)?;
    let (_, second) = adjust_epoch(&config.second)?;

    let mut analysis = CongruenceAnalysis::new(first, second)
        .map_err(|e| e.to_string())?
        .with_estimation_parameters(first_config.estimation)
        .with_test_statistic(first_config.test_statistic);
    config
        .apply(&mut analysis)
        .map_err(|e| format!("Invalid congruence groups in {}: {e}", path.display()))?;
    analysis.analyse();

    let report = CongruenceReport::new(&analysis);
    let json = serde_json::to_string_pretty(&report)
        .map_err(|e| format!("Failed to serialize report: {e}"))?;
    println!("{json}");
    Ok(())
}
