use geodetic_adjustment::config::project;
use geodetic_adjustment::AdjustmentReport;
use std::env;
use std::path::PathBuf;

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("Error: {err}");
            std::process::exit(1);
        }
    }
}

/// Adjusts one project and returns the numeric estimation state.
fn run() -> Result<i32, String> {
    let mut args = env::args();
    let program = args
        .next()
        .unwrap_or_else(|| "geodetic_adjustment".to_string());
    let path = args
        .next()
        .map(PathBuf::from)
        .ok_or_else(|| format!("Usage: {program} <project.json>"))?;

    let config = project::load_config(&path).map_err(|e| e.to_string())?;
    let mut adjustment = config
        .adjustment()
        .map_err(|e| format!("Invalid project {}: {e}", path.display()))?;
    let state = adjustment.adjust();

    let report = AdjustmentReport::new(&adjustment, &config.units);
    let json = serde_json::to_string_pretty(&report)
        .map_err(|e| format!("Failed to serialize report: {e}"))?;
    println!("{json}");
    Ok(state.id())
}
