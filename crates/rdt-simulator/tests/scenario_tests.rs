use rdt_simulator::{load_scenario, run_scenario};
use std::path::PathBuf;

fn scenario_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../scenarios")
}

#[test]
fn bundled_scenarios_pass() {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(scenario_dir())
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .filter(|p| p.extension().is_some_and(|e| e == "toml"))
        .collect();
    paths.sort();
    assert!(!paths.is_empty());
    for path in paths {
        if let Err(e) = run_scenario(&path) {
            panic!("{}: {e:#}", path.display());
        }
    }
}

#[test]
fn missing_scenario_file_is_an_error() {
    let err = load_scenario(scenario_dir().join("does-not-exist.toml")).unwrap_err();
    assert!(format!("{err:#}").contains("Failed to read scenario file"));
}
