//! Configuration files feeding an orchestrator

use std::io::Write;
use std::sync::Arc;

use tempfile::Builder;

use touchlink::backend::simulated::SimulatedBackend;
use touchlink::prelude::*;
use touchlink::watchdog::{FixedLocator, ScriptedController};

#[test]
fn toml_round_trip_preserves_every_section() {
    let mut config = TouchLinkConfig::default();
    config.tracking.prediction_ms = 25;
    config.tracking.keep_alive = true;
    config.render.resolution_divisor = 4;
    config.watchdog.tick_ms = 250;
    config.tool.install_dir = Some("C:/Oculus/Support/oculus-diagnostics".into());

    let file = Builder::new().suffix(".toml").tempfile().unwrap();
    config.save_to_file(file.path()).unwrap();
    let loaded = TouchLinkConfig::load_from_file(file.path()).unwrap();

    assert_eq!(loaded, config);
}

#[test]
fn host_settings_from_file_reach_the_orchestrator() {
    let mut file = Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(
        file,
        "[tracking]\nprediction_ms = 40\nkeep_alive = true\nreduce_res = false\n"
    )
    .unwrap();

    let config = TouchLinkConfig::load_from_file(file.path()).unwrap().sanitized();
    assert!(config.validate().is_ok());

    let tracking = TrackingOrchestrator::with_tool(
        config,
        Box::new(SimulatedBackend::new()),
        Arc::new(ScriptedController::new()),
        Box::new(FixedLocator::new("odt")),
    );
    assert_eq!(tracking.prediction_ms(), 40);
    assert!(tracking.keep_alive());
    assert!(!tracking.reduce_res());
}

#[test]
fn out_of_range_prediction_is_recovered() {
    let mut file = Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(file, "[tracking]\nprediction_ms = 5000\n").unwrap();

    let raw = TouchLinkConfig::load_from_file(file.path()).unwrap();
    assert!(raw.validate().is_err());

    let config = raw.sanitized();
    assert!(config.validate().is_ok());
    assert_eq!(config.tracking.prediction_ms, 11);
}
