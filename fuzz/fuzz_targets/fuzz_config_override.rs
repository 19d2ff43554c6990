//! Fuzz target for `--set key=value` overrides.

#![no_main]

use drbo_config::{validate_experiment, ExperimentConfig};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|assignments: Vec<String>| {
    if let Ok(config) = ExperimentConfig::default().with_overrides(&assignments) {
        let _ = validate_experiment(&config);
    }
});
