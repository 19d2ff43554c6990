//! Fuzz target for experiment config parsing.
//!
//! Tests that TOML and JSON config parsing plus validation handle arbitrary
//! input without panicking.

#![no_main]

use drbo_config::{validate_experiment, ExperimentConfig};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    for parsed in [
        ExperimentConfig::from_toml_str(text),
        ExperimentConfig::from_json_str(text),
    ] {
        if let Ok(config) = parsed {
            let _ = validate_experiment(&config);
        }
    }
});
