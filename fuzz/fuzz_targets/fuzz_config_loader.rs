#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Parse and validate arbitrary TOML; errors are fine, panics are not.
    if let Ok(cfg) = ears_config::load_toml(data) {
        if cfg.validate().is_ok() {
            // Whatever passes config validation must also pass the core's.
            let ear = ears_core::EarConfig::from(&cfg);
            assert!(ear.validate().is_ok(), "{ear:?}");
        }
    }
});
