#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Parse and validate must never panic; a config that validates must also
    // map onto core channels.
    let Ok(cfg) = toml::from_str::<thermal_config::Config>(data) else {
        return;
    };
    if cfg.validate().is_ok() {
        let channels = thermal_core::conversions::channels_from_config(&cfg);
        assert!(channels.is_ok(), "validated config failed to map: {channels:?}");
    }
});
