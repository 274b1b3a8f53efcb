#![no_main]
use libfuzzer_sys::fuzz_target;
use thermal_config::{ThermistorFit, ThermistorRow};

fuzz_target!(|points: Vec<(f32, f32)>| {
    let rows: Vec<ThermistorRow> = points
        .into_iter()
        .map(|(celsius, ohms)| ThermistorRow { celsius, ohms })
        .collect();
    if let Ok(fit) = ThermistorFit::from_rows(&rows) {
        assert!(fit.beta.is_finite() && fit.beta > 0.0, "bad beta: {fit:?}");
    }
});
