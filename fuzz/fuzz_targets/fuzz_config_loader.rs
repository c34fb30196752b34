#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Fuzz TOML parsing of the experiment file: invalid input must be
    // rejected gracefully, never with a panic.
    let parsed = toml::from_str::<sectioner_config::Config>(data);
    match parsed {
        Ok(cfg) => {
            // Ensure validate() does not panic either
            let _ = cfg.validate();
        }
        Err(_e) => {
            // parse error is acceptable
        }
    }
});
