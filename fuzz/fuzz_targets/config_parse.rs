#![no_main]

use libfuzzer_sys::fuzz_target;
use tfship::config::TfshipConfig;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok(config) = toml::from_str::<TfshipConfig>(text) {
        let _ = config.validate();
        if let Ok(rendered) = toml::to_string(&config) {
            let reparsed: TfshipConfig =
                toml::from_str(&rendered).expect("rendered config must parse");
            assert_eq!(config.http.timeout, reparsed.http.timeout);
            assert_eq!(
                config.policy.partial_failure,
                reparsed.policy.partial_failure
            );
        }
    }
});
