#![no_main]

use libfuzzer_sys::fuzz_target;
use tfship_types::{PartialFailurePolicy, PublishReport};

fuzz_target!(|data: &[u8]| {
    if let Ok(report) = serde_json::from_slice::<PublishReport>(data) {
        assert!(report.failed_count() <= report.platforms.len() + report.checksums.len());
        if report.is_success(PartialFailurePolicy::Fail) {
            assert!(report.is_success(PartialFailurePolicy::Allow));
        }

        if let Ok(json) = serde_json::to_string(&report) {
            let parsed: PublishReport = serde_json::from_str(&json).expect("roundtrip");
            assert_eq!(parsed.state, report.state);
            assert_eq!(parsed.platforms.len(), report.platforms.len());
        }
    }
});
