#![no_main]

use libfuzzer_sys::fuzz_target;
use tfship_manifest::{ManifestEntry, derive_platform, parse_manifest};

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    let manifest = parse_manifest(text);
    let mut last_line = 0;
    for entry in manifest.entries() {
        assert!(entry.line() > last_line, "entries must keep manifest order");
        last_line = entry.line();

        if let ManifestEntry::Platform { artifact, .. } = entry {
            assert!(!artifact.platform.os.contains('_'));
            assert!(!artifact.platform.arch.contains('_'));
            assert_eq!(
                derive_platform(&artifact.filename).ok(),
                Some(artifact.platform.clone())
            );
        }
    }
});
