#![no_main]

use std::fs;

use libfuzzer_sys::fuzz_target;
use tempfile::tempdir;
use tfship_auth::{CREDENTIALS_FILE, token_from_credentials_file};

fuzz_target!(|data: &[u8]| {
    let td = match tempdir() {
        Ok(v) => v,
        Err(_) => return,
    };

    let path = td.path().join(CREDENTIALS_FILE);
    if fs::write(&path, data).is_err() {
        return;
    }

    if let Ok(Some(token)) = token_from_credentials_file(&path, "app.terraform.io") {
        assert!(!token.is_empty());
    }
});
