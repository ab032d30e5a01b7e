//! Outcome ledger lines from disk must parse or fail cleanly.

#![no_main]

use faultline_reporter::LedgerEntry;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(input) = std::str::from_utf8(data) else {
        return;
    };
    for line in input.lines().filter(|l| !l.trim().is_empty()) {
        if let Ok(entry) = serde_json::from_str::<LedgerEntry>(line) {
            let _ = entry.outcome.state();
        }
    }
});
