//! JUnit XML parsing and result mapping must never panic.

#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(input) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(report) = faultline_junit::parse_str(input) {
        let mapping = faultline_junit::map_results(&report);
        assert_eq!(mapping.results.len() + mapping.dropped.len(), report.cases.len());
        for case in report.failing() {
            let _ = case.to_outcome();
        }
    }
});
