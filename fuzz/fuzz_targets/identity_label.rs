//! Identity labels are stable and tracker-safe for any node id.

#![no_main]

use faultline_ids::TestIdentity;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(node_id) = std::str::from_utf8(data) else {
        return;
    };
    let id = TestIdentity::from_node_id(node_id);
    let label = id.label();
    assert_eq!(label, TestIdentity::from_node_id(node_id).label());
    assert!(!label.contains(char::is_whitespace));
    let _ = faultline_dedupe::duplicate_jql("QA", &label);
    let _ = id.slug();
});
