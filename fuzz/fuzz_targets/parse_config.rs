//! Config files in either format, plus the env overlay, must never panic.

#![no_main]

use faultline_config::FaultlineConfig;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(input) = std::str::from_utf8(data) else {
        return;
    };
    let _: Result<FaultlineConfig, _> = serde_json::from_str(input);
    if let Ok(mut config) = serde_yaml::from_str::<FaultlineConfig>(input) {
        let _ = config.apply_env_with(|key| {
            input
                .lines()
                .find_map(|l| l.strip_prefix(key)?.strip_prefix('=').map(str::to_string))
        });
        let _ = config.jira.is_usable();
        let _ = config.lock_dir();
    }
});
