// SPDX-License-Identifier: Apache-2.0

//! The legacy follow_freq warning is process wide, so it is checked in its own
//! test binary where no other source has fired it yet.

use filesource::config::{ConfigVersion, GlobalConfig};
use filesource::diagnostics::LEGACY_FOLLOW_FREQ_WARNING;
use filesource::sources::file::FileSourceDriver;
use tracing_test::traced_test;

#[traced_test]
#[test]
fn test_legacy_warning_emitted_once_per_process() {
    let cfg = GlobalConfig::new(ConfigVersion::new(2, 5));
    assert!(!LEGACY_FOLLOW_FREQ_WARNING.is_set());

    let drivers: Vec<_> = ["/var/log/app.log", "/var/log/other.log", "/proc/kmsg", "/dev/null"]
        .into_iter()
        .map(|path| FileSourceDriver::new(path, &cfg, None, None))
        .collect();

    assert!(drivers.iter().all(|driver| driver.follow_freq() == -1));
    assert!(LEGACY_FOLLOW_FREQ_WARNING.is_set());

    logs_assert(|lines: &[&str]| {
        let warnings = lines
            .iter()
            .filter(|line| line.contains("WARN"))
            .filter(|line| line.contains("default value of follow_freq"))
            .count();
        match warnings {
            1 => Ok(()),
            n => Err(format!("expected one legacy warning, got {}", n)),
        }
    });

    for driver in drivers {
        driver.free().unwrap();
    }
}
