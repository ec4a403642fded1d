//! Host identity helpers for node reports

use sysinfo::System;

pub fn hostname() -> String {
    gethostname::gethostname().to_string_lossy().to_string()
}

/// "Linux 6.8.0" style string attached to every report
pub fn os_info() -> String {
    let name = System::name().unwrap_or_else(|| "Unknown".to_string());
    match System::os_version() {
        Some(version) => format!("{name} {version}"),
        None => name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_identity() {
        assert!(!hostname().is_empty());
        assert!(!os_info().is_empty());
    }
}
