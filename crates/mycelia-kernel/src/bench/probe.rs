//! Process memory / host probes.

use sysinfo::System;

/// Source of resident-set-size readings. `None` when the platform gives no
/// reading.
pub trait MemoryProbe: Send + Sync {
    fn rss_bytes(&self) -> Option<u64>;
}

/// `sysinfo`-backed probe for the current process.
#[derive(Debug, Default)]
pub struct SysinfoProbe;

impl MemoryProbe for SysinfoProbe {
    fn rss_bytes(&self) -> Option<u64> {
        let pid = sysinfo::get_current_pid().ok()?;
        let mut sys = System::new();
        if !sys.refresh_process(pid) {
            return None;
        }
        sys.process(pid).map(|p| p.memory())
    }
}

/// Human-readable OS line for the report header.
pub fn os_description() -> String {
    System::long_os_version()
        .or_else(System::name)
        .unwrap_or_else(|| std::env::consts::OS.to_string())
}
