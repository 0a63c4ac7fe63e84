use std::ffi::OsStr;

use sysinfo::{ProcessesToUpdate, System};
use tracing::debug;

/// Terminates host processes by executable name.
pub trait ProcessKiller: Send + Sync {
    /// Returns how many processes were signalled.
    fn kill_by_name(&self, name: &str) -> usize;
}

pub struct SystemProcessKiller;

impl ProcessKiller for SystemProcessKiller {
    fn kill_by_name(&self, name: &str) -> usize {
        let mut system = System::new();
        system.refresh_processes(ProcessesToUpdate::All, true);
        let own_pid = std::process::id();
        let mut killed = 0;
        for process in system.processes_by_exact_name(OsStr::new(name)) {
            if process.pid().as_u32() == own_pid {
                continue;
            }
            if process.kill() {
                killed += 1;
            }
        }
        debug!(name = %name, killed, "kill by name");
        killed
    }
}

/// Human readable OS description for diagnostics dumps.
pub fn os_description() -> String {
    let long = System::long_os_version().unwrap_or_else(|| std::env::consts::OS.to_string());
    match System::kernel_version() {
        Some(kernel) => format!("{long} (kernel {kernel})"),
        None => long,
    }
}
