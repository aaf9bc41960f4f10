//! Standard `process_*` metrics, read from `/proc/self` at scrape time.
//!
//! Nothing is cached: every render takes a fresh snapshot. On platforms
//! without procfs every reading is `None` and the families are omitted.

use std::fmt::Write;
#[cfg(target_os = "linux")]
use std::fs;

/// Clock ticks per second as reported in `/proc/<pid>/stat` (USER_HZ).
#[cfg(target_os = "linux")]
const USER_HZ: f64 = 100.0;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessSnapshot {
    pub cpu_seconds: Option<f64>,
    pub resident_memory_bytes: Option<u64>,
    pub virtual_memory_bytes: Option<u64>,
    pub start_time_seconds: Option<f64>,
    pub open_fds: Option<u64>,
    pub max_fds: Option<u64>,
}

impl ProcessSnapshot {
    #[cfg(target_os = "linux")]
    pub fn read() -> Self {
        let stat = fs::read_to_string("/proc/self/stat").ok();
        let fields = stat.as_deref().and_then(stat_fields);

        let cpu_seconds = fields.as_ref().and_then(|f| {
            let utime: u64 = f.get(11)?.parse().ok()?;
            let stime: u64 = f.get(12)?.parse().ok()?;
            Some((utime + stime) as f64 / USER_HZ)
        });
        let start_time_seconds = fields.as_ref().and_then(|f| {
            let ticks: u64 = f.get(19)?.parse().ok()?;
            Some(boot_time()? as f64 + ticks as f64 / USER_HZ)
        });
        let virtual_memory_bytes = fields.as_ref().and_then(|f| f.get(20)?.parse().ok());

        Self {
            cpu_seconds,
            resident_memory_bytes: status_kib("VmRSS:").map(|kib| kib * 1024),
            virtual_memory_bytes,
            start_time_seconds,
            open_fds: fs::read_dir("/proc/self/fd").ok().map(|d| d.count() as u64),
            max_fds: max_open_files(),
        }
    }

    #[cfg(not(target_os = "linux"))]
    pub fn read() -> Self {
        Self::default()
    }

    pub fn render(&self, out: &mut String) {
        if let Some(v) = self.cpu_seconds {
            family(out, "process_cpu_seconds_total", "Total user and system CPU time spent in seconds.", "counter", v);
        }
        if let Some(v) = self.virtual_memory_bytes {
            family(out, "process_virtual_memory_bytes", "Virtual memory size in bytes.", "gauge", v);
        }
        if let Some(v) = self.resident_memory_bytes {
            family(out, "process_resident_memory_bytes", "Resident memory size in bytes.", "gauge", v);
        }
        if let Some(v) = self.start_time_seconds {
            family(
                out,
                "process_start_time_seconds",
                "Start time of the process since unix epoch in seconds.",
                "gauge",
                v,
            );
        }
        if let Some(v) = self.open_fds {
            family(out, "process_open_fds", "Number of open file descriptors.", "gauge", v);
        }
        if let Some(v) = self.max_fds {
            family(out, "process_max_fds", "Maximum number of open file descriptors.", "gauge", v);
        }
    }
}

fn family(out: &mut String, name: &str, help: &str, kind: &str, value: impl std::fmt::Display) {
    let _ = writeln!(out, "# HELP {name} {help}");
    let _ = writeln!(out, "# TYPE {name} {kind}");
    let _ = writeln!(out, "{name} {value}");
}

/// Fields of `/proc/self/stat` after the `(comm)` field, which may itself
/// contain spaces. Index 0 is the process state.
#[cfg(target_os = "linux")]
fn stat_fields(stat: &str) -> Option<Vec<&str>> {
    let rest = &stat[stat.rfind(')')? + 1..];
    Some(rest.split_whitespace().collect())
}

#[cfg(target_os = "linux")]
fn boot_time() -> Option<u64> {
    let stat = fs::read_to_string("/proc/stat").ok()?;
    stat.lines()
        .find_map(|line| line.strip_prefix("btime "))
        .and_then(|v| v.trim().parse().ok())
}

#[cfg(target_os = "linux")]
fn status_kib(key: &str) -> Option<u64> {
    let status = fs::read_to_string("/proc/self/status").ok()?;
    let line = status.lines().find(|l| l.starts_with(key))?;
    line[key.len()..].split_whitespace().next()?.parse().ok()
}

#[cfg(target_os = "linux")]
fn max_open_files() -> Option<u64> {
    let limits = fs::read_to_string("/proc/self/limits").ok()?;
    let line = limits.lines().find(|l| l.starts_with("Max open files"))?;
    // "Max open files  <soft>  <hard>  files"
    line["Max open files".len()..].split_whitespace().next()?.parse().ok()
}
