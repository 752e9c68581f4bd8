//! OS capability shim
//!
//! The orchestrator needs a small amount of platform introspection: which
//! processes are running (for stop-process-for-update handling), whether a
//! process can be stopped, and whether the target path sits on a local
//! device. [`OsInspector`] is that seam; [`UnixInspector`] reads `/proc`
//! and sends signals through `nix`, and [`MockInspector`] backs tests.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// A running process as seen by the inspector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub pid: i32,
    pub name: String,
}

/// A mounted volume
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeInfo {
    pub mount_point: PathBuf,
    pub file_system: String,
}

/// Platform process/volume introspection used by the orchestrator
pub trait OsInspector: Send + Sync {
    fn running_processes(&self) -> Vec<ProcessInfo>;

    /// Ask the process to stop, escalating after the timeout; returns
    /// whether the process is gone
    fn kill_process(&self, info: &ProcessInfo, timeout: Duration) -> bool;

    fn volumes(&self) -> Vec<VolumeInfo>;

    fn is_path_on_local_device(&self, path: &Path) -> bool;
}

const NETWORK_FILE_SYSTEMS: &[&str] = &["nfs", "nfs4", "cifs", "smbfs", "fuse.sshfs", "9p"];

/// `/proc`-based inspector for unix targets
#[derive(Debug, Clone, Copy, Default)]
pub struct UnixInspector;

impl UnixInspector {
    fn process_alive(pid: i32) -> bool {
        Path::new("/proc").join(pid.to_string()).exists()
    }
}

impl OsInspector for UnixInspector {
    fn running_processes(&self) -> Vec<ProcessInfo> {
        let Ok(entries) = std::fs::read_dir("/proc") else {
            return Vec::new();
        };
        entries
            .filter_map(|entry| {
                let entry = entry.ok()?;
                let pid: i32 = entry.file_name().to_str()?.parse().ok()?;
                let name = std::fs::read_to_string(entry.path().join("comm")).ok()?;
                Some(ProcessInfo {
                    pid,
                    name: name.trim().to_string(),
                })
            })
            .collect()
    }

    fn kill_process(&self, info: &ProcessInfo, timeout: Duration) -> bool {
        use nix::sys::signal::{Signal, kill};
        use nix::unistd::Pid;

        let pid = Pid::from_raw(info.pid);
        if kill(pid, Signal::SIGTERM).is_err() {
            return !Self::process_alive(info.pid);
        }

        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if !Self::process_alive(info.pid) {
                return true;
            }
            std::thread::sleep(Duration::from_millis(50));
        }

        // Did not exit in time; escalate.
        let _ = kill(pid, Signal::SIGKILL);
        std::thread::sleep(Duration::from_millis(100));
        !Self::process_alive(info.pid)
    }

    fn volumes(&self) -> Vec<VolumeInfo> {
        let Ok(mounts) = std::fs::read_to_string("/proc/mounts") else {
            return Vec::new();
        };
        mounts
            .lines()
            .filter_map(|line| {
                let mut fields = line.split_whitespace();
                let _device = fields.next()?;
                let mount_point = fields.next()?;
                let file_system = fields.next()?;
                Some(VolumeInfo {
                    mount_point: PathBuf::from(mount_point),
                    file_system: file_system.to_string(),
                })
            })
            .collect()
    }

    fn is_path_on_local_device(&self, path: &Path) -> bool {
        // Longest mount-point prefix wins.
        let volume = self
            .volumes()
            .into_iter()
            .filter(|v| path.starts_with(&v.mount_point))
            .max_by_key(|v| v.mount_point.as_os_str().len());
        match volume {
            Some(v) => !NETWORK_FILE_SYSTEMS.contains(&v.file_system.as_str()),
            None => true,
        }
    }
}

/// Scriptable inspector for tests
#[derive(Debug, Default)]
pub struct MockInspector {
    processes: std::sync::Mutex<Vec<ProcessInfo>>,
    pub kill_succeeds: bool,
}

impl MockInspector {
    pub fn new() -> Self {
        Self {
            processes: std::sync::Mutex::new(Vec::new()),
            kill_succeeds: true,
        }
    }

    pub fn with_process(self, pid: i32, name: impl Into<String>) -> Self {
        self.lock_processes().push(ProcessInfo {
            pid,
            name: name.into(),
        });
        self
    }

    fn lock_processes(&self) -> std::sync::MutexGuard<'_, Vec<ProcessInfo>> {
        self.processes
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl OsInspector for MockInspector {
    fn running_processes(&self) -> Vec<ProcessInfo> {
        self.lock_processes().clone()
    }

    fn kill_process(&self, info: &ProcessInfo, _timeout: Duration) -> bool {
        if self.kill_succeeds {
            self.lock_processes().retain(|p| p.pid != info.pid);
        }
        self.kill_succeeds
    }

    fn volumes(&self) -> Vec<VolumeInfo> {
        vec![VolumeInfo {
            mount_point: PathBuf::from("/"),
            file_system: "ext4".to_string(),
        }]
    }

    fn is_path_on_local_device(&self, _path: &Path) -> bool {
        true
    }
}
