//! Cgroups v2 resource management.
//!
//! Provides the per-container cgroup handle: directory creation, memory and
//! CPU limits, process membership and removal, all through the unified
//! hierarchy's control files.

pub mod cpu;
pub mod memory;

use std::io::Write;
use std::path::{Path, PathBuf};

use mcr_common::constants::CGROUP_NAME_PREFIX;
use mcr_common::error::{McrError, Result};
use mcr_common::types::ResourceLimits;

/// Control file listing the member processes.
pub const CGROUP_PROCS: &str = "cgroup.procs";

/// Handle to the cgroup of a single container.
///
/// Tracks which control files have been written so a failure part-way
/// through [`apply_limits`](Self::apply_limits) reports everything that was
/// already in force.
#[derive(Debug)]
pub struct CgroupManager {
    name: String,
    path: PathBuf,
    applied: Vec<String>,
}

impl CgroupManager {
    /// Derives the cgroup name for a managed process (`mini_<pid>`).
    #[must_use]
    pub fn name_for_pid(pid: u32) -> String {
        format!("{CGROUP_NAME_PREFIX}{pid}")
    }

    /// Creates (or reuses) the cgroup `<root>/<name>`.
    ///
    /// # Errors
    ///
    /// Returns [`McrError::ResourceLimit`] if the directory cannot be
    /// created.
    pub fn create(root: &Path, name: &str) -> Result<Self> {
        let path = root.join(name);
        std::fs::create_dir_all(&path).map_err(|e| McrError::ResourceLimit {
            cgroup: path.clone(),
            control: "create".into(),
            applied: Vec::new(),
            source: e,
        })?;
        tracing::info!(path = %path.display(), "cgroup created");
        Ok(Self {
            name: name.to_string(),
            path,
            applied: Vec::new(),
        })
    }

    /// Creates the cgroup for the managed process `pid`.
    ///
    /// # Errors
    ///
    /// Returns [`McrError::ResourceLimit`] if the directory cannot be
    /// created.
    pub fn for_pid(root: &Path, pid: u32) -> Result<Self> {
        Self::create(root, &Self::name_for_pid(pid))
    }

    /// Cgroup name relative to the hierarchy root.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Absolute path of the cgroup directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Control files written so far, in order.
    #[must_use]
    pub fn applied(&self) -> &[String] {
        &self.applied
    }

    /// Writes the memory ceiling to `memory.max`.
    ///
    /// # Errors
    ///
    /// Returns [`McrError::ResourceLimit`] if the write fails.
    pub fn set_memory_limit(&mut self, bytes: u64) -> Result<()> {
        memory::set_memory_max(&self.path, bytes)
            .map_err(|e| self.limit_error(memory::MEMORY_MAX, e))?;
        self.applied.push(memory::MEMORY_MAX.to_string());
        Ok(())
    }

    /// Writes the CPU bandwidth limit to `cpu.max`.
    ///
    /// # Errors
    ///
    /// Returns [`McrError::ResourceLimit`] if the write fails.
    pub fn set_cpu_limit(&mut self, quota_us: u64, period_us: u64) -> Result<()> {
        cpu::set_cpu_max(&self.path, quota_us, period_us)
            .map_err(|e| self.limit_error(cpu::CPU_MAX, e))?;
        self.applied.push(cpu::CPU_MAX.to_string());
        Ok(())
    }

    /// Applies every requested limit, memory first, then CPU.
    ///
    /// # Errors
    ///
    /// Returns a single [`McrError::ResourceLimit`] naming the failing
    /// control file and the ones already written.
    pub fn apply_limits(&mut self, limits: &ResourceLimits) -> Result<()> {
        if let Some(bytes) = limits.memory_bytes {
            self.set_memory_limit(bytes)?;
        }
        if let Some(quota) = limits.cpu_quota_us {
            self.set_cpu_limit(quota, limits.cpu_period_us)?;
        }
        Ok(())
    }

    /// Adds a process to this cgroup by writing its PID.
    ///
    /// Descendants the process creates afterwards inherit the membership.
    ///
    /// # Errors
    ///
    /// Returns [`McrError::ResourceLimit`] if writing to `cgroup.procs`
    /// fails, e.g. because the process already exited.
    pub fn add_process(&self, pid: u32) -> Result<()> {
        write_control(&self.path.join(CGROUP_PROCS), &pid.to_string())
            .map_err(|e| self.limit_error(CGROUP_PROCS, e))?;
        tracing::debug!(cgroup = %self.name, pid, "added process to cgroup");
        Ok(())
    }

    /// Removes the cgroup directory.
    ///
    /// Only succeeds once every member process has exited. A cgroup that
    /// no longer exists is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`McrError::Io`] if `rmdir(2)` fails.
    pub fn destroy(self) -> Result<()> {
        match std::fs::remove_dir(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(McrError::Io {
                    path: self.path,
                    source: e,
                });
            }
        }
        tracing::info!(path = %self.path.display(), "cgroup destroyed");
        Ok(())
    }

    fn limit_error(&self, control: &str, source: std::io::Error) -> McrError {
        McrError::ResourceLimit {
            cgroup: self.path.clone(),
            control: control.to_string(),
            applied: self.applied.clone(),
            source,
        }
    }
}

/// Overwrites an existing control file with `value`.
///
/// Control files are provided by cgroupfs; a missing file means the
/// controller is not enabled, so the file is never created here.
pub(crate) fn write_control(path: &Path, value: &str) -> std::io::Result<()> {
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .truncate(true)
        .open(path)?;
    file.write_all(value.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONTROL_FILES: [&str; 3] = [memory::MEMORY_MAX, cpu::CPU_MAX, CGROUP_PROCS];

    /// Creates a cgroup under a temporary root with empty control files,
    /// standing in for cgroupfs.
    fn fake_cgroup(root: &Path, controls: &[&str]) -> CgroupManager {
        let cg = CgroupManager::create(root, "testgroup").unwrap();
        for control in controls {
            std::fs::write(cg.path().join(control), "").unwrap();
        }
        cg
    }

    fn read(cg: &CgroupManager, control: &str) -> String {
        std::fs::read_to_string(cg.path().join(control)).unwrap()
    }

    #[test]
    fn create_makes_directory_and_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let cg = CgroupManager::create(tmp.path(), "testgroup").unwrap();
        assert!(cg.path().is_dir());
        assert_eq!(cg.name(), "testgroup");
        assert!(CgroupManager::create(tmp.path(), "testgroup").is_ok());
    }

    #[test]
    fn name_is_derived_from_pid() {
        assert_eq!(CgroupManager::name_for_pid(4242), "mini_4242");
        let tmp = tempfile::tempdir().unwrap();
        let cg = CgroupManager::for_pid(tmp.path(), 7).unwrap();
        assert_eq!(cg.path(), tmp.path().join("mini_7"));
    }

    #[test]
    fn create_fails_under_a_file() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("not-a-dir");
        std::fs::write(&file, "").unwrap();
        let err = CgroupManager::create(&file, "testgroup").unwrap_err();
        assert!(matches!(err, McrError::ResourceLimit { .. }));
    }

    #[test]
    fn memory_limit_is_written_as_plain_decimal() {
        let tmp = tempfile::tempdir().unwrap();
        let mut cg = fake_cgroup(tmp.path(), &CONTROL_FILES);
        cg.set_memory_limit(268_435_456).unwrap();
        assert_eq!(read(&cg, memory::MEMORY_MAX), "268435456");
    }

    #[test]
    fn memory_limit_overwrites_previous_value() {
        let tmp = tempfile::tempdir().unwrap();
        let mut cg = fake_cgroup(tmp.path(), &CONTROL_FILES);
        cg.set_memory_limit(1_000_000_000).unwrap();
        cg.set_memory_limit(42).unwrap();
        assert_eq!(read(&cg, memory::MEMORY_MAX), "42");
    }

    #[test]
    fn cpu_limit_writes_quota_then_period() {
        let tmp = tempfile::tempdir().unwrap();
        let mut cg = fake_cgroup(tmp.path(), &CONTROL_FILES);
        cg.set_cpu_limit(50_000, 100_000).unwrap();
        assert_eq!(read(&cg, cpu::CPU_MAX), "50000 100000");
    }

    #[test]
    fn add_process_round_trips_pid() {
        let tmp = tempfile::tempdir().unwrap();
        let cg = fake_cgroup(tmp.path(), &CONTROL_FILES);
        cg.add_process(1234).unwrap();
        let pid: u32 = read(&cg, CGROUP_PROCS).parse().unwrap();
        assert_eq!(pid, 1234);
    }

    #[test]
    fn missing_control_file_is_a_limit_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let mut cg = fake_cgroup(tmp.path(), &[]);
        let err = cg.set_memory_limit(1024).unwrap_err();
        assert!(matches!(err, McrError::ResourceLimit { ref control, .. } if control == "memory.max"));
        assert!(!cg.path().join(memory::MEMORY_MAX).exists());
        assert!(cg.add_process(1).is_err());
    }

    #[test]
    fn apply_limits_writes_memory_then_cpu() {
        let tmp = tempfile::tempdir().unwrap();
        let mut cg = fake_cgroup(tmp.path(), &CONTROL_FILES);
        let limits = ResourceLimits {
            memory_bytes: Some(64 * 1024 * 1024),
            cpu_quota_us: Some(25_000),
            cpu_period_us: 50_000,
        };
        cg.apply_limits(&limits).unwrap();
        assert_eq!(cg.applied(), ["memory.max", "cpu.max"]);
        assert_eq!(read(&cg, cpu::CPU_MAX), "25000 50000");
    }

    #[test]
    fn half_applied_limits_are_one_aggregate_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let mut cg = fake_cgroup(tmp.path(), &[memory::MEMORY_MAX]);
        // A directory in place of the control file makes the CPU write fail
        // even when running as root.
        std::fs::create_dir(cg.path().join(cpu::CPU_MAX)).unwrap();
        let limits = ResourceLimits {
            memory_bytes: Some(1024),
            cpu_quota_us: Some(10_000),
            ..ResourceLimits::default()
        };

        let err = cg.apply_limits(&limits).unwrap_err();
        match err {
            McrError::ResourceLimit {
                control, applied, ..
            } => {
                assert_eq!(control, "cpu.max");
                assert_eq!(applied, vec!["memory.max".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn apply_limits_without_limits_writes_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let mut cg = fake_cgroup(tmp.path(), &[]);
        cg.apply_limits(&ResourceLimits::default()).unwrap();
        assert!(cg.applied().is_empty());
    }

    #[test]
    fn destroy_removes_empty_cgroup_and_tolerates_absence() {
        let tmp = tempfile::tempdir().unwrap();
        let cg = CgroupManager::create(tmp.path(), "gone").unwrap();
        let path = cg.path().to_path_buf();
        cg.destroy().unwrap();
        assert!(!path.exists());

        let cg = CgroupManager::create(tmp.path(), "gone").unwrap();
        std::fs::remove_dir(cg.path()).unwrap();
        assert!(cg.destroy().is_ok());
    }
}
