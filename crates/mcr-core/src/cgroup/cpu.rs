//! CPU resource control via cgroups v2.
//!
//! Manages the `cpu.max` control file.

use std::path::Path;

/// Control file holding the CPU bandwidth limit.
pub const CPU_MAX: &str = "cpu.max";

/// Sets the CPU bandwidth limit (max microseconds per period).
///
/// Writes `quota_us period_us` to `cpu.max`, where `quota_us` is the
/// maximum CPU time allowed per `period_us` window.
///
/// # Errors
///
/// Returns the underlying I/O error if `cpu.max` is missing or the
/// kernel rejects the value.
pub fn set_cpu_max(cgroup_path: &Path, quota_us: u64, period_us: u64) -> std::io::Result<()> {
    super::write_control(&cgroup_path.join(CPU_MAX), &format!("{quota_us} {period_us}"))?;
    tracing::debug!(quota_us, period_us, "CPU max quota set");
    Ok(())
}
