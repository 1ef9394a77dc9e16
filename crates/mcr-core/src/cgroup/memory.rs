//! Memory resource control via cgroups v2.
//!
//! Manages the `memory.max` control file.

use std::path::Path;

/// Control file holding the hard memory ceiling.
pub const MEMORY_MAX: &str = "memory.max";

/// Sets the hard memory limit for a cgroup.
///
/// Writes the byte count in decimal, without unit suffix or newline.
///
/// # Errors
///
/// Returns the underlying I/O error if `memory.max` is missing or the
/// kernel rejects the value.
pub fn set_memory_max(cgroup_path: &Path, bytes: u64) -> std::io::Result<()> {
    super::write_control(&cgroup_path.join(MEMORY_MAX), &bytes.to_string())?;
    tracing::debug!(bytes, "memory max limit set");
    Ok(())
}
