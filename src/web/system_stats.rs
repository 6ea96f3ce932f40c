// Host RAM and disk usage, read fresh on every call

use std::path::Path;

use sysinfo::System;

use merge_control_types::stats::percent_of;
use merge_control_types::{ControlError, ControlResult, DiskUsage, RamUsage};

const MB: u64 = 1024 * 1024;
const GB: u64 = 1024 * 1024 * 1024;

pub fn ram() -> RamUsage {
    let mut sys = System::new();
    sys.refresh_memory();

    let total = sys.total_memory();
    let available = sys.available_memory();

    RamUsage {
        total_mb: total / MB,
        available_mb: available / MB,
        percent: percent_of(total.saturating_sub(available), total),
    }
}

/// Usage of the filesystem that contains `path`.
pub fn disk(path: &Path) -> ControlResult<DiskUsage> {
    if !path.exists() {
        return Err(ControlError::not_found(format!("Path not found: {}", path.display())));
    }

    let (total, used, free) = filesystem_bytes(path)?;

    Ok(DiskUsage {
        total_gb: total / GB,
        used_gb: used / GB,
        free_gb: free / GB,
        percent: percent_of(used, used + free),
    })
}

/// (total, used, free) in bytes. `free` is the space available to
/// unprivileged users, so `used + free` can be less than `total`.
#[cfg(not(windows))]
#[allow(clippy::unnecessary_cast)]
fn filesystem_bytes(path: &Path) -> ControlResult<(u64, u64, u64)> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|_| ControlError::invalid_request("path contains a NUL byte"))?;

    // SAFETY: statvfs is plain old data; zeroed is a valid initial value.
    let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
    // SAFETY: c_path is a valid NUL-terminated string and stat is writable.
    let rc = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };
    if rc != 0 {
        let err = std::io::Error::last_os_error();
        return Err(if err.kind() == std::io::ErrorKind::NotFound {
            ControlError::not_found(format!("Path not found: {}", path.display()))
        } else {
            err.into()
        });
    }

    let frsize = stat.f_frsize as u64;
    let total = stat.f_blocks as u64 * frsize;
    let used = (stat.f_blocks as u64).saturating_sub(stat.f_bfree as u64) * frsize;
    let free = stat.f_bavail as u64 * frsize;
    Ok((total, used, free))
}

#[cfg(windows)]
fn filesystem_bytes(path: &Path) -> ControlResult<(u64, u64, u64)> {
    use sysinfo::Disks;

    let canonical = path.canonicalize()?;
    let disks = Disks::new_with_refreshed_list();
    let disk = disks
        .list()
        .iter()
        .filter(|d| canonical.starts_with(d.mount_point()))
        .max_by_key(|d| d.mount_point().components().count())
        .ok_or_else(|| {
            ControlError::not_found(format!("No mounted filesystem for {}", path.display()))
        })?;

    let total = disk.total_space();
    let free = disk.available_space();
    Ok((total, total.saturating_sub(free), free))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ram_reports_consistent_values() {
        let usage = ram();
        assert!(usage.total_mb > 0);
        assert!(usage.available_mb <= usage.total_mb);
        assert!((0.0..=100.0).contains(&usage.percent));
    }

    #[test]
    fn test_disk_of_existing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let usage = disk(dir.path()).unwrap();
        assert!(usage.used_gb <= usage.total_gb);
        assert!(usage.free_gb <= usage.total_gb);
        assert!((0.0..=100.0).contains(&usage.percent));
    }

    #[test]
    fn test_disk_of_missing_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = disk(&dir.path().join("does").join("not").join("exist")).unwrap_err();
        assert!(matches!(err, ControlError::NotFound(_)));
    }
}
