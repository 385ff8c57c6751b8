//! Permission normalization for stored files.
//!
//! Stored files are plain data: owner read/write, group and other read,
//! never executable, whatever mode the source carried.

use std::io;
use std::path::Path;

/// rw-r--r-- (0644)
#[cfg(unix)]
pub const DATA_FILE_PERM: u32 =
    (libc::S_IRUSR | libc::S_IWUSR | libc::S_IRGRP | libc::S_IROTH) as u32;

/// Execute bits for all users; never present on a stored file.
#[cfg(unix)]
pub const DATA_FILE_FORBIDDEN_MASK: u32 = (libc::S_IXUSR | libc::S_IXGRP | libc::S_IXOTH) as u32;

/// Apply [`DATA_FILE_PERM`] to a freshly stored file.
#[cfg(unix)]
pub fn normalize_data_file_mode(path: &Path) -> io::Result<()> {
    use std::fs;
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(DATA_FILE_PERM))
}

#[cfg(not(unix))]
pub fn normalize_data_file_mode(path: &Path) -> io::Result<()> {
    use std::fs;

    let mut perms = fs::metadata(path)?.permissions();
    #[allow(clippy::permissions_set_readonly_false)]
    perms.set_readonly(false);
    fs::set_permissions(path, perms)
}
