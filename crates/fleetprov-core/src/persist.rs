// ── Identity file persistence ──
//
// Certificates and private keys are written as UTF-8 text. The parent
// directory is created on demand and the file ends up readable and
// writable by its owner only.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;

use crate::error::CoreError;

/// Write `contents` to `path`, creating parent directories as needed, and
/// restrict the file to owner read/write.
///
/// The file is created owner-only and truncated before any bytes are
/// written, so the contents are never readable by others.
pub fn write_private_file(path: &Path, contents: &str) -> Result<(), CoreError> {
    let fail = |context: &str| {
        let path = path.to_path_buf();
        let context = context.to_owned();
        move |source: std::io::Error| CoreError::Persistence {
            context,
            path,
            source,
        }
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(fail("Failed to create directory for"))?;
    }
    let mut file = open_private(path).map_err(fail("Failed to write"))?;
    // An existing file keeps its old mode on open.
    restrict_to_owner(path).map_err(fail("Failed to set permissions on"))?;
    file.write_all(contents.as_bytes()).map_err(fail("Failed to write"))?;
    tracing::debug!(path = %path.display(), bytes = contents.len(), "wrote identity file");
    Ok(())
}

/// Read an identity file supplied by the operator.
pub fn read_private_file(path: &Path) -> Result<String, CoreError> {
    fs::read_to_string(path).map_err(|source| CoreError::Persistence {
        context: "Failed to read".into(),
        path: path.to_path_buf(),
        source,
    })
}

/// Restrict an existing file to owner read/write.
pub fn restrict_private_file(path: &Path) -> Result<(), CoreError> {
    restrict_to_owner(path).map_err(|source| CoreError::Persistence {
        context: "Failed to set permissions on".into(),
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(unix)]
fn open_private(path: &Path) -> std::io::Result<File> {
    use std::os::unix::fs::OpenOptionsExt;
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
}

#[cfg(not(unix))]
fn open_private(path: &Path) -> std::io::Result<File> {
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
}

#[cfg(unix)]
fn restrict_to_owner(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_to_owner(path: &Path) -> std::io::Result<()> {
    // Non-Unix ACLs are inherited from the parent directory.
    fs::metadata(path).map(|_| ())
}
