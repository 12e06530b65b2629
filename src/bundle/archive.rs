//! Canonical tar entries
//!
//! Every archive the service produces is hashed, so headers carry no
//! host-specific metadata: mtime 0, uid/gid 0 and a normalized mode.

use std::fs;
use std::io::{self, Write};
use std::path::Path;
use tar::{Builder, Header};

/// Append a regular file with a canonical header
pub(crate) fn append_canonical<W: Write>(
    builder: &mut Builder<W>,
    path: &Path,
    data: &[u8],
    executable: bool,
) -> io::Result<()> {
    let mut header = Header::new_gnu();
    header.set_size(data.len() as u64);
    header.set_mtime(0);
    header.set_uid(0);
    header.set_gid(0);
    header.set_mode(if executable { 0o755 } else { 0o644 });
    header.set_entry_type(tar::EntryType::Regular);
    builder.append_data(&mut header, path, data)
}

/// Check if a file carries an executable mode bit
pub(crate) fn is_executable(path: &Path) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Ok(metadata) = fs::metadata(path) {
            return metadata.permissions().mode() & 0o111 != 0;
        }
    }
    #[cfg(not(unix))]
    let _ = path;
    false
}
