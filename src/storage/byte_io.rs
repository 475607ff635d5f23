//! Blocking file primitives: size query, exact-length read/write and
//! zero-copy bulk transfer.
//!
//! Every call opens its own descriptors and releases them on return,
//! including on error paths.

use crate::models::{Result, TierError};
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use std::time::Instant;
use tracing::debug;

/// Permission bits for every file this crate creates.
pub const FILE_MODE: u32 = 0o644;

/// Largest count a single `sendfile(2)` call will move on Linux.
#[cfg(target_os = "linux")]
const MAX_SENDFILE_CHUNK: u64 = 0x7fff_f000;

/// Size of `path` in bytes.
pub fn file_size(path: &Path) -> Result<u64> {
    match fs::metadata(path) {
        Ok(meta) => Ok(meta.len()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(TierError::NotFound(path.to_path_buf()))
        }
        Err(e) => Err(TierError::io(format!("stat {}", path.display()), e)),
    }
}

/// Create or truncate `path` and write all of `buffer` to it.
pub fn write_file(path: &Path, buffer: &[u8]) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .mode(FILE_MODE)
        .open(path)
        .map_err(|e| TierError::io(format!("opening {} for writing", path.display()), e))?;

    file.write_all(buffer).map_err(|e| {
        TierError::io(
            format!("writing {} bytes to {}", buffer.len(), path.display()),
            e,
        )
    })
}

/// Fill `buffer` with exactly `buffer.len()` bytes from the start of `path`.
pub fn read_file(path: &Path, buffer: &mut [u8]) -> Result<()> {
    let mut file = File::open(path)
        .map_err(|e| TierError::io(format!("opening {} for reading", path.display()), e))?;

    let len = buffer.len();
    file.read_exact(buffer).map_err(|e| {
        TierError::io(format!("reading {} bytes from {}", len, path.display()), e)
    })
}

/// Copy `src` to `dst` using the kernel's zero-copy path.
///
/// The source size is captured once up front and the copy loops until that
/// many bytes have moved, since one call may move less than requested.
/// `dst` is created if missing and truncated otherwise. Returns the number of
/// bytes moved, which always equals the captured source size.
pub fn transfer_file(src: &Path, dst: &Path) -> Result<u64> {
    let source = File::open(src)
        .map_err(|e| TierError::io(format!("opening source {}", src.display()), e))?;
    transfer_from(&source, src, dst)
}

/// Size and copy come from the same descriptor, so a path swapped after the
/// open cannot mix two files into one transfer.
fn transfer_from(source: &File, src: &Path, dst: &Path) -> Result<u64> {
    let start = Instant::now();

    let expected = source
        .metadata()
        .map_err(|e| TierError::io(format!("stat {}", src.display()), e))?
        .len();

    let dest = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .mode(FILE_MODE)
        .open(dst)
        .map_err(|e| TierError::io(format!("opening destination {}", dst.display()), e))?;

    let moved = copy_range(source, &dest, expected).map_err(|e| {
        TierError::io(
            format!("copying {} to {}", src.display(), dst.display()),
            e,
        )
    })?;

    if moved < expected {
        return Err(TierError::Truncated {
            path: src.to_path_buf(),
            expected,
            moved,
        });
    }

    debug!(
        src = %src.display(),
        dst = %dst.display(),
        bytes = moved,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Transferred file"
    );
    Ok(moved)
}

#[cfg(target_os = "linux")]
fn copy_range(source: &File, dest: &File, expected: u64) -> std::io::Result<u64> {
    use nix::errno::Errno;
    use nix::sys::sendfile::sendfile;
    use std::os::unix::io::AsRawFd;

    let mut moved = 0u64;
    while moved < expected {
        let count = (expected - moved).min(MAX_SENDFILE_CHUNK) as usize;
        match sendfile(dest.as_raw_fd(), source.as_raw_fd(), None, count) {
            // Source shrank underneath us
            Ok(0) => break,
            Ok(n) => moved += n as u64,
            Err(Errno::EINTR) | Err(Errno::EAGAIN) => continue,
            Err(errno) => return Err(errno.into()),
        }
    }
    Ok(moved)
}

#[cfg(not(target_os = "linux"))]
fn copy_range(source: &File, dest: &File, expected: u64) -> std::io::Result<u64> {
    let mut reader = Read::take(source, expected);
    let mut writer = dest;
    std::io::copy(&mut reader, &mut writer)
}
