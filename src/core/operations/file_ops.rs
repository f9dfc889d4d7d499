use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

use crate::core::dataset::has_accepted_extension;
use crate::error::{CurationError, Result};

/// Pause between attempts, multiplied by the attempt number
const RETRY_BACKOFF: Duration = Duration::from_millis(20);

/// Errors worth another attempt. Anything else (missing file, permission
/// denied, corrupt content) fails straight away.
fn is_transient(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}

/// Run `op` up to `attempts` times while it fails with a transient error.
pub fn with_io_retry<T, F>(attempts: u32, mut op: F) -> io::Result<T>
where
    F: FnMut() -> io::Result<T>,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(e) if is_transient(&e) && attempt < attempts => {
                warn!("Transient I/O error (attempt {}/{}): {}", attempt, attempts, e);
                thread::sleep(RETRY_BACKOFF * attempt);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Read a whole file, retrying transient failures.
pub fn read_file(path: &Path, attempts: u32) -> Result<Vec<u8>> {
    with_io_retry(attempts, || fs::read(path)).map_err(|e| CurationError::io(path, e))
}

/// Write `bytes` to `dest` so that readers only ever see the complete file.
///
/// The data goes to a temporary file in the destination directory which is
/// then renamed over `dest`.
pub fn write_atomic(dest: &Path, bytes: &[u8], attempts: u32) -> Result<()> {
    let parent = match dest.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    with_io_retry(attempts, || {
        let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
        tmp.write_all(bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(dest).map_err(|e| e.error)?;
        Ok(())
    })
    .map_err(|e| CurationError::io(dest, e))?;

    debug!("Wrote {:?} ({} bytes)", dest, bytes.len());
    Ok(())
}

/// Copy `src` to `dest` atomically.
pub fn copy_atomic(src: &Path, dest: &Path, attempts: u32) -> Result<()> {
    let bytes = read_file(src, attempts)?;
    write_atomic(dest, &bytes, attempts)
}

/// Create `dir` and clear image files and leftover temporaries from an
/// earlier run, so a re-run leaves exactly what it writes.
///
/// Only files with an accepted extension and `.tmp*` files are removed.
pub fn prepare_output_dir(dir: &Path, extensions: &[String]) -> Result<()> {
    fs::create_dir_all(dir).map_err(|e| CurationError::io(dir, e))?;

    let entries = fs::read_dir(dir).map_err(|e| CurationError::io(dir, e))?;
    let mut removed = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let stale_tmp = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(".tmp"));
        if stale_tmp || has_accepted_extension(&path, extensions) {
            fs::remove_file(&path).map_err(|e| CurationError::io(&path, e))?;
            removed += 1;
        }
    }

    if removed > 0 {
        debug!("Cleared {} files from {:?}", removed, dir);
    }
    Ok(())
}

/// Serialize `value` as pretty JSON and write it atomically.
///
/// Failures are reported as [`CurationError::ManifestWrite`]; a stage cannot
/// complete without its manifest.
pub fn write_manifest<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    write_atomic(path, json.as_bytes(), 1).map_err(|e| match e {
        CurationError::Io { path, source } => CurationError::ManifestWrite { path, source },
        other => other,
    })
}
