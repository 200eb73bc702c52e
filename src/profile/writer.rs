//! Document serialization
//!
//! Renders discovery results and device profiles as pretty-printed JSON and
//! writes them atomically: the bytes go to a sibling temporary file which is
//! then renamed over the target.

use log::info;
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::ProfilerError;

/// Serialize a document to its canonical bytes (trailing newline included)
pub fn to_bytes<D: Serialize>(document: &D) -> Result<Vec<u8>, ProfilerError> {
    let mut bytes = serde_json::to_vec_pretty(document)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Serialize and atomically write a document to `path`
pub fn write_document<D: Serialize>(document: &D, path: &Path) -> Result<(), ProfilerError> {
    let bytes = to_bytes(document)?;
    atomic_write(path, &bytes).map_err(|source| ProfilerError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    info!("Wrote {} ({} bytes)", path.display(), bytes.len());
    Ok(())
}

fn atomic_write(path: &Path, data: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let tmp = temp_path(path);
    let written = (|| {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(data)?;
        file.sync_all()?;
        fs::rename(&tmp, path)
    })();

    if written.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    written
}

/// `profile.json` -> `.profile.json.tmp`, in the same directory
fn temp_path(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    path.with_file_name(format!(".{}.tmp", file_name))
}
