//! JSON helpers and atomic file output shared by every crate.

use serde::{de::DeserializeOwned, Serialize};
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::Path;

#[derive(thiserror::Error, Debug)]
pub enum JsonIoError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Load a JSON document from disk.
pub fn read_json<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T, JsonIoError> {
    let raw = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

/// Write `value` to disk as pretty JSON.
pub fn write_json<T: Serialize>(value: &T, path: impl AsRef<Path>) -> Result<(), JsonIoError> {
    let json = serde_json::to_string_pretty(value)?;
    write_atomic(path, |w| w.write_all(json.as_bytes()))?;
    Ok(())
}

/// Write a file through a temporary sibling and rename it into place once
/// `fill` succeeds, so a failed write never leaves a truncated target.
pub fn write_atomic<F>(path: impl AsRef<Path>, fill: F) -> io::Result<()>
where
    F: FnOnce(&mut dyn Write) -> io::Result<()>,
{
    let path = path.as_ref();
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        fill(&mut writer)?;
        writer.flush()?;
    }
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
