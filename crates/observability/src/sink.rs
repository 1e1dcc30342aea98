use fs2::FileExt;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

/// Appends `record` as one JSON line, holding an exclusive lock so lines
/// from concurrent writers never interleave.
pub(crate) fn append_json_line(path: &Path, record: &serde_json::Value) -> io::Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }

    let mut line = serde_json::to_vec(record)?;
    line.push(b'\n');

    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.lock_exclusive()?;
    let written = file.write_all(&line);
    FileExt::unlock(&file)?;
    written
}
