use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::Builder;
use walkdir::WalkDir;

use crate::constants::cache::{ENTRY_COPY_SEPARATOR, ENTRY_EXTENSION};
use crate::types::{CopyIndex, SampleIndex};

/// One entry file discovered under a cache root.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntryFile {
    /// Sample index encoded in the file name.
    pub index: SampleIndex,
    /// Copy number encoded in the file name.
    pub copy: CopyIndex,
    /// Full path of the entry file.
    pub path: PathBuf,
}

/// Filesystem transport for per-index cache entry files.
///
/// Entries live directly under `root` as `<index>_<copy>.sample`. Writes go
/// through a temp file in the same directory and are renamed into place, so a
/// visible entry is always complete.
#[derive(Clone, Debug)]
pub struct EntryDirectory {
    root: PathBuf,
}

impl EntryDirectory {
    /// Open (creating if needed) the entry directory at `root`.
    pub fn open(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Directory holding the entries.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Deterministic path for `(index, copy)`.
    pub fn entry_path(&self, index: SampleIndex, copy: CopyIndex) -> PathBuf {
        self.root.join(entry_file_name(index, copy))
    }

    /// Read a file, mapping a missing file to `None`.
    pub fn read(&self, path: &Path) -> io::Result<Option<Vec<u8>>> {
        match fs::read(path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Write `payload` to `path` via temp file plus rename.
    pub fn write_atomic(&self, path: &Path, payload: &[u8]) -> io::Result<()> {
        let mut tmp = Builder::new()
            .prefix(".entry-")
            .suffix(".tmp")
            .tempfile_in(&self.root)?;
        tmp.write_all(payload)?;
        tmp.flush()?;
        tmp.persist(path).map_err(|err| err.error)?;
        Ok(())
    }

    /// Enumerate entry files directly under the root, sorted by `(index, copy)`.
    ///
    /// Directory read errors are returned rather than skipped.
    pub fn list_entries(&self) -> io::Result<Vec<EntryFile>> {
        let mut entries = Vec::new();
        for entry in WalkDir::new(&self.root).min_depth(1).max_depth(1) {
            let entry = entry.map_err(io::Error::from)?;
            if !entry.file_type().is_file() {
                continue;
            }
            if let Some((index, copy)) = parse_entry_file_name(entry.path()) {
                entries.push(EntryFile {
                    index,
                    copy,
                    path: entry.path().to_path_buf(),
                });
            }
        }
        entries.sort_by_key(|entry| (entry.index, entry.copy));
        Ok(entries)
    }

    /// Number of entry files directly under the root.
    pub fn count_entries(&self) -> io::Result<usize> {
        Ok(self.list_entries()?.len())
    }

    /// Delete every entry file, returning how many were removed.
    ///
    /// Files that do not follow the entry naming scheme are left alone.
    pub fn remove_entries(&self) -> io::Result<usize> {
        let entries = self.list_entries()?;
        for entry in &entries {
            match fs::remove_file(&entry.path) {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => return Err(err),
            }
        }
        Ok(entries.len())
    }
}

/// File name for `(index, copy)`, e.g. `12_0.sample`.
pub fn entry_file_name(index: SampleIndex, copy: CopyIndex) -> String {
    format!("{index}{ENTRY_COPY_SEPARATOR}{copy}.{ENTRY_EXTENSION}")
}

/// Parse `(index, copy)` back out of an entry path; `None` for foreign files.
pub fn parse_entry_file_name(path: &Path) -> Option<(SampleIndex, CopyIndex)> {
    let is_entry = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext == ENTRY_EXTENSION)
        .unwrap_or(false);
    if !is_entry {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    let (index, copy) = stem.split_once(ENTRY_COPY_SEPARATOR)?;
    Some((index.parse().ok()?, copy.parse().ok()?))
}
