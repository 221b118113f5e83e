//! Sequence file storage.
//!
//! Controllers and the upload path address files by absolute device paths
//! such as `/show.fseq`. [`DirStorage`] maps those onto a directory on the
//! host and refuses anything that would escape it.

use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid path {0:?}")]
    InvalidPath(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("{op} {path}: {source}")]
    Io {
        op: &'static str,
        path: String,
        #[source]
        source: io::Error,
    },
}

/// A file in the storage root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Name relative to the root, without a leading `/`.
    pub name: String,
    pub size: u64,
}

impl FileEntry {
    pub fn is_sequence(&self) -> bool {
        is_sequence_name(&self.name)
    }
}

/// Bytes used by stored files and the capacity of the backing volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StorageUsage {
    pub used_bytes: u64,
    pub total_bytes: u64,
}

/// Case variants accepted as sequence files.
pub fn is_sequence_name(name: &str) -> bool {
    name.ends_with(".fseq") || name.ends_with(".FSEQ")
}

pub trait Storage: Send + Sync {
    fn exists(&self, path: &str) -> bool;

    fn remove(&self, path: &str) -> Result<(), StorageError>;

    /// Create (or truncate) `path` for writing.
    fn create(&self, path: &str) -> Result<Box<dyn Write + Send>, StorageError>;

    /// Files directly under the root, sorted by name.
    fn list(&self) -> Result<Vec<FileEntry>, StorageError>;

    fn usage(&self) -> Result<StorageUsage, StorageError>;
}

// ── Directory-backed storage ────────────────────────────────────────

pub struct DirStorage {
    root: PathBuf,
}

impl DirStorage {
    /// Use `root`, creating it if needed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|source| StorageError::Io {
            op: "create",
            path: root.display().to_string(),
            source,
        })?;
        Ok(Self { root })
    }

    /// Map a device path onto the host filesystem.
    ///
    /// Only plain name components are allowed; `..`, `.` and empty paths
    /// are rejected.
    pub fn resolve(&self, path: &str) -> Result<PathBuf, StorageError> {
        let relative = path.trim_start_matches('/');
        if relative.is_empty() {
            return Err(StorageError::InvalidPath(path.to_string()));
        }
        let mut out = self.root.clone();
        for component in Path::new(relative).components() {
            match component {
                Component::Normal(part) => out.push(part),
                _ => return Err(StorageError::InvalidPath(path.to_string())),
            }
        }
        Ok(out)
    }

    fn scan(&self) -> Result<Vec<FileEntry>, StorageError> {
        let io_err = |source| StorageError::Io {
            op: "list",
            path: self.root.display().to_string(),
            source,
        };
        let mut entries = Vec::new();
        for entry in std::fs::read_dir(&self.root).map_err(io_err)?.flatten() {
            let Ok(meta) = entry.metadata() else {
                continue;
            };
            if !meta.is_file() {
                continue;
            }
            entries.push(FileEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                size: meta.len(),
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    /// Capacity of the volume holding the root, from the mounted disk
    /// with the longest matching mount point.
    fn volume_capacity(&self) -> Option<u64> {
        let root = std::fs::canonicalize(&self.root).ok()?;
        let disks = sysinfo::Disks::new_with_refreshed_list();
        disks
            .list()
            .iter()
            .filter(|d| root.starts_with(d.mount_point()))
            .max_by_key(|d| d.mount_point().as_os_str().len())
            .map(|d| d.total_space())
    }
}

impl Storage for DirStorage {
    fn exists(&self, path: &str) -> bool {
        self.resolve(path).map(|p| p.is_file()).unwrap_or(false)
    }

    fn remove(&self, path: &str) -> Result<(), StorageError> {
        let host = self.resolve(path)?;
        std::fs::remove_file(&host).map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                StorageError::NotFound(path.to_string())
            } else {
                StorageError::Io {
                    op: "remove",
                    path: path.to_string(),
                    source,
                }
            }
        })
    }

    fn create(&self, path: &str) -> Result<Box<dyn Write + Send>, StorageError> {
        let host = self.resolve(path)?;
        let file = std::fs::File::create(&host).map_err(|source| StorageError::Io {
            op: "create",
            path: path.to_string(),
            source,
        })?;
        Ok(Box::new(file))
    }

    fn list(&self) -> Result<Vec<FileEntry>, StorageError> {
        self.scan()
    }

    fn usage(&self) -> Result<StorageUsage, StorageError> {
        let used_bytes = self.scan()?.iter().map(|e| e.size).sum();
        let total_bytes = self.volume_capacity().unwrap_or(used_bytes);
        Ok(StorageUsage {
            used_bytes,
            total_bytes: total_bytes.max(used_bytes),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage() -> (tempfile::TempDir, DirStorage) {
        let dir = tempfile::tempdir().unwrap();
        let storage = DirStorage::open(dir.path()).unwrap();
        (dir, storage)
    }

    #[test]
    fn resolves_device_paths_under_root() {
        let (dir, storage) = storage();
        assert_eq!(storage.resolve("/show.fseq").unwrap(), dir.path().join("show.fseq"));
        assert_eq!(storage.resolve("show.fseq").unwrap(), dir.path().join("show.fseq"));
    }

    #[test]
    fn rejects_escaping_paths() {
        let (_dir, storage) = storage();
        for bad in ["/", "", "/../etc/passwd", "a/../../b", "./x"] {
            assert!(
                matches!(storage.resolve(bad), Err(StorageError::InvalidPath(_))),
                "{bad:?}"
            );
        }
    }

    #[test]
    fn create_list_remove() {
        let (_dir, storage) = storage();
        let mut w = storage.create("/b.fseq").unwrap();
        w.write_all(&[1, 2, 3]).unwrap();
        drop(w);
        storage.create("/a.txt").unwrap();

        assert!(storage.exists("/b.fseq"));
        let files = storage.list().unwrap();
        assert_eq!(
            files,
            vec![
                FileEntry { name: "a.txt".into(), size: 0 },
                FileEntry { name: "b.fseq".into(), size: 3 },
            ]
        );
        assert!(!files[0].is_sequence());
        assert!(files[1].is_sequence());

        storage.remove("/b.fseq").unwrap();
        assert!(!storage.exists("/b.fseq"));
        assert!(matches!(
            storage.remove("/b.fseq"),
            Err(StorageError::NotFound(_))
        ));
    }

    #[test]
    fn usage_counts_file_bytes() {
        let (_dir, storage) = storage();
        storage.create("/x.fseq").unwrap().write_all(&[0u8; 2048]).unwrap();
        let usage = storage.usage().unwrap();
        assert_eq!(usage.used_bytes, 2048);
        assert!(usage.total_bytes >= usage.used_bytes);
    }

    #[test]
    fn sequence_extension_matching() {
        assert!(is_sequence_name("show.fseq"));
        assert!(is_sequence_name("SHOW.FSEQ"));
        assert!(!is_sequence_name("show.Fseq"));
        assert!(!is_sequence_name("show.fseq.bak"));
    }
}
