// src/mirror/store.rs

//! Local mirror storage
//!
//! A commit first writes every new file, manifest included, to a temporary
//! file in its destination directory. Nothing is renamed into place until
//! all of them are written, so a failure while staging leaves the previous
//! mirror exactly as it was. The manifest is renamed last: until then the
//! previous manifest still describes the files it names.

use super::{SyncOutcome, relative_path};
use crate::error::{Error, Result};
use crate::repomd::{self, RepoMetadata};
use std::collections::HashSet;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// Location of the manifest relative to a repository root
pub const REPOMD_LOCATION: &str = "repodata/repomd.xml";

/// Persistent home of a mirror's manifest and database files
pub trait ManifestStore {
    /// Load the current manifest, or `None` if the mirror was never synced
    fn load(&self) -> Result<Option<RepoMetadata>>;

    /// Write every fetched file of `outcome`, then replace the manifest
    ///
    /// On error the store still holds the previous manifest and the files
    /// it describes.
    fn commit(&self, outcome: &SyncOutcome) -> Result<()>;
}

/// A file written next to its destination but not yet renamed into place
struct StagedFile {
    temp: NamedTempFile,
    path: PathBuf,
}

impl StagedFile {
    fn promote(self) -> Result<()> {
        let path = self.path;
        self.temp.persist(&path).map_err(|e| Error::PersistFailure {
            path: path.display().to_string(),
            reason: format!("failed to rename into place: {}", e.error),
        })?;
        debug!("Promoted {}", path.display());
        Ok(())
    }
}

/// A mirror rooted at a directory on the local file system
#[derive(Debug, Clone)]
pub struct LocalMirror {
    root: PathBuf,
}

impl LocalMirror {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the local repomd.xml
    pub fn manifest_path(&self) -> PathBuf {
        self.root.join(REPOMD_LOCATION)
    }

    /// Resolve a manifest location inside this mirror
    pub fn path_for(&self, location: &str) -> Result<PathBuf> {
        relative_path(location)
            .map(|relative| self.root.join(relative))
            .ok_or_else(|| Error::PersistFailure {
                path: location.to_string(),
                reason: "location escapes the mirror root".to_string(),
            })
    }

    /// Atomically replace the manifest on its own
    pub fn persist(&self, manifest: &RepoMetadata) -> Result<()> {
        self.stage(self.manifest_path(), &manifest.encode()?)?
            .promote()
    }

    /// Delete the files a sync made obsolete
    ///
    /// Covers entries the remote dropped and the old locations of entries
    /// that moved. Files still referenced by the new manifest are kept.
    /// Returns the number of files removed.
    pub fn remove_orphans(&self, outcome: &SyncOutcome) -> Result<usize> {
        let referenced: HashSet<&str> = outcome
            .manifest
            .databases()
            .iter()
            .map(|db| db.location.as_str())
            .collect();

        let mut visited = HashSet::new();
        let mut removed = 0;
        for entry in outcome.orphans() {
            if referenced.contains(entry.location.as_str()) || !visited.insert(&entry.location) {
                continue;
            }

            let path = self.path_for(&entry.location)?;
            match fs::remove_file(&path) {
                Ok(()) => {
                    info!("Removed orphaned '{}' at {}", entry.data_type, path.display());
                    removed += 1;
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    debug!("Orphan {} already gone", path.display());
                }
                Err(e) => {
                    warn!("Failed to remove orphan {}: {}", path.display(), e);
                    return Err(Error::Io(e));
                }
            }
        }
        Ok(removed)
    }

    /// Write `bytes` to a temporary file in the directory of `path`
    fn stage(&self, path: PathBuf, bytes: &[u8]) -> Result<StagedFile> {
        let failure = |reason: String| Error::PersistFailure {
            path: path.display().to_string(),
            reason,
        };

        let parent = path
            .parent()
            .ok_or_else(|| failure("no parent directory".to_string()))?;
        fs::create_dir_all(parent)
            .map_err(|e| failure(format!("failed to create {}: {}", parent.display(), e)))?;

        let mut temp = NamedTempFile::new_in(parent)
            .map_err(|e| failure(format!("failed to create temporary file: {}", e)))?;
        temp.write_all(bytes)
            .map_err(|e| failure(format!("failed to write: {}", e)))?;
        temp.as_file()
            .sync_all()
            .map_err(|e| failure(format!("failed to sync: {}", e)))?;

        debug!("Staged {} bytes for {}", bytes.len(), path.display());
        Ok(StagedFile { temp, path })
    }
}

impl ManifestStore for LocalMirror {
    fn load(&self) -> Result<Option<RepoMetadata>> {
        let path = self.manifest_path();
        match fs::read(&path) {
            Ok(bytes) => repomd::decode(&bytes).map(Some),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No local manifest at {}", path.display());
                Ok(None)
            }
            Err(e) => Err(Error::Io(e)),
        }
    }

    fn commit(&self, outcome: &SyncOutcome) -> Result<()> {
        // Dropping a StagedFile deletes its temporary file, so an early
        // return here leaves no trace in the mirror.
        let mut staged = Vec::with_capacity(outcome.fetched.len());
        for file in &outcome.fetched {
            let path = self.path_for(&file.entry.location)?;
            staged.push(self.stage(path, &file.bytes)?);
        }
        let manifest = self.stage(self.manifest_path(), &outcome.manifest.encode()?)?;

        for file in staged {
            file.promote()?;
        }
        manifest.promote()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mirror::VerifiedFile;
    use crate::repomd::{Checksum, ChecksumType, RepoDatabase};
    use tempfile::tempdir;

    fn entry(data_type: &str, content: &[u8]) -> RepoDatabase {
        entry_at(data_type, &format!("repodata/{}.xml", data_type), content)
    }

    fn entry_at(data_type: &str, location: &str, content: &[u8]) -> RepoDatabase {
        let mut db = RepoDatabase::new(data_type, location);
        db.size = content.len() as u64;
        db.checksum = Checksum::compute(ChecksumType::Sha256, content);
        db
    }

    fn outcome(revision: u64, files: &[(RepoDatabase, &[u8])]) -> SyncOutcome {
        SyncOutcome {
            manifest: RepoMetadata::new(revision, files.iter().map(|(e, _)| e.clone()).collect())
                .unwrap(),
            fetched: files
                .iter()
                .map(|(entry, bytes)| VerifiedFile {
                    entry: entry.clone(),
                    bytes: bytes.to_vec(),
                })
                .collect(),
            carried: Vec::new(),
            dropped: Vec::new(),
            superseded: Vec::new(),
        }
    }

    fn leftover_temp_files(dir: &Path) -> usize {
        fs::read_dir(dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(".tmp"))
            .count()
    }

    #[test]
    fn test_load_missing_manifest() {
        let dir = tempdir().unwrap();
        let mirror = LocalMirror::new(dir.path());
        assert!(mirror.load().unwrap().is_none());
    }

    #[test]
    fn test_persist_then_load() {
        let dir = tempdir().unwrap();
        let mirror = LocalMirror::new(dir.path().join("base"));
        let manifest = RepoMetadata::new(4, vec![entry("primary", b"p")]).unwrap();

        mirror.persist(&manifest).unwrap();
        assert!(mirror.manifest_path().exists());
        assert_eq!(mirror.load().unwrap(), Some(manifest));
    }

    #[test]
    fn test_load_corrupt_manifest() {
        let dir = tempdir().unwrap();
        let mirror = LocalMirror::new(dir.path());
        fs::create_dir_all(dir.path().join("repodata")).unwrap();
        fs::write(mirror.manifest_path(), b"<repomd><revision>").unwrap();

        assert!(matches!(mirror.load(), Err(Error::MalformedManifest(_))));
    }

    #[test]
    fn test_commit_writes_files_and_manifest() {
        let dir = tempdir().unwrap();
        let mirror = LocalMirror::new(dir.path());
        let outcome = outcome(1, &[(entry("primary", b"p"), b"p")]);

        mirror.commit(&outcome).unwrap();
        assert_eq!(fs::read(dir.path().join("repodata/primary.xml")).unwrap(), b"p");
        assert_eq!(mirror.load().unwrap(), Some(outcome.manifest));
        assert_eq!(leftover_temp_files(&dir.path().join("repodata")), 0);
    }

    #[test]
    fn test_failed_commit_keeps_previous_files() {
        let dir = tempdir().unwrap();
        let mirror = LocalMirror::new(dir.path());
        let first = outcome(1, &[(entry("primary", b"A"), b"A")]);
        mirror.commit(&first).unwrap();

        // A plain file where the second entry needs a directory
        fs::write(dir.path().join("blocker"), b"").unwrap();
        let second = outcome(
            2,
            &[
                (entry("primary", b"B"), b"B"),
                (entry_at("other", "blocker/other.xml", b"o"), b"o"),
            ],
        );

        let result = mirror.commit(&second);
        assert!(matches!(result, Err(Error::PersistFailure { .. })));

        assert_eq!(fs::read(dir.path().join("repodata/primary.xml")).unwrap(), b"A");
        assert_eq!(mirror.load().unwrap(), Some(first.manifest));
        assert_eq!(leftover_temp_files(&dir.path().join("repodata")), 0);
    }

    #[test]
    fn test_commit_rejects_escaping_location() {
        let dir = tempdir().unwrap();
        let mirror = LocalMirror::new(dir.path().join("mirror"));
        let outcome = outcome(1, &[(entry_at("primary", "../../evil", b"x"), b"x")]);

        let result = mirror.commit(&outcome);
        assert!(matches!(result, Err(Error::PersistFailure { .. })));
        assert!(mirror.load().unwrap().is_none());
    }

    #[test]
    fn test_remove_orphans() {
        let dir = tempdir().unwrap();
        let mirror = LocalMirror::new(dir.path());
        let shared_old = entry_at("prestodelta", "repodata/shared.xml", b"s");
        let first = outcome(
            1,
            &[
                (entry("updateinfo", b"u"), b"u"),
                (shared_old.clone(), b"s"),
                (entry_at("primary", "repodata/a-primary.xml", b"A"), b"A"),
            ],
        );
        mirror.commit(&first).unwrap();

        let mut second = outcome(
            2,
            &[
                (entry_at("deltainfo", "repodata/shared.xml", b"s"), b"s"),
                (entry_at("primary", "repodata/b-primary.xml", b"B"), b"B"),
            ],
        );
        second.dropped = vec![entry("updateinfo", b"u"), shared_old, entry("other", b"o")];
        second.superseded = vec![entry_at("primary", "repodata/a-primary.xml", b"A")];
        mirror.commit(&second).unwrap();

        let removed = mirror.remove_orphans(&second).unwrap();

        assert_eq!(removed, 2);
        assert!(!dir.path().join("repodata/updateinfo.xml").exists());
        assert!(!dir.path().join("repodata/a-primary.xml").exists());
        assert!(dir.path().join("repodata/shared.xml").exists());
        assert!(dir.path().join("repodata/b-primary.xml").exists());
    }
}
