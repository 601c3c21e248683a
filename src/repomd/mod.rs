// src/repomd/mod.rs

//! Repository metadata (repomd.xml) model
//!
//! A `RepoMetadata` describes one snapshot of a YUM repository: a revision
//! counter and the list of database files (primary, filelists, other, ...)
//! that clients download. Values are validated on construction and never
//! mutated afterwards; a sync produces a new value instead.

pub mod checksum;
mod codec;

pub use checksum::{Checksum, ChecksumType};
pub use codec::{NS_REPO, NS_RPM, decode};

use crate::error::{Error, Result};
use std::collections::HashSet;

/// Metadata manifest for one RPM/YUM repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoMetadata {
    revision: u64,
    databases: Vec<RepoDatabase>,
}

/// One downloadable database file listed in a manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoDatabase {
    /// Database type, unique within a manifest (e.g. "primary")
    pub data_type: String,

    /// Path of the file relative to the repository root
    pub location: String,

    /// Producer-side creation time (hint only)
    pub timestamp: i64,

    /// Size of the file as fetched
    pub size: u64,

    /// Digest of the file as fetched
    pub checksum: Option<Checksum>,

    /// Size of the decompressed file
    pub open_size: u64,

    /// Digest of the decompressed file
    pub open_checksum: Option<Checksum>,

    /// Schema version of the file's contents. Never interpreted here.
    pub database_version: u32,
}

impl RepoMetadata {
    /// Build a manifest, checking the per-entry invariants
    ///
    /// Fails with `MalformedManifest` if two entries share a type, or if an
    /// entry has a non-zero size without the matching checksum.
    pub fn new(revision: u64, databases: Vec<RepoDatabase>) -> Result<Self> {
        let mut seen = HashSet::new();
        for db in &databases {
            if !seen.insert(db.data_type.as_str()) {
                return Err(Error::MalformedManifest(format!(
                    "duplicate data type '{}'",
                    db.data_type
                )));
            }
            db.validate()?;
        }

        Ok(Self {
            revision,
            databases,
        })
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Database entries in document order
    pub fn databases(&self) -> &[RepoDatabase] {
        &self.databases
    }

    /// Look up an entry by its type
    pub fn database(&self, data_type: &str) -> Option<&RepoDatabase> {
        self.databases.iter().find(|db| db.data_type == data_type)
    }

    /// Serialize to the canonical repomd.xml layout
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        codec::write_document(self, &mut out)?;
        Ok(out)
    }

    /// Serialize to the canonical repomd.xml layout, writing to `writer`
    pub fn write_to<W: std::io::Write>(&self, writer: W) -> Result<()> {
        codec::write_document(self, writer)
    }
}

impl RepoDatabase {
    /// Create an entry with only the identifying fields set
    pub fn new(data_type: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            data_type: data_type.into(),
            location: location.into(),
            timestamp: 0,
            size: 0,
            checksum: None,
            open_size: 0,
            open_checksum: None,
            database_version: 0,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.data_type.is_empty() {
            return Err(Error::MalformedManifest(
                "data entry with empty type".to_string(),
            ));
        }
        if self.location.is_empty() {
            return Err(Error::MalformedManifest(format!(
                "data entry '{}' has an empty location",
                self.data_type
            )));
        }
        if self.size > 0 && self.checksum.is_none() {
            return Err(Error::MalformedManifest(format!(
                "data entry '{}' has size {} but no checksum",
                self.data_type, self.size
            )));
        }
        if self.open_size > 0 && self.open_checksum.is_none() {
            return Err(Error::MalformedManifest(format!(
                "data entry '{}' has open-size {} but no open-checksum",
                self.data_type, self.open_size
            )));
        }
        Ok(())
    }
}

impl std::fmt::Display for RepoDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.data_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(data_type: &str, digest: &str) -> RepoDatabase {
        let mut db = RepoDatabase::new(data_type, format!("repodata/{}-{}.xml.gz", digest, data_type));
        db.size = 10;
        db.checksum = Some(Checksum::new(ChecksumType::Sha256, digest));
        db
    }

    #[test]
    fn test_new_rejects_duplicate_types() {
        let result = RepoMetadata::new(1, vec![entry("primary", "aa"), entry("primary", "bb")]);
        assert!(matches!(result, Err(Error::MalformedManifest(_))));
    }

    #[test]
    fn test_new_requires_checksum_for_sized_entry() {
        let mut db = entry("primary", "aa");
        db.checksum = None;
        assert!(RepoMetadata::new(1, vec![db]).is_err());

        let mut db = entry("primary", "aa");
        db.open_size = 40;
        assert!(RepoMetadata::new(1, vec![db]).is_err());
    }

    #[test]
    fn test_empty_entry_without_checksum_is_valid() {
        let db = RepoDatabase::new("group", "repodata/comps.xml");
        let md = RepoMetadata::new(3, vec![db]).unwrap();
        assert_eq!(md.revision(), 3);
        assert!(md.database("group").is_some());
        assert!(md.database("primary").is_none());
    }

    #[test]
    fn test_databases_keep_insertion_order() {
        let md = RepoMetadata::new(
            1,
            vec![entry("other", "cc"), entry("primary", "aa"), entry("filelists", "bb")],
        )
        .unwrap();
        let types: Vec<_> = md.databases().iter().map(|d| d.data_type.as_str()).collect();
        assert_eq!(types, vec!["other", "primary", "filelists"]);
    }
}
