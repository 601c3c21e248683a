// src/lib.rs

//! Yumsync
//!
//! Incremental mirroring of RPM/YUM repository metadata. A sync attempt
//! reads a repository's `repodata/repomd.xml`, works out which database
//! files changed since the last local sync, fetches and verifies them, and
//! only then replaces the local manifest.
//!
//! # Architecture
//!
//! - `repomd`: manifest model and the canonical XML codec
//! - `mirror`: diff/fetch/verify engine, transports and the on-disk store
//! - `config`: Yumfile loading and mirror lookup
//! - `db`: SQLite journal of sync attempts

pub mod config;
pub mod db;
mod error;
pub mod mirror;
pub mod repomd;

pub use error::{ChecksumKind, Error, Result};
