// src/mirror/mod.rs

//! Incremental mirroring of repository metadata
//!
//! This module provides functionality for:
//! - Diffing a remote manifest against the last local one
//! - Fetching changed database files through a `Transport`
//! - Verifying checksums of everything fetched
//! - Handing a fully verified result to a `ManifestStore` for commit
//!
//! A sync attempt is all-or-nothing. The engine keeps verified bytes in
//! memory and writes nothing; the caller commits the outcome only after
//! every needed entry was fetched and verified.

pub mod decompress;
pub mod store;
pub mod transport;

pub use store::{LocalMirror, ManifestStore, REPOMD_LOCATION};
pub use transport::{FetchedFile, HttpTransport, LocalTransport, Transport, transport_for};

use crate::error::{ChecksumKind, Error, Result};
use decompress::decompress;
use crate::repomd::{self, Checksum, RepoDatabase, RepoMetadata};
use rayon::ThreadPoolBuilder;
use rayon::prelude::*;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

/// Default number of concurrent fetches per sync attempt
pub const DEFAULT_JOBS: usize = 4;

/// Options for a sync attempt
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Maximum number of entries fetched or verified at the same time.
    /// `1` runs everything sequentially in manifest order.
    pub jobs: usize,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self { jobs: DEFAULT_JOBS }
    }
}

/// Lifecycle of one sync attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Diffing,
    Fetching,
    Verifying,
    Committed,
    Aborted,
}

impl SyncState {
    pub fn as_str(&self) -> &str {
        match self {
            SyncState::Idle => "idle",
            SyncState::Diffing => "diffing",
            SyncState::Fetching => "fetching",
            SyncState::Verifying => "verifying",
            SyncState::Committed => "committed",
            SyncState::Aborted => "aborted",
        }
    }

    /// Whether `next` is a legal successor of this state
    pub fn can_transition_to(&self, next: SyncState) -> bool {
        use SyncState::*;
        matches!(
            (self, next),
            (Idle, Diffing)
                | (Diffing, Fetching)
                | (Fetching, Verifying)
                | (Verifying, Committed)
                | (Diffing | Fetching | Verifying, Aborted)
        )
    }
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a sync attempt has to do, per database type
#[derive(Debug, Default)]
pub struct SyncPlan<'a> {
    /// Remote entries that must be fetched
    pub fetch: Vec<&'a RepoDatabase>,

    /// Remote entries whose local copy is still current
    pub carried: Vec<&'a RepoDatabase>,

    /// Local entries the remote no longer lists
    pub dropped: Vec<&'a RepoDatabase>,

    /// Local entries replaced by a fetched entry at a different location
    pub superseded: Vec<&'a RepoDatabase>,
}

/// Decide which remote entries need fetching
///
/// The compressed-file checksum is the only signal used to skip a fetch.
/// An entry is also re-fetched when its location moved, since the local
/// file would otherwise not exist at the path the new manifest names.
pub fn plan<'a>(remote: &'a RepoMetadata, local: Option<&'a RepoMetadata>) -> SyncPlan<'a> {
    let mut plan = SyncPlan::default();

    let Some(local) = local else {
        plan.fetch = remote.databases().iter().collect();
        return plan;
    };

    for entry in remote.databases() {
        let current = local.database(&entry.data_type).filter(|old| {
            old.location == entry.location
                && matches!(
                    (&old.checksum, &entry.checksum),
                    (Some(a), Some(b)) if a.matches(b)
                )
        });

        if current.is_some() {
            debug!("'{}' unchanged, carrying over", entry.data_type);
            plan.carried.push(entry);
            continue;
        }

        debug!("'{}' changed or new, fetching {}", entry.data_type, entry.location);
        plan.fetch.push(entry);

        if let Some(old) = local.database(&entry.data_type)
            && old.location != entry.location
        {
            plan.superseded.push(old);
        }
    }

    plan.dropped = local
        .databases()
        .iter()
        .filter(|old| remote.database(&old.data_type).is_none())
        .collect();

    plan
}

/// A fetched database file whose checksums were verified
#[derive(Debug, Clone)]
pub struct VerifiedFile {
    pub entry: RepoDatabase,
    pub bytes: Vec<u8>,
}

/// Result of a committed sync attempt
#[derive(Debug, Clone)]
pub struct SyncOutcome {
    /// The new local manifest: the remote one, revision included
    pub manifest: RepoMetadata,

    /// Verified bytes of every fetched entry, in manifest order
    pub fetched: Vec<VerifiedFile>,

    /// Types whose local files were kept as they are
    pub carried: Vec<String>,

    /// Local entries no longer listed remotely. Their files are orphans
    /// for the caller to reclaim.
    pub dropped: Vec<RepoDatabase>,

    /// Previous local entries of fetched types that moved to a new
    /// location. Their old files are orphans too.
    pub superseded: Vec<RepoDatabase>,
}

impl SyncOutcome {
    /// Whether the attempt fetched nothing
    pub fn is_noop(&self) -> bool {
        self.fetched.is_empty() && self.dropped.is_empty()
    }

    /// Entries whose files the new manifest no longer needs
    pub fn orphans(&self) -> impl Iterator<Item = &RepoDatabase> {
        self.dropped.iter().chain(&self.superseded)
    }
}

/// Tracks the state of a single attempt for logging
struct SyncAttempt {
    origin: String,
    state: SyncState,
}

impl SyncAttempt {
    fn new(origin: String) -> Self {
        Self {
            origin,
            state: SyncState::Idle,
        }
    }

    fn advance(&mut self, next: SyncState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal sync transition {} -> {}",
            self.state,
            next
        );
        debug!("Sync of {}: {} -> {}", self.origin, self.state, next);
        self.state = next;
    }
}

/// Run one sync attempt for a repository
///
/// Compares `remote` with `local` (absent on first sync), fetches every
/// entry that changed and verifies it. On success the returned outcome
/// carries the new manifest and the verified bytes; on any failure nothing
/// is returned and the caller's local state is untouched.
pub fn sync(
    remote: &RepoMetadata,
    local: Option<&RepoMetadata>,
    transport: &dyn Transport,
    options: &SyncOptions,
) -> Result<SyncOutcome> {
    let mut attempt = SyncAttempt::new(transport.describe());

    match run_attempt(&mut attempt, remote, local, transport, options) {
        Ok(outcome) => Ok(outcome),
        Err(e) => {
            attempt.advance(SyncState::Aborted);
            warn!("Sync of {} aborted: {}", attempt.origin, e);
            Err(e)
        }
    }
}

fn run_attempt(
    attempt: &mut SyncAttempt,
    remote: &RepoMetadata,
    local: Option<&RepoMetadata>,
    transport: &dyn Transport,
    options: &SyncOptions,
) -> Result<SyncOutcome> {
    attempt.advance(SyncState::Diffing);

    if let Some(local) = local
        && remote.revision() < local.revision()
    {
        warn!(
            "Remote revision {} of {} is older than local revision {}",
            remote.revision(),
            attempt.origin,
            local.revision()
        );
    }

    let plan = plan(remote, local);
    info!(
        "{} entries to fetch, {} unchanged, {} dropped",
        plan.fetch.len(),
        plan.carried.len(),
        plan.dropped.len()
    );

    attempt.advance(SyncState::Fetching);
    let fetched = run_cancellable(&plan.fetch, options.jobs, |entry| {
        let file = transport.fetch(&entry.location)?;
        debug!("Fetched '{}' ({} bytes)", entry.data_type, file.bytes.len());
        Ok(((*entry).clone(), file))
    })?;

    attempt.advance(SyncState::Verifying);
    run_cancellable(&fetched, options.jobs, |(entry, file)| verify(entry, file))?;

    attempt.advance(SyncState::Committed);
    info!(
        "Sync of {} ready to commit at revision {}",
        attempt.origin,
        remote.revision()
    );

    Ok(SyncOutcome {
        manifest: remote.clone(),
        fetched: fetched
            .into_iter()
            .map(|(entry, file)| VerifiedFile {
                entry,
                bytes: file.bytes,
            })
            .collect(),
        carried: plan.carried.iter().map(|e| e.data_type.clone()).collect(),
        dropped: plan.dropped.into_iter().cloned().collect(),
        superseded: plan.superseded.into_iter().cloned().collect(),
    })
}

/// Apply `op` to every item, stopping at the first failure
///
/// With more than one job the items run on a dedicated pool. A failure
/// raises a shared flag; items that have not started yet are skipped, and
/// the first error observed is returned.
fn run_cancellable<I, O, F>(items: &[I], jobs: usize, op: F) -> Result<Vec<O>>
where
    I: Sync,
    O: Send,
    F: Fn(&I) -> Result<O> + Sync,
{
    if jobs <= 1 || items.len() <= 1 {
        return items.iter().map(&op).collect();
    }

    let pool = ThreadPoolBuilder::new()
        .num_threads(jobs.min(items.len()))
        .build()
        .map_err(|e| Error::InitError(format!("Failed to create fetch pool: {}", e)))?;

    let cancelled = AtomicBool::new(false);
    let failure: Mutex<Option<Error>> = Mutex::new(None);

    let results: Vec<Option<O>> = pool.install(|| {
        items
            .par_iter()
            .map(|item| {
                if cancelled.load(Ordering::Acquire) {
                    return None;
                }
                match op(item) {
                    Ok(out) => Some(out),
                    Err(e) => {
                        cancelled.store(true, Ordering::Release);
                        let mut slot = failure.lock().unwrap_or_else(|p| p.into_inner());
                        slot.get_or_insert(e);
                        None
                    }
                }
            })
            .collect()
    });

    if let Some(e) = failure.into_inner().unwrap_or_else(|p| p.into_inner()) {
        return Err(e);
    }
    Ok(results.into_iter().flatten().collect())
}

/// Check a fetched file against the digests its manifest entry declares
pub fn verify(entry: &RepoDatabase, file: &FetchedFile) -> Result<()> {
    match &entry.checksum {
        Some(expected) => {
            check_digest(entry, ChecksumKind::Checksum, expected, &file.bytes)?;

            if let Some(observed) = &file.observed
                && observed.algorithm == expected.algorithm
                && !observed.matches(expected)
            {
                return Err(Error::ChecksumMismatch {
                    data_type: entry.data_type.clone(),
                    kind: ChecksumKind::Checksum,
                    expected: expected.digest.clone(),
                    actual: observed.digest.clone(),
                });
            }
        }
        None => debug!("'{}' declares no checksum, stored unverified", entry.data_type),
    }

    if let Some(expected) = &entry.open_checksum {
        match decompress(&entry.location, &file.bytes) {
            Ok(Some(open)) => check_digest(entry, ChecksumKind::OpenChecksum, expected, &open)?,
            Ok(None) => debug!(
                "No decoder for {}, open-checksum of '{}' not checked",
                entry.location, entry.data_type
            ),
            Err(e) => {
                return Err(Error::ChecksumMismatch {
                    data_type: entry.data_type.clone(),
                    kind: ChecksumKind::OpenChecksum,
                    expected: expected.digest.clone(),
                    actual: format!("undecodable ({})", e),
                });
            }
        }
    }

    Ok(())
}

fn check_digest(
    entry: &RepoDatabase,
    kind: ChecksumKind,
    expected: &Checksum,
    data: &[u8],
) -> Result<()> {
    let actual = expected
        .algorithm
        .digest(data)
        .ok_or_else(|| Error::UnsupportedChecksum {
            data_type: entry.data_type.clone(),
            algorithm: expected.algorithm.to_string(),
        })?;

    if !actual.eq_ignore_ascii_case(&expected.digest) {
        return Err(Error::ChecksumMismatch {
            data_type: entry.data_type.clone(),
            kind,
            expected: expected.digest.clone(),
            actual,
        });
    }

    debug!("{} of '{}' verified", kind, entry.data_type);
    Ok(())
}

/// Sync one mirror end to end
///
/// Fetches and decodes the remote `repodata/repomd.xml`, diffs it against
/// the store's manifest, and commits the verified result. The store is
/// only written when something changed.
pub fn sync_mirror(
    store: &dyn ManifestStore,
    transport: &dyn Transport,
    options: &SyncOptions,
) -> Result<SyncOutcome> {
    info!("Synchronizing {}", transport.describe());

    let remote = repomd::decode(&transport.fetch(REPOMD_LOCATION)?.bytes)?;
    let local = store.load()?;

    let outcome = sync(&remote, local.as_ref(), transport, options)?;

    if outcome.is_noop() && local.as_ref() == Some(&outcome.manifest) {
        info!("{} is up to date", transport.describe());
    } else {
        store.commit(&outcome)?;
        info!(
            "Committed revision {} ({} fetched)",
            outcome.manifest.revision(),
            outcome.fetched.len()
        );
    }

    Ok(outcome)
}

/// Resolve a manifest location to a path relative to a mirror root
///
/// Returns `None` for absolute paths and anything climbing out with `..`.
pub(crate) fn relative_path(location: &str) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in Path::new(location).components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            _ => return None,
        }
    }
    if out.as_os_str().is_empty() {
        None
    } else {
        Some(out)
    }
}
