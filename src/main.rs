// src/main.rs

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::Path;
use tracing::{error, info};
use yumsync::config::{MirrorConfig, Yumfile};
use yumsync::db::models::{SyncRecord, current_timestamp};
use yumsync::mirror::{self, LocalMirror, SyncOptions, SyncOutcome};

#[derive(Parser)]
#[command(name = "yumsync")]
#[command(author, version, about = "Incremental mirroring of RPM/YUM repository metadata", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the sync history database
    Init {
        /// Database path (default: /var/lib/yumsync/history.db)
        #[arg(short, long, default_value = "/var/lib/yumsync/history.db")]
        db_path: String,
    },
    /// Sync repository metadata for the mirrors defined in a Yumfile
    Sync {
        /// Path to the Yumfile
        #[arg(short = 'f', long, default_value = "Yumfile")]
        yumfile: String,
        /// Only sync these repository ids (all enabled mirrors if omitted)
        #[arg(short, long = "repo")]
        repos: Vec<String>,
        /// Number of database files fetched concurrently per repository
        #[arg(short, long, default_value_t = mirror::DEFAULT_JOBS)]
        jobs: usize,
        /// Delete files of database entries the remote no longer lists
        #[arg(long)]
        prune: bool,
        /// Record each attempt in this history database
        #[arg(short, long)]
        db_path: Option<String>,
    },
    /// Print the entries of a repomd.xml file
    Show {
        /// Path to a repomd.xml file
        path: String,
    },
    /// Show sync history
    History {
        /// Only show this repository id
        #[arg(short, long)]
        repo: Option<String>,
        /// Database path (default: /var/lib/yumsync/history.db)
        #[arg(short, long, default_value = "/var/lib/yumsync/history.db")]
        db_path: String,
    },
}

/// Resolve the mirrors a sync run should process
fn select_mirrors<'a>(yumfile: &'a Yumfile, ids: &[String]) -> Result<Vec<&'a MirrorConfig>> {
    if ids.is_empty() {
        return Ok(yumfile.enabled_repos().collect());
    }

    ids.iter()
        .map(|id| {
            yumfile
                .repo(id)
                .ok_or_else(|| anyhow::anyhow!("Repository '{}' is not defined in the Yumfile", id))
        })
        .collect()
}

/// Sync a single mirror and optionally reclaim orphaned files
fn sync_one(mirror: &MirrorConfig, options: &SyncOptions, prune: bool) -> yumsync::Result<SyncOutcome> {
    let transport = mirror::transport_for(&mirror.baseurl)?;
    let store = LocalMirror::new(&mirror.local_path);

    let outcome = mirror::sync_mirror(&store, transport.as_ref(), options)?;

    if prune && outcome.orphans().next().is_some() {
        let removed = store.remove_orphans(&outcome)?;
        info!("Pruned {} orphaned file(s) from {}", removed, mirror.id);
    }

    Ok(outcome)
}

fn main() -> Result<()> {
    // Initialize tracing subscriber for logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Init { db_path }) => {
            info!("Initializing history database at: {}", db_path);
            yumsync::db::init(&db_path)?;
            println!("Database initialized successfully at: {}", db_path);
            Ok(())
        }
        Some(Commands::Sync {
            yumfile,
            repos,
            jobs,
            prune,
            db_path,
        }) => {
            let yumfile = Yumfile::load(Path::new(&yumfile))?;
            let mirrors = select_mirrors(&yumfile, &repos)?;

            let conn = match db_path {
                Some(path) => {
                    yumsync::db::init(&path)?;
                    Some(yumsync::db::open(&path)?)
                }
                None => None,
            };

            let options = SyncOptions { jobs: jobs.max(1) };
            let mut failed = Vec::new();

            for mirror in mirrors {
                info!("Syncing repository: {}", mirror.id);
                let started_at = current_timestamp();

                let mut record = match sync_one(mirror, &options, prune) {
                    Ok(outcome) => {
                        println!(
                            "{}: revision {} ({} fetched, {} unchanged, {} dropped)",
                            mirror.id,
                            outcome.manifest.revision(),
                            outcome.fetched.len(),
                            outcome.carried.len(),
                            outcome.dropped.len()
                        );
                        SyncRecord::committed(&mirror.id, started_at, &outcome)
                    }
                    Err(e) => {
                        error!("Sync of {} failed: {}", mirror.id, e);
                        println!("{}: FAILED - {}", mirror.id, e);
                        failed.push(mirror.id.clone());
                        SyncRecord::aborted(&mirror.id, started_at, &e)
                    }
                };

                if let Some(conn) = &conn {
                    record.insert(conn)?;
                }
            }

            if !failed.is_empty() {
                return Err(anyhow::anyhow!(
                    "Sync failed for {} repository(ies): {}",
                    failed.len(),
                    failed.join(", ")
                ));
            }

            Ok(())
        }
        Some(Commands::Show { path }) => {
            let bytes = std::fs::read(&path)?;
            let manifest = yumsync::repomd::decode(&bytes)?;

            println!("Revision: {}", manifest.revision());
            for db in manifest.databases() {
                let checksum = db
                    .checksum
                    .as_ref()
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!("  {:<20} {:>12}  {}  {}", db.data_type, db.size, checksum, db.location);
            }
            println!("\nTotal: {} database(s)", manifest.databases().len());

            Ok(())
        }
        Some(Commands::History { repo, db_path }) => {
            let conn = yumsync::db::open(&db_path)?;

            let records = match repo {
                Some(repo) => SyncRecord::list_by_repo(&conn, &repo)?,
                None => SyncRecord::list_all(&conn)?,
            };

            if records.is_empty() {
                println!("No sync history.");
            } else {
                println!("Sync history:");
                for record in &records {
                    let revision = record
                        .revision
                        .map(|r| r.to_string())
                        .unwrap_or_else(|| "-".to_string());
                    print!(
                        "  [{}] {} {} revision {} ({})",
                        record.id.unwrap_or_default(),
                        record.finished_at,
                        record.repo_id,
                        revision,
                        record.status.as_str()
                    );
                    match &record.error {
                        Some(error) => println!(" - {}", error),
                        None => println!(
                            " - {} fetched, {} unchanged, {} dropped",
                            record.fetched, record.carried, record.dropped
                        ),
                    }
                }
                println!("\nTotal: {} attempt(s)", records.len());
            }

            Ok(())
        }
        None => {
            // No command provided, show help
            println!("yumsync v{}", env!("CARGO_PKG_VERSION"));
            println!("Run 'yumsync --help' for usage information");
            Ok(())
        }
    }
}
