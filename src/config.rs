// src/config.rs

//! Yumfile: the list of repositories to mirror
//!
//! ```json
//! {
//!   "pathPrefix": "/srv/mirror",
//!   "repos": [
//!     { "id": "fedora-39", "baseurl": "https://dl.example.org/fedora/39/x86_64", "localPath": "fedora/39" }
//!   ]
//! }
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::debug;

/// One repository mirror definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MirrorConfig {
    /// Repository identifier, unique within a Yumfile
    pub id: String,

    /// Human-readable name
    #[serde(default)]
    pub name: Option<String>,

    /// Remote repository root (http(s)://, file:// or a local path)
    pub baseurl: String,

    /// Local mirror root; prefixed with `pathPrefix` on load
    pub local_path: String,

    /// Disabled mirrors are skipped by a full sync
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// A parsed and validated Yumfile
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Yumfile {
    /// Mirror definitions in file order
    pub repos: Vec<MirrorConfig>,

    /// Directory prepended to every `localPath`
    #[serde(default)]
    pub path_prefix: Option<String>,

    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl Yumfile {
    /// Load a Yumfile from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        debug!("Loading Yumfile: {}", path.display());

        let file = File::open(path).map_err(|e| {
            Error::ConfigError(format!("Failed to open {}: {}", path.display(), e))
        })?;
        let yumfile: Yumfile = serde_json::from_reader(BufReader::new(file)).map_err(|e| {
            Error::ConfigError(format!("Failed to parse {}: {}", path.display(), e))
        })?;

        yumfile.validated()
    }

    /// Parse a Yumfile from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        let yumfile: Yumfile = serde_json::from_str(json)
            .map_err(|e| Error::ConfigError(format!("Failed to parse Yumfile: {}", e)))?;
        yumfile.validated()
    }

    /// Check every mirror, apply the path prefix and build the id index
    fn validated(mut self) -> Result<Self> {
        let prefix = self
            .path_prefix
            .as_deref()
            .filter(|p| !p.is_empty())
            .map(|p| p.trim_end_matches('/').to_string());

        let mut index = HashMap::with_capacity(self.repos.len());
        for (i, mirror) in self.repos.iter_mut().enumerate() {
            for (field, value) in [
                ("id", &mirror.id),
                ("baseurl", &mirror.baseurl),
                ("localPath", &mirror.local_path),
            ] {
                if value.trim().is_empty() {
                    return Err(Error::ConfigError(format!(
                        "Repository #{} has an empty {}",
                        i + 1,
                        field
                    )));
                }
            }

            if index.insert(mirror.id.clone(), i).is_some() {
                return Err(Error::ConfigError(format!(
                    "Repository '{}' is defined more than once",
                    mirror.id
                )));
            }

            if let Some(prefix) = &prefix {
                mirror.local_path = format!("{}/{}", prefix, mirror.local_path);
            }
        }

        self.index = index;
        Ok(self)
    }

    /// Find a mirror by repository id
    pub fn repo(&self, id: &str) -> Option<&MirrorConfig> {
        self.index.get(id).map(|&i| &self.repos[i])
    }

    /// Mirrors a full sync should process, in file order
    pub fn enabled_repos(&self) -> impl Iterator<Item = &MirrorConfig> {
        self.repos.iter().filter(|m| m.enabled)
    }
}
