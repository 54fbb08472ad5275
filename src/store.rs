// =============================================================================
// Level Store — date-keyed persistence of computed level maps
// =============================================================================
//
// A larger-horizon companion to the in-memory history cache: computed
// ladders are saved per trading day and reused verbatim on later runs,
// skipping recomputation entirely. Reuse is only sound while the
// level-affecting configuration is unchanged, so the file header carries a
// fingerprint of that configuration; a mismatch discards the stored days on
// load.
//
// Persistence failures are never fatal. A missing, malformed, or stale file
// loads as an empty store with a warning, and the engine falls through to a
// fresh computation.
// =============================================================================

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::types::LevelName;

/// On-disk shape of the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoreFile {
    fingerprint: String,
    days: BTreeMap<NaiveDate, BTreeMap<LevelName, f64>>,
}

/// Date-keyed store of computed level maps.
#[derive(Debug, Clone)]
pub struct LevelStore {
    fingerprint: String,
    days: BTreeMap<NaiveDate, BTreeMap<LevelName, f64>>,
    dirty: bool,
}

impl LevelStore {
    /// Fresh, empty store bound to the given config fingerprint.
    pub fn new(fingerprint: impl Into<String>) -> Self {
        Self {
            fingerprint: fingerprint.into(),
            days: BTreeMap::new(),
            dirty: false,
        }
    }

    /// Load the store from `path`, keeping only entries saved under the
    /// same `fingerprint`.
    ///
    /// Any failure — missing file, unreadable file, parse error, stale
    /// fingerprint — logs and yields an empty store; it never propagates.
    pub fn load(path: impl AsRef<Path>, fingerprint: impl Into<String>) -> Self {
        let path = path.as_ref();
        let fingerprint = fingerprint.into();

        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "no persisted levels yet");
                return Self::new(fingerprint);
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read persisted levels");
                return Self::new(fingerprint);
            }
        };

        let file: StoreFile = match serde_json::from_str(&content) {
            Ok(file) => file,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "malformed persisted levels; starting empty");
                return Self::new(fingerprint);
            }
        };

        if file.fingerprint != fingerprint {
            warn!(
                path = %path.display(),
                "persisted levels were computed under a different configuration; discarding"
            );
            return Self::new(fingerprint);
        }

        info!(path = %path.display(), days = file.days.len(), "persisted levels loaded");
        Self {
            fingerprint,
            days: file.days,
            dirty: false,
        }
    }

    /// Saved ladder for `day`, if one exists.
    pub fn lookup(&self, day: NaiveDate) -> Option<&BTreeMap<LevelName, f64>> {
        self.days.get(&day)
    }

    /// Record a freshly computed ladder for `day`.
    pub fn insert(&mut self, day: NaiveDate, levels: BTreeMap<LevelName, f64>) {
        debug!(day = %day, levels = levels.len(), "level set recorded in store");
        self.days.insert(day, levels);
        self.dirty = true;
    }

    /// Persist the store to `path` using an atomic write (write to `.tmp`,
    /// then rename).
    pub fn save(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let file = StoreFile {
            fingerprint: self.fingerprint.clone(),
            days: self.days.clone(),
        };
        let content = serde_json::to_string_pretty(&file)
            .context("failed to serialise persisted levels to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp levels to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp levels to {}", path.display()))?;

        self.dirty = false;
        debug!(path = %path.display(), days = self.days.len(), "persisted levels saved (atomic)");
        Ok(())
    }

    /// Save only if there are unsaved changes. Called at shutdown.
    pub fn flush(&mut self, path: impl AsRef<Path>) -> Result<()> {
        if self.dirty {
            self.save(path)?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
}
