//! Rating storage and snapshot persistence
//!
//! This module defines the per-pool [`RatingStore`] together with the
//! [`SnapshotBackend`] interface it persists through. Snapshots are flat text,
//! one competitor per line, rewritten in full on every save.

use crate::error::{RatingError, Result};
use crate::types::{CompetitorId, RatingState, Standing};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Trait for reading and writing a whole snapshot
#[cfg_attr(test, mockall::automock)]
pub trait SnapshotBackend: Send + Sync {
    /// Read the snapshot, `None` when it does not exist yet
    fn read(&self) -> Result<Option<String>>;

    /// Replace the snapshot with `contents`
    fn write(&self, contents: &str) -> Result<()>;

    /// Human readable location for logs and errors
    fn describe(&self) -> String;
}

/// File-backed snapshot, replaced atomically via rename
#[derive(Debug, Clone)]
pub struct FileSnapshot {
    path: PathBuf,
}

impl FileSnapshot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persistence_error(&self, source: std::io::Error) -> anyhow::Error {
        RatingError::PersistenceFailed {
            location: self.describe(),
            source,
        }
        .into()
    }
}

impl SnapshotBackend for FileSnapshot {
    fn read(&self) -> Result<Option<String>> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(anyhow::Error::new(e)
                .context(format!("Failed to read snapshot {}", self.path.display()))),
        }
    }

    fn write(&self, contents: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| self.persistence_error(e))?;
            }
        }

        // Write next to the target so the rename stays on one filesystem
        let file_name = self
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "snapshot".to_string());
        let tmp_path = self
            .path
            .with_file_name(format!(".{}.{}.tmp", file_name, Uuid::new_v4()));

        if let Err(e) = fs::write(&tmp_path, contents) {
            let _ = fs::remove_file(&tmp_path);
            return Err(self.persistence_error(e));
        }
        if let Err(e) = fs::rename(&tmp_path, &self.path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(self.persistence_error(e));
        }

        Ok(())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// In-memory snapshot for tests and dry runs
#[derive(Debug, Default)]
pub struct InMemorySnapshot {
    contents: RwLock<Option<String>>,
}

impl InMemorySnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from existing snapshot text
    pub fn with_contents(contents: impl Into<String>) -> Self {
        Self {
            contents: RwLock::new(Some(contents.into())),
        }
    }

    /// Current snapshot text (for testing)
    pub fn contents(&self) -> Option<String> {
        self.contents.read().ok().and_then(|c| c.clone())
    }
}

impl SnapshotBackend for InMemorySnapshot {
    fn read(&self) -> Result<Option<String>> {
        let contents = self
            .contents
            .read()
            .map_err(|_| RatingError::InternalError {
                message: "Failed to acquire snapshot read lock".to_string(),
            })?;

        Ok(contents.clone())
    }

    fn write(&self, contents: &str) -> Result<()> {
        let mut stored = self
            .contents
            .write()
            .map_err(|_| RatingError::InternalError {
                message: "Failed to acquire snapshot write lock".to_string(),
            })?;

        *stored = Some(contents.to_string());
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

/// Shared handle, so a caller can keep inspecting a backend it handed over
impl<T: SnapshotBackend + ?Sized> SnapshotBackend for Arc<T> {
    fn read(&self) -> Result<Option<String>> {
        (**self).read()
    }

    fn write(&self, contents: &str) -> Result<()> {
        (**self).write(contents)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// Encode ratings as `<name> <integer rating> <matches played>` lines.
///
/// Ratings are rounded to the nearest integer on the way out.
pub fn encode_ratings<'a>(
    entries: impl IntoIterator<Item = (&'a CompetitorId, &'a RatingState)>,
) -> String {
    let mut out = String::new();
    for (competitor, state) in entries {
        out.push_str(&format!(
            "{} {} {}\n",
            competitor,
            state.rating.round() as i64,
            state.matches_played
        ));
    }
    out
}

/// Decode a ratings snapshot. The competitor name is everything before the
/// last two tokens, so names may contain spaces.
pub fn decode_ratings(contents: &str) -> Result<BTreeMap<CompetitorId, RatingState>> {
    let mut ratings = BTreeMap::new();

    for (index, raw) in contents.lines().enumerate() {
        let line_number = index + 1;
        let tokens: Vec<&str> = raw.split_whitespace().collect();
        if tokens.is_empty() {
            continue;
        }
        if tokens.len() < 3 {
            return Err(RatingError::MalformedRecord {
                line: line_number,
                reason: format!("expected '<name> <rating> <matches>', got '{}'", raw.trim()),
            }
            .into());
        }

        let matches_token = tokens[tokens.len() - 1];
        let rating_token = tokens[tokens.len() - 2];
        let name = tokens[..tokens.len() - 2].join(" ");

        let rating: f64 = rating_token
            .parse()
            .ok()
            .filter(|r: &f64| r.is_finite())
            .ok_or_else(|| RatingError::MalformedRecord {
                line: line_number,
                reason: format!("invalid rating '{}'", rating_token),
            })?;
        let matches_played: u32 = matches_token.parse().map_err(|_| RatingError::MalformedRecord {
            line: line_number,
            reason: format!("invalid match count '{}'", matches_token),
        })?;

        if ratings
            .insert(name.clone(), RatingState { rating, matches_played })
            .is_some()
        {
            warn!(
                line = line_number,
                competitor = %name,
                "Duplicate competitor in snapshot, keeping last entry"
            );
        }
    }

    Ok(ratings)
}

/// Durable mapping from competitor to rating state for one pool
pub struct RatingStore {
    pool: String,
    ratings: BTreeMap<CompetitorId, RatingState>,
    initial: RatingState,
    backend: Box<dyn SnapshotBackend>,
    snapshot_missing: bool,
}

impl std::fmt::Debug for RatingStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RatingStore")
            .field("pool", &self.pool)
            .field("competitors", &self.ratings.len())
            .field("backend", &self.backend.describe())
            .finish()
    }
}

impl RatingStore {
    /// Load a pool's ratings from its snapshot.
    ///
    /// A missing snapshot is not an error: the store starts empty and a
    /// warning is logged.
    pub fn load(
        pool: impl Into<String>,
        backend: Box<dyn SnapshotBackend>,
        initial_rating: f64,
    ) -> Result<Self> {
        let pool = pool.into();
        let mut snapshot_missing = false;

        let ratings = match backend.read()? {
            Some(contents) => {
                let ratings = decode_ratings(&contents)?;
                info!(
                    pool = %pool,
                    competitors = ratings.len(),
                    "Loaded ratings from {}",
                    backend.describe()
                );
                ratings
            }
            None => {
                let missing = RatingError::MissingStore {
                    location: backend.describe(),
                };
                warn!(pool = %pool, "{}; starting with empty ratings", missing);
                snapshot_missing = true;
                BTreeMap::new()
            }
        };

        Ok(Self {
            pool,
            ratings,
            initial: RatingState::new(initial_rating),
            backend,
            snapshot_missing,
        })
    }

    /// Pool this store belongs to
    pub fn pool(&self) -> &str {
        &self.pool
    }

    /// Whether the backing snapshot was absent at load time
    pub fn snapshot_missing(&self) -> bool {
        self.snapshot_missing
    }

    /// Get a competitor's state, creating the default entry on first reference
    pub fn get(&mut self, competitor: &str) -> RatingState {
        if let Some(state) = self.ratings.get(competitor) {
            return *state;
        }

        debug!(pool = %self.pool, competitor, "Creating default rating entry");
        let initial = self.initial;
        self.ratings.insert(competitor.to_string(), initial);
        initial
    }

    /// Look up a competitor without creating it
    pub fn peek(&self, competitor: &str) -> Option<RatingState> {
        self.ratings.get(competitor).copied()
    }

    /// Rating for a competitor, or the initial rating when unseen. Never inserts.
    pub fn rating_or_default(&self, competitor: &str) -> f64 {
        self.peek(competitor)
            .map(|state| state.rating)
            .unwrap_or(self.initial.rating)
    }

    pub fn contains(&self, competitor: &str) -> bool {
        self.ratings.contains_key(competitor)
    }

    /// Replace a competitor's state in the live mapping
    pub fn set(&mut self, competitor: &str, state: RatingState) {
        self.ratings.insert(competitor.to_string(), state);
    }

    /// Put back a state captured with [`peek`](Self::peek); `None` removes the entry
    pub fn restore(&mut self, competitor: &str, state: Option<RatingState>) {
        match state {
            Some(state) => self.set(competitor, state),
            None => {
                self.ratings.remove(competitor);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.ratings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ratings.is_empty()
    }

    /// Iterate competitors in snapshot order
    pub fn iter(&self) -> impl Iterator<Item = (&CompetitorId, &RatingState)> {
        self.ratings.iter()
    }

    /// Write the full mapping to the backend, replacing the previous snapshot
    pub fn save(&self) -> Result<()> {
        let contents = encode_ratings(self.ratings.iter());
        self.backend.write(&contents)?;
        debug!(
            pool = %self.pool,
            competitors = self.ratings.len(),
            "Saved ratings to {}",
            self.backend.describe()
        );
        Ok(())
    }

    /// Competitors ordered by rating (descending), ties broken by name
    pub fn standings(&self) -> Vec<Standing> {
        let mut entries: Vec<(&CompetitorId, &RatingState)> = self.ratings.iter().collect();
        entries.sort_by(|a, b| {
            b.1.rating
                .partial_cmp(&a.1.rating)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(b.0))
        });

        entries
            .into_iter()
            .enumerate()
            .map(|(index, (competitor, state))| Standing {
                rank: index + 1,
                competitor: competitor.clone(),
                rating: state.rating,
                matches_played: state.matches_played,
            })
            .collect()
    }
}
