//! Memoized city loads.
//!
//! Entries are keyed by city and remember the identity (canonical path,
//! size, modification time) of every file the city's schema reads. Editing,
//! adding or removing any of them reloads the city even before the TTL runs
//! out. Readers share the snapshot through `Arc`.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tracing::debug;

use crate::error::{AnalysisError, Result};
use crate::loader::{load_city, LoadReport};
use crate::schema::CitySchema;
use crate::types::CityDataset;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileIdentity {
    pub path: PathBuf,
    pub len: u64,
    pub modified: Option<SystemTime>,
}

impl FileIdentity {
    pub fn of(path: &Path) -> Result<Self> {
        let canonical = path
            .canonicalize()
            .map_err(|e| AnalysisError::io(path, e))?;
        let meta = std::fs::metadata(&canonical).map_err(|e| AnalysisError::io(path, e))?;
        Ok(Self {
            path: canonical,
            len: meta.len(),
            modified: meta.modified().ok(),
        })
    }

    /// Like [`FileIdentity::of`], but a file that does not exist is `None`.
    pub fn probe(path: &Path) -> Result<Option<Self>> {
        match Self::of(path) {
            Ok(identity) => Ok(Some(identity)),
            Err(AnalysisError::Io { source, .. }) if source.kind() == ErrorKind::NotFound => {
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }
}

/// Identities of a schema's source files, in [`CitySchema::source_files`]
/// order. The listings file must exist; optional tables may be absent.
fn source_identities(schema: &CitySchema, data_dir: &Path) -> Result<Vec<Option<FileIdentity>>> {
    let mut files = schema.source_files().into_iter();
    let mut identities = Vec::new();
    if let Some(listings) = files.next() {
        identities.push(Some(FileIdentity::of(&data_dir.join(listings))?));
    }
    for file in files {
        identities.push(FileIdentity::probe(&data_dir.join(file))?);
    }
    Ok(identities)
}

#[derive(Debug, Clone)]
struct CacheEntry {
    sources: Vec<Option<FileIdentity>>,
    dataset: Arc<CityDataset>,
    report: LoadReport,
    stored_at: Instant,
}

impl CacheEntry {
    fn is_stale(&self, ttl: Duration) -> bool {
        self.stored_at.elapsed() >= ttl
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

#[derive(Debug)]
pub struct DatasetCache {
    ttl: Duration,
    entries: HashMap<String, CacheEntry>,
    stats: CacheStats,
}

impl DatasetCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
            stats: CacheStats::default(),
        }
    }

    /// Return the cached snapshot for `schema`, reading from `data_dir`
    /// only when there is no fresh entry for the current source files.
    pub fn get_or_load(
        &mut self,
        schema: &CitySchema,
        data_dir: &Path,
    ) -> Result<(Arc<CityDataset>, LoadReport)> {
        let city = schema.name.to_ascii_lowercase();
        let sources = source_identities(schema, data_dir)?;

        if let Some(entry) = self.entries.get(&city) {
            if entry.sources == sources && !entry.is_stale(self.ttl) {
                self.stats.hits += 1;
                debug!(city = %schema.name, "dataset cache hit");
                return Ok((Arc::clone(&entry.dataset), entry.report.clone()));
            }
        }

        self.stats.misses += 1;
        debug!(city = %schema.name, "dataset cache miss");
        let (dataset, report) = load_city(schema, data_dir)?;
        let dataset = Arc::new(dataset);
        self.entries.insert(
            city,
            CacheEntry {
                sources,
                dataset: Arc::clone(&dataset),
                report: report.clone(),
                stored_at: Instant::now(),
            },
        );
        Ok((dataset, report))
    }

    pub fn invalidate(&mut self, city: &str) {
        self.entries.remove(&city.to_ascii_lowercase());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }
}
