//! File-based record store
//!
//! Stores insights as individual JSON files in a directory, one file per
//! record named `<id>.json`, using the same row layout as the hosted
//! `insights` table.

use crate::error::DedupError;
use crate::models::{
    CorpusQuery, InsightId, InsightStatus, InsightStore, StatusOverview, StoredInsight,
};
use crate::normalize::{normalize, tokenize, NormalizerOptions};
use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tokio::sync::RwLock;

/// Storage-specific errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Insight not found: {id}")]
    InsightNotFound { id: InsightId },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Storage directory error: {message}")]
    Directory { message: String },

    #[error("Corrupt record {path}: {source}")]
    CorruptRecord {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Invalid record {path}: {source}")]
    InvalidRecord { path: PathBuf, source: DedupError },
}

/// File-based record store
///
/// Keeps an in-memory copy of every record once the directory has been read.
pub struct FileStorage {
    /// Base directory for storage
    storage_dir: PathBuf,

    /// In-memory cache of insights
    cache: RwLock<HashMap<InsightId, StoredInsight>>,

    /// Whether the cache has been loaded
    cache_loaded: RwLock<bool>,
}

impl FileStorage {
    /// Create a new file storage instance
    ///
    /// The storage directory will be created if it doesn't exist.
    pub async fn new<P: AsRef<Path>>(storage_dir: P) -> Result<Self, StorageError> {
        let storage_dir = storage_dir.as_ref().to_path_buf();

        if !storage_dir.exists() {
            fs::create_dir_all(&storage_dir).await?;
        }

        let metadata = fs::metadata(&storage_dir).await?;
        if !metadata.is_dir() {
            return Err(StorageError::Directory {
                message: format!("{} is not a directory", storage_dir.display()),
            });
        }

        Ok(Self {
            storage_dir,
            cache: RwLock::new(HashMap::new()),
            cache_loaded: RwLock::new(false),
        })
    }

    /// Directory holding the record files
    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    fn insight_path(&self, id: InsightId) -> PathBuf {
        self.storage_dir.join(format!("{id}.json"))
    }

    /// Load all insights into cache if not already loaded.
    ///
    /// A record file that cannot be parsed fails the load: a partial corpus
    /// could hide a true duplicate.
    async fn ensure_cache_loaded(&self) -> Result<(), StorageError> {
        if *self.cache_loaded.read().await {
            return Ok(());
        }

        let mut cache = self.cache.write().await;
        let mut cache_loaded_guard = self.cache_loaded.write().await;

        // Double-check in case another task loaded while we were waiting
        if *cache_loaded_guard {
            return Ok(());
        }

        tracing::info!("Loading insights from {}", self.storage_dir.display());
        let start = std::time::Instant::now();

        let mut entries = fs::read_dir(&self.storage_dir).await?;
        let mut loaded = HashMap::new();

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();

            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }

            let is_record = path
                .file_stem()
                .and_then(|s| s.to_str())
                .is_some_and(|stem| stem.parse::<InsightId>().is_ok());
            if !is_record {
                continue;
            }

            let insight = self.load_insight_from_file(&path).await?;
            loaded.insert(insight.id, insight);
        }

        tracing::info!("Loaded {} insights in {:?}", loaded.len(), start.elapsed());

        // Records written before the first load stay authoritative
        for (id, insight) in loaded {
            cache.entry(id).or_insert(insight);
        }
        *cache_loaded_guard = true;
        Ok(())
    }

    async fn load_insight_from_file(&self, path: &Path) -> Result<StoredInsight, StorageError> {
        let content = fs::read_to_string(path).await?;
        let insight: StoredInsight =
            serde_json::from_str(&content).map_err(|source| StorageError::CorruptRecord {
                path: path.to_path_buf(),
                source,
            })?;
        insight.validate().map_err(|source| StorageError::InvalidRecord {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(insight)
    }

    async fn save_insight_to_file(&self, insight: &StoredInsight) -> Result<(), StorageError> {
        let path = self.insight_path(insight.id);
        let content = serde_json::to_string_pretty(insight)?;
        fs::write(path, content).await?;
        Ok(())
    }
}

/// Returns true if any keyword is a token of any compared field
fn matches_keywords(insight: &StoredInsight, keywords: &HashSet<String>) -> bool {
    let options = NormalizerOptions::default();
    [
        insight.insight.clone(),
        insight.results.comparison_text(),
        insight.limitations_context.clone(),
    ]
    .iter()
    .any(|text| {
        let normalized = normalize(text, &options);
        tokenize(&normalized)
            .into_iter()
            .any(|token| keywords.contains(token))
    })
}

#[async_trait::async_trait]
impl InsightStore for FileStorage {
    async fn store_insight(&mut self, insight: StoredInsight) -> crate::Result<()> {
        self.save_insight_to_file(&insight)
            .await
            .context("Failed to save insight to file")?;

        self.ensure_cache_loaded().await?;
        let mut cache = self.cache.write().await;
        cache.insert(insight.id, insight);

        Ok(())
    }

    async fn get_insight(&self, id: InsightId) -> crate::Result<Option<StoredInsight>> {
        self.ensure_cache_loaded().await?;
        let cache = self.cache.read().await;
        Ok(cache.get(&id).cloned())
    }

    async fn update_status(&mut self, id: InsightId, status: InsightStatus) -> crate::Result<()> {
        self.ensure_cache_loaded().await?;
        let mut cache = self.cache.write().await;

        let mut updated = cache
            .get(&id)
            .cloned()
            .ok_or(StorageError::InsightNotFound { id })?;
        updated.set_status(status);
        self.save_insight_to_file(&updated)
            .await
            .context("Failed to update insight file")?;
        cache.insert(id, updated);

        tracing::debug!("Set status of {} to {}", id, status);
        Ok(())
    }

    async fn bulk_update_status(
        &mut self,
        ids: &[InsightId],
        status: InsightStatus,
    ) -> crate::Result<usize> {
        self.ensure_cache_loaded().await?;
        let mut cache = self.cache.write().await;

        let mut updated = 0;
        for id in ids {
            match cache.get(id).cloned() {
                Some(mut insight) => {
                    insight.set_status(status);
                    self.save_insight_to_file(&insight)
                        .await
                        .context("Failed to update insight file")?;
                    cache.insert(*id, insight);
                    updated += 1;
                }
                None => tracing::warn!("Skipping status update for unknown insight {}", id),
            }
        }

        tracing::info!("Updated {} of {} insights to {}", updated, ids.len(), status);
        Ok(updated)
    }

    async fn fetch(&self, query: &CorpusQuery) -> crate::Result<Vec<StoredInsight>> {
        self.ensure_cache_loaded().await?;
        let cache = self.cache.read().await;

        let (mut insights, limit): (Vec<StoredInsight>, usize) = match query {
            CorpusQuery::All { limit } => (cache.values().cloned().collect(), *limit),
            CorpusQuery::Keywords { keywords, limit } => {
                let options = NormalizerOptions::default();
                // A keyword like "before/after" normalizes to several tokens
                let keywords: HashSet<String> = keywords
                    .iter()
                    .flat_map(|keyword| {
                        let normalized = normalize(keyword, &options);
                        tokenize(&normalized)
                            .into_iter()
                            .map(str::to_string)
                            .collect::<Vec<_>>()
                    })
                    .collect();
                let matching = cache
                    .values()
                    .filter(|insight| matches_keywords(insight, &keywords))
                    .cloned()
                    .collect();
                (matching, *limit)
            }
            CorpusQuery::Recent { days, limit } => {
                let cutoff = Utc::now() - Duration::days(i64::from(*days));
                let recent = cache
                    .values()
                    .filter(|insight| insight.created_at >= cutoff)
                    .cloned()
                    .collect();
                (recent, *limit)
            }
        };

        // Newest first; ids break ties so the order is stable
        insights.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        insights.truncate(limit);

        tracing::debug!("Fetched {} insights for {:?}", insights.len(), query);
        Ok(insights)
    }

    async fn status_overview(&self) -> crate::Result<StatusOverview> {
        self.ensure_cache_loaded().await?;
        let cache = self.cache.read().await;

        let mut overview: StatusOverview =
            InsightStatus::ALL.into_iter().map(|status| (status, 0)).collect();
        for insight in cache.values() {
            *overview.entry(insight.status).or_default() += 1;
        }
        Ok(overview)
    }
}
