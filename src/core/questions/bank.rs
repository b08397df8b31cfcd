use std::path::{Path, PathBuf};

use rand::seq::SliceRandom;
use tokio::sync::OnceCell;

use super::types::{QuestionCategory, QuestionError, QuestionRecord};

/// Read-only question pool.
///
/// A file-backed bank loads lazily on the first `get` and keeps the result
/// for the rest of the process. A failed load is not remembered, so the
/// next call tries again.
pub struct QuestionBank {
    path: Option<PathBuf>,
    pool: OnceCell<Vec<QuestionRecord>>,
}

impl QuestionBank {
    /// Bank backed by a JSON array on disk. Nothing is read until first use.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            pool: OnceCell::new(),
        }
    }

    /// Bank over an in-memory pool.
    pub fn from_records(records: Vec<QuestionRecord>) -> Self {
        Self {
            path: None,
            pool: OnceCell::new_with(Some(records)),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn is_loaded(&self) -> bool {
        self.pool.initialized()
    }

    /// The whole pool, loading it if needed.
    pub async fn records(&self) -> Result<&[QuestionRecord], QuestionError> {
        let pool = self.pool.get_or_try_init(|| self.load()).await?;
        Ok(pool.as_slice())
    }

    async fn load(&self) -> Result<Vec<QuestionRecord>, QuestionError> {
        let Some(path) = self.path.as_deref() else {
            return Ok(Vec::new());
        };

        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| QuestionError::Load(format!("{}: {}", path.display(), e)))?;
        let records: Vec<QuestionRecord> =
            serde_json::from_str(&raw).map_err(|e| QuestionError::Parse(e.to_string()))?;

        tracing::info!(
            "Loaded question bank from {} ({} questions)",
            path.display(),
            records.len()
        );
        Ok(records)
    }

    /// Random question of the requested category.
    ///
    /// Falls back to the whole pool when the category has no entries and
    /// fails only when the pool is empty.
    pub async fn get(&self, category: QuestionCategory) -> Result<QuestionRecord, QuestionError> {
        let all = self.records().await?;
        let matching: Vec<&QuestionRecord> =
            all.iter().filter(|q| q.category == category).collect();

        let mut rng = rand::thread_rng();
        if let Some(record) = matching.choose(&mut rng) {
            return Ok((*record).clone());
        }

        if !all.is_empty() {
            tracing::debug!("No '{}' questions in pool, picking from all", category);
        }
        all.choose(&mut rng).cloned().ok_or(QuestionError::EmptyPool)
    }
}
