//! In-process store used as the fallback tier and in tests.
//!
//! When opened with a snapshot path, every change rewrites the JSON snapshot so
//! the cache survives between CLI invocations. The snapshot is serialized under
//! the table lock and written after the lock is released; `writing` keeps the
//! file writes in the same order as the changes.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock, RwLockWriteGuard};
use tracing::debug;

use crate::error::Result;
use crate::models::{
    CommentAnalysis, CommentAnalysisFilter, Evaluation, EvaluationFilter, Teacher,
    TeacherEvaluationResult,
};
use crate::store::EvaluationStore;

#[derive(Debug, Default, Serialize, Deserialize)]
struct Tables {
    teachers: Vec<Teacher>,
    evaluations: Vec<Evaluation>,
    comment_analysis: Vec<CommentAnalysis>,
    results: Vec<TeacherEvaluationResult>,
    filter_words: BTreeSet<String>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    snapshot: Option<PathBuf>,
    writing: Mutex<()>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the snapshot at `path` if it exists, starting empty otherwise.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let tables = if path.exists() {
            let bytes = std::fs::read(&path)?;
            serde_json::from_slice(&bytes)?
        } else {
            Tables::default()
        };

        Ok(Self {
            tables: RwLock::new(tables),
            snapshot: Some(path),
            writing: Mutex::new(()),
        })
    }

    async fn persist(&self, tables: RwLockWriteGuard<'_, Tables>) -> Result<()> {
        let Some(path) = &self.snapshot else {
            return Ok(());
        };
        let bytes = serde_json::to_vec(&*tables)?;
        let _writing = self.writing.lock().await;
        drop(tables);

        tokio::fs::write(path, bytes).await?;
        debug!(path = %path.display(), "fallback snapshot written");
        Ok(())
    }
}

#[async_trait]
impl EvaluationStore for MemoryStore {
    async fn query_teachers(&self) -> Result<Vec<Teacher>> {
        Ok(self.tables.read().await.teachers.clone())
    }

    async fn insert_teacher(&self, teacher: &Teacher) -> Result<()> {
        let mut tables = self.tables.write().await;
        match tables.teachers.iter_mut().find(|t| t.email == teacher.email) {
            Some(existing) => {
                existing.full_name = teacher.full_name.clone();
                existing.department = teacher.department.clone();
            }
            None => tables.teachers.push(teacher.clone()),
        }
        self.persist(tables).await
    }

    async fn query_evaluations(&self, filter: &EvaluationFilter) -> Result<Vec<Evaluation>> {
        let tables = self.tables.read().await;
        Ok(tables
            .evaluations
            .iter()
            .filter(|evaluation| filter.matches(evaluation))
            .cloned()
            .collect())
    }

    async fn insert_evaluation(&self, evaluation: &Evaluation) -> Result<bool> {
        let mut tables = self.tables.write().await;
        let duplicate = tables.evaluations.iter().any(|existing| {
            existing.id == evaluation.id
                || (existing.student_id == evaluation.student_id
                    && existing.teacher_id == evaluation.teacher_id
                    && existing.evaluation_period == evaluation.evaluation_period)
        });
        if duplicate {
            return Ok(false);
        }

        tables.evaluations.push(evaluation.clone());
        self.persist(tables).await?;
        Ok(true)
    }

    async fn query_comment_analysis(
        &self,
        filter: &CommentAnalysisFilter,
    ) -> Result<Vec<CommentAnalysis>> {
        let tables = self.tables.read().await;
        Ok(tables
            .comment_analysis
            .iter()
            .filter(|analysis| filter.matches(analysis))
            .cloned()
            .collect())
    }

    async fn insert_comment_analysis(&self, records: &[CommentAnalysis]) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.comment_analysis.extend_from_slice(records);
        self.persist(tables).await
    }

    async fn upsert_teacher_result(&self, result: &TeacherEvaluationResult) -> Result<()> {
        let mut tables = self.tables.write().await;
        let existing = tables.results.iter_mut().find(|row| {
            row.teacher_id == result.teacher_id && row.evaluation_period == result.evaluation_period
        });
        match existing {
            Some(row) => *row = result.clone(),
            None => tables.results.push(result.clone()),
        }
        self.persist(tables).await
    }

    async fn query_teacher_results(&self, period: &str) -> Result<Vec<TeacherEvaluationResult>> {
        let tables = self.tables.read().await;
        Ok(tables
            .results
            .iter()
            .filter(|row| row.evaluation_period == period)
            .cloned()
            .collect())
    }

    async fn query_filter_words(&self) -> Result<BTreeSet<String>> {
        Ok(self.tables.read().await.filter_words.clone())
    }

    async fn insert_filter_word(&self, word: &str) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.filter_words.insert(word.to_string());
        self.persist(tables).await
    }

    async fn delete_filter_word(&self, word: &str) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.filter_words.remove(word);
        self.persist(tables).await
    }

    async fn reset_evaluations(&self) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.evaluations.clear();
        tables.comment_analysis.clear();
        tables.results.clear();
        self.persist(tables).await
    }

    async fn replace_filter_words(&self, words: &BTreeSet<String>) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables.filter_words == *words {
            return Ok(());
        }
        tables.filter_words = words.clone();
        self.persist(tables).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sample_evaluation, sample_teacher};

    #[tokio::test]
    async fn duplicate_submissions_are_ignored() {
        let store = MemoryStore::new();
        let teacher = sample_teacher("Maria Santos");
        let first = sample_evaluation(teacher.id, "2021-0001", 5);
        let mut second = sample_evaluation(teacher.id, "2021-0001", 3);
        second.id = uuid::Uuid::new_v4();

        assert!(store.insert_evaluation(&first).await.unwrap());
        assert!(!store.insert_evaluation(&second).await.unwrap());

        let rows = store
            .query_evaluations(&EvaluationFilter::for_teacher(teacher.id))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].overall, 5);
    }

    #[tokio::test]
    async fn snapshot_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("evaluation-cache.json");
        {
            let store = MemoryStore::open(&path).unwrap();
            store.insert_filter_word("bastos").await.unwrap();
        }

        let reopened = MemoryStore::open(&path).unwrap();
        let words = reopened.query_filter_words().await.unwrap();
        assert!(words.contains("bastos"));
    }

    #[tokio::test]
    async fn replacing_filter_words_swaps_the_whole_set() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("evaluation-cache.json");
        let store = MemoryStore::open(&path).unwrap();
        store.insert_filter_word("stale").await.unwrap();

        let fresh: BTreeSet<String> = ["bastos", "rude"].iter().map(|w| w.to_string()).collect();
        store.replace_filter_words(&fresh).await.unwrap();
        assert_eq!(store.query_filter_words().await.unwrap(), fresh);

        let reopened = MemoryStore::open(&path).unwrap();
        assert_eq!(reopened.query_filter_words().await.unwrap(), fresh);
    }

    #[tokio::test]
    async fn unchanged_filter_words_leave_the_snapshot_alone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("evaluation-cache.json");
        let store = MemoryStore::open(&path).unwrap();

        store.replace_filter_words(&BTreeSet::new()).await.unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn reset_keeps_teachers_and_filter_words() {
        let store = MemoryStore::new();
        let teacher = sample_teacher("Jose Rizal");
        store.insert_teacher(&teacher).await.unwrap();
        store.insert_filter_word("rude").await.unwrap();
        store
            .insert_evaluation(&sample_evaluation(teacher.id, "2021-0002", 4))
            .await
            .unwrap();

        store.reset_evaluations().await.unwrap();

        assert!(store
            .query_evaluations(&EvaluationFilter::default())
            .await
            .unwrap()
            .is_empty());
        assert_eq!(store.query_teachers().await.unwrap().len(), 1);
        assert_eq!(store.query_filter_words().await.unwrap().len(), 1);
    }
}
