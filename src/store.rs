//! Repository interface the classifier, aggregator and filter are written against.
//!
//! `TieredStore` pairs a primary store with a fallback cache:
//! - reads hit the primary and fall back to the cache when the primary is
//!   unreachable;
//! - successful primary reads of the filter-word set refresh the cache;
//! - writes go to the primary and are mirrored into the cache. While the
//!   primary is unreachable a write is logged and kept in the cache only.
//!
//! An error from a primary that answered (constraint violation, bad row) is
//! returned as is and never reaches the cache.

use std::collections::BTreeSet;

use async_trait::async_trait;
use tracing::warn;

use crate::error::Result;
use crate::models::{
    CommentAnalysis, CommentAnalysisFilter, Evaluation, EvaluationFilter, Teacher,
    TeacherEvaluationResult,
};

#[async_trait]
pub trait EvaluationStore: Send + Sync {
    async fn query_teachers(&self) -> Result<Vec<Teacher>>;

    async fn insert_teacher(&self, teacher: &Teacher) -> Result<()>;

    async fn query_evaluations(&self, filter: &EvaluationFilter) -> Result<Vec<Evaluation>>;

    /// Stores a new submission. Returns `false` when one already exists for
    /// the same (student, teacher, period).
    async fn insert_evaluation(&self, evaluation: &Evaluation) -> Result<bool>;

    async fn query_comment_analysis(
        &self,
        filter: &CommentAnalysisFilter,
    ) -> Result<Vec<CommentAnalysis>>;

    async fn insert_comment_analysis(&self, records: &[CommentAnalysis]) -> Result<()>;

    /// Insert-or-replace keyed by (teacher_id, evaluation_period).
    async fn upsert_teacher_result(&self, result: &TeacherEvaluationResult) -> Result<()>;

    async fn query_teacher_results(&self, period: &str) -> Result<Vec<TeacherEvaluationResult>>;

    async fn query_filter_words(&self) -> Result<BTreeSet<String>>;

    async fn insert_filter_word(&self, word: &str) -> Result<()>;

    async fn delete_filter_word(&self, word: &str) -> Result<()>;

    /// Bulk administrative reset: drops evaluations, their comment analysis
    /// and every computed result.
    async fn reset_evaluations(&self) -> Result<()>;

    /// Replaces the stored filter-word set wholesale.
    async fn replace_filter_words(&self, words: &BTreeSet<String>) -> Result<()> {
        let current = self.query_filter_words().await?;
        for stale in current.difference(words) {
            self.delete_filter_word(stale).await?;
        }
        for fresh in words.difference(&current) {
            self.insert_filter_word(fresh).await?;
        }
        Ok(())
    }
}

pub struct TieredStore<P, F> {
    primary: P,
    fallback: F,
}

impl<P, F> TieredStore<P, F>
where
    P: EvaluationStore,
    F: EvaluationStore,
{
    pub fn new(primary: P, fallback: F) -> Self {
        Self { primary, fallback }
    }

    pub fn fallback(&self) -> &F {
        &self.fallback
    }
}

macro_rules! read_through {
    ($self:ident, $op:literal, $call:ident ( $($arg:expr),* )) => {
        match $self.primary.$call($($arg),*).await {
            Err(err) if err.is_unavailable() => {
                warn!(operation = $op, error = %err, "primary store unreachable, reading fallback");
                $self.fallback.$call($($arg),*).await
            }
            other => other,
        }
    };
}

macro_rules! write_through {
    ($self:ident, $op:literal, $call:ident ( $($arg:expr),* )) => {
        match $self.primary.$call($($arg),*).await {
            Ok(value) => {
                if let Err(err) = $self.fallback.$call($($arg),*).await {
                    warn!(operation = $op, error = %err, "fallback mirror write failed");
                }
                Ok(value)
            }
            Err(err) if err.is_unavailable() => {
                warn!(operation = $op, error = %err, "primary store unreachable, kept in fallback");
                $self.fallback.$call($($arg),*).await
            }
            Err(err) => Err(err),
        }
    };
}

#[async_trait]
impl<P, F> EvaluationStore for TieredStore<P, F>
where
    P: EvaluationStore,
    F: EvaluationStore,
{
    async fn query_teachers(&self) -> Result<Vec<Teacher>> {
        read_through!(self, "query_teachers", query_teachers())
    }

    async fn insert_teacher(&self, teacher: &Teacher) -> Result<()> {
        write_through!(self, "insert_teacher", insert_teacher(teacher))
    }

    async fn query_evaluations(&self, filter: &EvaluationFilter) -> Result<Vec<Evaluation>> {
        read_through!(self, "query_evaluations", query_evaluations(filter))
    }

    async fn insert_evaluation(&self, evaluation: &Evaluation) -> Result<bool> {
        write_through!(self, "insert_evaluation", insert_evaluation(evaluation))
    }

    async fn query_comment_analysis(
        &self,
        filter: &CommentAnalysisFilter,
    ) -> Result<Vec<CommentAnalysis>> {
        read_through!(self, "query_comment_analysis", query_comment_analysis(filter))
    }

    async fn insert_comment_analysis(&self, records: &[CommentAnalysis]) -> Result<()> {
        write_through!(self, "insert_comment_analysis", insert_comment_analysis(records))
    }

    async fn upsert_teacher_result(&self, result: &TeacherEvaluationResult) -> Result<()> {
        write_through!(self, "upsert_teacher_result", upsert_teacher_result(result))
    }

    async fn query_teacher_results(&self, period: &str) -> Result<Vec<TeacherEvaluationResult>> {
        read_through!(self, "query_teacher_results", query_teacher_results(period))
    }

    async fn query_filter_words(&self) -> Result<BTreeSet<String>> {
        match self.primary.query_filter_words().await {
            Ok(words) => {
                if let Err(err) = self.fallback.replace_filter_words(&words).await {
                    warn!(error = %err, "failed to refresh cached filter words");
                }
                Ok(words)
            }
            Err(err) if err.is_unavailable() => {
                warn!(operation = "query_filter_words", error = %err, "primary store unreachable, reading fallback");
                self.fallback.query_filter_words().await
            }
            Err(err) => Err(err),
        }
    }

    async fn insert_filter_word(&self, word: &str) -> Result<()> {
        write_through!(self, "insert_filter_word", insert_filter_word(word))
    }

    async fn delete_filter_word(&self, word: &str) -> Result<()> {
        write_through!(self, "delete_filter_word", delete_filter_word(word))
    }

    async fn reset_evaluations(&self) -> Result<()> {
        write_through!(self, "reset_evaluations", reset_evaluations())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use sqlx::error::{DatabaseError, ErrorKind};

    use crate::error::EvaluationError;
    use crate::memory::MemoryStore;
    use crate::testing::{sample_evaluation, sample_teacher};

    /// A primary tier whose every call fails with the same error.
    pub(crate) struct FailingStore {
        error: fn() -> sqlx::Error,
    }

    impl FailingStore {
        /// Behaves like a database that cannot be reached.
        pub(crate) fn offline() -> Self {
            Self {
                error: || sqlx::Error::PoolTimedOut,
            }
        }

        /// Answers every call with a foreign-key violation.
        pub(crate) fn rejecting() -> Self {
            Self {
                error: || sqlx::Error::Database(Box::new(ForeignKeyViolation)),
            }
        }

        fn fail<T>(&self) -> Result<T> {
            Err(EvaluationError::Database((self.error)()))
        }
    }

    #[derive(Debug)]
    struct ForeignKeyViolation;

    const FK_MESSAGE: &str = "insert or update violates foreign key constraint";

    impl std::fmt::Display for ForeignKeyViolation {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str(FK_MESSAGE)
        }
    }

    impl std::error::Error for ForeignKeyViolation {}

    impl DatabaseError for ForeignKeyViolation {
        fn message(&self) -> &str {
            FK_MESSAGE
        }

        fn as_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn std::error::Error + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> ErrorKind {
            ErrorKind::ForeignKeyViolation
        }
    }

    #[async_trait]
    impl EvaluationStore for FailingStore {
        async fn query_teachers(&self) -> Result<Vec<Teacher>> {
            self.fail()
        }
        async fn insert_teacher(&self, _teacher: &Teacher) -> Result<()> {
            self.fail()
        }
        async fn query_evaluations(&self, _filter: &EvaluationFilter) -> Result<Vec<Evaluation>> {
            self.fail()
        }
        async fn insert_evaluation(&self, _evaluation: &Evaluation) -> Result<bool> {
            self.fail()
        }
        async fn query_comment_analysis(
            &self,
            _filter: &CommentAnalysisFilter,
        ) -> Result<Vec<CommentAnalysis>> {
            self.fail()
        }
        async fn insert_comment_analysis(&self, _records: &[CommentAnalysis]) -> Result<()> {
            self.fail()
        }
        async fn upsert_teacher_result(&self, _result: &TeacherEvaluationResult) -> Result<()> {
            self.fail()
        }
        async fn query_teacher_results(
            &self,
            _period: &str,
        ) -> Result<Vec<TeacherEvaluationResult>> {
            self.fail()
        }
        async fn query_filter_words(&self) -> Result<BTreeSet<String>> {
            self.fail()
        }
        async fn insert_filter_word(&self, _word: &str) -> Result<()> {
            self.fail()
        }
        async fn delete_filter_word(&self, _word: &str) -> Result<()> {
            self.fail()
        }
        async fn reset_evaluations(&self) -> Result<()> {
            self.fail()
        }
    }

    #[tokio::test]
    async fn writes_survive_an_offline_primary() {
        let store = TieredStore::new(FailingStore::offline(), MemoryStore::new());
        store.insert_filter_word("bad").await.unwrap();

        let words = store.query_filter_words().await.unwrap();
        assert!(words.contains("bad"));
    }

    #[tokio::test]
    async fn filter_word_reads_refresh_the_cache() {
        let primary = MemoryStore::new();
        primary.insert_filter_word("rude").await.unwrap();
        let fallback = MemoryStore::new();
        fallback.insert_filter_word("stale").await.unwrap();

        let store = TieredStore::new(primary, fallback);
        let words = store.query_filter_words().await.unwrap();
        assert_eq!(words.into_iter().collect::<Vec<_>>(), vec!["rude"]);

        let cached = store.fallback().query_filter_words().await.unwrap();
        assert_eq!(cached.into_iter().collect::<Vec<_>>(), vec!["rude"]);
    }

    #[tokio::test]
    async fn both_tiers_failing_surfaces_an_error() {
        let store = TieredStore::new(FailingStore::offline(), FailingStore::offline());
        let err = store.query_teachers().await.unwrap_err();
        assert!(matches!(err, EvaluationError::Database(_)));
    }

    #[tokio::test]
    async fn rejected_writes_are_not_cached() {
        let store = TieredStore::new(FailingStore::rejecting(), MemoryStore::new());
        let evaluation = sample_evaluation(uuid::Uuid::new_v4(), "2021-0009", 4);

        let err = store.insert_evaluation(&evaluation).await.unwrap_err();
        assert!(matches!(err, EvaluationError::Database(sqlx::Error::Database(_))));
        assert!(!err.is_unavailable());

        let cached = store
            .fallback()
            .query_evaluations(&EvaluationFilter::default())
            .await
            .unwrap();
        assert!(cached.is_empty());
    }

    #[tokio::test]
    async fn rejected_reads_do_not_fall_back() {
        let fallback = MemoryStore::new();
        fallback.insert_teacher(&sample_teacher("Ana Cruz")).await.unwrap();
        fallback.insert_filter_word("rude").await.unwrap();

        let store = TieredStore::new(FailingStore::rejecting(), fallback);
        assert!(store.query_teachers().await.is_err());
        assert!(store.query_filter_words().await.is_err());
    }

    #[tokio::test]
    async fn successful_writes_are_mirrored() {
        let store = TieredStore::new(MemoryStore::new(), MemoryStore::new());
        let teacher = sample_teacher("Ramon Bautista");
        store.insert_teacher(&teacher).await.unwrap();

        assert_eq!(store.fallback().query_teachers().await.unwrap(), vec![teacher]);
    }
}
