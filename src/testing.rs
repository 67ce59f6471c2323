//! Fixtures shared by the unit tests.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{EvaluationError, Result};
use crate::memory::MemoryStore;
use crate::models::{
    CommentAnalysis, CommentAnalysisFilter, Evaluation, EvaluationFilter, Teacher,
    TeacherEvaluationResult,
};
use crate::store::EvaluationStore;

pub fn sample_teacher(name: &str) -> Teacher {
    Teacher {
        id: Uuid::new_v4(),
        full_name: name.to_string(),
        department: "Computer Studies".to_string(),
        email: format!("{}@school.edu.ph", name.to_lowercase().replace(' ', ".")),
    }
}

/// Every rating set to `overall`, no comments.
pub fn sample_evaluation(teacher_id: Uuid, student_id: &str, overall: i16) -> Evaluation {
    Evaluation {
        id: Uuid::new_v4(),
        student_id: student_id.to_string(),
        teacher_id,
        evaluation_period: "1st Semester 2025-2026".to_string(),
        overall,
        teaching_effectiveness: overall,
        classroom_management: overall,
        course_content: overall,
        responsiveness: overall,
        positive_feedback: None,
        negative_feedback: None,
        suggestions: None,
        answers: BTreeMap::new(),
        created_at: Utc::now(),
    }
}

/// Delegates to a `MemoryStore` but rejects result upserts for chosen
/// teachers and comment rows whose text contains "unstorable".
pub struct FlakyStore {
    pub inner: MemoryStore,
    failing: RwLock<HashSet<Uuid>>,
}

impl FlakyStore {
    pub fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            failing: RwLock::new(HashSet::new()),
        }
    }

    pub async fn fail_for(&self, teacher_id: Uuid) {
        self.failing.write().await.insert(teacher_id);
    }
}

#[async_trait]
impl EvaluationStore for FlakyStore {
    async fn query_teachers(&self) -> Result<Vec<Teacher>> {
        self.inner.query_teachers().await
    }

    async fn insert_teacher(&self, teacher: &Teacher) -> Result<()> {
        self.inner.insert_teacher(teacher).await
    }

    async fn query_evaluations(&self, filter: &EvaluationFilter) -> Result<Vec<Evaluation>> {
        self.inner.query_evaluations(filter).await
    }

    async fn insert_evaluation(&self, evaluation: &Evaluation) -> Result<bool> {
        self.inner.insert_evaluation(evaluation).await
    }

    async fn query_comment_analysis(
        &self,
        filter: &CommentAnalysisFilter,
    ) -> Result<Vec<CommentAnalysis>> {
        self.inner.query_comment_analysis(filter).await
    }

    async fn insert_comment_analysis(&self, records: &[CommentAnalysis]) -> Result<()> {
        if records.iter().any(|r| r.comment_text.contains("unstorable")) {
            return Err(EvaluationError::Database(sqlx::Error::PoolTimedOut));
        }
        self.inner.insert_comment_analysis(records).await
    }

    async fn upsert_teacher_result(&self, result: &TeacherEvaluationResult) -> Result<()> {
        if self.failing.read().await.contains(&result.teacher_id) {
            return Err(EvaluationError::Database(sqlx::Error::PoolTimedOut));
        }
        self.inner.upsert_teacher_result(result).await
    }

    async fn query_teacher_results(&self, period: &str) -> Result<Vec<TeacherEvaluationResult>> {
        self.inner.query_teacher_results(period).await
    }

    async fn query_filter_words(&self) -> Result<BTreeSet<String>> {
        self.inner.query_filter_words().await
    }

    async fn insert_filter_word(&self, word: &str) -> Result<()> {
        self.inner.insert_filter_word(word).await
    }

    async fn delete_filter_word(&self, word: &str) -> Result<()> {
        self.inner.delete_filter_word(word).await
    }

    async fn reset_evaluations(&self) -> Result<()> {
        self.inner.reset_evaluations().await
    }
}
