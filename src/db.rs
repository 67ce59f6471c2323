use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::{PgPool, Row};

use crate::error::Result;
use crate::models::{
    CommentAnalysis, CommentAnalysisFilter, Evaluation, EvaluationFilter, Teacher,
    TeacherEvaluationResult,
};
use crate::store::EvaluationStore;

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Builds a lazily connecting pool, so an unreachable database surfaces as a
/// per-query error the fallback tier can absorb.
pub fn connect(database_url: &str, max_connections: u32) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect_lazy(database_url)?;
    Ok(pool)
}

pub async fn init_db(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(sqlx::Error::from)?;
    Ok(())
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn evaluation_from_row(row: &PgRow) -> Evaluation {
    let answers: Json<BTreeMap<String, i16>> = row.get("answers");
    Evaluation {
        id: row.get("id"),
        student_id: row.get("student_id"),
        teacher_id: row.get("teacher_id"),
        evaluation_period: row.get("evaluation_period"),
        overall: row.get("overall"),
        teaching_effectiveness: row.get("teaching_effectiveness"),
        classroom_management: row.get("classroom_management"),
        course_content: row.get("course_content"),
        responsiveness: row.get("responsiveness"),
        positive_feedback: row.get("positive_feedback"),
        negative_feedback: row.get("negative_feedback"),
        suggestions: row.get("suggestions"),
        answers: answers.0,
        created_at: row.get("created_at"),
    }
}

fn analysis_from_row(row: &PgRow) -> Result<CommentAnalysis> {
    let comment_type: String = row.get("comment_type");
    let flag_reason: Option<String> = row.get("flag_reason");
    let language: String = row.get("language_detected");

    Ok(CommentAnalysis {
        id: row.get("id"),
        evaluation_id: row.get("evaluation_id"),
        comment_text: row.get("comment_text"),
        comment_type: comment_type.parse()?,
        is_flagged: row.get("is_flagged"),
        flag_reason: flag_reason.map(|reason| reason.parse()).transpose()?,
        language_detected: language.parse()?,
    })
}

fn result_from_row(row: &PgRow) -> TeacherEvaluationResult {
    let average_scores: Json<BTreeMap<String, f64>> = row.get("average_scores");
    TeacherEvaluationResult {
        teacher_id: row.get("teacher_id"),
        evaluation_period: row.get("evaluation_period"),
        overall_rating: row.get("overall_rating"),
        total_evaluations: row.get("total_evaluations"),
        average_scores: average_scores.0,
        positive_comments: row.get("positive_comments"),
        negative_comments: row.get("negative_comments"),
        suggestions: row.get("suggestions"),
        flagged_comments: row.get("flagged_comments"),
    }
}

/// Rows come back in insertion order so flagged comments fold into results
/// the same way on every run.
fn comment_analysis_query(filter: &CommentAnalysisFilter) -> String {
    let mut query = String::from(
        "SELECT id, evaluation_id, comment_text, comment_type, is_flagged, flag_reason, \
         language_detected FROM teacher_evaluation.comment_analysis WHERE TRUE",
    );
    if filter.evaluation_ids.is_some() {
        query.push_str(" AND evaluation_id = ANY($1)");
    }
    if filter.flagged_only {
        query.push_str(" AND is_flagged");
    }
    query.push_str(" ORDER BY created_at, id");
    query
}

#[async_trait]
impl EvaluationStore for PgStore {
    async fn query_teachers(&self) -> Result<Vec<Teacher>> {
        let rows = sqlx::query(
            "SELECT id, full_name, department, email \
             FROM teacher_evaluation.teachers ORDER BY full_name",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| Teacher {
                id: row.get("id"),
                full_name: row.get("full_name"),
                department: row.get("department"),
                email: row.get("email"),
            })
            .collect())
    }

    async fn insert_teacher(&self, teacher: &Teacher) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO teacher_evaluation.teachers (id, full_name, department, email)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (email) DO UPDATE
            SET full_name = EXCLUDED.full_name, department = EXCLUDED.department
            "#,
        )
        .bind(teacher.id)
        .bind(&teacher.full_name)
        .bind(&teacher.department)
        .bind(&teacher.email)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn query_evaluations(&self, filter: &EvaluationFilter) -> Result<Vec<Evaluation>> {
        let mut query = String::from(
            "SELECT id, student_id, teacher_id, evaluation_period, overall, \
             teaching_effectiveness, classroom_management, course_content, responsiveness, \
             positive_feedback, negative_feedback, suggestions, answers, created_at \
             FROM teacher_evaluation.evaluations WHERE TRUE",
        );

        let mut param = 0;
        if filter.teacher_id.is_some() {
            param += 1;
            query.push_str(&format!(" AND teacher_id = ${param}"));
        }
        if filter.evaluation_period.is_some() {
            param += 1;
            query.push_str(&format!(" AND evaluation_period = ${param}"));
        }
        query.push_str(" ORDER BY created_at, id");

        let mut rows = sqlx::query(&query);
        if let Some(teacher_id) = filter.teacher_id {
            rows = rows.bind(teacher_id);
        }
        if let Some(period) = &filter.evaluation_period {
            rows = rows.bind(period);
        }

        let records = rows.fetch_all(&self.pool).await?;
        Ok(records.iter().map(evaluation_from_row).collect())
    }

    async fn insert_evaluation(&self, evaluation: &Evaluation) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO teacher_evaluation.evaluations
            (id, student_id, teacher_id, evaluation_period, overall, teaching_effectiveness,
             classroom_management, course_content, responsiveness, positive_feedback,
             negative_feedback, suggestions, answers, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (student_id, teacher_id, evaluation_period) DO NOTHING
            "#,
        )
        .bind(evaluation.id)
        .bind(&evaluation.student_id)
        .bind(evaluation.teacher_id)
        .bind(&evaluation.evaluation_period)
        .bind(evaluation.overall)
        .bind(evaluation.teaching_effectiveness)
        .bind(evaluation.classroom_management)
        .bind(evaluation.course_content)
        .bind(evaluation.responsiveness)
        .bind(&evaluation.positive_feedback)
        .bind(&evaluation.negative_feedback)
        .bind(&evaluation.suggestions)
        .bind(Json(&evaluation.answers))
        .bind(evaluation.created_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn query_comment_analysis(
        &self,
        filter: &CommentAnalysisFilter,
    ) -> Result<Vec<CommentAnalysis>> {
        let query = comment_analysis_query(filter);
        let mut rows = sqlx::query(&query);
        if let Some(ids) = &filter.evaluation_ids {
            rows = rows.bind(ids);
        }

        let records = rows.fetch_all(&self.pool).await?;
        records.iter().map(analysis_from_row).collect()
    }

    async fn insert_comment_analysis(&self, records: &[CommentAnalysis]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for record in records {
            sqlx::query(
                r#"
                INSERT INTO teacher_evaluation.comment_analysis
                (id, evaluation_id, comment_text, comment_type, is_flagged, flag_reason,
                 language_detected)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(record.id)
            .bind(record.evaluation_id)
            .bind(&record.comment_text)
            .bind(record.comment_type.as_str())
            .bind(record.is_flagged)
            .bind(record.flag_reason.map(|reason| reason.as_str()))
            .bind(record.language_detected.as_str())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn upsert_teacher_result(&self, result: &TeacherEvaluationResult) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO teacher_evaluation.teacher_results
            (teacher_id, evaluation_period, overall_rating, total_evaluations, average_scores,
             positive_comments, negative_comments, suggestions, flagged_comments)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (teacher_id, evaluation_period) DO UPDATE
            SET overall_rating = EXCLUDED.overall_rating,
                total_evaluations = EXCLUDED.total_evaluations,
                average_scores = EXCLUDED.average_scores,
                positive_comments = EXCLUDED.positive_comments,
                negative_comments = EXCLUDED.negative_comments,
                suggestions = EXCLUDED.suggestions,
                flagged_comments = EXCLUDED.flagged_comments
            "#,
        )
        .bind(result.teacher_id)
        .bind(&result.evaluation_period)
        .bind(result.overall_rating)
        .bind(result.total_evaluations)
        .bind(Json(&result.average_scores))
        .bind(&result.positive_comments)
        .bind(&result.negative_comments)
        .bind(&result.suggestions)
        .bind(&result.flagged_comments)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn query_teacher_results(&self, period: &str) -> Result<Vec<TeacherEvaluationResult>> {
        let rows = sqlx::query(
            "SELECT teacher_id, evaluation_period, overall_rating, total_evaluations, \
             average_scores, positive_comments, negative_comments, suggestions, flagged_comments \
             FROM teacher_evaluation.teacher_results WHERE evaluation_period = $1",
        )
        .bind(period)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(result_from_row).collect())
    }

    async fn query_filter_words(&self) -> Result<BTreeSet<String>> {
        let rows = sqlx::query("SELECT word FROM teacher_evaluation.filter_words")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(|row| row.get("word")).collect())
    }

    async fn insert_filter_word(&self, word: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO teacher_evaluation.filter_words (word) VALUES ($1) \
             ON CONFLICT (word) DO NOTHING",
        )
        .bind(word)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_filter_word(&self, word: &str) -> Result<()> {
        sqlx::query("DELETE FROM teacher_evaluation.filter_words WHERE word = $1")
            .bind(word)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn reset_evaluations(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for statement in [
            "DELETE FROM teacher_evaluation.comment_analysis",
            "DELETE FROM teacher_evaluation.teacher_results",
            "DELETE FROM teacher_evaluation.evaluations",
        ] {
            sqlx::query(statement).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn comment_analysis_rows_are_ordered_by_insertion() {
        let unfiltered = comment_analysis_query(&CommentAnalysisFilter::default());
        assert!(unfiltered.ends_with(" WHERE TRUE ORDER BY created_at, id"));

        let flagged = comment_analysis_query(&CommentAnalysisFilter::flagged_for(vec![Uuid::nil()]));
        assert!(flagged.ends_with(" AND evaluation_id = ANY($1) AND is_flagged ORDER BY created_at, id"));
    }
}
