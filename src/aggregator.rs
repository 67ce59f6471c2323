use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use tracing::{error, info};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    CommentAnalysisFilter, Evaluation, EvaluationFilter, Teacher, TeacherEvaluationResult,
};
use crate::store::EvaluationStore;

/// Maps the 1-5 questionnaire scale onto 0-100.
pub const RATING_SCALE_FACTOR: f64 = 20.0;

pub const CATEGORIES: [&str; 4] = [
    "teaching_effectiveness",
    "classroom_management",
    "course_content",
    "responsiveness",
];

#[derive(Debug, Clone, PartialEq)]
pub struct RankedTeacher {
    pub rank: usize,
    pub teacher_id: Uuid,
    pub teacher_name: String,
    pub department: String,
    pub overall_rating: f64,
    pub total_evaluations: i32,
}

pub fn rating_to_percentage(rating: f64) -> f64 {
    rating * RATING_SCALE_FACTOR
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Folds one teacher's evaluations into a result row. Returns `None` when
/// there is nothing to aggregate.
pub fn summarize(
    teacher_id: Uuid,
    evaluation_period: &str,
    evaluations: &[Evaluation],
    flagged_comments: Vec<String>,
) -> Option<TeacherEvaluationResult> {
    if evaluations.is_empty() {
        return None;
    }

    let count = evaluations.len() as f64;
    let mut totals = [0.0f64; 5];
    for evaluation in evaluations {
        for (total, rating) in totals.iter_mut().zip(evaluation.ratings()) {
            *total += f64::from(rating);
        }
    }
    let percentage = |total: f64| round2(rating_to_percentage(total / count));

    let average_scores: BTreeMap<String, f64> = CATEGORIES
        .iter()
        .zip(&totals[1..])
        .map(|(name, total)| (name.to_string(), percentage(*total)))
        .collect();

    Some(TeacherEvaluationResult {
        teacher_id,
        evaluation_period: evaluation_period.to_string(),
        overall_rating: percentage(totals[0]),
        total_evaluations: evaluations.len() as i32,
        average_scores,
        positive_comments: non_empty(evaluations, |e| e.positive_feedback.as_deref()),
        negative_comments: non_empty(evaluations, |e| e.negative_feedback.as_deref()),
        suggestions: non_empty(evaluations, |e| e.suggestions.as_deref()),
        flagged_comments,
    })
}

fn non_empty<F>(evaluations: &[Evaluation], field: F) -> Vec<String>
where
    F: Fn(&Evaluation) -> Option<&str>,
{
    evaluations
        .iter()
        .filter_map(field)
        .filter(|text| !text.trim().is_empty())
        .map(str::to_string)
        .collect()
}

/// Reads one teacher's rows and builds the result without writing it.
pub async fn compute_teacher<S>(
    store: &S,
    teacher_id: Uuid,
    evaluation_period: &str,
) -> Result<Option<TeacherEvaluationResult>>
where
    S: EvaluationStore + ?Sized,
{
    // Every submission for the teacher is folded in regardless of its own
    // period; `evaluation_period` only labels the stored result.
    let evaluations = store
        .query_evaluations(&EvaluationFilter::for_teacher(teacher_id))
        .await?;
    if evaluations.is_empty() {
        return Ok(None);
    }

    let ids = evaluations.iter().map(|e| e.id).collect();
    let flagged = store
        .query_comment_analysis(&CommentAnalysisFilter::flagged_for(ids))
        .await?
        .into_iter()
        .map(|analysis| analysis.comment_text)
        .collect();

    Ok(summarize(teacher_id, evaluation_period, &evaluations, flagged))
}

/// Recomputes every teacher's result for `evaluation_period`.
///
/// A failure for one teacher is logged and the pass moves on; only a failure
/// to enumerate teachers is returned.
pub async fn compute_results<S>(store: &S, evaluation_period: &str) -> Result<()>
where
    S: EvaluationStore + ?Sized,
{
    let teachers = store.query_teachers().await?;
    let mut written = 0usize;
    let mut skipped = 0usize;
    let mut failed = 0usize;

    for teacher in &teachers {
        let result = match compute_teacher(store, teacher.id, evaluation_period).await {
            Ok(Some(result)) => result,
            Ok(None) => {
                skipped += 1;
                continue;
            }
            Err(err) => {
                error!(teacher_id = %teacher.id, error = %err, "failed to load evaluations");
                failed += 1;
                continue;
            }
        };

        match store.upsert_teacher_result(&result).await {
            Ok(()) => {
                written += 1;
                info!(
                    teacher_id = %teacher.id,
                    overall_rating = result.overall_rating,
                    total_evaluations = result.total_evaluations,
                    "teacher result written"
                );
            }
            Err(err) => {
                error!(teacher_id = %teacher.id, error = %err, "failed to upsert teacher result");
                failed += 1;
            }
        }
    }

    info!(
        evaluation_period,
        written, skipped, failed, "aggregation pass complete"
    );
    Ok(())
}

/// Orders results by overall rating; equal ratings share a rank.
pub fn rank_results(
    results: &[TeacherEvaluationResult],
    teachers: &[Teacher],
) -> Vec<RankedTeacher> {
    let by_id: HashMap<Uuid, &Teacher> = teachers.iter().map(|t| (t.id, t)).collect();

    let mut ranked: Vec<RankedTeacher> = results
        .iter()
        .map(|result| {
            let teacher = by_id.get(&result.teacher_id);
            RankedTeacher {
                rank: 0,
                teacher_id: result.teacher_id,
                teacher_name: teacher
                    .map(|t| t.full_name.clone())
                    .unwrap_or_else(|| result.teacher_id.to_string()),
                department: teacher.map(|t| t.department.clone()).unwrap_or_default(),
                overall_rating: result.overall_rating,
                total_evaluations: result.total_evaluations,
            }
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.overall_rating
            .partial_cmp(&a.overall_rating)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.total_evaluations.cmp(&a.total_evaluations))
            .then_with(|| a.teacher_name.cmp(&b.teacher_name))
    });

    let mut previous: Option<(f64, usize)> = None;
    for (index, entry) in ranked.iter_mut().enumerate() {
        let rank = match previous {
            Some((rating, rank)) if rating == entry.overall_rating => rank,
            _ => index + 1,
        };
        entry.rank = rank;
        previous = Some((entry.overall_rating, rank));
    }

    ranked
}
