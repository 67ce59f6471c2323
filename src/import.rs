use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use chrono::Utc;
use serde::Deserialize;
use tracing::warn;
use uuid::Uuid;

use crate::error::{EvaluationError, Result};
use crate::models::{evaluation_period, Evaluation, Teacher};
use crate::store::EvaluationStore;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub inserted: usize,
    pub duplicates: usize,
    pub rejected: usize,
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    teacher_email: String,
    teacher_name: String,
    department: String,
    student_id: String,
    semester: String,
    school_year: String,
    overall: i16,
    teaching_effectiveness: i16,
    classroom_management: i16,
    course_content: i16,
    responsiveness: i16,
    positive_feedback: Option<String>,
    negative_feedback: Option<String>,
    suggestions: Option<String>,
    /// JSON object of question id to rating, e.g. `{"q1": 5}`.
    answers: Option<String>,
}

fn blank_to_none(value: Option<String>) -> Option<String> {
    value.filter(|text| !text.trim().is_empty())
}

/// Inserts the teacher if needed and returns the id the store knows it by.
async fn resolve_teacher<S>(
    store: &S,
    known: &mut HashMap<String, Uuid>,
    email: &str,
    full_name: &str,
    department: &str,
) -> Result<Uuid>
where
    S: EvaluationStore + ?Sized,
{
    if let Some(id) = known.get(email) {
        return Ok(*id);
    }

    store
        .insert_teacher(&Teacher {
            id: Uuid::new_v4(),
            full_name: full_name.to_string(),
            department: department.to_string(),
            email: email.to_string(),
        })
        .await?;

    let teachers = store.query_teachers().await?;
    known.extend(teachers.into_iter().map(|t| (t.email, t.id)));
    known
        .get(email)
        .copied()
        .ok_or_else(|| EvaluationError::validation(format!("teacher {email} was not stored")))
}

pub async fn import_csv<S>(store: &S, csv_path: &Path) -> Result<ImportSummary>
where
    S: EvaluationStore + ?Sized,
{
    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut known: HashMap<String, Uuid> = store
        .query_teachers()
        .await?
        .into_iter()
        .map(|t| (t.email, t.id))
        .collect();
    let mut summary = ImportSummary::default();

    for (index, result) in reader.deserialize::<CsvRow>().enumerate() {
        let line = index + 2;
        let row = result?;
        let answers: BTreeMap<String, i16> = match blank_to_none(row.answers) {
            Some(raw) => serde_json::from_str(&raw)?,
            None => BTreeMap::new(),
        };

        let teacher_id = resolve_teacher(
            store,
            &mut known,
            row.teacher_email.trim(),
            row.teacher_name.trim(),
            row.department.trim(),
        )
        .await?;

        let evaluation = Evaluation {
            id: Uuid::new_v4(),
            student_id: row.student_id.trim().to_string(),
            teacher_id,
            evaluation_period: evaluation_period(&row.semester, &row.school_year),
            overall: row.overall,
            teaching_effectiveness: row.teaching_effectiveness,
            classroom_management: row.classroom_management,
            course_content: row.course_content,
            responsiveness: row.responsiveness,
            positive_feedback: blank_to_none(row.positive_feedback),
            negative_feedback: blank_to_none(row.negative_feedback),
            suggestions: blank_to_none(row.suggestions),
            answers,
            created_at: Utc::now(),
        };

        if let Err(err) = evaluation.validate() {
            warn!(line, error = %err, "skipping invalid evaluation row");
            summary.rejected += 1;
            continue;
        }

        if store.insert_evaluation(&evaluation).await? {
            summary.inserted += 1;
        } else {
            summary.duplicates += 1;
        }
    }

    Ok(summary)
}

pub async fn seed<S>(store: &S, period: &str) -> Result<ImportSummary>
where
    S: EvaluationStore + ?Sized,
{
    let teachers = vec![
        (
            Uuid::parse_str("6f1d7c9e-3b7a-4a52-9c1e-5d0a2b8e4f11").map_err(invalid_seed)?,
            "Maria Santos",
            "Computer Studies",
            "maria.santos@school.edu.ph",
        ),
        (
            Uuid::parse_str("2b8c4e61-0d9f-4f3a-8a27-7e5c1b9d3a42").map_err(invalid_seed)?,
            "Jose Dela Cruz",
            "Mathematics",
            "jose.delacruz@school.edu.ph",
        ),
        (
            Uuid::parse_str("c4a9e2d7-5f18-4b6c-b3e0-91f7a6d2c853").map_err(invalid_seed)?,
            "Liza Reyes",
            "Languages",
            "liza.reyes@school.edu.ph",
        ),
    ];

    let mut known = HashMap::new();
    for (id, full_name, department, email) in &teachers {
        store
            .insert_teacher(&Teacher {
                id: *id,
                full_name: full_name.to_string(),
                department: department.to_string(),
                email: email.to_string(),
            })
            .await?;
        known.insert(email.to_string(), *id);
    }
    for teacher in store.query_teachers().await? {
        known.insert(teacher.email, teacher.id);
    }

    let evaluations = [
        (
            "maria.santos@school.edu.ph",
            "2023-00114",
            [5, 5, 4, 5, 5],
            Some("The teacher was helpful and explained the lesson clearly"),
            None,
            Some("More hands-on lab activities in class"),
        ),
        (
            "maria.santos@school.edu.ph",
            "2023-00231",
            [4, 4, 4, 5, 3],
            Some("Ang mga guro ay napaka mabait sa amin"),
            Some("Replies to messages are slow"),
            None,
        ),
        (
            "jose.delacruz@school.edu.ph",
            "2023-00114",
            [3, 3, 2, 4, 3],
            Some("Knows the subject very well"),
            Some("bobo ka"),
            Some("aaaaaa"),
        ),
        (
            "jose.delacruz@school.edu.ph",
            "2023-00302",
            [4, 3, 4, 4, 4],
            None,
            Some("The lessons move too fast for the class"),
            Some("Post the slides before class"),
        ),
        (
            "liza.reyes@school.edu.ph",
            "2023-00231",
            [5, 5, 5, 5, 5],
            Some("Magaling magturo si ma'am, very good class"),
            None,
            None,
        ),
    ];

    let mut summary = ImportSummary::default();
    for (email, student_id, ratings, positive, negative, suggestions) in evaluations {
        let teacher_id = known
            .get(email)
            .copied()
            .ok_or_else(|| EvaluationError::validation(format!("unknown seed teacher {email}")))?;
        let evaluation = Evaluation {
            id: Uuid::new_v4(),
            student_id: student_id.to_string(),
            teacher_id,
            evaluation_period: period.to_string(),
            overall: ratings[0],
            teaching_effectiveness: ratings[1],
            classroom_management: ratings[2],
            course_content: ratings[3],
            responsiveness: ratings[4],
            positive_feedback: positive.map(str::to_string),
            negative_feedback: negative.map(str::to_string),
            suggestions: suggestions.map(str::to_string),
            answers: (1..=10)
                .map(|q| (format!("q{q}"), ratings[q % ratings.len()]))
                .collect(),
            created_at: Utc::now(),
        };

        if store.insert_evaluation(&evaluation).await? {
            summary.inserted += 1;
        } else {
            summary.duplicates += 1;
        }
    }

    Ok(summary)
}

fn invalid_seed(err: uuid::Error) -> EvaluationError {
    EvaluationError::validation(format!("invalid seed id: {err}"))
}
