use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EvaluationError;

pub const RATING_RANGE: std::ops::RangeInclusive<i16> = 1..=5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Teacher {
    pub id: Uuid,
    pub full_name: String,
    pub department: String,
    pub email: String,
}

/// One student's submission for one teacher in one evaluation period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub id: Uuid,
    pub student_id: String,
    pub teacher_id: Uuid,
    pub evaluation_period: String,
    pub overall: i16,
    pub teaching_effectiveness: i16,
    pub classroom_management: i16,
    pub course_content: i16,
    pub responsiveness: i16,
    pub positive_feedback: Option<String>,
    pub negative_feedback: Option<String>,
    pub suggestions: Option<String>,
    pub answers: BTreeMap<String, i16>,
    pub created_at: DateTime<Utc>,
}

impl Evaluation {
    pub fn ratings(&self) -> [i16; 5] {
        [
            self.overall,
            self.teaching_effectiveness,
            self.classroom_management,
            self.course_content,
            self.responsiveness,
        ]
    }

    /// Checks the submission invariants: every rating and answer in 1..=5
    /// and a non-empty student reference.
    pub fn validate(&self) -> Result<(), EvaluationError> {
        if self.student_id.trim().is_empty() {
            return Err(EvaluationError::validation("student id is required"));
        }

        let fields = [
            "overall",
            "teaching_effectiveness",
            "classroom_management",
            "course_content",
            "responsiveness",
        ];
        for (field, rating) in fields.iter().zip(self.ratings()) {
            if !RATING_RANGE.contains(&rating) {
                return Err(EvaluationError::validation(format!(
                    "{field} rating {rating} is outside 1-5"
                )));
            }
        }
        for (question, rating) in &self.answers {
            if !RATING_RANGE.contains(rating) {
                return Err(EvaluationError::validation(format!(
                    "answer to question {question} is outside 1-5"
                )));
            }
        }

        Ok(())
    }

    /// All free-text fields joined with spaces, skipping blanks.
    pub fn combined_comments(&self) -> String {
        [
            self.positive_feedback.as_deref(),
            self.negative_feedback.as_deref(),
            self.suggestions.as_deref(),
        ]
        .into_iter()
        .flatten()
        .filter(|text| !text.trim().is_empty())
        .collect::<Vec<_>>()
        .join(" ")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommentType {
    Positive,
    Negative,
    Suggestion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlagReason {
    Offensive,
    Spam,
    Unrelated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    English,
    Tagalog,
    Taglish,
}

macro_rules! text_enum {
    ($ty:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = EvaluationError;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                match value {
                    $($text => Ok($ty::$variant),)+
                    other => Err(EvaluationError::Validation(format!(
                        "unknown {} value '{other}'",
                        stringify!($ty)
                    ))),
                }
            }
        }
    };
}

text_enum!(CommentType {
    Positive => "positive",
    Negative => "negative",
    Suggestion => "suggestion",
});

text_enum!(FlagReason {
    Offensive => "offensive",
    Spam => "spam",
    Unrelated => "unrelated",
});

text_enum!(Language {
    English => "english",
    Tagalog => "tagalog",
    Taglish => "taglish",
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentAnalysis {
    pub id: Uuid,
    pub evaluation_id: Uuid,
    pub comment_text: String,
    pub comment_type: CommentType,
    pub is_flagged: bool,
    pub flag_reason: Option<FlagReason>,
    pub language_detected: Language,
}

/// Materialized aggregate, one per (teacher, evaluation period).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeacherEvaluationResult {
    pub teacher_id: Uuid,
    pub evaluation_period: String,
    pub overall_rating: f64,
    pub total_evaluations: i32,
    pub average_scores: BTreeMap<String, f64>,
    pub positive_comments: Vec<String>,
    pub negative_comments: Vec<String>,
    pub suggestions: Vec<String>,
    pub flagged_comments: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct EvaluationFilter {
    pub teacher_id: Option<Uuid>,
    pub evaluation_period: Option<String>,
}

impl EvaluationFilter {
    pub fn for_teacher(teacher_id: Uuid) -> Self {
        Self {
            teacher_id: Some(teacher_id),
            ..Self::default()
        }
    }

    pub fn matches(&self, evaluation: &Evaluation) -> bool {
        self.teacher_id.map_or(true, |id| evaluation.teacher_id == id)
            && self
                .evaluation_period
                .as_deref()
                .map_or(true, |period| evaluation.evaluation_period == period)
    }
}

#[derive(Debug, Clone, Default)]
pub struct CommentAnalysisFilter {
    pub evaluation_ids: Option<Vec<Uuid>>,
    pub flagged_only: bool,
}

impl CommentAnalysisFilter {
    pub fn flagged_for(evaluation_ids: Vec<Uuid>) -> Self {
        Self {
            evaluation_ids: Some(evaluation_ids),
            flagged_only: true,
        }
    }

    pub fn matches(&self, analysis: &CommentAnalysis) -> bool {
        (!self.flagged_only || analysis.is_flagged)
            && self
                .evaluation_ids
                .as_ref()
                .map_or(true, |ids| ids.contains(&analysis.evaluation_id))
    }
}

/// Builds the period key stored alongside evaluations and results.
pub fn evaluation_period(semester: &str, school_year: &str) -> String {
    format!("{} {}", semester.trim(), school_year.trim())
}
