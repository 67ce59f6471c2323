//! Persists classifier output for the comment fields of one evaluation.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::classifier;
use crate::models::{CommentAnalysis, CommentType};
use crate::store::EvaluationStore;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommentInput {
    pub positive_feedback: Option<String>,
    pub negative_feedback: Option<String>,
    pub suggestions: Option<String>,
}

impl CommentInput {
    fn fields(&self) -> [(CommentType, Option<&str>); 3] {
        [
            (CommentType::Positive, self.positive_feedback.as_deref()),
            (CommentType::Negative, self.negative_feedback.as_deref()),
            (CommentType::Suggestion, self.suggestions.as_deref()),
        ]
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AnalysisOutcome {
    pub analyzed: usize,
    pub flagged: usize,
}

/// Classifies each non-empty field and stores one analysis row per field.
///
/// A field whose row cannot be stored is logged and left out of the counts;
/// the remaining fields are still processed.
pub async fn analyze_comments<S>(
    store: &S,
    evaluation_id: Uuid,
    comments: &CommentInput,
) -> AnalysisOutcome
where
    S: EvaluationStore + ?Sized,
{
    let mut outcome = AnalysisOutcome::default();

    for (comment_type, text) in comments.fields() {
        let Some(text) = text else { continue };
        let Some(classification) = classifier::classify(text) else {
            continue;
        };

        let record = CommentAnalysis {
            id: Uuid::new_v4(),
            evaluation_id,
            comment_text: text.to_string(),
            comment_type,
            is_flagged: classification.is_flagged,
            flag_reason: classification.flag_reason,
            language_detected: classification.language,
        };

        if let Err(err) = store.insert_comment_analysis(std::slice::from_ref(&record)).await {
            warn!(
                %evaluation_id,
                comment_type = %comment_type,
                error = %err,
                "failed to store comment analysis"
            );
            continue;
        }

        outcome.analyzed += 1;
        if record.is_flagged {
            outcome.flagged += 1;
        }
    }

    info!(
        %evaluation_id,
        analyzed = outcome.analyzed,
        flagged = outcome.flagged,
        "comments analyzed"
    );
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::models::{CommentAnalysisFilter, FlagReason, Language};
    use crate::store::tests::FailingStore;
    use crate::store::TieredStore;
    use crate::testing::FlakyStore;

    fn input(positive: &str, negative: &str, suggestions: &str) -> CommentInput {
        let some = |text: &str| Some(text.to_string());
        CommentInput {
            positive_feedback: some(positive),
            negative_feedback: some(negative),
            suggestions: some(suggestions),
        }
    }

    #[tokio::test]
    async fn stores_one_row_per_non_empty_field() {
        let store = MemoryStore::new();
        let evaluation_id = Uuid::new_v4();
        let comments = input(
            "The teacher was helpful and explained the lesson clearly",
            "bobo ka",
            "  ",
        );

        let outcome = analyze_comments(&store, evaluation_id, &comments).await;
        assert_eq!(outcome, AnalysisOutcome { analyzed: 2, flagged: 1 });

        let rows = store
            .query_comment_analysis(&CommentAnalysisFilter::default())
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].comment_type, CommentType::Positive);
        assert_eq!(rows[0].language_detected, Language::English);
        assert_eq!(rows[1].comment_type, CommentType::Negative);
        assert_eq!(rows[1].flag_reason, Some(FlagReason::Offensive));
        assert!(rows.iter().all(|row| row.evaluation_id == evaluation_id));
    }

    #[tokio::test]
    async fn missing_fields_are_skipped() {
        let store = MemoryStore::new();
        let comments = CommentInput {
            suggestions: Some("Give more examples in class please".to_string()),
            ..CommentInput::default()
        };

        let outcome = analyze_comments(&store, Uuid::new_v4(), &comments).await;
        assert_eq!(outcome, AnalysisOutcome { analyzed: 1, flagged: 0 });
    }

    #[tokio::test]
    async fn a_failed_field_does_not_abort_the_others() {
        let store = FlakyStore::new(MemoryStore::new());
        let comments = input(
            "Great class and very good lessons",
            "unstorable remark about the subject",
            "12345",
        );

        let outcome = analyze_comments(&store, Uuid::new_v4(), &comments).await;
        assert_eq!(outcome, AnalysisOutcome { analyzed: 2, flagged: 1 });
    }

    #[tokio::test]
    async fn rows_rejected_by_the_primary_are_not_counted() {
        let store = TieredStore::new(FailingStore::rejecting(), MemoryStore::new());
        let comments = input("Great class", "bobo ka", "aaaaaa");

        let outcome = analyze_comments(&store, Uuid::new_v4(), &comments).await;
        assert_eq!(outcome, AnalysisOutcome::default());

        let cached = store
            .fallback()
            .query_comment_analysis(&CommentAnalysisFilter::default())
            .await
            .unwrap();
        assert!(cached.is_empty());
    }

    #[tokio::test]
    async fn rows_are_cached_while_the_primary_is_offline() {
        let store = TieredStore::new(FailingStore::offline(), MemoryStore::new());
        let comments = input("Great class", "bobo ka", "aaaaaa");

        let outcome = analyze_comments(&store, Uuid::new_v4(), &comments).await;
        assert_eq!(outcome, AnalysisOutcome { analyzed: 3, flagged: 2 });
    }
}
