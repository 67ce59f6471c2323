use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tracing::error;
use uuid::Uuid;

use crate::aggregator;
use crate::analysis::{self, AnalysisOutcome, CommentInput};
use crate::store::EvaluationStore;

pub type SharedState = Arc<AppState>;

pub struct AppState {
    pub store: Arc<dyn EvaluationStore>,
    pub evaluation_period: String,
}

type ApiError = (StatusCode, Json<Value>);

#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    pub evaluation_id: Uuid,
    #[serde(flatten)]
    pub comments: CommentInput,
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/api/compute-results", post(compute_results))
        .route("/api/analyze-comments", post(analyze_comments))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn compute_results(State(state): State<SharedState>) -> Result<Json<Value>, ApiError> {
    aggregator::compute_results(state.store.as_ref(), &state.evaluation_period)
        .await
        .map_err(|err| {
            error!(error = %err, "compute results failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "success": false, "error": err.to_string() })),
            )
        })?;

    Ok(Json(json!({ "success": true })))
}

pub async fn analyze_comments(
    State(state): State<SharedState>,
    Json(request): Json<AnalyzeRequest>,
) -> Json<AnalysisOutcome> {
    let outcome =
        analysis::analyze_comments(state.store.as_ref(), request.evaluation_id, &request.comments)
            .await;
    Json(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::store::tests::FailingStore;
    use crate::testing::{sample_evaluation, sample_teacher};

    const PERIOD: &str = "2nd Semester 2025-2026";

    fn state(store: Arc<dyn EvaluationStore>) -> SharedState {
        Arc::new(AppState {
            store,
            evaluation_period: PERIOD.to_string(),
        })
    }

    #[tokio::test]
    async fn compute_results_reports_success() {
        let store = Arc::new(MemoryStore::new());
        let teacher = sample_teacher("Liza Reyes");
        store.insert_teacher(&teacher).await.unwrap();
        store
            .insert_evaluation(&sample_evaluation(teacher.id, "s1", 4))
            .await
            .unwrap();

        let Json(body) = compute_results(State(state(store.clone()))).await.unwrap();
        assert_eq!(body, json!({ "success": true }));
        assert_eq!(store.query_teacher_results(PERIOD).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn compute_results_fails_when_teachers_cannot_be_listed() {
        let (status, Json(body)) = compute_results(State(state(Arc::new(FailingStore::offline()))))
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["success"], json!(false));
    }

    #[tokio::test]
    async fn analyze_request_accepts_flat_comment_fields() {
        let request: AnalyzeRequest = serde_json::from_value(json!({
            "evaluation_id": Uuid::nil(),
            "positive_feedback": "Very good teacher, explains every lesson",
            "suggestions": "aaaaaa"
        }))
        .unwrap();

        let Json(outcome) =
            analyze_comments(State(state(Arc::new(MemoryStore::new()))), Json(request)).await;
        assert_eq!(outcome, AnalysisOutcome { analyzed: 2, flagged: 1 });
    }
}
