//! HTTP API server for integration with other systems.
//!
//! Provides REST endpoints for chapter splitting, version generation,
//! batch jobs, Lexile classification and listening materials.

use crate::audio::AudioConfig;
use crate::cli::Output;
use crate::config::Settings;
use crate::error::ReadLevelError;
use crate::import::{FieldMapping, ImportOptions};
use crate::material::NewMaterial;
use crate::pipeline::{BatchGenerate, CreateVersion, Pipeline};
use crate::review::ReviewDecision;
use crate::splitter::SplitStrategy;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

/// Shared application state.
struct AppState {
    pipeline: Pipeline,
}

/// Run the HTTP API server.
pub async fn run_serve(host: &str, port: u16, settings: Settings) -> anyhow::Result<()> {
    let pipeline = Pipeline::new(settings)?;
    let app = router(pipeline);

    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    Output::header("Readlevel API Server");
    println!();
    Output::success(&format!("Listening on http://{}", addr));
    println!();
    println!("Endpoints:");
    Output::kv("Health", "GET  /health");
    Output::kv("Split", "POST /books/:id/split");
    Output::kv("Chapters", "GET  /books/:id/chapters");
    Output::kv("Batch generate", "POST /books/:id/versions/batch");
    Output::kv("Versions", "GET|POST /chapters/:id/versions");
    Output::kv("Publish", "POST /versions/:id/publish");
    Output::kv("Jobs", "GET  /jobs, GET /jobs/:id, POST /jobs/:id/cancel");
    Output::kv("Lexile", "POST /lexile/classify, POST /lexile/estimate");
    Output::kv("Listening", "GET|POST /listening, POST /listening/import");
    println!();
    Output::info("Press Ctrl+C to stop the server.");

    axum::serve(listener, app).await?;

    Ok(())
}

/// Build the API router around a pipeline.
pub fn router(pipeline: Pipeline) -> Router {
    let state = Arc::new(AppState { pipeline });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/books/{book_id}/split", post(split_book))
        .route("/books/{book_id}/chapters", get(list_chapters))
        .route("/books/{book_id}/versions/batch", post(batch_generate))
        .route("/chapters/{chapter_id}/versions", get(list_versions).post(create_version))
        .route("/versions/{version_id}", delete(delete_version))
        .route("/versions/{version_id}/publish", post(publish_version))
        .route("/versions/{version_id}/compare/{other_id}", get(compare_versions))
        .route("/jobs", get(list_jobs))
        .route("/jobs/{job_id}", get(get_job))
        .route("/jobs/{job_id}/cancel", post(cancel_job))
        .route("/lexile/classify", post(classify))
        .route("/lexile/estimate", post(estimate))
        .route("/listening", get(list_materials).post(add_material))
        .route("/listening/import", post(import_materials))
        .route("/listening/batch-match", post(batch_match))
        .route("/listening/batch-review", post(batch_review))
        .route("/listening/{material_id}/match-audio", post(match_audio))
        .route("/listening/{material_id}/review", post(review))
        .route("/listening/{material_id}/reset", post(reset_review))
        .route("/listening/{material_id}/reviews", get(review_history))
        .layer(cors)
        .with_state(state)
}

// === Request/Response Types ===

#[derive(Deserialize)]
struct SplitRequest {
    text: String,
    #[serde(default)]
    max_words: Option<usize>,
    #[serde(default)]
    strategy: Option<SplitStrategy>,
    /// Replace the book's existing chapters
    #[serde(default)]
    replace: bool,
}

#[derive(Deserialize)]
struct ClassifyRequest {
    score: i32,
}

#[derive(Deserialize)]
struct EstimateRequest {
    text: String,
}

#[derive(Deserialize)]
struct BatchMatchRequest {
    material_ids: Vec<Uuid>,
    #[serde(default)]
    config: AudioConfig,
}

#[derive(Deserialize)]
struct BatchReviewRequest {
    material_ids: Vec<Uuid>,
    #[serde(flatten)]
    decision: ReviewDecision,
    /// Run as a tracked job instead of inline.
    #[serde(default)]
    background: bool,
}

#[derive(Deserialize)]
struct ImportRequest {
    table_id: String,
    mapping: FieldMapping,
    #[serde(default)]
    options: Option<ImportOptions>,
}

#[derive(Serialize)]
struct JobResponse {
    job_id: Uuid,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// HTTP status for an error.
fn status_for(error: &ReadLevelError) -> StatusCode {
    match error {
        ReadLevelError::Validation(_) => StatusCode::BAD_REQUEST,
        ReadLevelError::NotFound(_) => StatusCode::NOT_FOUND,
        ReadLevelError::Conflict(_) => StatusCode::CONFLICT,
        ReadLevelError::ExternalService(_) | ReadLevelError::OpenAI(_) | ReadLevelError::Http(_) => {
            StatusCode::BAD_GATEWAY
        }
        ReadLevelError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(error: ReadLevelError) -> Response {
    (
        status_for(&error),
        Json(ErrorResponse {
            error: error.to_string(),
        }),
    )
        .into_response()
}

fn respond<T: Serialize>(result: crate::Result<T>) -> Response {
    respond_with(StatusCode::OK, result)
}

fn respond_with<T: Serialize>(status: StatusCode, result: crate::Result<T>) -> Response {
    match result {
        Ok(value) => (status, Json(value)).into_response(),
        Err(e) => error_response(e),
    }
}

fn respond_job(result: crate::Result<Uuid>) -> Response {
    respond_with(StatusCode::ACCEPTED, result.map(|job_id| JobResponse { job_id }))
}

// === Handlers ===

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn split_book(
    State(state): State<Arc<AppState>>,
    Path(book_id): Path<String>,
    Json(req): Json<SplitRequest>,
) -> Response {
    respond_with(
        StatusCode::CREATED,
        state
            .pipeline
            .split_book(&book_id, &req.text, req.max_words, req.strategy, req.replace)
            .await,
    )
}

async fn list_chapters(State(state): State<Arc<AppState>>, Path(book_id): Path<String>) -> Response {
    respond(state.pipeline.list_chapters(&book_id).await)
}

async fn batch_generate(
    State(state): State<Arc<AppState>>,
    Path(book_id): Path<String>,
    Json(req): Json<BatchGenerate>,
) -> Response {
    respond_job(state.pipeline.batch_generate(&book_id, &req).await)
}

async fn create_version(
    State(state): State<Arc<AppState>>,
    Path(chapter_id): Path<Uuid>,
    Json(req): Json<CreateVersion>,
) -> Response {
    respond_with(StatusCode::CREATED, state.pipeline.create_version(chapter_id, &req).await)
}

async fn list_versions(State(state): State<Arc<AppState>>, Path(chapter_id): Path<Uuid>) -> Response {
    respond(state.pipeline.list_versions(chapter_id).await)
}

async fn publish_version(State(state): State<Arc<AppState>>, Path(version_id): Path<Uuid>) -> Response {
    respond(state.pipeline.publish_version(version_id).await)
}

async fn delete_version(State(state): State<Arc<AppState>>, Path(version_id): Path<Uuid>) -> Response {
    match state.pipeline.delete_version(version_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(e),
    }
}

async fn compare_versions(
    State(state): State<Arc<AppState>>,
    Path((left, right)): Path<(Uuid, Uuid)>,
) -> Response {
    respond(state.pipeline.compare_versions(left, right).await)
}

async fn list_jobs(State(state): State<Arc<AppState>>) -> Response {
    respond(state.pipeline.list_jobs())
}

async fn get_job(State(state): State<Arc<AppState>>, Path(job_id): Path<Uuid>) -> Response {
    respond(state.pipeline.job_status(job_id))
}

async fn cancel_job(State(state): State<Arc<AppState>>, Path(job_id): Path<Uuid>) -> Response {
    respond(state.pipeline.cancel_job(job_id))
}

async fn classify(State(state): State<Arc<AppState>>, Json(req): Json<ClassifyRequest>) -> Response {
    respond(state.pipeline.classify(req.score))
}

async fn estimate(State(state): State<Arc<AppState>>, Json(req): Json<EstimateRequest>) -> Response {
    respond(state.pipeline.estimate(&req.text).await)
}

async fn list_materials(State(state): State<Arc<AppState>>) -> Response {
    respond(state.pipeline.list_materials().await)
}

async fn add_material(State(state): State<Arc<AppState>>, Json(req): Json<NewMaterial>) -> Response {
    respond_with(StatusCode::CREATED, state.pipeline.add_material(req).await)
}

async fn match_audio(
    State(state): State<Arc<AppState>>,
    Path(material_id): Path<Uuid>,
    Json(config): Json<AudioConfig>,
) -> Response {
    respond(state.pipeline.match_audio(material_id, &config).await)
}

async fn batch_match(State(state): State<Arc<AppState>>, Json(req): Json<BatchMatchRequest>) -> Response {
    respond_job(state.pipeline.batch_match(&req.material_ids, req.config).await)
}

async fn review(
    State(state): State<Arc<AppState>>,
    Path(material_id): Path<Uuid>,
    Json(decision): Json<ReviewDecision>,
) -> Response {
    respond(state.pipeline.review(material_id, &decision).await)
}

async fn reset_review(State(state): State<Arc<AppState>>, Path(material_id): Path<Uuid>) -> Response {
    respond(state.pipeline.reset_review(material_id).await)
}

async fn review_history(State(state): State<Arc<AppState>>, Path(material_id): Path<Uuid>) -> Response {
    respond(state.pipeline.review_history(material_id).await)
}

async fn batch_review(State(state): State<Arc<AppState>>, Json(req): Json<BatchReviewRequest>) -> Response {
    if req.background {
        return respond_job(state.pipeline.review_job(&req.material_ids, &req.decision).await);
    }
    respond(state.pipeline.batch_review(&req.material_ids, &req.decision).await)
}

async fn import_materials(State(state): State<Arc<AppState>>, Json(req): Json<ImportRequest>) -> Response {
    respond(
        state
            .pipeline
            .import_materials(&req.table_id, &req.mapping, req.options)
            .await,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioMatcher;
    use crate::import::{TableRecord, TableSource};
    use crate::lexile::HeuristicAssessor;
    use crate::pipeline::Components;
    use crate::retry::RetryPolicy;
    use crate::splitter::ChapterSplitter;
    use crate::store::MemoryContentStore;
    use crate::versions::Rewriter;
    use async_trait::async_trait;
    use serde_json::{json, Value};

    struct FirstWords;

    #[async_trait]
    impl Rewriter for FirstWords {
        async fn rewrite(&self, text: &str, _difficulty: u8, _target: Option<i32>) -> crate::Result<String> {
            Ok(text.split_whitespace().take(10).collect::<Vec<_>>().join(" "))
        }
    }

    struct NoTables;

    #[async_trait]
    impl TableSource for NoTables {
        async fn fetch_records(&self, table_id: &str) -> crate::Result<Vec<TableRecord>> {
            Err(ReadLevelError::NotFound(format!("Table {} not found", table_id)))
        }
    }

    async fn spawn_server() -> String {
        let pipeline = Pipeline::with_components(
            Settings::default(),
            Components {
                store: Arc::new(MemoryContentStore::new()),
                rewriter: Arc::new(FirstWords),
                assessor: Arc::new(HeuristicAssessor::new()),
                splitter: ChapterSplitter::new(),
                matcher: AudioMatcher::new(RetryPolicy::none()),
                table_source: Arc::new(NoTables),
            },
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(pipeline)).await.unwrap();
        });
        format!("http://{}", addr)
    }

    const BOOK: &str = "The fox ran through the woods at night.\n\nA quiet owl watched from the old oak tree.";

    #[tokio::test]
    async fn test_health() {
        let base = spawn_server().await;
        let res = reqwest::get(format!("{}/health", base)).await.unwrap();
        assert_eq!(res.status(), 200);
    }

    #[tokio::test]
    async fn test_split_generate_publish() {
        let base = spawn_server().await;
        let client = reqwest::Client::new();

        let res = client
            .post(format!("{}/books/b1/split", base))
            .json(&json!({ "text": BOOK, "max_words": 50 }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 201);
        let chapters: Vec<Value> = res.json().await.unwrap();
        assert_eq!(chapters.len(), 1);
        let chapter_id = chapters[0]["id"].as_str().unwrap().to_string();

        let body = json!({ "version_label": "1.0.0", "difficulty": 2, "target_lexile": 500, "created_by": "test" });
        let res = client
            .post(format!("{}/chapters/{}/versions", base, chapter_id))
            .json(&body)
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 201);
        let version: Value = res.json().await.unwrap();
        assert_eq!(version["lexile_level"], 500);

        let res = client
            .post(format!("{}/chapters/{}/versions", base, chapter_id))
            .json(&body)
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 409);

        let res = client
            .post(format!("{}/versions/{}/publish", base, version["id"].as_str().unwrap()))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 200);
        let published: Value = res.json().await.unwrap();
        assert_eq!(published["status"], "published");
    }

    #[tokio::test]
    async fn test_error_statuses() {
        let base = spawn_server().await;
        let client = reqwest::Client::new();

        let res = client
            .post(format!("{}/lexile/classify", base))
            .json(&json!({ "score": -5 }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 400);

        let res = client
            .post(format!("{}/listening/{}/reset", base, Uuid::new_v4()))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 404);

        let res = client.get(format!("{}/jobs/{}", base, Uuid::new_v4())).send().await.unwrap();
        assert_eq!(res.status(), 404);

        let res = client
            .post(format!("{}/listening/import", base))
            .json(&json!({ "table_id": "missing", "mapping": { "Name": "title", "Body": "content" } }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 404);
    }

    #[tokio::test]
    async fn test_material_review() {
        let base = spawn_server().await;
        let client = reqwest::Client::new();

        let res = client
            .post(format!("{}/listening", base))
            .json(&json!({ "title": "At the market", "content": "We buy apples and bread." }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 201);
        let material: Value = res.json().await.unwrap();
        let id = material["id"].as_str().unwrap().to_string();

        let decision = json!({ "verdict": "approved", "rating": 4, "feedback": "Clear audio" });
        let res = client
            .post(format!("{}/listening/{}/review", base, id))
            .json(&decision)
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 200);

        let res = client
            .post(format!("{}/listening/{}/review", base, id))
            .json(&decision)
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 409);

        let history: Vec<Value> = client
            .get(format!("{}/listening/{}/reviews", base, id))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(history.len(), 1);
    }
}
