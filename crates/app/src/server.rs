use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use docqa_core::{AnswerGenerator, AnswerSet, DocumentLoader, Embedder, QaPipeline, QaRequest};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub struct AppState<L, E, G>
where
    L: DocumentLoader,
    E: Embedder,
    G: AnswerGenerator,
{
    pub pipeline: Arc<QaPipeline<L, E, G>>,
    pub bearer_token: Arc<str>,
    pub request_timeout: Option<Duration>,
}

impl<L, E, G> Clone for AppState<L, E, G>
where
    L: DocumentLoader,
    E: Embedder,
    G: AnswerGenerator,
{
    fn clone(&self) -> Self {
        Self {
            pipeline: Arc::clone(&self.pipeline),
            bearer_token: Arc::clone(&self.bearer_token),
            request_timeout: self.request_timeout,
        }
    }
}

impl<L, E, G> AppState<L, E, G>
where
    L: DocumentLoader,
    E: Embedder,
    G: AnswerGenerator,
{
    /// Rejects a blank bearer token so the guard never compares against "".
    pub fn new(
        pipeline: QaPipeline<L, E, G>,
        bearer_token: &str,
        request_timeout: Option<Duration>,
    ) -> anyhow::Result<Self> {
        let bearer_token = bearer_token.trim();
        anyhow::ensure!(!bearer_token.is_empty(), "bearer token must not be blank");
        Ok(Self {
            pipeline: Arc::new(pipeline),
            bearer_token: Arc::from(bearer_token),
            request_timeout,
        })
    }
}

#[derive(Debug)]
pub enum ApiError {
    Unauthorized(&'static str),
    InvalidInput(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            ApiError::Unauthorized(detail) => (StatusCode::UNAUTHORIZED, detail.to_string()),
            ApiError::InvalidInput(detail) => (StatusCode::UNPROCESSABLE_ENTITY, detail),
            ApiError::Internal(detail) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Internal server error: {detail}"),
            ),
        };
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

pub fn app_router<L, E, G>(state: AppState<L, E, G>) -> Router
where
    L: DocumentLoader + 'static,
    E: Embedder + 'static,
    G: AnswerGenerator + 'static,
{
    Router::new()
        .route("/health", get(health))
        .route("/hackrx/run", post(run_questions::<L, E, G>))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

pub async fn run_server<L, E, G>(bind: &str, state: AppState<L, E, G>) -> anyhow::Result<()>
where
    L: DocumentLoader + 'static,
    E: Embedder + 'static,
    G: AnswerGenerator + 'static,
{
    let addr: SocketAddr = bind
        .parse()
        .with_context(|| format!("invalid bind address {bind}"))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("docqa listening on http://{}", addr);

    axum::serve(listener, app_router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown requested");
        })
        .await?;
    Ok(())
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok", "service": "docqa" }))
}

fn authorize(headers: &HeaderMap, expected: &str) -> Result<(), ApiError> {
    let token = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or(ApiError::Unauthorized(
            "Missing or invalid Authorization header",
        ))?;

    if token.trim() != expected {
        return Err(ApiError::Unauthorized("Unauthorized"));
    }
    Ok(())
}

async fn run_questions<L, E, G>(
    State(state): State<AppState<L, E, G>>,
    headers: HeaderMap,
    payload: Result<Json<QaRequest>, JsonRejection>,
) -> Result<Json<AnswerSet>, ApiError>
where
    L: DocumentLoader + 'static,
    E: Embedder + 'static,
    G: AnswerGenerator + 'static,
{
    authorize(&headers, &state.bearer_token)?;

    let Json(request) = payload.map_err(|rejection| ApiError::InvalidInput(rejection.body_text()))?;
    request
        .validate()
        .map_err(|error| ApiError::InvalidInput(error.to_string()))?;

    // dropping the pipeline future on timeout abandons its in-flight calls
    let outcome = match state.request_timeout {
        Some(limit) => tokio::time::timeout(limit, state.pipeline.run(&request))
            .await
            .map_err(|_| {
                warn!(timeout_ms = limit.as_millis() as u64, "request timed out");
                ApiError::Internal(format!("request timed out after {limit:?}"))
            })?,
        None => state.pipeline.run(&request).await,
    };

    outcome.map(Json).map_err(|error| {
        if error.is_client_error() {
            ApiError::InvalidInput(error.to_string())
        } else {
            ApiError::Internal(error.to_string())
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::AppGenerator;
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use docqa_core::{CharacterNgramEmbedder, LoadError, PipelineOptions, TextUnit};
    use serde_json::Value;
    use tower::ServiceExt;

    enum StaticLoader {
        Policy,
        Missing,
        Hanging,
    }

    #[async_trait]
    impl DocumentLoader for StaticLoader {
        async fn load(&self, _locator: &str) -> Result<Vec<TextUnit>, LoadError> {
            match self {
                StaticLoader::Policy => Ok(vec![TextUnit::new(
                    "policy.pdf",
                    1,
                    "The grace period is thirty days.\n\nCataract surgery waits two years.",
                )]),
                StaticLoader::Missing => Err(LoadError::Download {
                    locator: "https://example.com/policy.pdf".to_string(),
                    status: "404 Not Found".to_string(),
                }),
                StaticLoader::Hanging => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(Vec::new())
                }
            }
        }
    }

    fn pipeline(
        loader: StaticLoader,
    ) -> QaPipeline<StaticLoader, CharacterNgramEmbedder, AppGenerator> {
        let options = PipelineOptions {
            chunk_size: 40,
            chunk_overlap: 5,
            top_k: 1,
            ..PipelineOptions::default()
        };
        QaPipeline::new(loader, CharacterNgramEmbedder::default(), AppGenerator::Echo, options)
            .expect("options are valid")
    }

    fn router_with(loader: StaticLoader, timeout: Duration) -> Router {
        let state =
            AppState::new(pipeline(loader), "secret", Some(timeout)).expect("token is set");
        app_router(state)
    }

    fn router(loader: StaticLoader) -> Router {
        router_with(loader, Duration::from_secs(5))
    }

    fn request(auth: Option<&str>, body: &str) -> Request<Body> {
        let mut builder = Request::post("/hackrx/run").header("content-type", "application/json");
        if let Some(auth) = auth {
            builder = builder.header("authorization", auth);
        }
        builder.body(Body::from(body.to_string())).expect("request builds")
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body reads");
        serde_json::from_slice(&bytes).expect("body is json")
    }

    async fn detail(response: Response) -> String {
        json_body(response).await["detail"]
            .as_str()
            .unwrap_or_default()
            .to_string()
    }

    const VALID: &str = r#"{"documents":"https://example.com/policy.pdf","questions":["Grace period?","Cataract surgery?"]}"#;

    #[test]
    fn blank_bearer_token_is_rejected() {
        assert!(AppState::new(pipeline(StaticLoader::Policy), "  ", None).is_err());
        assert!(AppState::new(pipeline(StaticLoader::Policy), "", None).is_err());
    }

    #[tokio::test]
    async fn missing_bearer_is_unauthorized() {
        let response = router(StaticLoader::Policy)
            .oneshot(request(None, VALID))
            .await
            .expect("responds");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(detail(response).await, "Missing or invalid Authorization header");
    }

    #[tokio::test]
    async fn wrong_token_is_unauthorized() {
        let response = router(StaticLoader::Policy)
            .oneshot(request(Some("Bearer nope"), VALID))
            .await
            .expect("responds");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(detail(response).await, "Unauthorized");
    }

    #[tokio::test]
    async fn malformed_body_is_a_client_error() {
        let response = router(StaticLoader::Policy)
            .oneshot(request(Some("Bearer secret"), r#"{"documents": 3}"#))
            .await
            .expect("responds");
        assert!(response.status().is_client_error());

        let response = router(StaticLoader::Policy)
            .oneshot(request(
                Some("Bearer secret"),
                r#"{"documents":"https://example.com/policy.pdf","questions":[]}"#,
            ))
            .await
            .expect("responds");
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn answers_come_back_in_question_order() {
        let response = router(StaticLoader::Policy)
            .oneshot(request(Some("Bearer secret"), VALID))
            .await
            .expect("responds");
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        let answers: Vec<&str> = body["answers"]
            .as_array()
            .expect("answers array")
            .iter()
            .filter_map(Value::as_str)
            .collect();
        assert_eq!(answers.len(), 2);
        assert!(answers[0].contains("grace"));
        assert!(!answers[0].contains("Cataract"));
        assert!(answers[1].contains("Cataract"));
    }

    #[tokio::test]
    async fn pipeline_failure_is_internal_error() {
        let response = router(StaticLoader::Missing)
            .oneshot(request(Some("Bearer secret"), VALID))
            .await
            .expect("responds");
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(detail(response)
            .await
            .starts_with("Internal server error: failed to load document"));
    }

    #[tokio::test]
    async fn slow_request_times_out_as_internal_error() {
        let response = router_with(StaticLoader::Hanging, Duration::from_millis(50))
            .oneshot(request(Some("Bearer secret"), VALID))
            .await
            .expect("responds");
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(detail(response).await.contains("timed out"));
    }
}
