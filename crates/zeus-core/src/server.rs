//! HTTP boundary: `POST /chat` with `{"question": "..."}`.
//!
//! Success is `200 {"answer": "..."}`. An empty or missing question is `400`
//! and never reaches a model; model and index failures are `500`. Both error
//! shapes are `{"error": "..."}`.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;

use crate::answer::Answerer;

#[derive(Debug, Deserialize)]
struct ChatRequest {
    #[serde(default)]
    question: Option<String>,
}

#[derive(Debug, Serialize)]
struct ChatReply {
    answer: String,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

type ApiError = (StatusCode, Json<ErrorBody>);

pub fn router(answerer: Arc<Answerer>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/chat", post(chat_handler))
        .layer(CorsLayer::permissive())
        .with_state(answerer)
}

/// Bind `addr` and serve until Ctrl+C.
pub async fn serve(addr: SocketAddr, answerer: Arc<Answerer>) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(answerer))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down");
        })
        .await
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn chat_handler(
    State(answerer): State<Arc<Answerer>>,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatReply>, ApiError> {
    let Json(request) = body.map_err(|e| error(StatusCode::BAD_REQUEST, e.body_text()))?;
    let question = request.question.unwrap_or_default();
    if question.trim().is_empty() {
        return Err(error(StatusCode::BAD_REQUEST, "Empty question"));
    }
    match answerer.ask(&question).await {
        Ok(answer) => Ok(Json(ChatReply { answer: answer.text })),
        Err(e) if e.is_client_error() => Err(error(StatusCode::BAD_REQUEST, e.to_string())),
        Err(e) => {
            tracing::error!("chat request failed: {e}");
            Err(error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}

fn error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use axum::body::Body;
    use axum::http::Request;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::config::AnswerSettings;
    use crate::documents::{TextUnit, UnitLocation};
    use crate::store::VectorIndex;
    use crate::test_support::{keyword_vector, FakeChat, FakeEmbedder};

    fn app(chat: Arc<FakeChat>, embedder: Arc<FakeEmbedder>) -> Router {
        let text = "Nuclear output grew last year.";
        let unit = TextUnit::new(&PathBuf::from("n.pdf"), UnitLocation::Page(1), text.to_string());
        let index = VectorIndex::create_from(vec![unit], vec![keyword_vector(text)]).unwrap();
        router(Arc::new(Answerer::new(index, embedder, chat, AnswerSettings::default())))
    }

    async fn post(app: Router, body: &str) -> (StatusCode, Value) {
        let req = Request::builder()
            .method("POST")
            .uri("/chat")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn answers_question() {
        let chat = Arc::new(FakeChat::replying(&["Nuclear output grew last year by 5%."]));
        let app = app(chat, Arc::new(FakeEmbedder::default()));
        let (status, body) = post(app, r#"{"question":"nuclear?"}"#).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "answer": "Nuclear output grew last year by 5%." }));
    }

    #[tokio::test]
    async fn empty_question_is_client_error_without_calls() {
        let chat = Arc::new(FakeChat::default());
        let embedder = Arc::new(FakeEmbedder::default());
        let (status, body) = post(app(chat.clone(), embedder.clone()), r#"{"question":""}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Empty question");
        assert!(chat.prompts().is_empty());
        assert!(embedder.call_sizes().is_empty());

        let (status, _) = post(app(chat, embedder), "{}").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn malformed_json_is_client_error() {
        let (status, body) = post(
            app(Arc::new(FakeChat::default()), Arc::new(FakeEmbedder::default())),
            "{not json",
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn model_failure_is_server_error() {
        let (status, body) = post(
            app(Arc::new(FakeChat::failing()), Arc::new(FakeEmbedder::default())),
            r#"{"question":"nuclear?"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"].as_str().unwrap().contains("401"));
    }

    #[tokio::test]
    async fn healthz_is_ok() {
        let app = app(Arc::new(FakeChat::default()), Arc::new(FakeEmbedder::default()));
        let req = Request::builder().uri("/healthz").body(Body::empty()).unwrap();
        assert_eq!(app.oneshot(req).await.unwrap().status(), StatusCode::OK);
    }
}
