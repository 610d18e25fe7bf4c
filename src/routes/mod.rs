//! Router assembly: HTTP endpoints under `/api/v1`, CORS, and HTTP tracing.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::state::AppState;

pub mod http;

/// Build the application router with:
/// - essay endpoints (submit, list, detail), sentence detail and expression checks
/// - word review endpoints (add, grade, known flag, search, due list, stats)
/// - CORS (allow any origin/method/headers); adjust for production if needed
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/health", get(http::http_health))
        // Essays
        .route("/essays", post(http::http_submit_essay).get(http::http_list_essays))
        .route("/essays/:essay_id", get(http::http_get_essay))
        .route("/sentence/:sentence_id", get(http::http_get_sentence))
        .route("/mapping/:mapping_id/check", post(http::http_check_expression))
        // Word review
        .route(
            "/word",
            post(http::http_add_word)
                .put(http::http_grade_word)
                .get(http::http_search_words),
        )
        .route("/word/known", post(http::http_mark_known))
        .route("/word/frequency", get(http::http_word_frequency))
        .route("/word/:id", get(http::http_get_word))
        .route("/word/review/list", get(http::http_review_list))
        .route("/word/review/count", get(http::http_review_count))
        .route("/word/review/stat", get(http::http_review_stat))
        .route("/word/review/dayStat", get(http::http_review_day_stat));

    Router::new()
        .nest("/api/v1", api)
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                        .on_request(DefaultOnRequest::new().level(Level::INFO))
                        .on_response(DefaultOnResponse::new().level(Level::INFO)),
                )
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any),
                ),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::config::AppConfig;
    use crate::lexicon::relations::tests::sample_lexicon;
    use crate::llm::testing::ScriptedChat;
    use crate::segmentation::tests::{frequency, HAPPY_STRUCTURE, STAGE1_MARK, STAGE2_MARK};

    fn app(chat: ScriptedChat) -> Router {
        let freq = Arc::try_unwrap(frequency()).unwrap_or_default();
        let state = AppState::from_parts(AppConfig::default(), Arc::new(chat), freq, sample_lexicon());
        build_router(Arc::new(state))
    }

    async fn call(app: &Router, method: &str, uri: &str, user: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(u) = user {
            req = req.header(http::USER_HEADER, u);
        }
        let req = match body {
            Some(b) => req.header("content-type", "application/json").body(Body::from(b.to_string())),
            None => req.body(Body::empty()),
        }
        .unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn health_needs_no_user() {
        let app = app(ScriptedChat::new());
        let (status, body) = call(&app, "GET", "/api/v1/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], 0);
        assert_eq!(body["data"]["ok"], true);
    }

    #[tokio::test]
    async fn missing_user_header_is_rejected() {
        let app = app(ScriptedChat::new());
        let (status, body) = call(&app, "GET", "/api/v1/word/review/list", None, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], 1);
        assert_eq!(body["message"], "Invalid user ID");
    }

    #[tokio::test]
    async fn word_review_flow() {
        let app = app(ScriptedChat::new());
        let (status, body) = call(&app, "POST", "/api/v1/word", Some("u1"), Some(json!({"word": "glad", "translation": "高兴"}))).await;
        assert_eq!(status, StatusCode::OK);
        let id = body["data"]["id"].as_i64().unwrap();
        assert_eq!(body["data"]["repetitions"], 0);

        let (_, body) = call(&app, "GET", "/api/v1/word/review/count", Some("u1"), None).await;
        assert_eq!(body["data"], 0);
        let (_, body) = call(&app, "GET", "/api/v1/word/review/list", Some("u1"), None).await;
        assert_eq!(body["data"].as_array().unwrap().len(), 1);

        let (status, body) = call(&app, "PUT", "/api/v1/word", Some("u1"), Some(json!({"id": id, "quality": 5}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["repetitions"], 1);

        let (status, _) = call(&app, "PUT", "/api/v1/word", Some("u1"), Some(json!({"id": id, "quality": 8}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = call(&app, "GET", &format!("/api/v1/word/{}", id), Some("u2"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, body) = call(&app, "POST", "/api/v1/word/known", Some("u1"), Some(json!({"id": id, "is_know": true}))).await;
        assert_eq!(body["data"]["is_know"], true);
        let (_, body) = call(&app, "GET", "/api/v1/word/review/stat", Some("u1"), None).await;
        assert_eq!(body["data"]["totalKnowWordReviewCount"], 1);
        assert_eq!(body["data"]["todayReviewCount"], 1);

        let (_, body) = call(&app, "GET", "/api/v1/word?keyword=gla", Some("u1"), None).await;
        assert_eq!(body["data"].as_array().unwrap().len(), 1);

        let (status, _) = call(&app, "GET", "/api/v1/word/review/dayStat?start_date=2024-13-01&end_date=2024-01-02", Some("u1"), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn word_frequency_lookup() {
        let app = app(ScriptedChat::new());
        let (status, body) = call(&app, "GET", "/api/v1/word/frequency?word=Glad", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["rank"], 1890);
        assert_eq!(body["data"]["level"], "high");
        assert_eq!(body["data"]["is_common"], true);
        let (_, body) = call(&app, "GET", "/api/v1/word/frequency?word=felicitous", None, None).await;
        assert_eq!(body["data"]["level"], "low");
    }

    #[tokio::test]
    async fn essay_submission_round_trip() {
        let app = app(ScriptedChat::new().on(STAGE1_MARK, "raw").on(STAGE2_MARK, HAPPY_STRUCTURE));
        let (status, body) = call(&app, "POST", "/api/v1/essays", Some("u1"), Some(json!({"content": "我今天很开心"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["succeeded"], 1);
        let essay_id = body["data"]["essay"]["essay_id"].as_i64().unwrap();

        let (_, body) = call(&app, "GET", &format!("/api/v1/essays/{}", essay_id), Some("u1"), None).await;
        let mappings = body["data"]["sentences"][0]["mappings"].as_array().unwrap();
        let happy = mappings.iter().find(|m| m["chinese"] == "开心").unwrap();
        assert_eq!(happy["pinyin"], "kāi xīn");
        assert_eq!(happy["focus_start"], 4);
        assert_eq!(happy["candidates"][0], "happy");

        let mapping_id = happy["mapping_id"].as_i64().unwrap();
        let uri = format!("/api/v1/mapping/{}/check", mapping_id);
        let (status, body) = call(&app, "POST", &uri, Some("u1"), Some(json!({"expression": "happy"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["ai_review_is_correct"], true);
        let (status, _) = call(&app, "POST", &uri, Some("u2"), Some(json!({"expression": "happy"}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, body) = call(&app, "GET", "/api/v1/essays", Some("u1"), None).await;
        assert_eq!(body["data"].as_array().unwrap().len(), 1);

        let (status, body) = call(&app, "POST", "/api/v1/essays", Some("u1"), Some(json!({"content": ""}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], 1);
    }
}
