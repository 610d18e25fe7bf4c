//! HTTP endpoint handlers. These are thin wrappers that forward to the services.
//! Each handler is instrumented and logs the caller plus basic result info.

use std::sync::Arc;

use axum::{
  async_trait,
  extract::{FromRequestParts, Path, Query, State},
  http::request::Parts,
  Json,
};
use chrono::{NaiveDate, Utc};
use tracing::{info, instrument};

use crate::domain::{Essay, WordReview};
use crate::error::{AppError, AppResult};
use crate::essays::EssaySubmission;
use crate::lexicon::frequency::COMMON_DISPLAY_THRESHOLD;
use crate::protocol::*;
use crate::reviews::ReviewStats;
use crate::state::AppState;
use crate::store::{DayCount, NewWordReview};

pub const USER_HEADER: &str = "x-user-id";

type ApiJson<T> = AppResult<Json<ApiResponse<T>>>;

fn ok<T: serde::Serialize>(data: T) -> ApiJson<T> {
  Ok(Json(ApiResponse::ok(data)))
}

/// Caller identity taken from the `x-user-id` header; missing or blank is a 400.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub String);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
  type Rejection = AppError;

  async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
    parts
      .headers
      .get(USER_HEADER)
      .and_then(|v| v.to_str().ok())
      .map(str::trim)
      .filter(|s| !s.is_empty())
      .map(|s| CurrentUser(s.to_string()))
      .ok_or(AppError::Unauthorized)
  }
}

#[instrument(level = "info")]
pub async fn http_health() -> Json<ApiResponse<HealthOut>> {
  Json(ApiResponse::ok(HealthOut { ok: true }))
}

// --- essays ---

#[instrument(level = "info", skip(state, body), fields(user = %user.0, content_len = body.content.len()))]
pub async fn http_submit_essay(
  State(state): State<Arc<AppState>>,
  user: CurrentUser,
  Json(body): Json<SubmitEssayIn>,
) -> ApiJson<EssaySubmission> {
  let sub = state.essays.submit_essay(&user.0, body.title.as_deref(), &body.content).await?;
  info!(target: "viva_backend", essay_id = sub.essay.essay_id, run_id = %sub.run_id, succeeded = sub.succeeded, failed = sub.failed, "HTTP essay submitted");
  ok(sub)
}

#[instrument(level = "info", skip(state), fields(user = %user.0))]
pub async fn http_list_essays(State(state): State<Arc<AppState>>, user: CurrentUser) -> ApiJson<Vec<Essay>> {
  ok(state.essays.list_essays(&user.0).await)
}

#[instrument(level = "info", skip(state), fields(user = %user.0, %essay_id))]
pub async fn http_get_essay(
  State(state): State<Arc<AppState>>,
  user: CurrentUser,
  Path(essay_id): Path<i64>,
) -> ApiJson<EssayDetailOut> {
  let detail = state.essays.essay_detail(&user.0, essay_id).await?;
  ok(EssayDetailOut::from(detail))
}

#[instrument(level = "info", skip(state), fields(user = %user.0, %sentence_id))]
pub async fn http_get_sentence(
  State(state): State<Arc<AppState>>,
  user: CurrentUser,
  Path(sentence_id): Path<i64>,
) -> ApiJson<SentenceOut> {
  let detail = state.essays.sentence_detail(&user.0, sentence_id).await?;
  ok(SentenceOut::from(detail))
}

#[instrument(level = "info", skip(state, body), fields(user = %user.0, %mapping_id))]
pub async fn http_check_expression(
  State(state): State<Arc<AppState>>,
  user: CurrentUser,
  Path(mapping_id): Path<i64>,
  Json(body): Json<CheckExpressionIn>,
) -> ApiJson<MappingOut> {
  let mapping = state.essays.check_expression(&user.0, mapping_id, &body.expression).await?;
  ok(MappingOut::from(mapping))
}

// --- word review ---

#[instrument(level = "info", skip(state, body), fields(user = %user.0))]
pub async fn http_add_word(
  State(state): State<Arc<AppState>>,
  user: CurrentUser,
  Json(body): Json<WordReviewIn>,
) -> ApiJson<WordReview> {
  let item = NewWordReview {
    word: body.word.unwrap_or_default(),
    wrong_word: body.wrong_word,
    translation: body.translation,
    example_sentence: body.example_sentence,
  };
  ok(state.reviews.add_word(&user.0, item, body.quality, Utc::now()).await?)
}

#[instrument(level = "info", skip(state, body), fields(user = %user.0, id = ?body.id, quality = ?body.quality))]
pub async fn http_grade_word(
  State(state): State<Arc<AppState>>,
  user: CurrentUser,
  Json(body): Json<WordReviewIn>,
) -> ApiJson<WordReview> {
  let id = body.id.ok_or_else(|| AppError::Validation("id is required".into()))?;
  let quality = body.quality.ok_or_else(|| AppError::Validation("quality is required".into()))?;
  ok(state.reviews.grade_word(&user.0, id, quality, Utc::now()).await?)
}

#[instrument(level = "info", skip(state, body), fields(user = %user.0, id = ?body.id, is_know = body.is_know))]
pub async fn http_mark_known(
  State(state): State<Arc<AppState>>,
  user: CurrentUser,
  Json(body): Json<WordReviewIn>,
) -> ApiJson<WordReview> {
  let id = body.id.ok_or_else(|| AppError::Validation("id is required".into()))?;
  ok(state.reviews.mark_known(&user.0, id, body.is_know, Utc::now()).await?)
}

#[instrument(level = "info", skip(state), fields(user = %user.0, %id))]
pub async fn http_get_word(State(state): State<Arc<AppState>>, user: CurrentUser, Path(id): Path<i64>) -> ApiJson<WordReview> {
  ok(state.reviews.get_word(&user.0, id).await?)
}

#[instrument(level = "info", skip(state), fields(user = %user.0, keyword = ?q.keyword))]
pub async fn http_search_words(
  State(state): State<Arc<AppState>>,
  user: CurrentUser,
  Query(q): Query<WordSearchQuery>,
) -> ApiJson<Vec<WordReview>> {
  ok(state.reviews.search_words(&user.0, q.keyword.as_deref()).await)
}

#[instrument(level = "info", skip(state), fields(user = %user.0))]
pub async fn http_review_list(State(state): State<Arc<AppState>>, user: CurrentUser) -> ApiJson<Vec<WordReview>> {
  let due = state.reviews.due_today(&user.0, Utc::now()).await;
  info!(target: "review", count = due.len(), "HTTP due list served");
  ok(due)
}

#[instrument(level = "info", skip(state), fields(user = %user.0))]
pub async fn http_review_count(State(state): State<Arc<AppState>>, user: CurrentUser) -> ApiJson<usize> {
  ok(state.reviews.due_count(&user.0, Utc::now()).await)
}

#[instrument(level = "info", skip(state), fields(user = %user.0))]
pub async fn http_review_stat(State(state): State<Arc<AppState>>, user: CurrentUser) -> ApiJson<ReviewStats> {
  ok(state.reviews.stats(&user.0, Utc::now()).await)
}

#[instrument(level = "info", skip(state), fields(user = %user.0, start = %q.start_date, end = %q.end_date))]
pub async fn http_review_day_stat(
  State(state): State<Arc<AppState>>,
  user: CurrentUser,
  Query(q): Query<DayStatQuery>,
) -> ApiJson<Vec<DayCount>> {
  let start = parse_date(&q.start_date)?;
  let end = parse_date(&q.end_date)?;
  ok(state.reviews.day_stats(&user.0, start, end).await?)
}

/// Corpus rank and display tier of a word.
#[instrument(level = "info", skip(state), fields(word = %q.word))]
pub async fn http_word_frequency(State(state): State<Arc<AppState>>, Query(q): Query<FrequencyQuery>) -> ApiJson<WordFrequencyOut> {
  let word = q.word.trim().to_string();
  if word.is_empty() {
    return Err(AppError::Validation("word is required".into()));
  }
  ok(WordFrequencyOut {
    rank: state.frequency.rank(&word),
    level: state.frequency.frequency_level(&word),
    is_common: state.frequency.is_common_word(&word, COMMON_DISPLAY_THRESHOLD),
    word,
  })
}

fn parse_date(s: &str) -> AppResult<NaiveDate> {
  NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|_| AppError::Validation(format!("invalid date '{}', expected YYYY-MM-DD", s)))
}
