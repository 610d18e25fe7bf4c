//! Error taxonomy shared by the pipeline, the scheduler, the store and the HTTP layer.
//!
//! Inner layers return their own small enums; `AppError` is the HTTP boundary type
//! and maps each failure to a status code plus the `{status, message, data}` envelope.

use axum::{
  http::StatusCode,
  response::{IntoResponse, Response},
  Json,
};
use thiserror::Error;
use tracing::error;

use crate::protocol::ApiResponse;

/// Failures of a completion call, as seen by whoever parses the reply.
#[derive(Debug, Clone, Error)]
pub enum UpstreamError {
  /// Transport failure or non-success HTTP status.
  #[error("completion service unavailable: {0}")]
  Unavailable(String),
  /// The reply could not be coerced into the expected structure.
  #[error("unparseable completion reply: {0}")]
  Parse(String),
}

/// Which pipeline stage produced a parse failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
  TranslateSegment,
  StructureExtraction,
  SynonymExpansion,
}

impl std::fmt::Display for Stage {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let s = match self {
      Stage::TranslateSegment => "translate_segment",
      Stage::StructureExtraction => "structure_extraction",
      Stage::SynonymExpansion => "synonym_expansion",
    };
    f.write_str(s)
  }
}

/// Sentence-level failure of the segmentation pipeline.
#[derive(Debug, Clone, Error)]
pub enum PipelineError {
  #[error("validation failed: {0}")]
  Validation(String),
  #[error("stage {stage} returned an unusable reply: {reason}")]
  UpstreamParse { stage: Stage, reason: String },
  #[error("completion service unavailable: {0}")]
  UpstreamUnavailable(String),
  #[error("sentence processing timed out after {0}s")]
  Timeout(u64),
}

impl PipelineError {
  pub fn from_upstream(stage: Stage, e: UpstreamError) -> Self {
    match e {
      UpstreamError::Unavailable(msg) => PipelineError::UpstreamUnavailable(msg),
      UpstreamError::Parse(reason) => PipelineError::UpstreamParse { stage, reason },
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SrsError {
  #[error("Invalid quality value: {0} (expected 0..=5)")]
  InvalidQuality(i64),
}

/// Errors raised while loading bundled data files at startup.
#[derive(Debug, Error)]
pub enum DataError {
  #[error("failed to read {path}: {source}")]
  Io { path: String, #[source] source: std::io::Error },
  #[error("malformed data file {path}: {source}")]
  Format { path: String, #[source] source: serde_json::Error },
}

pub type AppResult<T> = std::result::Result<T, AppError>;

/// Boundary error returned by services and HTTP handlers.
#[derive(Debug, Error)]
pub enum AppError {
  #[error("{0}")]
  Validation(String),
  #[error("{0}")]
  NotFound(String),
  #[error("Invalid user ID")]
  Unauthorized,
  #[error("upstream failure: {0}")]
  Upstream(String),
}

impl AppError {
  pub fn status_code(&self) -> StatusCode {
    match self {
      AppError::Validation(_) | AppError::Unauthorized => StatusCode::BAD_REQUEST,
      AppError::NotFound(_) => StatusCode::NOT_FOUND,
      AppError::Upstream(_) => StatusCode::BAD_GATEWAY,
    }
  }
}

impl From<SrsError> for AppError {
  fn from(e: SrsError) -> Self {
    AppError::Validation(e.to_string())
  }
}

impl From<PipelineError> for AppError {
  fn from(e: PipelineError) -> Self {
    match e {
      PipelineError::Validation(msg) => AppError::Validation(msg),
      other => AppError::Upstream(other.to_string()),
    }
  }
}

impl IntoResponse for AppError {
  fn into_response(self) -> Response {
    let status = self.status_code();
    if status.is_server_error() {
      error!(target: "viva_backend", error = %self, "request failed");
    }
    let body = ApiResponse::<()>::failure(self.to_string());
    (status, Json(body)).into_response()
  }
}
