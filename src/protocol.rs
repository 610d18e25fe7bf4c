//! Public protocol structs for the HTTP endpoints (serde ready).
//! Every response body is wrapped in `ApiResponse`: `status` 0 means success.

use serde::{Deserialize, Serialize};

use crate::domain::{ActiveMapping, Essay};
use crate::essays::{EssayDetail, SentenceDetail};
use crate::lexicon::FrequencyLevel;
use crate::pinyin::phrase_pinyin;

/// `{status, message, data}` envelope shared by all endpoints.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub status: i32,
    pub message: Option<String>,
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self { status: 0, message: None, data: Some(data) }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self { status: 1, message: Some(message.into()), data: None }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthOut {
    pub ok: bool,
}

#[derive(Debug, Deserialize)]
pub struct SubmitEssayIn {
    pub content: String,
    #[serde(default)]
    pub title: Option<String>,
}

/// Mapping as the frontend renders it: the comma-joined English list is also
/// split into `candidates` (translated word first).
#[derive(Debug, Serialize)]
pub struct MappingOut {
    pub mapping_id: i64,
    pub sentence_id: i64,
    pub focus_start: usize,
    pub focus_end: usize,
    pub chinese: String,
    pub pinyin: String,
    pub english: String,
    pub candidates: Vec<String>,
    pub user_expression: String,
    pub ai_review_is_correct: Option<bool>,
    pub ai_review_expression: Option<String>,
}

impl From<ActiveMapping> for MappingOut {
    fn from(m: ActiveMapping) -> Self {
        let candidates = m
            .english
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
        Self {
            pinyin: phrase_pinyin(&m.chinese),
            mapping_id: m.mapping_id,
            sentence_id: m.sentence_id,
            focus_start: m.focus_start,
            focus_end: m.focus_end,
            chinese: m.chinese,
            english: m.english,
            candidates,
            user_expression: m.user_expression,
            ai_review_is_correct: m.ai_review_is_correct,
            ai_review_expression: m.ai_review_expression,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SentenceOut {
    pub sentence_id: i64,
    pub sentence: String,
    pub mappings: Vec<MappingOut>,
}

impl From<SentenceDetail> for SentenceOut {
    fn from(d: SentenceDetail) -> Self {
        Self {
            sentence_id: d.sentence.sentence_id,
            sentence: d.sentence.sentence,
            mappings: d.mappings.into_iter().map(MappingOut::from).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct EssayDetailOut {
    #[serde(flatten)]
    pub essay: Essay,
    pub sentences: Vec<SentenceOut>,
}

impl From<EssayDetail> for EssayDetailOut {
    fn from(d: EssayDetail) -> Self {
        Self { essay: d.essay, sentences: d.sentences.into_iter().map(SentenceOut::from).collect() }
    }
}

#[derive(Debug, Deserialize)]
pub struct CheckExpressionIn {
    pub expression: String,
}

/// Body of `POST /word`, `PUT /word` and `POST /word/known`. Which fields are
/// required depends on the endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct WordReviewIn {
    pub id: Option<i64>,
    pub word: Option<String>,
    pub wrong_word: Option<String>,
    pub quality: Option<i64>,
    pub translation: Option<String>,
    pub example_sentence: Option<String>,
    #[serde(default)]
    pub is_know: bool,
}

#[derive(Debug, Deserialize)]
pub struct WordSearchQuery {
    pub keyword: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DayStatQuery {
    pub start_date: String,
    pub end_date: String,
}

#[derive(Debug, Deserialize)]
pub struct FrequencyQuery {
    pub word: String,
}

#[derive(Debug, Serialize)]
pub struct WordFrequencyOut {
    pub word: String,
    pub rank: u32,
    pub level: FrequencyLevel,
    pub is_common: bool,
}
