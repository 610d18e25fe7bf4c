//! Domain models: persisted entities (essays, sentences, mappings, word reviews)
//! and the part-of-speech tag shared by the lexicon and the pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Part of speech, aligned with WordNet's one-letter tags.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Pos {
  #[serde(rename = "n", alias = "noun", alias = "NOUN")]
  Noun,
  #[serde(rename = "v", alias = "verb", alias = "VERB")]
  Verb,
  /// Adjective satellites (`s`) are folded into plain adjectives.
  #[serde(rename = "a", alias = "adjective", alias = "ADJECTIVE", alias = "adj", alias = "s")]
  Adjective,
  #[serde(rename = "r", alias = "adverb", alias = "ADVERB", alias = "adv")]
  Adverb,
}

impl Pos {
  pub fn tag(&self) -> &'static str {
    match self {
      Pos::Noun => "n",
      Pos::Verb => "v",
      Pos::Adjective => "a",
      Pos::Adverb => "r",
    }
  }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Essay {
  pub essay_id: i64,
  pub title: String,
  pub content: String,
  pub user_id: String,
  pub create_time: DateTime<Utc>,
  pub update_time: DateTime<Utc>,
  #[serde(default)] pub is_deleted: bool,
}

/// Immutable unit of essay text. Linked to essays through `EssaySentence`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Sentence {
  pub sentence_id: i64,
  pub sentence: String,
  pub create_time: DateTime<Utc>,
  #[serde(default)] pub is_deleted: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EssaySentence {
  pub essay_id: i64,
  pub sentence_id: i64,
  /// Order of the sentence inside the essay.
  pub position: usize,
  #[serde(default)] pub is_deleted: bool,
}

/// One resolved Chinese phrase -> English expression(s) correspondence in a sentence.
///
/// `focus_start..focus_end` is a char range into the sentence text; `english` is the
/// comma-joined candidate list with the translated word first.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActiveMapping {
  pub mapping_id: i64,
  pub sentence_id: i64,
  pub focus_start: usize,
  pub focus_end: usize,
  pub chinese: String,
  pub english: String,
  #[serde(default)] pub user_expression: String,
  #[serde(default)] pub ai_review_is_correct: Option<bool>,
  #[serde(default)] pub ai_review_expression: Option<String>,
  pub create_time: DateTime<Utc>,
  pub update_time: DateTime<Utc>,
  #[serde(default)] pub is_deleted: bool,
}

/// Fields the pipeline supplies when creating a mapping.
#[derive(Clone, Debug, PartialEq)]
pub struct NewMapping {
  pub focus_start: usize,
  pub focus_end: usize,
  pub chinese: String,
  pub english: String,
}

/// A tracked vocabulary item and its SM-2 state.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WordReview {
  pub id: i64,
  pub word: String,
  #[serde(default)] pub wrong_word: Option<String>,
  #[serde(default)] pub translation: Option<String>,
  #[serde(default)] pub example_sentence: Option<String>,
  pub user_id: String,
  pub easiness: f64,
  pub interval: i64,
  pub repetitions: u32,
  pub review_datetime: DateTime<Utc>,
  #[serde(default)] pub is_know: bool,
  #[serde(default)] pub is_deleted: bool,
  pub create_time: DateTime<Utc>,
  pub update_time: DateTime<Utc>,
}

/// Append-only record of one scheduling transition.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WordReviewLog {
  pub id: i64,
  pub word_id: i64,
  pub user_id: String,
  pub easiness: f64,
  pub interval: i64,
  pub repetitions: u32,
  pub review_datetime: DateTime<Utc>,
  pub create_time: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn pos_accepts_tags_and_names() {
    let tags: Vec<Pos> = serde_json::from_str(r#"["n","verb","a","s","ADVERB"]"#).unwrap();
    assert_eq!(tags, vec![Pos::Noun, Pos::Verb, Pos::Adjective, Pos::Adjective, Pos::Adverb]);
    assert_eq!(serde_json::to_string(&Pos::Verb).unwrap(), "\"v\"");
  }
}
