//! Essay segmentation and active-mapping pipeline.
//!
//! One Chinese sentence goes through four strictly sequential stages:
//!   1) translate + segment (free text, not parsed)
//!   2) structure extraction into `SegmentationResult` (sentence-fatal on parse failure)
//!   3) offset resolution with a forward-only cursor, plus cleanup of the English field
//!   4) synonym expansion: context senses -> common-word filter -> form transfer
//!
//! Stage 4 never fails a sentence: any trouble with one word degrades that word to
//! its translated form alone.

pub mod align;
pub mod split;
pub mod transform;

use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, error, info, instrument, warn};

use crate::config::Prompts;
use crate::domain::{NewMapping, Pos};
use crate::error::{PipelineError, Stage, UpstreamError};
use crate::lexicon::{FrequencyTable, LexicalRelations};
use crate::llm::{parse_reply, ChatCompletion};
use crate::util::{fill_template, trunc_for_log};

use self::align::{clean_english, clean_token, resolve_span, SpanQuery, SpanSource};
use self::transform::WordFormTransformer;

pub use self::split::{split_into_sentences, validate_essay};

/// Schema instructions embedded in the stage-2 prompt.
pub const SEGMENTATION_FORMAT_INSTRUCTIONS: &str = r#"Respond with a single JSON object and nothing else, matching this schema:
{
  "original": "<the original Chinese sentence, unchanged>",
  "translation": "<the English translation of the sentence>",
  "words": [
    {
      "english": "<english segmentation word>",
      "pos": "<one of: n (noun), v (verb), a (adjective), r (adverb)>",
      "chinese": "<corresponding chinese word copied from the original sentence>",
      "start": <0-based character index of the chinese word in the original sentence>,
      "len": <length of the chinese word in characters>
    }
  ]
}"#;

/// One word as extracted in stage 2.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Word {
  #[serde(deserialize_with = "string_or_list")]
  pub english: String,
  pub pos: Pos,
  pub chinese: String,
  #[serde(default)]
  pub start: Option<usize>,
  #[serde(default)]
  pub len: Option<usize>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SegmentationResult {
  pub original: String,
  pub translation: String,
  pub words: Vec<Word>,
}

/// A word after stage 3: cleaned English and a resolved char span.
#[derive(Clone, Debug, Serialize)]
pub struct AlignedWord {
  pub english: String,
  pub pos: Pos,
  pub chinese: String,
  pub focus_start: usize,
  pub focus_end: usize,
  pub span_source: SpanSource,
}

#[derive(Clone, Debug, Serialize)]
pub struct AlignedResult {
  pub original: String,
  pub translation: String,
  pub words: Vec<AlignedWord>,
}

/// How synonym expansion went for one word.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Expansion {
  Expanded { synonyms: usize },
  NoCandidates,
  Degraded { reason: String },
}

/// Final per-word record: `english[0]` is always the translated word.
#[derive(Clone, Debug, Serialize)]
pub struct ExpandedWord {
  pub english: Vec<String>,
  pub pos: Pos,
  pub chinese: String,
  pub focus_start: usize,
  pub focus_end: usize,
  pub span_source: SpanSource,
  pub expansion: Expansion,
}

impl ExpandedWord {
  /// Comma-joined candidates, each cleaned of brackets and quotes.
  pub fn english_csv(&self) -> String {
    self.english.iter().map(|e| clean_token(e)).collect::<Vec<_>>().join(",")
  }
}

#[derive(Clone, Debug, Serialize)]
pub struct ExpandedResult {
  pub original: String,
  pub translation: String,
  pub words: Vec<ExpandedWord>,
}

impl ExpandedResult {
  pub fn to_new_mappings(&self) -> Vec<NewMapping> {
    self
      .words
      .iter()
      .map(|w| NewMapping {
        focus_start: w.focus_start,
        focus_end: w.focus_end,
        chinese: w.chinese.clone(),
        english: w.english_csv(),
      })
      .collect()
  }
}

/// Accepts `"word"` or `["word", "alt"]` (joined with commas).
fn string_or_list<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
  #[derive(Deserialize)]
  #[serde(untagged)]
  enum OneOrMany {
    One(String),
    Many(Vec<String>),
  }
  Ok(match OneOrMany::deserialize(d)? {
    OneOrMany::One(s) => s,
    OneOrMany::Many(v) => v.join(","),
  })
}

/// The pipeline orchestrator. Cheap to clone; holds no per-sentence state.
#[derive(Clone)]
pub struct SegmentationService {
  chat: Arc<dyn ChatCompletion>,
  relations: LexicalRelations,
  transformer: WordFormTransformer,
  frequency: Arc<FrequencyTable>,
  prompts: Arc<Prompts>,
  common_word_rank: u32,
}

impl SegmentationService {
  pub fn new(
    chat: Arc<dyn ChatCompletion>,
    relations: LexicalRelations,
    frequency: Arc<FrequencyTable>,
    prompts: Arc<Prompts>,
    common_word_rank: u32,
  ) -> Self {
    let transformer = WordFormTransformer::new(relations.clone(), chat.clone(), prompts.word_transform.clone());
    Self { chat, relations, transformer, frequency, prompts, common_word_rank }
  }

  /// Runs stages 1-4 for one sentence.
  #[instrument(level = "info", skip(self, sentence), fields(sentence = %trunc_for_log(sentence, 40)))]
  pub async fn segment_sentence(&self, sentence: &str) -> Result<ExpandedResult, PipelineError> {
    let sentence = sentence.trim();
    if sentence.is_empty() {
      return Err(PipelineError::Validation("sentence must not be empty".into()));
    }
    let raw = self.translate_and_segment(sentence).await?;
    let structured = self.extract_structure(sentence, &raw).await?;
    let aligned = self.resolve_offsets(structured);
    let expanded = self.expand_synonyms(aligned).await;
    info!(target: "segmentation", words = expanded.words.len(), "sentence segmented");
    Ok(expanded)
  }

  /// Stage 1: free-text translation and segmentation, passed forward unparsed.
  pub async fn translate_and_segment(&self, sentence: &str) -> Result<String, PipelineError> {
    let prompt = fill_template(&self.prompts.segment_translate, &[("sentence", sentence)]);
    let reply = self
      .chat
      .chat(&prompt)
      .await
      .map_err(|e| PipelineError::from_upstream(Stage::TranslateSegment, e))?;
    debug!(target: "segmentation", preview = %trunc_for_log(&reply, 120), "stage 1 reply");
    if reply.trim().is_empty() {
      return Err(PipelineError::UpstreamParse { stage: Stage::TranslateSegment, reason: "empty reply".into() });
    }
    Ok(reply)
  }

  /// Stage 2: structured extraction. Not retried; failure aborts the sentence.
  pub async fn extract_structure(&self, sentence: &str, process1_result: &str) -> Result<SegmentationResult, PipelineError> {
    let prompt = fill_template(
      &self.prompts.segment_structure,
      &[("process1_result", process1_result), ("format_instructions", SEGMENTATION_FORMAT_INSTRUCTIONS)],
    );
    let reply = self
      .chat
      .chat(&prompt)
      .await
      .map_err(|e| PipelineError::from_upstream(Stage::StructureExtraction, e))?;

    let mut result: SegmentationResult = parse_reply(&reply).into_result().map_err(|e| {
      error!(target: "segmentation", error = %e, "stage 2 reply rejected");
      PipelineError::from_upstream(Stage::StructureExtraction, e)
    })?;

    // Spans are stored against the sentence we sent, so that is the alignment text.
    if result.original.trim() != sentence {
      warn!(target: "segmentation", model_original = %trunc_for_log(&result.original, 40), "model rewrote the original sentence; aligning against the input");
      result.original = sentence.to_string();
    }
    Ok(result)
  }

  /// Stage 3: char spans with a forward-only cursor, and English cleanup.
  pub fn resolve_offsets(&self, result: SegmentationResult) -> AlignedResult {
    let mut current_position = 0usize;
    let mut words = Vec::with_capacity(result.words.len());
    for word in result.words {
      let span = resolve_span(
        &SpanQuery { chinese: &word.chinese, start: word.start, len: word.len },
        &result.original,
        current_position,
      );
      if span.clamped || matches!(span.source, SpanSource::Cursor) {
        warn!(target: "segmentation", chinese = %word.chinese, source = ?span.source, start = span.start, end = span.end, "ambiguous alignment");
      }
      if span.end < current_position {
        warn!(target: "segmentation", chinese = %word.chinese, start = span.start, end = span.end, cursor = current_position, "word out of textual order; cursor kept");
      }
      current_position = current_position.max(span.end);
      words.push(AlignedWord {
        english: clean_english(&word.english),
        pos: word.pos,
        chinese: word.chinese,
        focus_start: span.start,
        focus_end: span.end,
        span_source: span.source,
      });
    }
    AlignedResult { original: result.original, translation: result.translation, words }
  }

  /// Stage 4: per-word synonym expansion, in original order.
  pub async fn expand_synonyms(&self, aligned: AlignedResult) -> ExpandedResult {
    let mut words = Vec::with_capacity(aligned.words.len());
    for word in aligned.words {
      let (english, expansion) = self.expand_word(&word.english, word.pos, &aligned.original).await;
      words.push(ExpandedWord {
        english,
        pos: word.pos,
        chinese: word.chinese,
        focus_start: word.focus_start,
        focus_end: word.focus_end,
        span_source: word.span_source,
        expansion,
      });
    }
    ExpandedResult { original: aligned.original, translation: aligned.translation, words }
  }

  async fn expand_word(&self, original: &str, pos: Pos, context: &str) -> (Vec<String>, Expansion) {
    let only_original = || vec![original.to_string()];

    let synonyms = match self.relations.synonyms_by_context(original, pos, context).await {
      Ok(s) => s,
      Err(e) => return (only_original(), degraded(original, "synonyms", e)),
    };

    let common: Vec<String> = synonyms
      .into_iter()
      .filter(|s| self.frequency.is_common_word(s, self.common_word_rank))
      .collect();
    if common.is_empty() {
      return (only_original(), Expansion::NoCandidates);
    }

    let transformed = match self.transformer.transform(original, pos, &common).await {
      Ok(t) => t,
      Err(e) => return (only_original(), degraded(original, "transform", e)),
    };

    let kept = self.reconcile(&common, transformed);
    let count = kept.len();
    let mut english = only_original();
    english.extend(kept);
    (english, Expansion::Expanded { synonyms: count })
  }

  /// Keeps transformed forms that are themselves common words. When the model returned
  /// one form per candidate, a rare form falls back to the candidate it came from.
  fn reconcile(&self, candidates: &[String], transformed: Vec<String>) -> Vec<String> {
    let is_common = |w: &str| self.frequency.is_common_word(w, self.common_word_rank);
    let paired = transformed.len() == candidates.len();

    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for (i, form) in transformed.into_iter().enumerate() {
      let chosen = if is_common(&form) {
        Some(form)
      } else if paired {
        Some(candidates[i].clone())
      } else {
        None
      };
      if let Some(w) = chosen.map(|w| clean_token(&w)) {
        if !w.is_empty() && seen.insert(w.to_lowercase()) {
          out.push(w);
        }
      }
    }
    out
  }
}

fn degraded(word: &str, step: &str, e: UpstreamError) -> Expansion {
  warn!(target: "segmentation", %word, %step, error = %e, "synonym expansion degraded to the original word");
  Expansion::Degraded { reason: format!("{} ({}): {}", Stage::SynonymExpansion, step, e) }
}
