//! Loading application configuration (prompts, thresholds, data paths) from TOML.
//!
//! The file is named by `VIVA_CONFIG_PATH`. Every section is optional; missing keys
//! fall back to the defaults below. Secrets and endpoints come from the environment
//! (see `llm::OpenAI::from_env`).

use serde::Deserialize;
use tracing::{error, info};

/// Rank at or below which a synonym counts as common enough to offer.
pub const COMMON_WORD_RANK: u32 = 2000;

/// Maximum essay length in characters.
pub const MAX_ESSAY_CHARS: usize = 1500;

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AppConfig {
  #[serde(default)]
  pub prompts: Prompts,
  #[serde(default)]
  pub pipeline: PipelineSettings,
  #[serde(default)]
  pub data: DataPaths,
}

/// Knobs for essay splitting and the per-sentence pipeline.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
  pub max_essay_chars: usize,
  pub common_word_rank: u32,
  /// Also split at commas, semicolons and clause connectives.
  pub split_clauses: bool,
  /// Wall-clock budget for one sentence's full 4-stage run.
  pub sentence_timeout_secs: u64,
  /// Upper bound of the due-today list.
  pub due_list_limit: usize,
}

impl Default for PipelineSettings {
  fn default() -> Self {
    Self {
      max_essay_chars: MAX_ESSAY_CHARS,
      common_word_rank: COMMON_WORD_RANK,
      split_clauses: true,
      sentence_timeout_secs: 120,
      due_list_limit: 200,
    }
  }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct DataPaths {
  pub frequency_table: String,
  pub lexicon: String,
}

impl Default for DataPaths {
  fn default() -> Self {
    Self {
      frequency_table: "data/word_frequency_table.json".into(),
      lexicon: "data/lexicon.json".into(),
    }
  }
}

/// Prompt templates for the completion calls. Placeholders use `{name}` syntax.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Prompts {
  /// Stage 1. Placeholders: `{sentence}`.
  pub segment_translate: String,
  /// Stage 2. Placeholders: `{process1_result}`, `{format_instructions}`.
  pub segment_structure: String,
  /// Sense selection. Placeholders: `{word}`, `{context}`, `{synsets}`, `{format_instructions}`.
  pub synset_choice: String,
  /// Form transfer. Placeholders: `{ref_word_lemma}`, `{ref_word_transformation}`, `{words}`, `{format_instructions}`.
  pub word_transform: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      segment_translate: "You are helping a Chinese speaker learn active English expression.\n\
        Sentence (zh): {sentence}\n\n\
        1. Translate the sentence into natural, idiomatic English.\n\
        2. Split your translation into content words (nouns, verbs, adjectives, adverbs). Skip articles, pronouns, prepositions and particles.\n\
        3. For every content word give its part of speech, the Chinese phrase it translates, and that phrase's position in the Chinese sentence as `index:start` (0-based character offset).\n\
        Keep the words in the order their Chinese phrases appear in the sentence."
        .into(),
      segment_structure: "Below is a translation and word segmentation of a Chinese sentence.\n\
        ---\n{process1_result}\n---\n\
        Convert it into the structured result. `original` must be the Chinese sentence exactly as written. \
        Each word's `chinese` must be copied verbatim from `original`; `start` is its 0-based character offset in `original` and `len` its length in characters.\n\n\
        {format_instructions}"
        .into(),
      synset_choice: "Word: {word}\nContext sentence: {context}\n\n\
        Candidate WordNet senses (JSON):\n{synsets}\n\n\
        Choose the sense or senses that match how the word is used in the context. Use only names from the list.\n\n\
        {format_instructions}"
        .into(),
      word_transform: "Reference word lemma: {ref_word_lemma}\n\
        Reference word as used: {ref_word_transformation}\n\
        Words to convert: {words}\n\n\
        Rewrite every word into the same grammatical form (tense, person, number, degree) as the reference word as used. \
        Keep the order of the input list and return exactly one form per input word.\n\n\
        {format_instructions}"
        .into(),
    }
  }
}

/// Load `AppConfig` from VIVA_CONFIG_PATH. Missing variable means defaults; a broken
/// file is logged and also falls back to defaults.
pub fn load_app_config_from_env() -> AppConfig {
  let Ok(path) = std::env::var("VIVA_CONFIG_PATH") else {
    info!(target: "viva_backend", "VIVA_CONFIG_PATH not set; using built-in defaults");
    return AppConfig::default();
  };
  match std::fs::read_to_string(&path) {
    Ok(s) => match toml::from_str::<AppConfig>(&s) {
      Ok(cfg) => {
        info!(target: "viva_backend", %path, "Loaded app config (TOML)");
        cfg
      }
      Err(e) => {
        error!(target: "viva_backend", %path, error = %e, "Failed to parse TOML config; using defaults");
        AppConfig::default()
      }
    },
    Err(e) => {
      error!(target: "viva_backend", %path, error = %e, "Failed to read TOML config file; using defaults");
      AppConfig::default()
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn partial_toml_keeps_defaults() {
    let cfg: AppConfig = toml::from_str(
      r#"
      [pipeline]
      split_clauses = false

      [prompts]
      segment_translate = "translate {sentence}"
      "#,
    )
    .unwrap();
    assert!(!cfg.pipeline.split_clauses);
    assert_eq!(cfg.pipeline.common_word_rank, COMMON_WORD_RANK);
    assert_eq!(cfg.prompts.segment_translate, "translate {sentence}");
    assert!(cfg.prompts.word_transform.contains("{ref_word_lemma}"));
    assert_eq!(cfg.data.lexicon, "data/lexicon.json");
  }
}
