//! Word-form transfer: rewrite candidate synonyms into the reference word's inflection
//! ("playing" + [run, swim] -> [running, swimming]).

use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, instrument};

use crate::domain::Pos;
use crate::error::UpstreamError;
use crate::lexicon::LexicalRelations;
use crate::llm::{parse_reply, ChatCompletion};
use crate::util::fill_template;

pub const TRANSFORM_FORMAT_INSTRUCTIONS: &str = r#"Respond with a single JSON object and nothing else, matching this schema:
{"words_transformation": ["<converted word 1>", "<converted word 2>", ...]}"#;

#[derive(Deserialize)]
struct WordTransformationResult {
  words_transformation: Vec<String>,
}

#[derive(Clone)]
pub struct WordFormTransformer {
  relations: LexicalRelations,
  chat: Arc<dyn ChatCompletion>,
  prompt: String,
}

impl WordFormTransformer {
  pub fn new(relations: LexicalRelations, chat: Arc<dyn ChatCompletion>, prompt: String) -> Self {
    Self { relations, chat, prompt }
  }

  /// Converted forms, in the order the model returned them. An empty candidate list
  /// returns immediately without a completion call.
  #[instrument(level = "debug", skip(self, candidates), fields(%word, pos = pos.tag(), candidates = candidates.len()))]
  pub async fn transform(&self, word: &str, pos: Pos, candidates: &[String]) -> Result<Vec<String>, UpstreamError> {
    if candidates.is_empty() {
      return Ok(Vec::new());
    }
    let lemma = self.relations.lemma(word, pos);
    let words_json = serde_json::to_string(candidates).map_err(|e| UpstreamError::Parse(e.to_string()))?;
    let prompt = fill_template(
      &self.prompt,
      &[
        ("ref_word_lemma", &lemma),
        ("ref_word_transformation", word),
        ("words", &words_json),
        ("format_instructions", TRANSFORM_FORMAT_INSTRUCTIONS),
      ],
    );

    let reply = self.chat.chat(&prompt).await?;
    let parsed: WordTransformationResult = parse_reply(&reply).into_result()?;
    let forms: Vec<String> = parsed
      .words_transformation
      .into_iter()
      .map(|w| w.trim().to_string())
      .filter(|w| !w.is_empty())
      .collect();
    debug!(target: "segmentation", %word, %lemma, forms = ?forms, "candidates transformed");
    Ok(forms)
  }
}
