//! Lexical relations: lemmas, stems, senses and context-aware synonyms.
//!
//! Senses come from a bundled WordNet-style lexicon (synsets with definitions and
//! lemmas, plus irregular-form exception lists). Choosing the sense that fits a
//! sentence is delegated to one completion call.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use rust_stemmers::{Algorithm, Stemmer};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::domain::Pos;
use crate::error::{DataError, UpstreamError};
use crate::llm::{parse_reply, ChatCompletion};
use crate::util::fill_template;

/// Schema instructions appended to the sense-selection prompt.
pub const SYNSET_FORMAT_INSTRUCTIONS: &str = r#"Respond with a single JSON object and nothing else, matching this schema:
{"synsets": [{"synset_name": "<name copied from the candidate list>", "definition": "<definition of that sense>"}]}
List only the senses that fit the context, best first."#;

/// One sense: a named set of interchangeable lemmas.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Synset {
  pub name: String,
  pub pos: Pos,
  pub definition: String,
  pub lemmas: Vec<String>,
}

#[derive(Deserialize)]
struct LexiconFile {
  synsets: Vec<Synset>,
  #[serde(default)]
  exceptions: HashMap<Pos, HashMap<String, Vec<String>>>,
}

/// In-memory lexicon, immutable after load.
pub struct Lexicon {
  synsets: Vec<Synset>,
  by_name: HashMap<String, usize>,
  /// (lemma, pos) -> synset indices
  index: HashMap<(String, Pos), Vec<usize>>,
  exceptions: HashMap<Pos, HashMap<String, Vec<String>>>,
  stemmer: Stemmer,
}

impl Lexicon {
  pub fn load(path: &str) -> Result<Self, DataError> {
    let raw = std::fs::read_to_string(path).map_err(|source| DataError::Io { path: path.to_string(), source })?;
    let lexicon = Self::from_json(&raw).map_err(|source| DataError::Format { path: path.to_string(), source })?;
    info!(target: "viva_backend", %path, synsets = lexicon.synsets.len(), "Loaded lexicon");
    Ok(lexicon)
  }

  pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
    let file: LexiconFile = serde_json::from_str(raw)?;
    Ok(Self::new(file.synsets, file.exceptions))
  }

  pub fn new(synsets: Vec<Synset>, exceptions: HashMap<Pos, HashMap<String, Vec<String>>>) -> Self {
    let mut by_name = HashMap::new();
    let mut index: HashMap<(String, Pos), Vec<usize>> = HashMap::new();
    for (i, s) in synsets.iter().enumerate() {
      by_name.insert(s.name.clone(), i);
      for lemma in &s.lemmas {
        index.entry((normalize(lemma), s.pos)).or_default().push(i);
      }
    }
    Self { synsets, by_name, index, exceptions, stemmer: Stemmer::create(Algorithm::English) }
  }

  pub fn synset(&self, name: &str) -> Option<&Synset> {
    self.by_name.get(name).map(|&i| &self.synsets[i])
  }

  fn has_lemma(&self, form: &str, pos: Pos) -> bool {
    self.index.contains_key(&(form.to_string(), pos))
  }

  /// WordNet "morphy": base forms of `word` known to the lexicon.
  pub fn morphy(&self, word: &str, pos: Pos) -> Vec<String> {
    let form = normalize(word);

    let filter = |forms: Vec<String>| -> Vec<String> {
      let mut seen = HashSet::new();
      forms
        .into_iter()
        .filter(|f| self.has_lemma(f, pos) && seen.insert(f.clone()))
        .collect()
    };

    if let Some(bases) = self.exceptions.get(&pos).and_then(|m| m.get(&form)) {
      let mut candidates = vec![form.clone()];
      candidates.extend(bases.iter().map(|b| normalize(b)));
      let known = filter(candidates);
      // Irregular forms are trusted even when the base is outside the bundled lexicon.
      return if known.is_empty() { bases.iter().map(|b| normalize(b)).collect() } else { known };
    }

    let mut forms = apply_rules(&[form.clone()], pos);
    let mut first = vec![form];
    first.extend(forms.iter().cloned());
    let results = filter(first);
    if !results.is_empty() {
      return results;
    }
    while !forms.is_empty() {
      forms = apply_rules(&forms, pos);
      let results = filter(forms.clone());
      if !results.is_empty() {
        return results;
      }
    }
    Vec::new()
  }

  /// Dictionary form of the word ("decided" -> "decide"); the word itself when unknown.
  pub fn lemma(&self, word: &str, pos: Pos) -> String {
    self
      .morphy(word, pos)
      .into_iter()
      .min_by_key(|f| f.len())
      .map(|f| f.replace('_', " "))
      .unwrap_or_else(|| word.trim().to_lowercase())
  }

  /// Crude root used for equality checks; not necessarily a real word.
  pub fn stem(&self, word: &str) -> String {
    self.stemmer.stem(&word.trim().to_lowercase()).into_owned()
  }

  /// Senses of `word` for the given part of speech, in lexicon order.
  pub fn synsets(&self, word: &str, pos: Pos) -> Vec<&Synset> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for base in self.morphy(word, pos) {
      if let Some(ids) = self.index.get(&(base, pos)) {
        for &i in ids {
          if seen.insert(i) {
            out.push(&self.synsets[i]);
          }
        }
      }
    }
    out.sort_by_key(|s| self.by_name.get(&s.name).copied().unwrap_or(usize::MAX));
    out
  }
}

fn normalize(word: &str) -> String {
  word.trim().to_lowercase().replace(' ', "_")
}

fn substitutions(pos: Pos) -> &'static [(&'static str, &'static str)] {
  match pos {
    Pos::Noun => &[
      ("s", ""), ("ses", "s"), ("ves", "f"), ("xes", "x"), ("zes", "z"),
      ("ches", "ch"), ("shes", "sh"), ("men", "man"), ("ies", "y"),
    ],
    Pos::Verb => &[
      ("s", ""), ("ies", "y"), ("es", "e"), ("es", ""),
      ("ed", "e"), ("ed", ""), ("ing", "e"), ("ing", ""),
    ],
    Pos::Adjective => &[("er", ""), ("est", ""), ("er", "e"), ("est", "e")],
    Pos::Adverb => &[],
  }
}

fn apply_rules(forms: &[String], pos: Pos) -> Vec<String> {
  let mut out = Vec::new();
  for form in forms {
    for (old, new) in substitutions(pos) {
      if let Some(stripped) = form.strip_suffix(old) {
        if !stripped.is_empty() {
          out.push(format!("{}{}", stripped, new));
        }
      }
    }
  }
  out
}

#[derive(Serialize)]
struct SynsetView<'a> {
  name: &'a str,
  definition: &'a str,
  lemmas: &'a [String],
}

/// The reply also echoes each sense's definition; only the name is read.
#[derive(Deserialize)]
struct ChosenSynset {
  synset_name: String,
}

#[derive(Deserialize)]
struct ChooseSynsetOutput {
  synsets: Vec<ChosenSynset>,
}

/// Lexicon plus the completion call that picks senses for a context.
#[derive(Clone)]
pub struct LexicalRelations {
  pub lexicon: Arc<Lexicon>,
  chat: Arc<dyn ChatCompletion>,
  prompt: String,
}

impl LexicalRelations {
  pub fn new(lexicon: Arc<Lexicon>, chat: Arc<dyn ChatCompletion>, prompt: String) -> Self {
    Self { lexicon, chat, prompt }
  }

  pub fn lemma(&self, word: &str, pos: Pos) -> String {
    self.lexicon.lemma(word, pos)
  }

  pub fn stem(&self, word: &str) -> String {
    self.lexicon.stem(word)
  }

  /// Synonyms of `word` in the sense(s) it carries inside `context`.
  ///
  /// Lemmas sharing the word's stem are excluded, so the result never contains
  /// other inflections of the word itself. Returns an empty list without calling
  /// the model when the lexicon has no sense for the word.
  #[instrument(level = "debug", skip(self, context), fields(%word, pos = pos.tag()))]
  pub async fn synonyms_by_context(&self, word: &str, pos: Pos, context: &str) -> Result<Vec<String>, UpstreamError> {
    let senses = self.lexicon.synsets(word, pos);
    if senses.is_empty() {
      debug!(target: "segmentation", %word, "no senses in lexicon; skipping sense selection");
      return Ok(Vec::new());
    }

    let views: Vec<SynsetView<'_>> = senses
      .iter()
      .map(|s| SynsetView { name: &s.name, definition: &s.definition, lemmas: &s.lemmas })
      .collect();
    let synsets_json = serde_json::to_string_pretty(&views).map_err(|e| UpstreamError::Parse(e.to_string()))?;
    let prompt = fill_template(
      &self.prompt,
      &[
        ("word", word),
        ("context", context),
        ("synsets", &synsets_json),
        ("format_instructions", SYNSET_FORMAT_INSTRUCTIONS),
      ],
    );

    let reply = self.chat.chat(&prompt).await?;
    let chosen: ChooseSynsetOutput = parse_reply(&reply).into_result()?;

    let original_stem = self.stem(word);
    let mut seen = HashSet::new();
    let mut synonyms = Vec::new();
    for pick in chosen.synsets {
      let Some(synset) = self.lexicon.synset(pick.synset_name.trim()) else {
        warn!(target: "segmentation", %word, synset = %pick.synset_name, "model chose an unknown sense; ignoring");
        continue;
      };
      for lemma in &synset.lemmas {
        let display = lemma.replace('_', " ");
        if self.stem(&display) == original_stem {
          continue;
        }
        if seen.insert(display.to_lowercase()) {
          synonyms.push(display);
        }
      }
    }
    debug!(target: "segmentation", %word, count = synonyms.len(), "context synonyms collected");
    Ok(synonyms)
  }
}

#[cfg(test)]
pub(crate) mod tests {
  use super::*;
  use crate::llm::testing::ScriptedChat;

  pub(crate) fn sample_lexicon() -> Lexicon {
    Lexicon::from_json(
      r#"{
        "synsets": [
          {"name": "happy.a.01", "pos": "a", "definition": "enjoying or showing joy", "lemmas": ["happy"]},
          {"name": "glad.a.01", "pos": "a", "definition": "showing pleasure", "lemmas": ["glad", "happy", "felicitous"]},
          {"name": "decide.v.01", "pos": "v", "definition": "reach a conclusion", "lemmas": ["decide", "make_up_one's_mind", "determine"]},
          {"name": "run.v.01", "pos": "v", "definition": "move fast on foot", "lemmas": ["run"]},
          {"name": "dog.n.01", "pos": "n", "definition": "a domestic canine", "lemmas": ["dog", "domestic_dog"]},
          {"name": "box.n.01", "pos": "n", "definition": "a container", "lemmas": ["box"]}
        ],
        "exceptions": {"v": {"ran": ["run"]}, "a": {"happier": ["happy"]}}
      }"#,
    )
    .unwrap()
  }

  #[test]
  fn morphy_lemmas() {
    let lx = sample_lexicon();
    assert_eq!(lx.lemma("decided", Pos::Verb), "decide");
    assert_eq!(lx.lemma("deciding", Pos::Verb), "decide");
    assert_eq!(lx.lemma("ran", Pos::Verb), "run");
    assert_eq!(lx.lemma("dogs", Pos::Noun), "dog");
    assert_eq!(lx.lemma("boxes", Pos::Noun), "box");
    assert_eq!(lx.lemma("happier", Pos::Adjective), "happy");
    assert_eq!(lx.lemma("zorbing", Pos::Verb), "zorbing");
  }

  #[test]
  fn stems_collapse_inflections() {
    let lx = sample_lexicon();
    assert_eq!(lx.stem("decided"), lx.stem("decide"));
    assert_ne!(lx.stem("decide"), lx.stem("determine"));
  }

  #[test]
  fn synsets_are_found_through_inflections() {
    let lx = sample_lexicon();
    let names: Vec<&str> = lx.synsets("happy", Pos::Adjective).iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["happy.a.01", "glad.a.01"]);
    assert_eq!(lx.synsets("decided", Pos::Verb).len(), 1);
    assert!(lx.synsets("happy", Pos::Verb).is_empty());
  }

  #[tokio::test]
  async fn context_synonyms_skip_same_stem_and_unknown_senses() {
    let chat = Arc::new(ScriptedChat::new().then(
      r#"```json
      {"synsets": [{"synset_name": "glad.a.01", "definition": "showing pleasure"}, {"synset_name": "nope.a.09", "definition": ""}]}
      ```"#,
    ));
    let rel = LexicalRelations::new(Arc::new(sample_lexicon()), chat.clone(), "{word}|{context}|{synsets}|{format_instructions}".into());
    let syns = rel.synonyms_by_context("happy", Pos::Adjective, "我很开心").await.unwrap();
    assert_eq!(syns, vec!["glad", "felicitous"]);
    assert_eq!(chat.calls(), 1);
    assert!(chat.prompts.lock().unwrap()[0].contains("glad.a.01"));
  }

  #[tokio::test]
  async fn multiword_lemmas_use_spaces() {
    let chat = Arc::new(ScriptedChat::new().then(r#"{"synsets": [{"synset_name": "decide.v.01", "definition": ""}]}"#));
    let rel = LexicalRelations::new(Arc::new(sample_lexicon()), chat, "{word}".into());
    let syns = rel.synonyms_by_context("decided", Pos::Verb, "ctx").await.unwrap();
    assert_eq!(syns, vec!["make up one's mind", "determine"]);
  }

  #[tokio::test]
  async fn sense_choice_needs_only_the_name() {
    let chat = Arc::new(ScriptedChat::new().then(r#"{"synsets": [{"synset_name": "decide.v.01"}]}"#));
    let rel = LexicalRelations::new(Arc::new(sample_lexicon()), chat, "{word}".into());
    let syns = rel.synonyms_by_context("decided", Pos::Verb, "ctx").await.unwrap();
    assert_eq!(syns, vec!["make up one's mind", "determine"]);
  }

  #[tokio::test]
  async fn unknown_word_makes_no_call() {
    let chat = Arc::new(ScriptedChat::new());
    let rel = LexicalRelations::new(Arc::new(sample_lexicon()), chat.clone(), "{word}".into());
    assert!(rel.synonyms_by_context("qwerty", Pos::Noun, "ctx").await.unwrap().is_empty());
    assert_eq!(chat.calls(), 0);
  }

  #[tokio::test]
  async fn malformed_reply_is_a_parse_error() {
    let chat = Arc::new(ScriptedChat::new().then("I think the first sense fits best."));
    let rel = LexicalRelations::new(Arc::new(sample_lexicon()), chat, "{word}".into());
    let err = rel.synonyms_by_context("happy", Pos::Adjective, "ctx").await.unwrap_err();
    assert!(matches!(err, UpstreamError::Parse(_)));
  }

  #[test]
  fn loads_lexicon_file() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/testdata/lexicon.json");
    let lx = Lexicon::load(path).unwrap();
    assert!(lx.synset("decide.v.01").is_some());
    assert_eq!(lx.lemma("went", Pos::Verb), "go");
    assert!(lx.synsets("happier", Pos::Adjective).len() >= 2);
  }
}
