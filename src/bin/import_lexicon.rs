//! Builds the lexical data files the server loads at startup.
//!
//! - `lexicon.json` from a WordNet 3.0 database directory (`data.*`, `index.*` and the
//!   `*.exc` exception lists, as shipped in WNdb-3.0 under `dict/`)
//! - `word_frequency_table.json` from a ranked word list: one word per line in rank
//!   order, or `rank<TAB>word...` rows as in the COCA lemma lists
//!
//! Example:
//!   cargo run --bin import_lexicon -- --wordnet-dir ~/WordNet-3.0/dict \
//!     --frequency-list lemmas_60k.txt --out data

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use clap::Parser;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

/// WordNet file suffix -> one-letter POS used in exception maps.
const POS_FILES: &[(&str, &str)] = &[("noun", "n"), ("verb", "v"), ("adj", "a"), ("adv", "r")];

#[derive(Parser, Debug)]
#[command(name = "import_lexicon", about = "Generate lexicon.json and word_frequency_table.json")]
struct Args {
  /// WordNet 3.0 `dict/` directory.
  #[arg(long)]
  wordnet_dir: Option<PathBuf>,
  /// Ranked word list (plain or COCA-style rows).
  #[arg(long)]
  frequency_list: Option<PathBuf>,
  /// Output directory.
  #[arg(long, default_value = "data")]
  out: PathBuf,
  /// Drop words ranked below this.
  #[arg(long)]
  max_rank: Option<u32>,
}

#[derive(Debug, Error)]
enum ImportError {
  #[error("failed to access {path}: {source}")]
  Io { path: String, #[source] source: std::io::Error },
  #[error("{path}:{line}: {reason}")]
  Format { path: String, line: usize, reason: String },
  #[error("failed to encode output: {0}")]
  Json(#[from] serde_json::Error),
  #[error("nothing to do: pass --wordnet-dir and/or --frequency-list")]
  NoInput,
}

#[derive(Debug, Serialize, PartialEq)]
struct SynsetOut {
  name: String,
  pos: String,
  definition: String,
  lemmas: Vec<String>,
}

#[derive(Debug, Serialize)]
struct LexiconOut {
  synsets: Vec<SynsetOut>,
  exceptions: BTreeMap<String, BTreeMap<String, Vec<String>>>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
  tracing_subscriber::fmt().with_target(false).init();
  let args = Args::parse();
  if args.wordnet_dir.is_none() && args.frequency_list.is_none() {
    return Err(ImportError::NoInput.into());
  }
  fs::create_dir_all(&args.out).map_err(|source| io_err(&args.out, source))?;

  if let Some(dir) = &args.wordnet_dir {
    let lexicon = import_wordnet(dir)?;
    let path = args.out.join("lexicon.json");
    write_json(&path, &lexicon)?;
    info!(path = %path.display(), synsets = lexicon.synsets.len(), "lexicon written");
  }
  if let Some(list) = &args.frequency_list {
    let raw = read(list)?;
    let ranks = parse_frequency_list(&raw, args.max_rank);
    let path = args.out.join("word_frequency_table.json");
    write_json(&path, &ranks)?;
    info!(path = %path.display(), words = ranks.len(), "frequency table written");
  }
  Ok(())
}

fn io_err(path: &Path, source: std::io::Error) -> ImportError {
  ImportError::Io { path: path.display().to_string(), source }
}

fn read(path: &Path) -> Result<String, ImportError> {
  fs::read(path)
    .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
    .map_err(|source| io_err(path, source))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), ImportError> {
  let body = serde_json::to_string(value)?;
  fs::write(path, body).map_err(|source| io_err(path, source))
}

fn import_wordnet(dir: &Path) -> Result<LexiconOut, ImportError> {
  let mut synsets = Vec::new();
  let mut exceptions = BTreeMap::new();
  for (suffix, tag) in POS_FILES {
    let index_path = dir.join(format!("index.{}", suffix));
    let senses = parse_index(&read(&index_path)?, &index_path)?;

    let data_path = dir.join(format!("data.{}", suffix));
    let data = read(&data_path)?;
    for (i, line) in data.lines().enumerate() {
      if is_license_line(line) {
        continue;
      }
      let synset = parse_data_line(line, &senses).map_err(|reason| ImportError::Format {
        path: data_path.display().to_string(),
        line: i + 1,
        reason,
      })?;
      synsets.push(synset);
    }

    let exc_path = dir.join(format!("{}.exc", suffix));
    match fs::read_to_string(&exc_path) {
      Ok(raw) => {
        exceptions.insert(tag.to_string(), parse_exceptions(&raw));
      }
      Err(e) => warn!(path = %exc_path.display(), error = %e, "no exception list; skipping"),
    }
  }
  Ok(LexiconOut { synsets, exceptions })
}

/// WNdb files open with a license block whose lines start with two spaces.
fn is_license_line(line: &str) -> bool {
  line.starts_with("  ") || line.trim().is_empty()
}

/// `(lemma, synset offset) -> sense number` from an `index.<pos>` file.
fn parse_index(raw: &str, path: &Path) -> Result<HashMap<(String, String), usize>, ImportError> {
  let mut senses = HashMap::new();
  for (i, line) in raw.lines().enumerate() {
    if is_license_line(line) {
      continue;
    }
    let err = |reason: &str| ImportError::Format { path: path.display().to_string(), line: i + 1, reason: reason.into() };
    let f: Vec<&str> = line.split_whitespace().collect();
    if f.len() < 4 {
      return Err(err("short index line"));
    }
    let synset_cnt: usize = f[2].parse().map_err(|_| err("bad synset_cnt"))?;
    let p_cnt: usize = f[3].parse().map_err(|_| err("bad p_cnt"))?;
    // lemma pos synset_cnt p_cnt [ptr_symbol x p_cnt] sense_cnt tagsense_cnt offsets...
    let offsets_at = 4 + p_cnt + 2;
    let offsets = f.get(offsets_at..offsets_at + synset_cnt).ok_or_else(|| err("missing synset offsets"))?;
    for (n, offset) in offsets.iter().enumerate() {
      senses.insert((f[0].to_string(), offset.to_string()), n + 1);
    }
  }
  Ok(senses)
}

/// One synset from a `data.<pos>` line:
/// `offset lex_filenum ss_type w_cnt(hex) word lex_id ... p_cnt ... | gloss`.
fn parse_data_line(line: &str, senses: &HashMap<(String, String), usize>) -> Result<SynsetOut, String> {
  let (head, gloss) = line.split_once(" | ").unwrap_or((line, ""));
  let f: Vec<&str> = head.split_whitespace().collect();
  if f.len() < 4 {
    return Err("short data line".into());
  }
  let (offset, ss_type) = (f[0], f[2]);
  let w_cnt = usize::from_str_radix(f[3], 16).map_err(|_| format!("bad w_cnt '{}'", f[3]))?;
  let words = f.get(4..4 + 2 * w_cnt).ok_or("missing words")?;
  let lemmas: Vec<String> = words.iter().step_by(2).map(|w| strip_marker(w).to_string()).collect();
  let first = lemmas.first().ok_or("synset without words")?.to_lowercase();
  let sense = senses.get(&(first.clone(), offset.to_string())).copied().unwrap_or(1);

  // Glosses append quoted examples after `; "`.
  let definition = gloss.split("; \"").next().unwrap_or_default().trim().to_string();
  Ok(SynsetOut { name: format!("{}.{}.{:02}", first, ss_type, sense), pos: ss_type.to_string(), definition, lemmas })
}

/// Adjective lemmas carry a syntactic marker such as `(a)` or `(ip)`.
fn strip_marker(word: &str) -> &str {
  match word.find('(') {
    Some(i) if word.ends_with(')') => &word[..i],
    _ => word,
  }
}

/// `inflected base [base...]` per line.
fn parse_exceptions(raw: &str) -> BTreeMap<String, Vec<String>> {
  let mut out = BTreeMap::new();
  for line in raw.lines() {
    let mut f = line.split_whitespace();
    if let Some(form) = f.next() {
      let bases: Vec<String> = f.map(String::from).collect();
      if !bases.is_empty() {
        out.insert(form.to_string(), bases);
      }
    }
  }
  out
}

/// Ranks from a word list. The first occurrence of a word keeps its rank; rows that do
/// not carry an explicit rank are numbered in file order.
fn parse_frequency_list(raw: &str, max_rank: Option<u32>) -> BTreeMap<String, u32> {
  let mut out = BTreeMap::new();
  let mut implicit = 0u32;
  for line in raw.lines() {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
      continue;
    }
    let fields: Vec<&str> = line.split(|c: char| c == '\t' || c == ',' || c.is_whitespace()).filter(|s| !s.is_empty()).collect();
    let Some(first) = fields.first() else { continue };
    let (word, rank) = match (first.parse::<u32>().ok(), fields.get(1)) {
      (Some(rank), Some(word)) => (*word, rank),
      _ => {
        implicit += 1;
        (*first, implicit)
      }
    };
    let word = word.to_lowercase();
    if !word.chars().all(|c| c.is_ascii_alphabetic() || c == '-' || c == '\'') {
      continue;
    }
    if max_rank.is_some_and(|m| rank > m) {
      continue;
    }
    out.entry(word).or_insert(rank);
  }
  out
}
