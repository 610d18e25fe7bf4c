//! Word-frequency ranks from a precomputed corpus table.
//!
//! The table is loaded once at startup and never mutated; share it behind an `Arc`.

use std::collections::HashMap;

use serde::Serialize;
use tracing::info;

use crate::error::DataError;

/// Rank reported for words missing from the table ("unranked / rare").
pub const UNRANKED: u32 = 66666;

/// Default threshold for `is_common_word`.
pub const COMMON_DISPLAY_THRESHOLD: u32 = 5000;

#[derive(Debug, Clone, Default)]
pub struct FrequencyTable {
  ranks: HashMap<String, u32>,
}

/// Display tier of a word's frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FrequencyLevel {
  VeryHigh,
  High,
  UpperMid,
  Mid,
  LowerMid,
  Low,
}

impl FrequencyTable {
  /// Read a JSON object of `word -> rank` from disk.
  pub fn load(path: &str) -> Result<Self, DataError> {
    let raw = std::fs::read_to_string(path).map_err(|source| DataError::Io { path: path.to_string(), source })?;
    let table = Self::from_json(&raw).map_err(|source| DataError::Format { path: path.to_string(), source })?;
    info!(target: "viva_backend", %path, words = table.len(), "Loaded word frequency table");
    Ok(table)
  }

  pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
    let parsed: HashMap<String, u32> = serde_json::from_str(raw)?;
    Ok(Self::from_pairs(parsed))
  }

  pub fn from_pairs<I, S>(pairs: I) -> Self
  where
    I: IntoIterator<Item = (S, u32)>,
    S: AsRef<str>,
  {
    let ranks = pairs.into_iter().map(|(w, r)| (w.as_ref().to_lowercase(), r)).collect();
    Self { ranks }
  }

  pub fn len(&self) -> usize {
    self.ranks.len()
  }

  /// Corpus rank of the word (case-insensitive), `UNRANKED` when unknown.
  pub fn rank(&self, word: &str) -> u32 {
    self.ranks.get(&word.trim().to_lowercase()).copied().unwrap_or(UNRANKED)
  }

  pub fn is_common_word(&self, word: &str, threshold: u32) -> bool {
    self.rank(word) <= threshold
  }

  pub fn frequency_level(&self, word: &str) -> FrequencyLevel {
    match self.rank(word) {
      0..=1000 => FrequencyLevel::VeryHigh,
      1001..=3000 => FrequencyLevel::High,
      3001..=5000 => FrequencyLevel::UpperMid,
      5001..=10000 => FrequencyLevel::Mid,
      10001..=20000 => FrequencyLevel::LowerMid,
      _ => FrequencyLevel::Low,
    }
  }
}
