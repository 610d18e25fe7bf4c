//! Offset alignment: where does each segmented Chinese phrase sit in the sentence?
//!
//! Two signals exist and neither is fully reliable:
//! 1. an embedded `<number>:<number>` index marker found in the text after the cursor;
//! 2. the `start`/`len` the model put on the structured word.
//!
//! The marker wins whenever it is present; otherwise the model fields are trusted as-is.
//! The two are never cross-checked. When the model omitted both fields we fall back to
//! a literal search from the cursor, and finally to an empty span at the cursor.

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use crate::util::{char_len, char_tail};

/// Which strategy produced a span.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanSource {
  Marker,
  Model,
  Search,
  Cursor,
}

/// The parts of a word the aligner looks at.
pub struct SpanQuery<'a> {
  pub chinese: &'a str,
  pub start: Option<usize>,
  pub len: Option<usize>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Span {
  pub start: usize,
  pub end: usize,
  pub source: SpanSource,
  /// The raw signal pointed outside the sentence and was clamped.
  pub clamped: bool,
}

fn marker_re() -> &'static Regex {
  static RE: OnceLock<Regex> = OnceLock::new();
  RE.get_or_init(|| Regex::new(r"\d+:(\d+)").expect("static marker regex"))
}

/// Resolves `[start, end)` in chars of `original`, searching from `cursor` onward.
///
/// Always returns `0 <= start <= end <= chars(original)`.
pub fn resolve_span(word: &SpanQuery<'_>, original: &str, cursor: usize) -> Span {
  let total = char_len(original);
  let cursor = cursor.min(total);
  let phrase_len = char_len(word.chinese);

  let marker = marker_re()
    .captures(char_tail(original, cursor))
    .and_then(|c| c.get(1))
    .and_then(|m| m.as_str().parse::<usize>().ok());

  let (start, end, source) = if let Some(offset) = marker {
    let start = offset.saturating_add(cursor);
    (start, start.saturating_add(phrase_len), SpanSource::Marker)
  } else if word.start.is_some() || word.len.is_some() {
    let start = word.start.unwrap_or(cursor);
    let len = word.len.unwrap_or(phrase_len);
    (start, start.saturating_add(len), SpanSource::Model)
  } else if let Some(found) = find_from(original, word.chinese, cursor) {
    (found, found + phrase_len, SpanSource::Search)
  } else {
    (cursor, cursor, SpanSource::Cursor)
  };

  let c_start = start.min(total);
  let c_end = end.clamp(c_start, total);
  Span { start: c_start, end: c_end, source, clamped: c_start != start || c_end != end }
}

/// Char index of the first occurrence of `needle` at or after char `from`.
fn find_from(haystack: &str, needle: &str, from: usize) -> Option<usize> {
  if needle.is_empty() {
    return None;
  }
  let tail = char_tail(haystack, from);
  tail.find(needle).map(|b| from + char_len(&tail[..b]))
}

/// Brackets and double quotes; apostrophes stay ("make up one's mind").
const STRIP_CHARS: &[char] = &['(', ')', '（', '）', '"', '“', '”'];

/// Strips bracket and double-quote characters from every comma-separated token and rejoins with commas.
pub fn clean_english(raw: &str) -> String {
  raw
    .split(',')
    .map(clean_token)
    .collect::<Vec<_>>()
    .join(",")
}

pub fn clean_token(token: &str) -> String {
  token.chars().filter(|c| !STRIP_CHARS.contains(c)).collect::<String>().trim().to_string()
}

#[cfg(test)]
mod tests {
  use super::*;

  fn q<'a>(chinese: &'a str, start: Option<usize>, len: Option<usize>) -> SpanQuery<'a> {
    SpanQuery { chinese, start, len }
  }

  #[test]
  fn model_fields_are_used_without_marker() {
    let s = "我今天很开心";
    let span = resolve_span(&q("开心", Some(4), Some(2)), s, 0);
    assert_eq!((span.start, span.end, span.source), (4, 6, SpanSource::Model));
    let picked: String = s.chars().skip(span.start).take(span.end - span.start).collect();
    assert_eq!(picked, "开心");
  }

  #[test]
  fn marker_after_cursor_wins_over_model_fields() {
    let s = "abc 0:2 def";
    let span = resolve_span(&q("de", Some(9), Some(2)), s, 3);
    assert_eq!(span.source, SpanSource::Marker);
    assert_eq!((span.start, span.end), (5, 7));
  }

  #[test]
  fn marker_before_cursor_is_ignored() {
    let s = "0:1 我喜欢你";
    let span = resolve_span(&q("你", Some(6), Some(1)), s, 4);
    assert_eq!(span.source, SpanSource::Model);
    assert_eq!((span.start, span.end), (6, 7));
  }

  #[test]
  fn missing_fields_fall_back_to_search_then_cursor() {
    let s = "天气很好，天气真好";
    let first = resolve_span(&q("天气", None, None), s, 0);
    assert_eq!((first.start, first.end, first.source), (0, 2, SpanSource::Search));
    let second = resolve_span(&q("天气", None, None), s, first.end);
    assert_eq!((second.start, second.end), (5, 7));
    let none = resolve_span(&q("下雨", None, None), s, 3);
    assert_eq!((none.start, none.end, none.source), (3, 3, SpanSource::Cursor));
  }

  #[test]
  fn empty_phrase_gives_zero_length_span() {
    let span = resolve_span(&q("", Some(2), Some(0)), "我很好", 0);
    assert_eq!((span.start, span.end), (2, 2));
    let span = resolve_span(&q("", None, None), "我很好", 1);
    assert_eq!((span.start, span.end), (1, 1));
  }

  #[test]
  fn spans_are_clamped_into_the_sentence() {
    let s = "我很好";
    let span = resolve_span(&q("很好", Some(2), Some(5)), s, 0);
    assert_eq!((span.start, span.end), (2, 3));
    assert!(span.clamped);
    let span = resolve_span(&q("很好", Some(40), Some(2)), s, 0);
    assert_eq!((span.start, span.end), (3, 3));
    let span = resolve_span(&q("x", None, None), s, 99);
    assert!(span.start <= span.end && span.end <= 3);
  }

  #[test]
  fn cleans_brackets_and_quotes_per_token() {
    assert_eq!(clean_english("(happy), \"glad\",“joyful”"), "happy,glad,joyful");
    assert_eq!(clean_english("take（a）break"), "takeabreak");
    assert_eq!(clean_english("weather"), "weather");
    assert_eq!(clean_token("make up one's mind"), "make up one's mind");
  }
}
