//! Essay validation and sentence/clause splitting.

use crate::error::PipelineError;
use crate::util::char_len;

const TERMINATORS: &[char] = &['。', '！', '？', '!', '?'];
const CLAUSE_PUNCT: &[char] = &['，', '；', ',', ';'];
/// Connectives that open a new clause; fragments are cut right before them.
/// Words that also occur inside ordinary words (不过 in 忙不过来, 可是 as "really is")
/// are left out.
const CLAUSE_CONNECTIVES: &[&str] = &["因为", "所以", "但是", "而且", "然后", "如果"];
/// (connective, preceding char) pairs where the connective is part of a longer word.
const BOUND_FORMS: &[(&str, char)] = &[("所以", '之')];

/// Rejects empty essays and essays longer than `max_chars` characters.
pub fn validate_essay(content: &str, max_chars: usize) -> Result<(), PipelineError> {
  if content.trim().is_empty() {
    return Err(PipelineError::Validation("作文内容不能为空。".into()));
  }
  let n = char_len(content);
  if n > max_chars {
    return Err(PipelineError::Validation(format!("作文内容不能超过{}个字。（当前{}个字）", max_chars, n)));
  }
  Ok(())
}

/// Splits an essay into trimmed, non-empty fragments.
///
/// Terminators stay attached to the sentence they end. With `split_clauses`, commas,
/// semicolons and clause connectives also start a new fragment.
pub fn split_into_sentences(essay: &str, split_clauses: bool) -> Vec<String> {
  let mut out = Vec::new();
  let mut current = String::new();
  let mut rest = essay;

  while let Some(ch) = rest.chars().next() {
    if split_clauses && !current.trim().is_empty() {
      let conn = CLAUSE_CONNECTIVES
        .iter()
        .find(|c| rest.starts_with(**c) && !is_bound(&current, c));
      if let Some(conn) = conn {
        push_fragment(&mut out, &mut current);
        current.push_str(conn);
        rest = &rest[conn.len()..];
        continue;
      }
    }

    current.push(ch);
    rest = &rest[ch.len_utf8()..];

    let is_break = TERMINATORS.contains(&ch) || (split_clauses && CLAUSE_PUNCT.contains(&ch));
    if is_break {
      // Keep runs like "？！" or "……。" together with the sentence they close.
      while let Some(next) = rest.chars().next() {
        if TERMINATORS.contains(&next) || next == '”' || next == '"' {
          current.push(next);
          rest = &rest[next.len_utf8()..];
        } else {
          break;
        }
      }
      push_fragment(&mut out, &mut current);
    }
  }
  push_fragment(&mut out, &mut current);
  out
}

fn is_bound(current: &str, conn: &str) -> bool {
  let prev = current.chars().last();
  BOUND_FORMS.iter().any(|(c, p)| *c == conn && prev == Some(*p))
}

fn push_fragment(out: &mut Vec<String>, current: &mut String) {
  let trimmed = current.trim();
  // A fragment of bare punctuation carries nothing to map.
  if !trimmed.is_empty() && !trimmed.chars().all(|c| TERMINATORS.contains(&c) || CLAUSE_PUNCT.contains(&c)) {
    out.push(trimmed.to_string());
  }
  current.clear();
}
