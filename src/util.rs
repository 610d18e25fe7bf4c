//! Small helpers shared by the prompt, pipeline and logging code.

/// Replaces occurrences of `{key}` in the template with the provided values.
/// No escaping or nesting; unknown placeholders are left as-is.
pub fn fill_template(tpl: &str, pairs: &[(&str, &str)]) -> String {
  let mut out = tpl.to_string();
  for (k, v) in pairs {
    let needle = format!("{{{}}}", k);
    out = out.replace(&needle, v);
  }
  out
}

/// True if the char belongs to the CJK ideograph blocks.
pub fn is_cjk(ch: char) -> bool {
  ('\u{4E00}'..='\u{9FFF}').contains(&ch)
    || ('\u{3400}'..='\u{4DBF}').contains(&ch)
    || ('\u{20000}'..='\u{2A6DF}').contains(&ch)
    || ('\u{2A700}'..='\u{2B73F}').contains(&ch)
    || ('\u{2B740}'..='\u{2B81F}').contains(&ch)
    || ('\u{2B820}'..='\u{2CEAF}').contains(&ch)
    || ('\u{F900}'..='\u{FAFF}').contains(&ch)
}

/// Length in Unicode scalar values. Every offset in this crate is counted this way.
pub fn char_len(s: &str) -> usize {
  s.chars().count()
}

/// Byte index of the `char_idx`-th char, or `s.len()` when past the end.
pub fn byte_offset(s: &str, char_idx: usize) -> usize {
  s.char_indices().nth(char_idx).map(|(b, _)| b).unwrap_or(s.len())
}

/// Suffix of `s` starting at char index `char_idx` (empty when past the end).
pub fn char_tail(s: &str, char_idx: usize) -> &str {
  &s[byte_offset(s, char_idx)..]
}

/// Log-safe truncation that never splits a char.
pub fn trunc_for_log(s: &str, max_chars: usize) -> String {
  let total = char_len(s);
  if total <= max_chars {
    s.to_string()
  } else {
    let head: String = s.chars().take(max_chars).collect();
    format!("{}… ({} chars total)", head, total)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn template_fills_known_keys_only() {
    let out = fill_template("{a} and {b} and {c}", &[("a", "1"), ("b", "2")]);
    assert_eq!(out, "1 and 2 and {c}");
  }

  #[test]
  fn char_helpers_work_on_multibyte_text() {
    let s = "我今天很开心";
    assert_eq!(char_len(s), 6);
    assert_eq!(char_tail(s, 4), "开心");
    assert_eq!(char_tail(s, 10), "");
    assert!(is_cjk('开'));
    assert!(!is_cjk('a'));
  }

  #[test]
  fn truncation_keeps_char_boundaries() {
    assert_eq!(trunc_for_log("天气很好", 10), "天气很好");
    assert!(trunc_for_log("天气很好", 2).starts_with("天气…"));
  }
}
