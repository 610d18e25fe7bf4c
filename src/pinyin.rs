//! Hanzi → Hanyu Pinyin for mapping phrases.
//!
//! Example:
//!   输入: "开心"
//!   输出: "kāi xīn"
use pinyin::ToPinyin;

use crate::util::is_cjk;

/// Syllables of a phrase with tone diacritics. Runs of non-Hanzi text (latin
/// letters, digits) become one token each; whitespace and punctuation are dropped.
///
/// Per-character lookup, so polyphonic characters take their default reading.
pub fn syllables(phrase: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut run = String::new();

    for ch in phrase.chars() {
        if let Some(py) = ch.to_pinyin() {
            flush(&mut out, &mut run);
            out.push(py.with_tone().to_string());
        } else if ch.is_alphanumeric() && !is_cjk(ch) {
            run.push(ch);
        } else {
            flush(&mut out, &mut run);
        }
    }
    flush(&mut out, &mut run);
    out
}

/// Space-separated pinyin of a phrase.
pub fn phrase_pinyin(phrase: &str) -> String {
    syllables(phrase).join(" ")
}

fn flush(out: &mut Vec<String>, run: &mut String) {
    if !run.is_empty() {
        out.push(std::mem::take(run));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hanzi_get_tone_marks() {
        assert_eq!(phrase_pinyin("开心"), "kāi xīn");
        assert_eq!(syllables("天气"), vec!["tiān", "qì"]);
    }

    #[test]
    fn latin_runs_stay_whole_and_punctuation_drops() {
        assert_eq!(phrase_pinyin("天气ok！"), "tiān qì ok");
        assert_eq!(phrase_pinyin(""), "");
    }
}
