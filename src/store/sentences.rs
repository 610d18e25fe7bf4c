use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::{Database, Tables, Transaction};
use crate::domain::{EssaySentence, Sentence};

#[derive(Clone)]
pub struct SentenceRepository {
  db: Arc<Database>,
}

impl SentenceRepository {
  pub fn new(db: Arc<Database>) -> Self {
    Self { db }
  }

  /// Inserts the sentence and links it to `essay_id` at `position`.
  pub fn create_sentence(&self, tx: &mut Transaction, text: &str, essay_id: i64, position: usize, now: DateTime<Utc>) -> Sentence {
    let sentence = Sentence {
      sentence_id: tx.next_sentence_id(),
      sentence: text.to_string(),
      create_time: now,
      is_deleted: false,
    };
    tx.insert_sentence(sentence.clone());
    tx.push_essay_sentence(EssaySentence { essay_id, sentence_id: sentence.sentence_id, position, is_deleted: false });
    sentence
  }

  pub async fn get_by_id(&self, sentence_id: i64) -> Option<Sentence> {
    let t = self.db.snapshot().await;
    t.sentences.get(&sentence_id).filter(|s| !s.is_deleted).cloned()
  }

  /// Sentences of an essay in essay order.
  pub async fn get_by_essay_id(&self, essay_id: i64) -> Vec<Sentence> {
    let t = self.db.snapshot().await;
    sentences_of(&t, essay_id)
  }

  /// Essay a sentence was stored under.
  pub async fn essay_id_of(&self, sentence_id: i64) -> Option<i64> {
    let t = self.db.snapshot().await;
    t.essay_sentences
      .iter()
      .find(|l| l.sentence_id == sentence_id && !l.is_deleted)
      .map(|l| l.essay_id)
  }
}

fn sentences_of(t: &Tables, essay_id: i64) -> Vec<Sentence> {
  let mut links: Vec<&EssaySentence> = t
    .essay_sentences
    .iter()
    .filter(|l| l.essay_id == essay_id && !l.is_deleted)
    .collect();
  links.sort_by_key(|l| l.position);
  links
    .into_iter()
    .filter_map(|l| t.sentences.get(&l.sentence_id))
    .filter(|s| !s.is_deleted)
    .cloned()
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn sentences_come_back_in_essay_order() {
    let db = Database::new();
    let repo = SentenceRepository::new(db.clone());
    let now = Utc::now();
    let mut tx = db.begin().await;
    // inserted out of order on purpose
    repo.create_sentence(&mut tx, "第二句。", 7, 1, now);
    let first = repo.create_sentence(&mut tx, "第一句。", 7, 0, now);
    repo.create_sentence(&mut tx, "别的作文。", 8, 0, now);
    tx.commit();

    let texts: Vec<String> = repo.get_by_essay_id(7).await.into_iter().map(|s| s.sentence).collect();
    assert_eq!(texts, vec!["第一句。", "第二句。"]);
    assert_eq!(repo.get_by_id(first.sentence_id).await.map(|s| s.sentence), Some("第一句。".into()));
    assert_eq!(repo.essay_id_of(first.sentence_id).await, Some(7));
    assert_eq!(repo.essay_id_of(99).await, None);
  }

  #[tokio::test]
  async fn same_text_twice_gives_two_rows() {
    let db = Database::new();
    let repo = SentenceRepository::new(db.clone());
    let mut tx = db.begin().await;
    let a = repo.create_sentence(&mut tx, "重复。", 1, 0, Utc::now());
    let b = repo.create_sentence(&mut tx, "重复。", 2, 0, Utc::now());
    tx.commit();
    assert_ne!(a.sentence_id, b.sentence_id);
  }
}
