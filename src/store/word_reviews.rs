use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::{end_of_day, Database, Transaction};
use crate::domain::WordReview;
use crate::srs::ReviewState;

/// User-supplied fields of a new vocabulary item.
#[derive(Clone, Debug, Default)]
pub struct NewWordReview {
  pub word: String,
  pub wrong_word: Option<String>,
  pub translation: Option<String>,
  pub example_sentence: Option<String>,
}

#[derive(Clone)]
pub struct WordReviewRepository {
  db: Arc<Database>,
}

impl WordReviewRepository {
  pub fn new(db: Arc<Database>) -> Self {
    Self { db }
  }

  pub fn create(&self, tx: &mut Transaction, user_id: &str, item: &NewWordReview, state: &ReviewState, now: DateTime<Utc>) -> WordReview {
    let row = WordReview {
      id: tx.next_word_review_id(),
      word: item.word.clone(),
      wrong_word: item.wrong_word.clone(),
      translation: item.translation.clone(),
      example_sentence: item.example_sentence.clone(),
      user_id: user_id.to_string(),
      easiness: state.easiness,
      interval: state.interval,
      repetitions: state.repetitions,
      review_datetime: state.review_datetime,
      is_know: false,
      is_deleted: false,
      create_time: now,
      update_time: now,
    };
    tx.insert_word_review(row.clone());
    row
  }

  /// Writes the scheduling fields back. `None` when the row is gone.
  pub fn update_schedule(&self, tx: &mut Transaction, id: i64, state: &ReviewState, now: DateTime<Utc>) -> Option<WordReview> {
    let row = tx.word_review_mut(id)?;
    row.easiness = state.easiness;
    row.interval = state.interval;
    row.repetitions = state.repetitions;
    row.review_datetime = state.review_datetime;
    row.update_time = now;
    Some(row.clone())
  }

  pub fn set_known(&self, tx: &mut Transaction, id: i64, is_know: bool, now: DateTime<Utc>) -> Option<WordReview> {
    let row = tx.word_review_mut(id)?;
    row.is_know = is_know;
    row.update_time = now;
    Some(row.clone())
  }

  /// Read inside a unit of work, seeing its uncommitted writes.
  pub fn get_for_update(&self, tx: &Transaction, id: i64) -> Option<WordReview> {
    tx.tables().word_reviews.get(&id).filter(|w| !w.is_deleted).cloned()
  }

  pub async fn get_by_id(&self, id: i64) -> Option<WordReview> {
    let t = self.db.snapshot().await;
    t.word_reviews.get(&id).filter(|w| !w.is_deleted).cloned()
  }

  /// The user's words whose word or translation contains `keyword` (case-insensitive);
  /// all of them when the keyword is empty. Most recently touched first.
  pub async fn search(&self, user_id: &str, keyword: Option<&str>) -> Vec<WordReview> {
    let needle = keyword.map(|k| k.trim().to_lowercase()).filter(|k| !k.is_empty());
    let t = self.db.snapshot().await;
    let mut out: Vec<WordReview> = t
      .word_reviews
      .values()
      .filter(|w| !w.is_deleted && w.user_id == user_id)
      .filter(|w| match &needle {
        None => true,
        Some(n) => {
          w.word.to_lowercase().contains(n.as_str())
            || w.translation.as_deref().map(|tr| tr.to_lowercase().contains(n.as_str())).unwrap_or(false)
        }
      })
      .cloned()
      .collect();
    out.sort_by(|a, b| b.update_time.cmp(&a.update_time).then(b.id.cmp(&a.id)));
    out
  }

  /// Words due now: not known, and either scheduled at or before `now` or never
  /// successfully reviewed. Earliest first, at most `limit`.
  pub async fn get_due_today(&self, user_id: &str, now: DateTime<Utc>, limit: usize) -> Vec<WordReview> {
    let t = self.db.snapshot().await;
    let mut out: Vec<WordReview> = t
      .word_reviews
      .values()
      .filter(|w| is_active(w, user_id) && (w.review_datetime <= now || w.repetitions == 0))
      .cloned()
      .collect();
    out.sort_by(|a, b| a.review_datetime.cmp(&b.review_datetime).then(a.id.cmp(&b.id)));
    out.truncate(limit);
    out
  }

  /// Words scheduled for any time up to the end of `now`'s day.
  pub async fn count_due_today(&self, user_id: &str, now: DateTime<Utc>) -> usize {
    let cutoff = end_of_day(now);
    let t = self.db.snapshot().await;
    t.word_reviews
      .values()
      .filter(|w| is_active(w, user_id) && w.review_datetime < cutoff)
      .count()
  }

  pub async fn count_known(&self, user_id: &str) -> usize {
    let t = self.db.snapshot().await;
    t.word_reviews
      .values()
      .filter(|w| !w.is_deleted && w.user_id == user_id && w.is_know)
      .count()
  }
}

fn is_active(w: &WordReview, user_id: &str) -> bool {
  !w.is_deleted && !w.is_know && w.user_id == user_id
}
