//! Vocabulary review: SM-2 scheduling persisted with an append-only log.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tracing::{info, instrument};

use crate::domain::WordReview;
use crate::error::{AppError, AppResult};
use crate::srs::{self, ReviewState};
use crate::store::{Database, DayCount, NewWordReview, WordReviewLogRepository, WordReviewRepository};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewStats {
  pub today_review_count: usize,
  pub today_need_review_count: usize,
  pub total_know_word_review_count: usize,
}

#[derive(Clone)]
pub struct WordReviewService {
  db: Arc<Database>,
  words: WordReviewRepository,
  logs: WordReviewLogRepository,
  due_list_limit: usize,
}

impl WordReviewService {
  pub fn new(db: Arc<Database>, due_list_limit: usize) -> Self {
    Self {
      words: WordReviewRepository::new(db.clone()),
      logs: WordReviewLogRepository::new(db.clone()),
      db,
      due_list_limit,
    }
  }

  /// Creates the word with its first schedule and logs it, in one transaction.
  #[instrument(level = "info", skip(self, item), fields(%user_id, word = %item.word))]
  pub async fn add_word(&self, user_id: &str, item: NewWordReview, quality: Option<i64>, now: DateTime<Utc>) -> AppResult<WordReview> {
    if item.word.trim().is_empty() {
      return Err(AppError::Validation("word must not be empty".into()));
    }
    let state = srs::first_review(quality.unwrap_or(0), now)?;
    let mut tx = self.db.begin().await;
    let row = self.words.create(&mut tx, user_id, &item, &state, now);
    self.logs.create(&mut tx, &row, now);
    tx.commit();
    info!(target: "review", id = row.id, interval = row.interval, "word added");
    Ok(row)
  }

  /// Applies one graded review and logs the new schedule.
  #[instrument(level = "info", skip(self), fields(%user_id))]
  pub async fn grade_word(&self, user_id: &str, id: i64, quality: i64, now: DateTime<Utc>) -> AppResult<WordReview> {
    let mut tx = self.db.begin().await;
    let current = self.owned(self.words.get_for_update(&tx, id), user_id)?;
    let prior = ReviewState {
      easiness: current.easiness,
      interval: current.interval,
      repetitions: current.repetitions,
      review_datetime: current.review_datetime,
    };
    let next = srs::review(quality, &prior, now)?;
    let row = self
      .words
      .update_schedule(&mut tx, id, &next, now)
      .ok_or_else(|| AppError::NotFound("WordReview not found".into()))?;
    self.logs.create(&mut tx, &row, now);
    tx.commit();
    info!(
      target: "review",
      id,
      quality,
      easiness = row.easiness,
      interval = row.interval,
      repetitions = row.repetitions,
      "word graded"
    );
    Ok(row)
  }

  pub async fn mark_known(&self, user_id: &str, id: i64, is_know: bool, now: DateTime<Utc>) -> AppResult<WordReview> {
    let mut tx = self.db.begin().await;
    self.owned(self.words.get_for_update(&tx, id), user_id)?;
    let row = self
      .words
      .set_known(&mut tx, id, is_know, now)
      .ok_or_else(|| AppError::NotFound("WordReview not found".into()))?;
    tx.commit();
    info!(target: "review", id, is_know, "known flag updated");
    Ok(row)
  }

  pub async fn get_word(&self, user_id: &str, id: i64) -> AppResult<WordReview> {
    self.owned(self.words.get_by_id(id).await, user_id)
  }

  pub async fn search_words(&self, user_id: &str, keyword: Option<&str>) -> Vec<WordReview> {
    self.words.search(user_id, keyword).await
  }

  pub async fn due_today(&self, user_id: &str, now: DateTime<Utc>) -> Vec<WordReview> {
    self.words.get_due_today(user_id, now, self.due_list_limit).await
  }

  pub async fn due_count(&self, user_id: &str, now: DateTime<Utc>) -> usize {
    self.words.count_due_today(user_id, now).await
  }

  pub async fn stats(&self, user_id: &str, now: DateTime<Utc>) -> ReviewStats {
    ReviewStats {
      today_review_count: self.logs.count_reviewed_words_today(user_id, now).await,
      today_need_review_count: self.words.count_due_today(user_id, now).await,
      total_know_word_review_count: self.words.count_known(user_id).await,
    }
  }

  pub async fn day_stats(&self, user_id: &str, start: NaiveDate, end: NaiveDate) -> AppResult<Vec<DayCount>> {
    if end < start {
      return Err(AppError::Validation("end_date must not be before start_date".into()));
    }
    Ok(self.logs.daily_counts(user_id, start, end).await)
  }

  fn owned(&self, row: Option<WordReview>, user_id: &str) -> AppResult<WordReview> {
    row
      .filter(|w| w.user_id == user_id)
      .ok_or_else(|| AppError::NotFound("WordReview not found".into()))
  }
}
