use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;

use super::{day_start, end_of_day, start_of_day, Database, Transaction};
use crate::domain::{WordReview, WordReviewLog};

/// Number of review events on one calendar day (heatmap cell).
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DayCount {
  pub date: NaiveDate,
  pub value: usize,
}

#[derive(Clone)]
pub struct WordReviewLogRepository {
  db: Arc<Database>,
}

impl WordReviewLogRepository {
  pub fn new(db: Arc<Database>) -> Self {
    Self { db }
  }

  /// Appends a snapshot of the word's current schedule.
  pub fn create(&self, tx: &mut Transaction, word: &WordReview, now: DateTime<Utc>) -> WordReviewLog {
    let log = WordReviewLog {
      id: tx.next_review_log_id(),
      word_id: word.id,
      user_id: word.user_id.clone(),
      easiness: word.easiness,
      interval: word.interval,
      repetitions: word.repetitions,
      review_datetime: word.review_datetime,
      create_time: now,
    };
    tx.push_review_log(log.clone());
    log
  }

  /// Distinct words the user reviewed on `now`'s day.
  pub async fn count_reviewed_words_today(&self, user_id: &str, now: DateTime<Utc>) -> usize {
    let (from, to) = (start_of_day(now), end_of_day(now));
    let t = self.db.snapshot().await;
    t.review_logs
      .iter()
      .filter(|l| l.user_id == user_id && l.create_time >= from && l.create_time < to)
      .map(|l| l.word_id)
      .collect::<HashSet<_>>()
      .len()
  }

  /// Review events per day for `start..=end`, only days with activity, in date order.
  pub async fn daily_counts(&self, user_id: &str, start: NaiveDate, end: NaiveDate) -> Vec<DayCount> {
    let (Some(from), Some(to)) = (day_start(start), day_start(end).map(|d| d + Duration::days(1))) else {
      return Vec::new();
    };
    let t = self.db.snapshot().await;
    let mut per_day: BTreeMap<NaiveDate, usize> = BTreeMap::new();
    for l in t.review_logs.iter().filter(|l| l.user_id == user_id && l.create_time >= from && l.create_time < to) {
      *per_day.entry(l.create_time.date_naive()).or_default() += 1;
    }
    per_day.into_iter().map(|(date, value)| DayCount { date, value }).collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::TimeZone;

  fn word(id: i64, user: &str) -> WordReview {
    let now = Utc::now();
    WordReview {
      id,
      word: "glad".into(),
      wrong_word: None,
      translation: None,
      example_sentence: None,
      user_id: user.into(),
      easiness: 2.5,
      interval: 1,
      repetitions: 1,
      review_datetime: now,
      is_know: false,
      is_deleted: false,
      create_time: now,
      update_time: now,
    }
  }

  #[tokio::test]
  async fn counts_distinct_words_today_and_per_day() {
    let db = Database::new();
    let repo = WordReviewLogRepository::new(db.clone());
    let day1 = Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap();
    let day2 = Utc.with_ymd_and_hms(2024, 6, 3, 23, 30, 0).unwrap();

    let mut tx = db.begin().await;
    repo.create(&mut tx, &word(1, "u1"), day1);
    repo.create(&mut tx, &word(1, "u1"), day1 + Duration::hours(2));
    repo.create(&mut tx, &word(2, "u1"), day1);
    repo.create(&mut tx, &word(1, "u1"), day2);
    repo.create(&mut tx, &word(3, "u2"), day1);
    tx.commit();

    assert_eq!(repo.count_reviewed_words_today("u1", day1).await, 2);
    assert_eq!(repo.count_reviewed_words_today("u1", day2).await, 1);

    let start = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
    let end = NaiveDate::from_ymd_opt(2024, 6, 3).unwrap();
    let days = repo.daily_counts("u1", start, end).await;
    assert_eq!(
      days,
      vec![DayCount { date: start, value: 3 }, DayCount { date: end, value: 1 }]
    );
    assert!(repo.daily_counts("u1", start, start - Duration::days(1)).await.is_empty());
  }
}
