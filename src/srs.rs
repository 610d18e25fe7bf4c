//! SM-2 spaced-repetition scheduler.
//!
//! Pure functions over `(easiness, interval, repetitions)`: the caller passes `now`,
//! so identical inputs always give identical outputs.
//!
//! - easiness' = easiness + (0.1 - (5 - q) * (0.08 + (5 - q) * 0.02)), floored at 1.3
//! - q < 3: repetitions = 0, interval = 1
//! - otherwise: interval = 1, 6, then ceil(interval * easiness); repetitions += 1
//!
//! The interval is computed with the easiness from *before* this review, and is
//! capped at `MAX_INTERVAL_DAYS` so the due date always stays representable.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SrsError;

pub const DEFAULT_EASINESS: f64 = 2.5;
pub const MIN_EASINESS: f64 = 1.3;
pub const PASSING_QUALITY: u8 = 3;
pub const MAX_QUALITY: i64 = 5;
/// Longest gap between two reviews (about a century).
pub const MAX_INTERVAL_DAYS: i64 = 36_500;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReviewState {
  pub easiness: f64,
  /// Days until the next review.
  pub interval: i64,
  /// Consecutive successful reviews.
  pub repetitions: u32,
  pub review_datetime: DateTime<Utc>,
}

/// Recall grade, validated to 0..=5.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Quality(u8);

impl Quality {
  pub fn new(value: i64) -> Result<Self, SrsError> {
    if (0..=MAX_QUALITY).contains(&value) {
      Ok(Self(value as u8))
    } else {
      Err(SrsError::InvalidQuality(value))
    }
  }

  pub fn value(&self) -> u8 {
    self.0
  }

  pub fn is_passing(&self) -> bool {
    self.0 >= PASSING_QUALITY
  }
}

/// State for a word seen for the first time.
pub fn first_review(quality: i64, now: DateTime<Utc>) -> Result<ReviewState, SrsError> {
  let q = Quality::new(quality)?;
  Ok(schedule(q, DEFAULT_EASINESS, 0, 0, now))
}

/// Next state after grading a word that already has a schedule.
pub fn review(quality: i64, prior: &ReviewState, now: DateTime<Utc>) -> Result<ReviewState, SrsError> {
  let q = Quality::new(quality)?;
  Ok(schedule(q, prior.easiness, prior.interval, prior.repetitions, now))
}

fn schedule(q: Quality, easiness: f64, interval: i64, repetitions: u32, now: DateTime<Utc>) -> ReviewState {
  let (interval, repetitions) = if q.is_passing() {
    let next = match repetitions {
      0 => 1,
      1 => 6,
      _ => (interval as f64 * easiness).ceil().min(MAX_INTERVAL_DAYS as f64) as i64,
    };
    (next.clamp(1, MAX_INTERVAL_DAYS), repetitions.saturating_add(1))
  } else {
    (1, 0)
  };

  let miss = f64::from(5 - q.value());
  let easiness = (easiness + 0.1 - miss * (0.08 + miss * 0.02)).max(MIN_EASINESS);

  let review_datetime = now
    .checked_add_signed(Duration::days(interval))
    .unwrap_or(DateTime::<Utc>::MAX_UTC);
  ReviewState { easiness, interval, repetitions, review_datetime }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::TimeZone;

  fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 8, 30, 0).unwrap()
  }

  fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
  }

  #[test]
  fn first_review_matches_reference_table() {
    let cases = [(5, 2.6, 1, 1), (4, 2.5, 1, 1), (3, 2.36, 1, 1), (2, 2.18, 1, 0), (1, 1.96, 1, 0), (0, 1.7, 1, 0)];
    for (q, easiness, interval, repetitions) in cases {
      let s = first_review(q, now()).unwrap();
      assert!(approx(s.easiness, easiness), "q={q}: easiness {}", s.easiness);
      assert_eq!(s.interval, interval, "q={q}");
      assert_eq!(s.repetitions, repetitions, "q={q}");
      assert_eq!(s.review_datetime, now() + Duration::days(1));
    }
  }

  #[test]
  fn successful_reviews_follow_one_six_then_easiness() {
    let s1 = first_review(5, now()).unwrap();
    let s2 = review(5, &s1, now()).unwrap();
    assert_eq!((s2.interval, s2.repetitions), (6, 2));
    assert!(approx(s2.easiness, 2.7));
    let s3 = review(4, &s2, now()).unwrap();
    // ceil(6 * 2.7) = 17, easiness unchanged at q=4
    assert_eq!((s3.interval, s3.repetitions), (17, 3));
    assert!(approx(s3.easiness, 2.7));
    assert_eq!(s3.review_datetime, now() + Duration::days(17));
  }

  #[test]
  fn failing_grade_resets_repetitions() {
    let mut s = first_review(5, now()).unwrap();
    for _ in 0..4 {
      s = review(5, &s, now()).unwrap();
    }
    assert!(s.repetitions >= 5);
    for q in 0..3 {
      let r = review(q, &s, now()).unwrap();
      assert_eq!(r.repetitions, 0);
      assert_eq!(r.interval, 1);
    }
  }

  #[test]
  fn easiness_never_drops_below_floor() {
    let mut s = first_review(0, now()).unwrap();
    for _ in 0..20 {
      s = review(0, &s, now()).unwrap();
      assert!(s.easiness >= MIN_EASINESS);
    }
    assert!(approx(s.easiness, MIN_EASINESS));
  }

  #[test]
  fn long_streak_caps_the_interval() {
    let mut s = first_review(5, now()).unwrap();
    for _ in 0..30 {
      s = review(5, &s, now()).unwrap();
      assert!(s.interval <= MAX_INTERVAL_DAYS);
    }
    assert_eq!(s.interval, MAX_INTERVAL_DAYS);
    assert_eq!(s.repetitions, 31);
    assert_eq!(s.review_datetime, now() + Duration::days(MAX_INTERVAL_DAYS));
  }

  #[test]
  fn review_is_deterministic() {
    let prior = ReviewState { easiness: 2.1, interval: 9, repetitions: 3, review_datetime: now() };
    assert_eq!(review(4, &prior, now()).unwrap(), review(4, &prior, now()).unwrap());
  }

  #[test]
  fn quality_out_of_range_is_rejected() {
    assert_eq!(first_review(6, now()).unwrap_err(), SrsError::InvalidQuality(6));
    let prior = first_review(3, now()).unwrap();
    assert_eq!(review(-1, &prior, now()).unwrap_err(), SrsError::InvalidQuality(-1));
  }
}
