//! In-memory relational store with explicit transactions.
//!
//! `Database` owns every table behind one `tokio::sync::RwLock`. A `Transaction`
//! holds the write lock for its whole lifetime and writes in place, recording the
//! inverse of each write. `commit()` forgets the log; dropping an uncommitted
//! transaction replays it newest-first. Readers wait while a transaction is open,
//! so they only ever observe committed state.
//!
//! Repositories are thin views constructed with an `Arc<Database>`.

pub mod essays;
pub mod mappings;
pub mod review_logs;
pub mod sentences;
pub mod word_reviews;

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};
use tracing::debug;
use uuid::Uuid;

use crate::domain::{ActiveMapping, Essay, EssaySentence, Sentence, WordReview, WordReviewLog};

pub use self::essays::EssayRepository;
pub use self::mappings::MappingRepository;
pub use self::review_logs::{DayCount, WordReviewLogRepository};
pub use self::sentences::SentenceRepository;
pub use self::word_reviews::{NewWordReview, WordReviewRepository};

/// Monotonic id counters, one per table.
#[derive(Clone, Debug, Default)]
pub struct Sequences {
  essay: i64,
  sentence: i64,
  mapping: i64,
  word_review: i64,
  review_log: i64,
}

#[derive(Debug, Default)]
pub struct Tables {
  pub essays: BTreeMap<i64, Essay>,
  pub sentences: BTreeMap<i64, Sentence>,
  pub essay_sentences: Vec<EssaySentence>,
  pub mappings: BTreeMap<i64, ActiveMapping>,
  pub word_reviews: BTreeMap<i64, WordReview>,
  pub review_logs: Vec<WordReviewLog>,
  seq: Sequences,
}

#[derive(Default)]
pub struct Database {
  tables: Arc<RwLock<Tables>>,
}

impl Database {
  pub fn new() -> Arc<Self> {
    Arc::new(Self::default())
  }

  /// Opens a unit of work. Writers are serialized, and readers block until the
  /// transaction commits or is dropped.
  pub async fn begin(&self) -> Transaction {
    let guard = self.tables.clone().write_owned().await;
    let seq = guard.seq.clone();
    let id = Uuid::new_v4();
    debug!(target: "viva_backend", tx = %id, "transaction opened");
    Transaction { guard, undo: Vec::new(), seq, id, committed: false }
  }

  /// Read-only view of committed state.
  pub async fn snapshot(&self) -> OwnedRwLockReadGuard<Tables> {
    self.tables.clone().read_owned().await
  }
}

/// Inverse of one write. Keyed rows carry the value they replaced.
enum Undo {
  Essay(i64, Option<Essay>),
  Sentence(i64, Option<Sentence>),
  EssaySentence,
  Mapping(i64, Option<ActiveMapping>),
  WordReview(i64, Option<WordReview>),
  ReviewLog,
}

pub struct Transaction {
  guard: OwnedRwLockWriteGuard<Tables>,
  undo: Vec<Undo>,
  /// Counters as of `begin()`.
  seq: Sequences,
  id: Uuid,
  committed: bool,
}

fn next(counter: &mut i64) -> i64 {
  *counter += 1;
  *counter
}

fn restore<T>(table: &mut BTreeMap<i64, T>, id: i64, prev: Option<T>) {
  match prev {
    Some(row) => {
      table.insert(id, row);
    }
    None => {
      table.remove(&id);
    }
  }
}

impl Transaction {
  /// Current state including this transaction's writes.
  pub fn tables(&self) -> &Tables {
    &self.guard
  }

  pub(crate) fn next_essay_id(&mut self) -> i64 {
    next(&mut self.guard.seq.essay)
  }

  pub(crate) fn next_sentence_id(&mut self) -> i64 {
    next(&mut self.guard.seq.sentence)
  }

  pub(crate) fn next_mapping_id(&mut self) -> i64 {
    next(&mut self.guard.seq.mapping)
  }

  pub(crate) fn next_word_review_id(&mut self) -> i64 {
    next(&mut self.guard.seq.word_review)
  }

  pub(crate) fn next_review_log_id(&mut self) -> i64 {
    next(&mut self.guard.seq.review_log)
  }

  pub(crate) fn insert_essay(&mut self, essay: Essay) {
    let id = essay.essay_id;
    let prev = self.guard.essays.insert(id, essay);
    self.undo.push(Undo::Essay(id, prev));
  }

  pub(crate) fn insert_sentence(&mut self, sentence: Sentence) {
    let id = sentence.sentence_id;
    let prev = self.guard.sentences.insert(id, sentence);
    self.undo.push(Undo::Sentence(id, prev));
  }

  pub(crate) fn push_essay_sentence(&mut self, link: EssaySentence) {
    self.guard.essay_sentences.push(link);
    self.undo.push(Undo::EssaySentence);
  }

  pub(crate) fn insert_mapping(&mut self, mapping: ActiveMapping) {
    let id = mapping.mapping_id;
    let prev = self.guard.mappings.insert(id, mapping);
    self.undo.push(Undo::Mapping(id, prev));
  }

  /// Live mapping for in-place update; `None` when missing or soft-deleted.
  pub(crate) fn mapping_mut(&mut self, id: i64) -> Option<&mut ActiveMapping> {
    let before = self.guard.mappings.get(&id).filter(|m| !m.is_deleted)?.clone();
    self.undo.push(Undo::Mapping(id, Some(before)));
    self.guard.mappings.get_mut(&id)
  }

  pub(crate) fn insert_word_review(&mut self, row: WordReview) {
    let id = row.id;
    let prev = self.guard.word_reviews.insert(id, row);
    self.undo.push(Undo::WordReview(id, prev));
  }

  /// Live word review for in-place update; `None` when missing or soft-deleted.
  pub(crate) fn word_review_mut(&mut self, id: i64) -> Option<&mut WordReview> {
    let before = self.guard.word_reviews.get(&id).filter(|w| !w.is_deleted)?.clone();
    self.undo.push(Undo::WordReview(id, Some(before)));
    self.guard.word_reviews.get_mut(&id)
  }

  pub(crate) fn push_review_log(&mut self, log: WordReviewLog) {
    self.guard.review_logs.push(log);
    self.undo.push(Undo::ReviewLog);
  }

  pub fn commit(mut self) {
    self.undo.clear();
    self.committed = true;
    debug!(target: "viva_backend", tx = %self.id, "transaction committed");
  }

  fn rollback(&mut self) {
    let t = &mut *self.guard;
    for undo in self.undo.drain(..).rev() {
      match undo {
        Undo::Essay(id, prev) => restore(&mut t.essays, id, prev),
        Undo::Sentence(id, prev) => restore(&mut t.sentences, id, prev),
        Undo::EssaySentence => {
          t.essay_sentences.pop();
        }
        Undo::Mapping(id, prev) => restore(&mut t.mappings, id, prev),
        Undo::WordReview(id, prev) => restore(&mut t.word_reviews, id, prev),
        Undo::ReviewLog => {
          t.review_logs.pop();
        }
      }
    }
    t.seq = std::mem::take(&mut self.seq);
  }
}

impl Drop for Transaction {
  fn drop(&mut self) {
    if !self.committed {
      let writes = self.undo.len();
      self.rollback();
      debug!(target: "viva_backend", tx = %self.id, writes, "transaction rolled back");
    }
  }
}

/// Midnight (UTC) of the day containing `t`.
pub fn start_of_day(t: DateTime<Utc>) -> DateTime<Utc> {
  day_start(t.date_naive()).unwrap_or(t)
}

/// Midnight (UTC) at the end of the day containing `t`; an exclusive bound.
pub fn end_of_day(t: DateTime<Utc>) -> DateTime<Utc> {
  start_of_day(t) + Duration::days(1)
}

pub(crate) fn day_start(d: NaiveDate) -> Option<DateTime<Utc>> {
  d.and_hms_opt(0, 0, 0).map(|n| Utc.from_utc_datetime(&n))
}
