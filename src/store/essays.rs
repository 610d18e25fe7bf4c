use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::{Database, Transaction};
use crate::domain::Essay;

#[derive(Clone)]
pub struct EssayRepository {
  db: Arc<Database>,
}

impl EssayRepository {
  pub fn new(db: Arc<Database>) -> Self {
    Self { db }
  }

  pub fn create(&self, tx: &mut Transaction, user_id: &str, title: &str, content: &str, now: DateTime<Utc>) -> Essay {
    let essay = Essay {
      essay_id: tx.next_essay_id(),
      title: title.to_string(),
      content: content.to_string(),
      user_id: user_id.to_string(),
      create_time: now,
      update_time: now,
      is_deleted: false,
    };
    tx.insert_essay(essay.clone());
    essay
  }

  pub async fn get_by_id(&self, essay_id: i64) -> Option<Essay> {
    let t = self.db.snapshot().await;
    t.essays.get(&essay_id).filter(|e| !e.is_deleted).cloned()
  }

  /// The user's essays, newest first.
  pub async fn list_by_user(&self, user_id: &str) -> Vec<Essay> {
    let t = self.db.snapshot().await;
    let mut out: Vec<Essay> = t
      .essays
      .values()
      .filter(|e| !e.is_deleted && e.user_id == user_id)
      .cloned()
      .collect();
    out.sort_by(|a, b| b.create_time.cmp(&a.create_time).then(b.essay_id.cmp(&a.essay_id)));
    out
  }
}
