use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::{Database, Transaction};
use crate::domain::{ActiveMapping, NewMapping};

#[derive(Clone)]
pub struct MappingRepository {
  db: Arc<Database>,
}

impl MappingRepository {
  pub fn new(db: Arc<Database>) -> Self {
    Self { db }
  }

  pub fn create_mapping(&self, tx: &mut Transaction, sentence_id: i64, m: &NewMapping, now: DateTime<Utc>) -> ActiveMapping {
    let mapping = ActiveMapping {
      mapping_id: tx.next_mapping_id(),
      sentence_id,
      focus_start: m.focus_start,
      focus_end: m.focus_end,
      chinese: m.chinese.clone(),
      english: m.english.clone(),
      user_expression: String::new(),
      ai_review_is_correct: None,
      ai_review_expression: None,
      create_time: now,
      update_time: now,
      is_deleted: false,
    };
    tx.insert_mapping(mapping.clone());
    mapping
  }

  pub fn create_mappings(&self, tx: &mut Transaction, sentence_id: i64, items: &[NewMapping], now: DateTime<Utc>) -> Vec<ActiveMapping> {
    items.iter().map(|m| self.create_mapping(tx, sentence_id, m, now)).collect()
  }

  pub async fn get_by_id(&self, mapping_id: i64) -> Option<ActiveMapping> {
    let t = self.db.snapshot().await;
    t.mappings.get(&mapping_id).filter(|m| !m.is_deleted).cloned()
  }

  /// Mappings of a sentence, in creation order.
  pub async fn get_by_sentence_id(&self, sentence_id: i64) -> Vec<ActiveMapping> {
    let t = self.db.snapshot().await;
    t.mappings
      .values()
      .filter(|m| m.sentence_id == sentence_id && !m.is_deleted)
      .cloned()
      .collect()
  }

  /// Records the user's expression review. Returns `None` for an unknown mapping.
  pub fn update_review(
    &self,
    tx: &mut Transaction,
    mapping_id: i64,
    user_expression: &str,
    is_correct: bool,
    expression: Option<String>,
    now: DateTime<Utc>,
  ) -> Option<ActiveMapping> {
    let m = tx.mapping_mut(mapping_id)?;
    m.user_expression = user_expression.to_string();
    m.ai_review_is_correct = Some(is_correct);
    m.ai_review_expression = expression;
    m.update_time = now;
    Some(m.clone())
  }
}
