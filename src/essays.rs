//! Essay submission: validate, split, run the pipeline per sentence, persist.
//!
//! The pipeline runs before any transaction is opened. Persistence then happens in one
//! unit of work: the essay row, every successful sentence (in essay order) and its
//! mappings. A sentence that failed any sentence-fatal stage is reported but not stored.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::config::PipelineSettings;
use crate::domain::{ActiveMapping, Essay, Sentence};
use crate::error::{AppError, AppResult, PipelineError};
use crate::segmentation::{split_into_sentences, validate_essay, ExpandedResult, SegmentationService};
use crate::store::{Database, EssayRepository, MappingRepository, SentenceRepository};
use crate::util::trunc_for_log;

const DEFAULT_TITLE: &str = "暂无";

/// What happened to one fragment of the essay.
#[derive(Clone, Debug, Serialize)]
pub struct SentenceOutcome {
  pub position: usize,
  pub text: String,
  pub sentence_id: Option<i64>,
  pub mapping_count: usize,
  pub error: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct EssaySubmission {
  pub essay: Essay,
  pub run_id: Uuid,
  pub outcomes: Vec<SentenceOutcome>,
  pub succeeded: usize,
  pub failed: usize,
}

#[derive(Clone, Debug, Serialize)]
pub struct SentenceDetail {
  pub sentence: Sentence,
  pub mappings: Vec<ActiveMapping>,
}

#[derive(Clone, Debug, Serialize)]
pub struct EssayDetail {
  pub essay: Essay,
  pub sentences: Vec<SentenceDetail>,
}

#[derive(Clone)]
pub struct EssayService {
  db: Arc<Database>,
  essays: EssayRepository,
  sentences: SentenceRepository,
  mappings: MappingRepository,
  segmentation: SegmentationService,
  settings: PipelineSettings,
}

impl EssayService {
  pub fn new(db: Arc<Database>, segmentation: SegmentationService, settings: PipelineSettings) -> Self {
    Self {
      essays: EssayRepository::new(db.clone()),
      sentences: SentenceRepository::new(db.clone()),
      mappings: MappingRepository::new(db.clone()),
      db,
      segmentation,
      settings,
    }
  }

  #[instrument(level = "info", skip(self, content), fields(%user_id, chars = content.chars().count()))]
  pub async fn submit_essay(&self, user_id: &str, title: Option<&str>, content: &str) -> AppResult<EssaySubmission> {
    validate_essay(content, self.settings.max_essay_chars)?;
    let fragments = split_into_sentences(content, self.settings.split_clauses);
    let run_id = Uuid::new_v4();
    info!(target: "segmentation", %run_id, sentences = fragments.len(), "essay accepted");

    let mut results: Vec<(String, Result<ExpandedResult, PipelineError>)> = Vec::with_capacity(fragments.len());
    for text in fragments {
      let r = self.segment_with_timeout(&text).await;
      if let Err(e) = &r {
        warn!(target: "segmentation", %run_id, sentence = %trunc_for_log(&text, 40), error = %e, "sentence failed");
      }
      results.push((text, r));
    }

    let now = Utc::now();
    let title = title.map(str::trim).filter(|t| !t.is_empty()).unwrap_or(DEFAULT_TITLE);
    let mut tx = self.db.begin().await;
    let essay = self.essays.create(&mut tx, user_id, title, content, now);

    let mut outcomes = Vec::with_capacity(results.len());
    let mut stored = 0usize;
    for (position, (text, result)) in results.into_iter().enumerate() {
      match result {
        Ok(expanded) => {
          let sentence = self.sentences.create_sentence(&mut tx, &text, essay.essay_id, stored, now);
          let created = self.mappings.create_mappings(&mut tx, sentence.sentence_id, &expanded.to_new_mappings(), now);
          stored += 1;
          outcomes.push(SentenceOutcome {
            position,
            text,
            sentence_id: Some(sentence.sentence_id),
            mapping_count: created.len(),
            error: None,
          });
        }
        Err(e) => outcomes.push(SentenceOutcome { position, text, sentence_id: None, mapping_count: 0, error: Some(e.to_string()) }),
      }
    }
    tx.commit();

    let failed = outcomes.len() - stored;
    if stored == 0 {
      error!(target: "segmentation", %run_id, essay_id = essay.essay_id, "every sentence failed; essay stored without sentences");
    } else {
      info!(target: "segmentation", %run_id, essay_id = essay.essay_id, succeeded = stored, failed, "essay processed");
    }
    Ok(EssaySubmission { essay, run_id, outcomes, succeeded: stored, failed })
  }

  async fn segment_with_timeout(&self, text: &str) -> Result<ExpandedResult, PipelineError> {
    let secs = self.settings.sentence_timeout_secs;
    match tokio::time::timeout(Duration::from_secs(secs), self.segmentation.segment_sentence(text)).await {
      Ok(r) => r,
      Err(_) => Err(PipelineError::Timeout(secs)),
    }
  }

  pub async fn list_essays(&self, user_id: &str) -> Vec<Essay> {
    self.essays.list_by_user(user_id).await
  }

  /// Essay with its sentences and mappings. Someone else's essay is `NotFound`.
  pub async fn essay_detail(&self, user_id: &str, essay_id: i64) -> AppResult<EssayDetail> {
    let essay = self
      .essays
      .get_by_id(essay_id)
      .await
      .filter(|e| e.user_id == user_id)
      .ok_or_else(|| AppError::NotFound("Essay not found".into()))?;
    let mut sentences = Vec::new();
    for sentence in self.sentences.get_by_essay_id(essay_id).await {
      let mappings = self.mappings.get_by_sentence_id(sentence.sentence_id).await;
      sentences.push(SentenceDetail { sentence, mappings });
    }
    Ok(EssayDetail { essay, sentences })
  }

  /// A sentence with its mappings, if it belongs to one of the caller's essays.
  pub async fn sentence_detail(&self, user_id: &str, sentence_id: i64) -> AppResult<SentenceDetail> {
    self.ensure_sentence_owner(user_id, sentence_id).await?;
    let sentence = self
      .sentences
      .get_by_id(sentence_id)
      .await
      .ok_or_else(|| AppError::NotFound("Sentence not found".into()))?;
    let mappings = self.mappings.get_by_sentence_id(sentence_id).await;
    Ok(SentenceDetail { sentence, mappings })
  }

  /// Grades the caller's own English for a mapping against its candidate list and
  /// records the attempt on the mapping.
  #[instrument(level = "info", skip(self, expression), fields(%user_id, %mapping_id))]
  pub async fn check_expression(&self, user_id: &str, mapping_id: i64, expression: &str) -> AppResult<ActiveMapping> {
    let expression = expression.trim();
    if expression.is_empty() {
      return Err(AppError::Validation("expression must not be empty".into()));
    }
    let mapping = self
      .mappings
      .get_by_id(mapping_id)
      .await
      .ok_or_else(|| AppError::NotFound("Mapping not found".into()))?;
    self.ensure_sentence_owner(user_id, mapping.sentence_id).await?;

    let (is_correct, reference) = judge_expression(&mapping.english, expression);
    let mut tx = self.db.begin().await;
    let updated = self
      .mappings
      .update_review(&mut tx, mapping_id, expression, is_correct, reference, Utc::now())
      .ok_or_else(|| AppError::NotFound("Mapping not found".into()))?;
    tx.commit();
    info!(target: "viva_backend", is_correct, "expression checked");
    Ok(updated)
  }

  async fn ensure_sentence_owner(&self, user_id: &str, sentence_id: i64) -> AppResult<()> {
    let essay_id = self
      .sentences
      .essay_id_of(sentence_id)
      .await
      .ok_or_else(|| AppError::NotFound("Sentence not found".into()))?;
    match self.essays.get_by_id(essay_id).await {
      Some(e) if e.user_id == user_id => Ok(()),
      _ => Err(AppError::NotFound("Sentence not found".into())),
    }
  }
}

/// Case and whitespace insensitive match against the comma-joined candidates.
/// Returns the verdict plus the candidate to show: the hit, or the translated word.
fn judge_expression(candidates_csv: &str, expression: &str) -> (bool, Option<String>) {
  let norm = |s: &str| s.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
  let wanted = norm(expression);
  let candidates: Vec<&str> = candidates_csv.split(',').map(str::trim).filter(|c| !c.is_empty()).collect();
  match candidates.iter().find(|c| norm(c) == wanted) {
    Some(hit) => (true, Some(hit.to_string())),
    None => (false, candidates.first().map(|c| c.to_string())),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::llm::testing::ScriptedChat;
  use crate::segmentation::tests::{service, HAPPY_STRUCTURE, SENSE_MARK, STAGE1_MARK, STAGE2_MARK, FORM_MARK};
  use crate::util::char_len;

  const WEATHER_STRUCTURE: &str = r#"{"original": "因为天气很好。", "translation": "because the weather is nice", "words": [{"english": "weather", "pos": "n", "chinese": "天气", "start": 2, "len": 2}]}"#;

  fn essay_service(chat: Arc<ScriptedChat>) -> (EssayService, Arc<Database>) {
    let db = Database::new();
    (EssayService::new(db.clone(), service(chat), PipelineSettings::default()), db)
  }

  #[tokio::test]
  async fn two_clause_essay_is_split_segmented_and_stored() {
    // Stage 2 replies are chosen by the clause text that stage 1 echoes back.
    let chat = Arc::new(
      ScriptedChat::new()
        .on("Sentence (zh): 我今天很开心", "stage1 happy")
        .on("Sentence (zh): 因为天气很好", "stage1 weather")
        .on("stage1 happy", HAPPY_STRUCTURE)
        .on("stage1 weather", WEATHER_STRUCTURE)
        .on(SENSE_MARK, r#"{"synsets": [{"synset_name": "glad.a.01", "definition": ""}]}"#)
        .on(FORM_MARK, r#"{"words_transformation": ["glad"]}"#),
    );
    let (svc, _db) = essay_service(chat);
    let sub = svc.submit_essay("u1", None, "我今天很开心因为天气很好。").await.unwrap();

    assert!(sub.outcomes.len() >= 2);
    assert_eq!((sub.succeeded, sub.failed), (2, 0));
    assert_eq!(sub.essay.title, DEFAULT_TITLE);

    let detail = svc.essay_detail("u1", sub.essay.essay_id).await.unwrap();
    assert_eq!(detail.sentences.len(), 2);
    let first = &detail.sentences[0];
    assert_eq!(first.sentence.sentence, "我今天很开心");
    let happy = first.mappings.iter().find(|m| m.chinese == "开心").unwrap();
    let picked: String = first.sentence.sentence.chars().skip(happy.focus_start).take(happy.focus_end - happy.focus_start).collect();
    assert_eq!(picked, "开心");
    assert!(happy.english.starts_with("happy"));
    for s in &detail.sentences {
      for m in &s.mappings {
        assert!(m.focus_start <= m.focus_end && m.focus_end <= char_len(&s.sentence.sentence));
      }
    }
  }

  #[tokio::test]
  async fn a_stage_two_failure_only_drops_its_sentence() {
    let chat = Arc::new(
      ScriptedChat::new()
        .on("Sentence (zh): 我今天很开心", "stage1 happy")
        .on("Sentence (zh): 因为天气很好", "stage1 weather")
        .on("stage1 happy", HAPPY_STRUCTURE)
        .on("stage1 weather", "I could not produce JSON, sorry.")
        .on(SENSE_MARK, "not json either"),
    );
    let (svc, _db) = essay_service(chat);
    let sub = svc.submit_essay("u1", Some("周末"), "我今天很开心因为天气很好。").await.unwrap();

    assert_eq!((sub.succeeded, sub.failed), (1, 1));
    assert!(sub.outcomes[0].sentence_id.is_some());
    assert!(sub.outcomes[1].sentence_id.is_none());
    assert!(sub.outcomes[1].error.as_deref().unwrap_or_default().contains("structure_extraction"));

    let detail = svc.essay_detail("u1", sub.essay.essay_id).await.unwrap();
    assert_eq!(detail.sentences.len(), 1);
    // degraded synonym expansion still stores the translated word
    assert!(detail.sentences[0].mappings.iter().any(|m| m.english == "happy"));
  }

  #[tokio::test]
  async fn essay_survives_when_every_sentence_fails() {
    let chat = Arc::new(ScriptedChat::new());
    let (svc, _db) = essay_service(chat);
    let sub = svc.submit_essay("u1", None, "今天下雨了。").await.unwrap();
    assert_eq!((sub.succeeded, sub.failed), (0, 1));
    assert_eq!(svc.list_essays("u1").await.len(), 1);
    assert!(svc.essay_detail("u1", sub.essay.essay_id).await.unwrap().sentences.is_empty());
  }

  #[tokio::test]
  async fn invalid_essay_is_rejected_before_any_call() {
    let chat = Arc::new(ScriptedChat::new());
    let (svc, _db) = essay_service(chat.clone());
    let err = svc.submit_essay("u1", None, "   ").await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
    assert_eq!(chat.calls(), 0);
    assert!(svc.list_essays("u1").await.is_empty());
  }

  #[tokio::test]
  async fn foreign_essay_is_not_found() {
    let chat = Arc::new(ScriptedChat::new().on(STAGE1_MARK, "raw").on(STAGE2_MARK, HAPPY_STRUCTURE));
    let (svc, _db) = essay_service(chat);
    let sub = svc.submit_essay("u1", None, "我今天很开心").await.unwrap();
    assert!(matches!(svc.essay_detail("u2", sub.essay.essay_id).await, Err(AppError::NotFound(_))));
    let sentence_id = sub.outcomes[0].sentence_id.unwrap();
    assert_eq!(svc.sentence_detail("u1", sentence_id).await.unwrap().mappings.len(), 2);
    assert!(matches!(svc.sentence_detail("u2", sentence_id).await, Err(AppError::NotFound(_))));
  }

  #[tokio::test]
  async fn expression_check_is_recorded_on_the_mapping() {
    let chat = Arc::new(ScriptedChat::new().on(STAGE1_MARK, "raw").on(STAGE2_MARK, HAPPY_STRUCTURE));
    let (svc, _db) = essay_service(chat);
    let sub = svc.submit_essay("u1", None, "我今天很开心").await.unwrap();
    let detail = svc.sentence_detail("u1", sub.outcomes[0].sentence_id.unwrap()).await.unwrap();
    let happy = detail.mappings.iter().find(|m| m.chinese == "开心").unwrap();

    let checked = svc.check_expression("u1", happy.mapping_id, "  Happy ").await.unwrap();
    assert_eq!(checked.user_expression, "Happy");
    assert_eq!(checked.ai_review_is_correct, Some(true));

    let checked = svc.check_expression("u1", happy.mapping_id, "joyous").await.unwrap();
    assert_eq!(checked.ai_review_is_correct, Some(false));
    assert_eq!(checked.ai_review_expression.as_deref(), Some("happy"));

    assert!(matches!(svc.check_expression("u2", happy.mapping_id, "happy").await, Err(AppError::NotFound(_))));
    assert!(matches!(svc.check_expression("u1", happy.mapping_id, " ").await, Err(AppError::Validation(_))));
    assert!(matches!(svc.check_expression("u1", 999, "happy").await, Err(AppError::NotFound(_))));
  }

  #[test]
  fn judging_ignores_case_and_spacing() {
    assert_eq!(judge_expression("decided,determine", "Determine"), (true, Some("determine".into())));
    assert_eq!(judge_expression("make up one's mind", "make  up one's mind"), (true, Some("make up one's mind".into())));
    assert_eq!(judge_expression("happy,glad", "sad"), (false, Some("happy".into())));
  }
}
