//! Application state: config, bundled lexical data, completion client and services.
//!
//! This module owns:
//!   - the frequency table and lexicon (immutable, shared behind `Arc`)
//!   - the completion client (OpenAI when configured, otherwise a disabled stand-in)
//!   - the essay and word-review services over one in-memory `Database`

use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::config::{load_app_config_from_env, AppConfig};
use crate::error::DataError;
use crate::essays::EssayService;
use crate::lexicon::{FrequencyTable, LexicalRelations, Lexicon};
use crate::llm::{ChatCompletion, DisabledCompletion, OpenAI};
use crate::reviews::WordReviewService;
use crate::segmentation::SegmentationService;
use crate::store::Database;

#[derive(Clone)]
pub struct AppState {
    pub frequency: Arc<FrequencyTable>,
    pub essays: EssayService,
    pub reviews: WordReviewService,
}

impl AppState {
    /// Build state from env: load config and data files, init the completion client.
    #[instrument(level = "info", skip_all)]
    pub fn new() -> Result<Self, DataError> {
        let config = load_app_config_from_env();
        let frequency = FrequencyTable::load(&config.data.frequency_table)?;
        let lexicon = Lexicon::load(&config.data.lexicon)?;

        let chat: Arc<dyn ChatCompletion> = match OpenAI::from_env() {
            Some(oa) => {
                info!(target: "viva_backend", base_url = %oa.base_url, model = %oa.model, "OpenAI enabled.");
                Arc::new(oa)
            }
            None => {
                warn!(target: "viva_backend", "OpenAI disabled (no OPENAI_API_KEY). Essay segmentation will fail per sentence.");
                Arc::new(DisabledCompletion)
            }
        };

        Ok(Self::from_parts(config, chat, frequency, lexicon))
    }

    /// Wire services from already-loaded parts.
    pub fn from_parts(config: AppConfig, chat: Arc<dyn ChatCompletion>, frequency: FrequencyTable, lexicon: Lexicon) -> Self {
        let db = Database::new();
        let prompts = Arc::new(config.prompts.clone());
        let frequency = Arc::new(frequency);
        let relations = LexicalRelations::new(Arc::new(lexicon), chat.clone(), config.prompts.synset_choice.clone());
        let segmentation = SegmentationService::new(
            chat,
            relations,
            frequency.clone(),
            prompts,
            config.pipeline.common_word_rank,
        );

        Self {
            essays: EssayService::new(db.clone(), segmentation, config.pipeline.clone()),
            reviews: WordReviewService::new(db, config.pipeline.due_list_limit),
            frequency,
        }
    }
}
