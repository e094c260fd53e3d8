use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::audio::TranscoderConfig;
use crate::chat::ChatHistoryStore;
use crate::recognition::{OneShotRecognizer, RecognitionConfig, RecognitionStrategy};
use crate::session::SessionHandle;
use crate::vendor::{CompletionClient, GenerationConfig, TextExtractor};

/// Shared application state for HTTP handlers
///
/// Vendor clients are built once at startup and shared by every request.
#[derive(Clone)]
pub struct AppState {
    /// Active live sessions (session_id → handle)
    pub sessions: Arc<RwLock<HashMap<String, SessionHandle>>>,

    pub text_extractor: Arc<dyn TextExtractor>,
    pub completion: Arc<dyn CompletionClient>,
    /// Used for uploaded audio files
    pub recognizer: Arc<dyn OneShotRecognizer>,
    /// Used for live sessions
    pub strategy: RecognitionStrategy,

    pub generation: GenerationConfig,
    pub transcoder: TranscoderConfig,
    pub recognition: RecognitionConfig,
    pub chat_history: ChatHistoryStore,
}

impl AppState {
    pub fn new(
        text_extractor: Arc<dyn TextExtractor>,
        completion: Arc<dyn CompletionClient>,
        recognizer: Arc<dyn OneShotRecognizer>,
        strategy: RecognitionStrategy,
    ) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            text_extractor,
            completion,
            recognizer,
            strategy,
            generation: GenerationConfig::default(),
            transcoder: TranscoderConfig::default(),
            recognition: RecognitionConfig::default(),
            chat_history: ChatHistoryStore::new("chat_histories"),
        }
    }

    pub fn with_generation(mut self, generation: GenerationConfig) -> Self {
        self.generation = generation;
        self
    }

    pub fn with_transcoder(mut self, transcoder: TranscoderConfig) -> Self {
        self.transcoder = transcoder;
        self
    }

    pub fn with_recognition(mut self, recognition: RecognitionConfig) -> Self {
        self.recognition = recognition;
        self
    }

    pub fn with_chat_history(mut self, store: ChatHistoryStore) -> Self {
        self.chat_history = store;
        self
    }
}
