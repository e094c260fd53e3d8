use super::error::ApiError;
use super::state::AppState;
use crate::audio::{transcode_all, AudioFile};
use crate::chat::{prompt, ChatHistoryStore, ChatMessage};
use crate::session::SessionStats;
use crate::vendor::Prompt;
use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct OcrResponse {
    pub ocr_text: String,
}

#[derive(Debug, Deserialize)]
pub struct AnswerRequest {
    pub mcq_text: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AnswerResponse {
    pub answer: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OcrQuestionResponse {
    pub ocr_text: String,
    pub question: String,
    pub answer: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
    pub session_id: String,
    pub history: Vec<ChatMessage>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TranscriptionResponse {
    pub transcript: String,
    pub confidence: f32,
}

#[derive(Debug, Serialize)]
pub struct StopSessionResponse {
    pub session_id: String,
    /// False when a stop had already been requested
    pub stop_requested: bool,
    pub stats: SessionStats,
}

/// One uploaded multipart file
struct Upload {
    data: Bytes,
    content_type: Option<String>,
}

#[derive(Default)]
struct UploadForm {
    file: Option<Upload>,
    text: Option<String>,
}

impl UploadForm {
    async fn read(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut form = UploadForm::default();
        while let Some(field) = multipart.next_field().await? {
            let name = field.name().map(str::to_string);
            match name.as_deref() {
                Some("file") => {
                    let content_type = field.content_type().map(str::to_string);
                    let data = field.bytes().await?;
                    form.file = Some(Upload { data, content_type });
                }
                Some("text") => form.text = Some(field.text().await?),
                _ => {}
            }
        }
        Ok(form)
    }

    /// The `file` field, which must be present and non-empty.
    fn require_file(self) -> Result<(Upload, Option<String>), ApiError> {
        match self.file {
            Some(upload) if !upload.data.is_empty() => Ok((upload, self.text)),
            Some(_) => Err(ApiError::BadRequest("uploaded file is empty".to_string())),
            None => Err(ApiError::BadRequest("missing multipart field 'file'".to_string())),
        }
    }
}

fn require_text(value: &str, field: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::BadRequest(format!("'{}' must not be empty", field)));
    }
    Ok(())
}

// ============================================================================
// Handlers
// ============================================================================

async fn extract_document_text(state: &AppState, image: &[u8]) -> Result<String, ApiError> {
    let annotations = state.text_extractor.extract_text(image).await?;
    Ok(annotations.into_iter().next().unwrap_or_default())
}

async fn answer_question(state: &AppState, question: &str) -> Result<String, ApiError> {
    let prompt = Prompt::text(question).with_system(prompt::ANSWER_PROMPT);
    Ok(state.completion.complete(&prompt, &state.generation).await?)
}

/// POST /api/v1/ocr
/// Extract the document text from an uploaded image
pub async fn ocr(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<OcrResponse>, ApiError> {
    let (upload, _) = UploadForm::read(multipart).await?.require_file()?;
    info!("OCR request ({} bytes)", upload.data.len());

    let ocr_text = extract_document_text(&state, &upload.data).await?;
    Ok(Json(OcrResponse { ocr_text }))
}

/// POST /api/v1/answer
pub async fn answer(
    State(state): State<AppState>,
    Json(req): Json<AnswerRequest>,
) -> Result<Json<AnswerResponse>, ApiError> {
    require_text(&req.mcq_text, "mcq_text")?;

    let answer = answer_question(&state, &req.mcq_text).await?;
    Ok(Json(AnswerResponse { answer }))
}

/// POST /api/v1/process_ocr_question
/// OCR, then question extraction, then answer
pub async fn process_ocr_question(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<OcrQuestionResponse>, ApiError> {
    let (upload, _) = UploadForm::read(multipart).await?.require_file()?;

    let ocr_text = extract_document_text(&state, &upload.data).await?;
    if ocr_text.trim().is_empty() {
        return Err(ApiError::BadRequest("no text found in image".to_string()));
    }

    let extraction = Prompt::text(ocr_text.as_str()).with_system(prompt::QUESTION_EXTRACTION_PROMPT);
    let question = state
        .completion
        .complete(&extraction, &state.generation)
        .await?;

    let answer = answer_question(&state, &question).await?;

    Ok(Json(OcrQuestionResponse {
        ocr_text,
        question,
        answer,
    }))
}

/// POST /api/v1/multimodal
/// Answer the question in an image, with optional extra context
pub async fn multimodal(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<AnswerResponse>, ApiError> {
    let (upload, text) = UploadForm::read(multipart).await?.require_file()?;

    let mime_type = upload
        .content_type
        .filter(|ct| ct.starts_with("image/"))
        .ok_or_else(|| ApiError::UnsupportedMedia("file must be an image".to_string()))?;

    let context = text.as_deref().unwrap_or("");
    let prompt = Prompt::text(context)
        .with_system(prompt::multimodal_system_prompt(text.as_deref()))
        .with_image(mime_type, upload.data.to_vec());

    let answer = state.completion.complete(&prompt, &state.generation).await?;
    Ok(Json(AnswerResponse { answer }))
}

/// POST /api/v1/chat
pub async fn chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    require_text(&req.message, "message")?;

    let session_id = match req.session_id {
        Some(id) => {
            ChatHistoryStore::validate_id(&id)?;
            id
        }
        None => uuid::Uuid::new_v4().to_string(),
    };

    let mut history = state.chat_history.load(&session_id).await?;
    let prompt = Prompt::text(prompt::chat_prompt(&history, &req.message));
    let response = state.completion.complete(&prompt, &state.generation).await?;

    history.push(ChatMessage::user(req.message));
    history.push(ChatMessage::assistant(response.clone()));
    state.chat_history.save(&session_id, &history).await?;

    Ok(Json(ChatResponse {
        response,
        session_id,
        history,
    }))
}

/// POST /api/v1/transcribe/upload
/// One-shot transcription of an uploaded audio file
pub async fn transcribe_upload(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<TranscriptionResponse>, ApiError> {
    let (upload, _) = UploadForm::read(multipart).await?.require_file()?;

    let is_audio = upload
        .content_type
        .as_deref()
        .is_some_and(|ct| ct.starts_with("audio/"));
    if !is_audio {
        return Err(ApiError::BadRequest("file must be an audio file".to_string()));
    }

    let mut recognition = state.recognition.clone();
    let pcm = if AudioFile::is_wav(&upload.data) {
        let audio = AudioFile::from_wav_bytes(&upload.data)
            .map_err(|e| ApiError::BadRequest(format!("{:#}", e)))?;
        recognition.sample_rate_hertz = audio.sample_rate;
        audio.to_mono_pcm_bytes()
    } else {
        recognition.sample_rate_hertz = state.transcoder.sample_rate;
        transcode_all(&state.transcoder, &upload.data).await?
    };

    info!("Transcribing upload ({} PCM bytes)", pcm.len());
    let transcription = state.recognizer.recognize(&recognition, &pcm).await?;

    Ok(Json(TranscriptionResponse {
        transcript: transcription.transcript,
        confidence: transcription.confidence,
    }))
}

/// GET /api/v1/sessions
pub async fn list_sessions(State(state): State<AppState>) -> impl IntoResponse {
    let sessions = state.sessions.read().await;
    let mut stats: Vec<SessionStats> = sessions.values().map(|h| h.stats()).collect();
    stats.sort_by(|a, b| a.started_at.cmp(&b.started_at));
    (StatusCode::OK, Json(stats))
}

/// GET /api/v1/sessions/:session_id
pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionStats>, ApiError> {
    let sessions = state.sessions.read().await;
    match sessions.get(&session_id) {
        Some(handle) => Ok(Json(handle.stats())),
        None => Err(ApiError::NotFound(format!("session {} not found", session_id))),
    }
}

/// POST /api/v1/sessions/:session_id/stop
/// Ask a live session to drain; the socket closes once it has
pub async fn stop_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<StopSessionResponse>, ApiError> {
    let handle = {
        let sessions = state.sessions.read().await;
        sessions.get(&session_id).cloned()
    };

    let Some(handle) = handle else {
        warn!("Stop requested for unknown session {}", session_id);
        return Err(ApiError::NotFound(format!("session {} not found", session_id)));
    };

    let stop_requested = handle.shutdown();
    Ok(Json(StopSessionResponse {
        session_id,
        stop_requested,
        stats: handle.stats(),
    }))
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
