// Integration tests for the cloud API clients
//
// Each test starts a local axum server that records the request and replies
// with a canned Google-style payload; clients are pointed at it through
// their base URL override.

use anyhow::Result;
use axum::{extract::State, http::StatusCode, http::Uri, Json, Router};
use base64::{engine::general_purpose::STANDARD, Engine};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use tutor_gateway::recognition::{OneShotRecognizer, RecognitionConfig};
use tutor_gateway::vendor::{
    CompletionClient, GeminiClient, GenerationConfig, GoogleSpeechClient, Prompt, TextExtractor,
    VisionClient,
};
use tutor_gateway::RelayError;

#[derive(Clone)]
struct MockApi {
    status: StatusCode,
    reply: Value,
    seen: Arc<Mutex<Vec<(String, Value)>>>,
}

async fn record(State(api): State<MockApi>, uri: Uri, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    let target = uri
        .path_and_query()
        .map(|pq| pq.to_string())
        .unwrap_or_default();
    api.seen.lock().push((target, body));
    (api.status, Json(api.reply.clone()))
}

/// Serve `reply` with `status` for every request. Returns the base URL and
/// the recorded (path?query, body) pairs.
async fn mock_api(status: StatusCode, reply: Value) -> Result<(String, Arc<Mutex<Vec<(String, Value)>>>)> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let api = MockApi {
        status,
        reply,
        seen: Arc::clone(&seen),
    };
    let app = Router::new().fallback(record).with_state(api);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    Ok((format!("http://{}", addr), seen))
}

#[tokio::test]
async fn test_speech_recognize_request_and_response() -> Result<()> {
    let (base_url, seen) = mock_api(
        StatusCode::OK,
        json!({"results": [{"alternatives": [{"transcript": "what is gravity", "confidence": 0.87}]}]}),
    )
    .await?;
    let client = GoogleSpeechClient::new("speech-key".to_string(), Some(base_url));

    let config = RecognitionConfig {
        sample_rate_hertz: 16000,
        ..Default::default()
    };
    let transcription = client.recognize(&config, &[1, 2, 3, 4]).await?;

    assert_eq!(transcription.transcript, "what is gravity");
    assert!((transcription.confidence - 0.87).abs() < 1e-6);

    let seen = seen.lock();
    let (target, body) = &seen[0];
    assert_eq!(target, "/v1/speech:recognize?key=speech-key");
    assert_eq!(body["config"]["encoding"], "LINEAR16");
    assert_eq!(body["config"]["sampleRateHertz"], 16000);
    assert_eq!(body["config"]["languageCode"], "en-US");
    assert_eq!(body["audio"]["content"], STANDARD.encode([1u8, 2, 3, 4]));
    Ok(())
}

#[tokio::test]
async fn test_speech_empty_response_is_empty_transcript() -> Result<()> {
    let (base_url, _) = mock_api(StatusCode::OK, json!({})).await?;
    let client = GoogleSpeechClient::new("k".to_string(), Some(base_url));

    let transcription = client.recognize(&RecognitionConfig::default(), &[0u8; 8]).await?;

    assert!(transcription.transcript.is_empty());
    assert_eq!(transcription.confidence, 0.0);
    Ok(())
}

#[tokio::test]
async fn test_speech_http_error_is_vendor_error() -> Result<()> {
    let (base_url, _) = mock_api(
        StatusCode::FORBIDDEN,
        json!({"error": {"code": 403, "message": "API key not valid"}}),
    )
    .await?;
    let client = GoogleSpeechClient::new("bad".to_string(), Some(base_url));

    let err = client
        .recognize(&RecognitionConfig::default(), &[0u8; 8])
        .await
        .unwrap_err();

    match err {
        RelayError::Vendor(message) => {
            assert!(message.contains("403"), "{}", message);
            assert!(message.contains("API key not valid"), "{}", message);
        }
        other => panic!("expected vendor error, got {:?}", other),
    }
    Ok(())
}

#[tokio::test]
async fn test_vision_returns_annotations_in_order() -> Result<()> {
    let (base_url, seen) = mock_api(
        StatusCode::OK,
        json!({"responses": [{"textAnnotations": [
            {"description": "Q1. 2 + 2 = ?\nA. 3\nB. 4"},
            {"description": "Q1."}
        ]}]}),
    )
    .await?;
    let client = VisionClient::new("vision-key".to_string(), Some(base_url));

    let texts = client.extract_text(b"image bytes").await?;

    assert_eq!(texts, vec!["Q1. 2 + 2 = ?\nA. 3\nB. 4".to_string(), "Q1.".to_string()]);

    let seen = seen.lock();
    let (target, body) = &seen[0];
    assert_eq!(target, "/v1/images:annotate?key=vision-key");
    assert_eq!(
        body["requests"][0]["image"]["content"],
        STANDARD.encode(b"image bytes")
    );
    assert_eq!(body["requests"][0]["features"][0]["type"], "TEXT_DETECTION");
    Ok(())
}

#[tokio::test]
async fn test_vision_error_payload_is_vendor_error() -> Result<()> {
    let (base_url, _) = mock_api(
        StatusCode::OK,
        json!({"responses": [{"error": {"code": 3, "message": "Bad image data."}}]}),
    )
    .await?;
    let client = VisionClient::new("k".to_string(), Some(base_url));

    let err = client.extract_text(b"junk").await.unwrap_err();

    assert!(matches!(err, RelayError::Vendor(ref m) if m.contains("Bad image data.")));
    Ok(())
}

#[tokio::test]
async fn test_gemini_request_shape_and_text() -> Result<()> {
    let (base_url, seen) = mock_api(
        StatusCode::OK,
        json!({"candidates": [{"content": {"role": "model", "parts": [
            {"text": "B. "},
            {"text": "4"}
        ]}}]}),
    )
    .await?;
    let client = GeminiClient::new(
        "llm-key".to_string(),
        "gemini-1.5-flash".to_string(),
        Some(base_url),
    );

    let prompt = Prompt::text("Q1. 2 + 2 = ?")
        .with_system("Answer precisely.")
        .with_image("image/png", vec![9, 9, 9]);
    let config = GenerationConfig {
        temperature: 0.1,
        top_p: 0.5,
        top_k: 10,
    };
    let answer = client.complete(&prompt, &config).await?;

    assert_eq!(answer, "B. 4");

    let seen = seen.lock();
    let (target, body) = &seen[0];
    assert_eq!(
        target,
        "/v1beta/models/gemini-1.5-flash:generateContent?key=llm-key"
    );
    assert_eq!(body["systemInstruction"]["parts"][0]["text"], "Answer precisely.");
    assert_eq!(body["contents"][0]["role"], "user");
    assert_eq!(body["contents"][0]["parts"][0]["text"], "Q1. 2 + 2 = ?");
    assert_eq!(body["contents"][0]["parts"][1]["inlineData"]["mimeType"], "image/png");
    assert_eq!(
        body["contents"][0]["parts"][1]["inlineData"]["data"],
        STANDARD.encode([9u8, 9, 9])
    );
    assert_eq!(body["generationConfig"]["topK"], 10);
    Ok(())
}

#[tokio::test]
async fn test_gemini_without_candidates_is_vendor_error() -> Result<()> {
    let (base_url, _) = mock_api(StatusCode::OK, json!({"candidates": []})).await?;
    let client = GeminiClient::new("k".to_string(), "gemini-1.5-flash".to_string(), Some(base_url));

    let err = client
        .complete(&Prompt::text("hello"), &GenerationConfig::default())
        .await
        .unwrap_err();

    assert!(matches!(err, RelayError::Vendor(_)));
    Ok(())
}

#[tokio::test]
async fn test_unreachable_host_is_vendor_error() -> Result<()> {
    // Bind then drop to get a port nothing listens on
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);

    let client = GeminiClient::new(
        "k".to_string(),
        "gemini-1.5-flash".to_string(),
        Some(format!("http://{}", addr)),
    );
    let err = client
        .complete(&Prompt::text("hello"), &GenerationConfig::default())
        .await
        .unwrap_err();

    assert!(matches!(err, RelayError::Vendor(_)));
    Ok(())
}
