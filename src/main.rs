use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tutor_gateway::chat::ChatHistoryStore;
use tutor_gateway::config::{LoggingConfig, RecognitionMode};
use tutor_gateway::recognition::{
    OneShotRecognizer, RecognitionConfig, RecognitionStrategy, WindowedStreamingRecognizer,
};
use tutor_gateway::vendor::{GeminiClient, GoogleSpeechClient, VisionClient};
use tutor_gateway::{create_router, AppState, Config};

#[derive(Debug, Parser)]
#[command(name = "tutor-gateway", version, about = "OCR, speech and tutoring API gateway")]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long, default_value = "config/tutor-gateway.toml")]
    config: PathBuf,

    /// Override the bind address
    #[arg(long)]
    bind: Option<String>,

    /// Override the port
    #[arg(short, long)]
    port: Option<u16>,
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(logging.level.as_str()));

    if logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn build_state(cfg: &Config) -> AppState {
    let speech = Arc::new(GoogleSpeechClient::new(
        cfg.speech.api_key.clone(),
        cfg.speech.base_url.clone(),
    ));
    let vision = Arc::new(VisionClient::new(
        cfg.vision.api_key.clone(),
        cfg.vision.base_url.clone(),
    ));
    let gemini = Arc::new(GeminiClient::new(
        cfg.llm.api_key.clone(),
        cfg.llm.model.clone(),
        cfg.llm.base_url.clone(),
    ));

    let recognizer: Arc<dyn OneShotRecognizer> = speech;
    let strategy = match cfg.speech.mode {
        RecognitionMode::Streaming => {
            RecognitionStrategy::Streaming(Arc::new(WindowedStreamingRecognizer::new(
                Arc::clone(&recognizer),
                tokio::runtime::Handle::current(),
                cfg.speech.interim_bytes,
                cfg.speech.window_bytes,
            )))
        }
        RecognitionMode::OneShot => RecognitionStrategy::OneShot(Arc::clone(&recognizer)),
    };

    let recognition = RecognitionConfig {
        sample_rate_hertz: cfg.transcoder.sample_rate,
        language_code: cfg.speech.language.clone(),
        model: cfg.speech.model.clone(),
        ..Default::default()
    };

    AppState::new(vision, gemini, recognizer, strategy)
        .with_generation(cfg.llm.generation())
        .with_transcoder(cfg.transcoder.clone())
        .with_recognition(recognition)
        .with_chat_history(ChatHistoryStore::new(&cfg.chat.history_dir))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let mut cfg = Config::load(&args.config)?;
    if let Some(bind) = args.bind {
        cfg.service.http.bind = bind;
    }
    if let Some(port) = args.port {
        cfg.service.http.port = port;
    }

    init_tracing(&cfg.logging);

    info!("{} v{}", cfg.service.name, env!("CARGO_PKG_VERSION"));
    info!(
        "Transcoder: {} (grace {}ms), speech mode: {:?}",
        cfg.transcoder.program, cfg.transcoder.grace_period_ms, cfg.speech.mode
    );
    for (name, key) in [
        ("speech", &cfg.speech.api_key),
        ("vision", &cfg.vision.api_key),
        ("llm", &cfg.llm.api_key),
    ] {
        if key.is_empty() {
            warn!("No API key configured for {}", name);
        }
    }

    let app = create_router(build_state(&cfg));

    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("HTTP server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    Ok(())
}
