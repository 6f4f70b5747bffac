use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Parser;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use triage_core::{
    EmbeddingProvider, HashEmbeddingProvider, MatchEngine, MiniLmEmbeddingProvider,
    DEFAULT_CACHE_DIR,
};

const SERVICE_NAME: &str = "triage-api";
const MAX_MESSAGE_CHARS: usize = 500;

#[derive(Debug, Parser)]
#[command(name = "triage-api")]
#[command(about = "Symptom-to-disease matcher HTTP API")]
struct Cli {
    /// Path to the symptom CSV corpus.
    #[arg(long)]
    csv: PathBuf,

    #[arg(long, default_value = "0.0.0.0:8000")]
    addr: SocketAddr,

    /// Path to the all-MiniLM-L6-v2 .safetensors file. When provided with
    /// --tokenizer-path, uses neural embeddings.
    #[arg(long)]
    model_path: Option<PathBuf>,

    /// Path to the tokenizer.json file. Required when --model-path is set.
    #[arg(long)]
    tokenizer_path: Option<PathBuf>,

    #[arg(long, default_value = DEFAULT_CACHE_DIR)]
    cache_dir: PathBuf,
}

/// Shared read-only request state. `engine` stays `None` when startup
/// failed; the server still runs so health checks keep answering.
struct AppState {
    engine: Option<MatchEngine>,
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    message: String,
}

#[derive(Debug, Serialize)]
struct ChatResponse {
    reply: String,
    confidence: f32,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    model_loaded: bool,
    dataset_loaded: bool,
}

async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "message": "Symptom matcher API",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "health": "/health (GET) - Health check",
            "chat": "/chat (POST) - Send symptom query",
            "stats": "/stats (GET) - Corpus statistics",
        },
        "example_request": {
            "url": "/chat",
            "method": "POST",
            "body": { "message": "I have fever and headache" },
        },
    }))
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let ready = state.engine.is_some();
    Json(HealthResponse {
        status: "healthy",
        service: SERVICE_NAME,
        model_loaded: ready,
        dataset_loaded: ready,
    })
}

async fn chat(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, (StatusCode, String)> {
    let Some(engine) = state.engine.as_ref() else {
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            "Service not ready. Model or dataset not loaded.".to_string(),
        ));
    };

    let query = request.message.trim();
    if query.is_empty() {
        return Ok(Json(ChatResponse {
            reply: "Please describe your symptoms so I can help you.".to_string(),
            confidence: 0.0,
        }));
    }
    if query.chars().count() > MAX_MESSAGE_CHARS {
        return Ok(Json(ChatResponse {
            reply: format!(
                "Your message is too long. Please describe your symptoms in {MAX_MESSAGE_CHARS} characters or less."
            ),
            confidence: 0.0,
        }));
    }

    let answer = engine.answer(query).map_err(|err| {
        warn!("chat request failed: {err}");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("internal error: {err}"),
        )
    })?;
    info!(label = %answer.label, confidence = answer.confidence, "answered chat query");

    Ok(Json(ChatResponse {
        reply: answer.reply,
        confidence: round2(answer.confidence),
    }))
}

async fn stats(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let Some(engine) = state.engine.as_ref() else {
        return Err((StatusCode::SERVICE_UNAVAILABLE, "Service not ready".to_string()));
    };

    Ok(Json(serde_json::json!({
        "total_records": engine.record_count(),
        "unique_diseases": engine.unique_label_count(),
        "embedding_dimensions": engine.dimension(),
        "model_name": engine.model_id(),
    })))
}

fn round2(x: f32) -> f32 {
    (x * 100.0).round() / 100.0
}

fn build_engine(cli: &Cli) -> anyhow::Result<MatchEngine> {
    let embedder: Box<dyn EmbeddingProvider> = match (&cli.model_path, &cli.tokenizer_path) {
        (Some(model), Some(tokenizer)) => {
            info!("loading model from {}", model.display());
            Box::new(MiniLmEmbeddingProvider::load(model, tokenizer)?)
        }
        (None, None) => Box::new(HashEmbeddingProvider::default()),
        _ => anyhow::bail!("--model-path and --tokenizer-path must both be provided"),
    };

    Ok(MatchEngine::bootstrap(embedder, &cli.csv, &cli.cache_dir)?)
}

fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/chat", post(chat))
        .route("/stats", get(stats))
        .with_state(state)
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let engine = match build_engine(&cli) {
        Ok(engine) => {
            info!(
                records = engine.record_count(),
                model = engine.model_id(),
                "corpus ready"
            );
            Some(engine)
        }
        Err(err) => {
            warn!("startup failed, serving health checks only: {err:#}");
            None
        }
    };
    let state = Arc::new(AppState { engine });

    info!("Starting symptom matcher API on {}", cli.addr);
    axum::Server::bind(&cli.addr)
        .serve(router(state).into_make_service())
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn ready_state() -> Arc<AppState> {
        let dir = tempfile::tempdir().expect("tempdir");
        let csv_path = dir.path().join("symptoms.csv");
        let mut file = std::fs::File::create(&csv_path).expect("create csv");
        file.write_all(b"text,label\nfever and chills,Flu\nitchy rash,Allergy\n")
            .expect("write csv");

        let engine = MatchEngine::bootstrap(
            Box::new(HashEmbeddingProvider::new(128)),
            &csv_path,
            &dir.path().join("cache"),
        )
        .expect("bootstrap");

        Arc::new(AppState {
            engine: Some(engine),
        })
    }

    fn empty_state() -> Arc<AppState> {
        Arc::new(AppState { engine: None })
    }

    #[tokio::test]
    async fn chat_rejects_when_not_ready() {
        let (status, detail) = chat(
            State(empty_state()),
            Json(ChatRequest {
                message: "fever".to_string(),
            }),
        )
        .await
        .unwrap_err();

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(detail.contains("not ready"));
    }

    #[tokio::test]
    async fn chat_answers_with_composed_reply() {
        let Json(response) = chat(
            State(ready_state()),
            Json(ChatRequest {
                message: "fever and chills".to_string(),
            }),
        )
        .await
        .unwrap();

        assert!(response.reply.contains("Flu"));
        assert!(response.reply.contains("consult a doctor"));
        assert!((response.confidence - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn chat_always_replies_even_below_threshold() {
        let Json(response) = chat(
            State(ready_state()),
            Json(ChatRequest {
                message: "totally unrelated gibberish".to_string(),
            }),
        )
        .await
        .unwrap();

        // Unlike the CLI loop, the API composes a reply at any confidence
        // and leaves the cutoff to the caller.
        assert!(response.reply.contains("consult a doctor"));
    }

    #[tokio::test]
    async fn empty_message_prompts_for_symptoms() {
        let Json(response) = chat(
            State(ready_state()),
            Json(ChatRequest {
                message: "   ".to_string(),
            }),
        )
        .await
        .unwrap();

        assert!(response.reply.contains("describe your symptoms"));
        assert_eq!(response.confidence, 0.0);
    }

    #[tokio::test]
    async fn oversized_message_is_turned_away() {
        let Json(response) = chat(
            State(ready_state()),
            Json(ChatRequest {
                message: "a ".repeat(300),
            }),
        )
        .await
        .unwrap();

        assert!(response.reply.contains("too long"));
        assert_eq!(response.confidence, 0.0);
    }

    #[tokio::test]
    async fn health_is_ok_either_way() {
        let Json(ready) = health(State(ready_state())).await;
        assert!(ready.model_loaded);
        assert!(ready.dataset_loaded);

        let Json(down) = health(State(empty_state())).await;
        assert_eq!(down.status, "healthy");
        assert!(!down.model_loaded);
    }

    #[tokio::test]
    async fn stats_reports_corpus_shape() {
        let Json(stats_body) = stats(State(ready_state())).await.unwrap();
        assert_eq!(stats_body["total_records"], 2);
        assert_eq!(stats_body["unique_diseases"], 2);
        assert_eq!(stats_body["embedding_dimensions"], 128);
        assert_eq!(stats_body["model_name"], "token-hash-128");

        let (status, _) = stats(State(empty_state())).await.unwrap_err();
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }
}
