//! Remediation engine entry points.
//!
//! Runs either as a one-shot processor for a single finding payload or as a
//! push-delivery HTTP listener. The delivery layer owns retries: any
//! retryable engine failure maps to a non-2xx response so the message is
//! redelivered, which is safe because every rule is idempotent.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Parser;
use tower_http::trace::TraceLayer;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use remediation_engine::clients::{
    CloudResourceManager, CloudStorage, ComputeEngine, Services, TokenProvider,
};
use remediation_engine::{finding, remediate, Configuration, Deadline};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Process a single finding payload from this path ("-" reads stdin),
    /// then exit. Without it, the push-delivery listener is started.
    #[arg(long)]
    finding: Option<PathBuf>,

    /// Listener port
    #[arg(long, default_value_t = 8080)]
    port: u16,

    /// Per-invocation deadline in seconds
    #[arg(long, default_value_t = 60)]
    deadline_secs: u64,
}

#[derive(Clone)]
struct AppState {
    services: Services,
    deadline: Duration,
}

#[tokio::main]
async fn main() -> Result<()> {
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .json()
        .init();

    let cli = Cli::parse();
    let services = build_services()?;
    let deadline = Duration::from_secs(cli.deadline_secs);

    if let Some(path) = cli.finding {
        let payload = read_payload(&path)?;
        let config = Configuration::from_env();
        let outcome = remediate(&payload, &config, &services, Deadline::after(deadline)).await?;
        info!("{}", outcome.summary());
        return Ok(());
    }

    let state = AppState { services, deadline };
    let app = Router::new()
        .route("/health", get(health_check))
        .route("/v1/findings", post(handle_finding))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], cli.port));
    info!("remediation engine listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn build_services() -> Result<Services> {
    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .context("failed to create HTTP client")?;
    let tokens = TokenProvider::new(http_client.clone());

    Ok(Services::new(
        Arc::new(CloudResourceManager::new(
            http_client.clone(),
            tokens.clone(),
        )),
        Arc::new(ComputeEngine::new(http_client.clone(), tokens.clone())),
        Arc::new(CloudStorage::new(http_client, tokens)),
    ))
}

fn read_payload(path: &PathBuf) -> Result<Vec<u8>> {
    if path.as_os_str() == "-" {
        use std::io::Read;
        let mut buf = Vec::new();
        std::io::stdin()
            .read_to_end(&mut buf)
            .context("failed to read finding from stdin")?;
        Ok(buf)
    } else {
        std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))
    }
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "remediation-engine",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Push-delivery endpoint. 204 acknowledges the message, including every
/// deliberate no-op; non-2xx asks the delivery layer to redeliver.
async fn handle_finding(State(state): State<AppState>, body: Bytes) -> StatusCode {
    let payload = match finding::decode_push_envelope(&body) {
        Ok(payload) => payload,
        Err(err) => {
            error!("rejected push envelope: {err}");
            return StatusCode::BAD_REQUEST;
        }
    };

    let config = Configuration::from_env();
    match remediate(
        &payload,
        &config,
        &state.services,
        Deadline::after(state.deadline),
    )
    .await
    {
        Ok(_) => StatusCode::NO_CONTENT,
        Err(err) if err.is_retryable() => {
            error!("remediation failed, redelivery requested: {err}");
            StatusCode::INTERNAL_SERVER_ERROR
        }
        Err(err) => {
            error!("remediation rejected finding: {err}");
            StatusCode::BAD_REQUEST
        }
    }
}
