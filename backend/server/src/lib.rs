//! Documentation of the Spirit API, the backend behind the Spirit chat companion.
//!
//!
//!
//! # General Infrastructure
//! - Single axum process, deployed behind the host's TLS terminating proxy
//! - Chat requests are forwarded to the OpenAI chat completion API
//! - Reflections are stored in Supabase, we talk to its PostgREST endpoint directly
//! - Invite codes and their state live in process memory only
//!
//!
//!
//! # Endpoints
//!
//! | Method | Path | Notes |
//! |---|---|---|
//! | GET | `/` | Health check |
//! | POST | `/api/spirit` | `{ messages: [...] }` -> `{ reply }`, messages forwarded as given |
//! | GET | `/reflections?limit=25&offset=0` | Newest first, limit capped at 200 |
//! | POST | `/reflections` | `{ summary, user?, category?, sentiment? }` |
//! | any | `/reflections/*` | `404 { success: false, message, path }` |
//! | POST | `/invite/create` | Admin only, `x-admin-token` header |
//! | GET | `/invite/list` | Admin only, `x-admin-token` header |
//! | POST | `/invite/verify` | `{ code }` -> `{ message, token }` |
//!
//! Error bodies are `{ error: <message> }`, on `/reflections` routes `{ success: false, error }`.
//!
//!
//!
//! # Invites
//!
//! **Goal**: Only let people in who were handed a code.
//!
//! - Admin mints a code with `POST /invite/create`
//! - User presents it once with `POST /invite/verify` and receives a JWT valid for 30 days
//! - Second presentation of the same code is a `409`, unknown codes are a `404`
//! - Codes are lost on restart, and each instance has its own codes. Run one instance
//!
//!
//!
//! # Rate Limiting
//! - Token bucket per client IP, see [`mod@rate_limit`]
//! - `RATE_LIMIT_BURST` requests per `RATE_LIMIT_REFILL_SECS`
//!
//!
//!
//! # Setup
//!
//! Required environment (or files under `/run/secrets`).
//! ```sh
//! ADMIN_TOKEN=...
//! JWT_SECRET=...
//! OPENAI_API_KEY=...
//! SUPABASE_URL=https://<project>.supabase.co
//! SUPABASE_KEY=...
//! ```
//!
//! Optional: `PORT` (10000), `OPENAI_MODEL` (gpt-5), `OPENAI_ENDPOINT`, `RATE_LIMIT_BURST` (60),
//! `RATE_LIMIT_REFILL_SECS` (60). A `.env` file in the working directory is loaded first.
//!
//! Run.
//! ```sh
//! RUST_LOG=info cargo run -p spirit-api
//! ```
//!
//! Mint and redeem a code.
//! ```sh
//! curl -X POST -H "x-admin-token: $ADMIN_TOKEN" localhost:10000/invite/create
//! curl -X POST -H "content-type: application/json" -d '{"code":"<code>"}' localhost:10000/invite/verify
//! ```
//!
//! View current docs.
//! ```sh
//! cargo doc --open
//! ```
use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use axum::{
    Router,
    http::{
        HeaderName, Method,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    middleware::from_fn_with_state,
    routing::{any, get, post},
};

use signal::{
    ctrl_c,
    unix::{SignalKind, signal},
};
use tokio::{net::TcpListener, signal};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

pub mod chat;
pub mod config;
pub mod error;
pub mod guard;
pub mod invite;
pub mod rate_limit;
pub mod reflections;
pub mod routes;
pub mod state;
pub mod token;

use config::Config;
use guard::ADMIN_HEADER;
use rate_limit::rate_limit;
use routes::{
    create_invite_handler, create_reflection_handler, health_handler, list_invites_handler,
    list_reflections_handler, reflection_not_found, spirit_handler, verify_invite_handler,
};
use state::AppState;

pub async fn start_server() -> anyhow::Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    info!("Loading config...");
    let config = Config::load().context("Environment misconfigured")?;
    let port = config.port;

    info!("Initializing state...");
    let state = AppState::new(config).context("Failed to build HTTP client")?;

    info!("Starting server...");
    let app = router(state);

    let address = format!("0.0.0.0:{port}");
    info!("Binding to {address}");

    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind to {address}"))?;
    info!("Server running on {address}");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server failure")?;

    info!("Server shut down");

    Ok(())
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            CONTENT_TYPE,
            AUTHORIZATION,
            HeaderName::from_static(ADMIN_HEADER),
        ])
        .max_age(Duration::from_secs(60 * 60));

    Router::new()
        .route("/", get(health_handler))
        .route("/api/spirit", post(spirit_handler))
        .route(
            "/reflections",
            get(list_reflections_handler)
                .post(create_reflection_handler)
                .fallback(reflection_not_found),
        )
        .route("/reflections/{*rest}", any(reflection_not_found))
        .route("/invite/create", post(create_invite_handler))
        .route("/invite/list", get(list_invites_handler))
        .route("/invite/verify", post(verify_invite_handler))
        .layer(from_fn_with_state(state.clone(), rate_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }

        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                terminate.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }

        info!("Received terminate signal, shutting down");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
