use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::{OriginalUri, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{error, info, warn};

use crate::{
    error::{AppError, ReflectionError},
    guard::Admin,
    reflections::{NewReflection, page},
    state::AppState,
};

pub const WELCOME_MESSAGE: &str = "Welcome to Spirit.";

#[derive(Deserialize)]
struct SpiritRequest {
    messages: Vec<Value>,
}

#[derive(Deserialize)]
pub struct PageQuery {
    limit: Option<String>,
    offset: Option<String>,
}

#[derive(Deserialize)]
struct VerifyRequest {
    code: Option<String>,
}

pub async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "message": "Spirit API is alive",
        "status": "online",
        "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    }))
}

pub async fn spirit_handler(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let request: SpiritRequest = serde_json::from_slice(&body)
        .map_err(|_| AppError::MalformedPayload("Missing or invalid 'messages' array."))?;

    let reply = state.chat.reply(request.messages).await.map_err(|e| {
        error!("Spirit connection error: {e}");
        AppError::SpiritConnection
    })?;

    Ok(Json(json!({ "reply": reply })))
}

pub async fn list_reflections_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Value>, ReflectionError> {
    let (limit, offset) = page(query.limit.as_deref(), query.offset.as_deref());

    let reflections = state
        .reflections
        .recent(limit, offset)
        .await
        .inspect_err(|e| error!("Failed to fetch reflections: {e}"))?;

    Ok(Json(json!({
        "success": true,
        "count": reflections.len(),
        "reflections": reflections,
    })))
}

pub async fn create_reflection_handler(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<impl IntoResponse, ReflectionError> {
    let new_reflection: NewReflection = if body.is_empty() {
        NewReflection::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|_| AppError::MalformedPayload("Missing or invalid 'summary' text."))?
    };
    let reflection = new_reflection.into_reflection()?;

    state
        .reflections
        .insert(&reflection)
        .await
        .inspect_err(|e| error!("Failed to log reflection: {e}"))?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "Reflection successfully recorded.",
            "reflectionId": reflection.id,
            "timestamp": reflection.timestamp,
        })),
    ))
}

pub async fn reflection_not_found(OriginalUri(uri): OriginalUri) -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "success": false,
            "message": "Reflection route not found.",
            "path": uri.to_string(),
        })),
    )
}

pub async fn create_invite_handler(_: Admin, State(state): State<Arc<AppState>>) -> Json<Value> {
    let code = state.invites.create_code().await;
    info!("Invite code created");

    Json(json!({ "code": code }))
}

pub async fn list_invites_handler(_: Admin, State(state): State<Arc<AppState>>) -> Json<Value> {
    let invites = state.invites.list().await;

    Json(json!({
        "count": invites.len(),
        "invites": invites,
    }))
}

pub async fn verify_invite_handler(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let code = serde_json::from_slice::<VerifyRequest>(&body)
        .ok()
        .and_then(|request| request.code)
        .filter(|code| !code.is_empty())
        .ok_or(AppError::MalformedPayload("Missing invite code."))?;

    state
        .invites
        .redeem(&code)
        .await
        .inspect_err(|e| warn!("Invite redemption rejected: {e}"))?;

    let token = state
        .tokens
        .issue(&code)
        .map_err(|e| AppError::InternalError(e.into()))?;
    info!("Invite code redeemed");

    Ok(Json(json!({
        "message": WELCOME_MESSAGE,
        "token": token,
    })))
}
