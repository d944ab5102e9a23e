use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

use crate::config::Config;
use crate::dispatch::{Orchestrator, SmsOptions, WhatsAppOptions};
use crate::error::DispatchError;
use crate::gateway::{GatewayDispatcher, connection, verify_token};
use crate::models::channel::UpsertChannel;
use crate::models::log::LogFilter;
use crate::models::notification::{ChannelKind, NotificationFilter};
use crate::models::response::ApiResponse;
use crate::models::template::CreateTemplate;
use crate::registry::ChannelRegistry;
use crate::store::Store;

pub struct AppState {
    pub store: Arc<dyn Store>,
    pub registry: ChannelRegistry,
    pub orchestrator: Orchestrator,
    pub gateway: GatewayDispatcher,
    pub config: Config,
}

pub async fn run_api_server(state: Arc<AppState>) -> Result<(), Box<dyn std::error::Error>> {
    let port = state.config.server_port;

    let app = router(state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await?;

    info!(address = %addr, "Notification service started");

    axum::serve(listener, app).await?;

    Ok(())
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/channels", post(upsert_channel).get(list_channels))
        .route(
            "/api/channels/{id}",
            get(channel_by_kind).delete(delete_channel),
        )
        .route("/api/channels/{id}/deactivate", post(deactivate_channel))
        .route("/api/logs", get(list_logs))
        .route("/api/logs/statistics", get(log_statistics))
        .route("/api/notifications", get(list_notifications))
        .route("/api/notifications/{id}/logs", get(logs_by_notification))
        .route("/api/send/email", post(send_email))
        .route("/api/send/sms", post(send_sms))
        .route("/api/send/whatsapp", post(send_whatsapp))
        .route("/api/send/push", post(send_push))
        .route("/api/send/in-app", post(send_in_app))
        .route("/api/send/template", post(send_from_template))
        .route("/api/templates", post(create_template).get(list_templates))
        .route("/ws", get(ws_upgrade))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// The surrounding platform resolves the tenant and forwards it here.
fn tenant_id(headers: &HeaderMap) -> Result<Uuid, DispatchError> {
    headers
        .get("x-tenant-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| Uuid::parse_str(v).ok())
        .ok_or_else(|| DispatchError::Unauthorized("missing or invalid X-Tenant-Id".to_string()))
}

async fn health_check(State(state): State<Arc<AppState>>) -> Response {
    match state.store.health_check().await {
        Ok(()) => (
            StatusCode::OK,
            Json(ApiResponse::success((), "healthy".to_string())),
        )
            .into_response(),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiResponse::<()>::error(
                e.to_string(),
                "unhealthy".to_string(),
            )),
        )
            .into_response(),
    }
}

// ---------------------------------------------------------------------------
// Channel admin
// ---------------------------------------------------------------------------

async fn upsert_channel(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<UpsertChannel>,
) -> Result<Response, DispatchError> {
    let tenant = tenant_id(&headers)?;
    let channel = state.registry.upsert_channel(tenant, body).await?;

    Ok((
        StatusCode::OK,
        Json(ApiResponse::success(channel, "Channel stored".to_string())),
    )
        .into_response())
}

async fn list_channels(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, DispatchError> {
    let tenant = tenant_id(&headers)?;
    let channels = state.registry.active_channels(tenant).await?;

    Ok(Json(ApiResponse::success(channels, "Active channels".to_string())).into_response())
}

async fn channel_by_kind(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(kind): Path<String>,
) -> Result<Response, DispatchError> {
    let tenant = tenant_id(&headers)?;
    let kind = ChannelKind::parse(&kind)
        .ok_or_else(|| DispatchError::not_found(format!("channel kind '{}'", kind)))?;

    let channel = state.registry.active_channel(tenant, kind).await?;

    Ok(Json(ApiResponse::success(
        channel,
        "Resolved channel".to_string(),
    ))
    .into_response())
}

async fn deactivate_channel(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Response, DispatchError> {
    let tenant = tenant_id(&headers)?;
    state.registry.deactivate_channel(tenant, id).await?;

    Ok(Json(ApiResponse::success((), "Channel deactivated".to_string())).into_response())
}

async fn delete_channel(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Response, DispatchError> {
    let tenant = tenant_id(&headers)?;
    state.registry.delete_channel(tenant, id).await?;

    Ok(Json(ApiResponse::success((), "Channel deleted".to_string())).into_response())
}

// ---------------------------------------------------------------------------
// Logs & statistics
// ---------------------------------------------------------------------------

async fn list_logs(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(filter): Query<LogFilter>,
) -> Result<Response, DispatchError> {
    let tenant = tenant_id(&headers)?;
    let logs = state.store.logs(tenant, filter).await?;

    Ok(Json(ApiResponse::success(logs, "Delivery logs".to_string())).into_response())
}

#[derive(Debug, Deserialize)]
struct StatisticsQuery {
    start_date: Option<DateTime<Utc>>,
    end_date: Option<DateTime<Utc>>,
}

async fn log_statistics(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<StatisticsQuery>,
) -> Result<Response, DispatchError> {
    let tenant = tenant_id(&headers)?;
    let stats = state
        .store
        .statistics(tenant, query.start_date, query.end_date)
        .await?;

    Ok(Json(ApiResponse::success(stats, "Delivery statistics".to_string())).into_response())
}

async fn logs_by_notification(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Response, DispatchError> {
    let tenant = tenant_id(&headers)?;
    // Ownership check: the notification must exist within the tenant.
    state.store.notification(tenant, id).await?;
    let logs = state.store.logs_by_notification(id).await?;

    Ok(Json(ApiResponse::success(logs, "Notification logs".to_string())).into_response())
}

// ---------------------------------------------------------------------------
// Sending
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct SendEmailRequest {
    user_id: Uuid,
    recipient: String,
    subject: String,
    content: String,
    template_id: Option<Uuid>,
}

async fn send_email(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<SendEmailRequest>,
) -> Result<Response, DispatchError> {
    let tenant = tenant_id(&headers)?;
    let notification = state
        .orchestrator
        .send_email(
            tenant,
            body.user_id,
            body.recipient,
            body.subject,
            body.content,
            body.template_id,
        )
        .await?;

    Ok(Json(ApiResponse::success(notification, "Email processed".to_string())).into_response())
}

#[derive(Debug, Deserialize)]
struct SendSmsRequest {
    user_id: Uuid,
    recipient: String,
    content: String,
    template_id: Option<Uuid>,
    channel_id: Option<Uuid>,
}

async fn send_sms(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<SendSmsRequest>,
) -> Result<Response, DispatchError> {
    let tenant = tenant_id(&headers)?;
    let notification = state
        .orchestrator
        .send_sms(
            tenant,
            body.user_id,
            body.recipient,
            body.content,
            SmsOptions {
                template_id: body.template_id,
                channel_id: body.channel_id,
            },
        )
        .await?;

    Ok(Json(ApiResponse::success(notification, "SMS processed".to_string())).into_response())
}

#[derive(Debug, Deserialize)]
struct SendWhatsAppRequest {
    user_id: Uuid,
    recipient: String,
    message: String,
    template_id: Option<Uuid>,
    channel_id: Option<Uuid>,
    template_name: Option<String>,
    #[serde(default)]
    template_params: Vec<String>,
}

async fn send_whatsapp(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<SendWhatsAppRequest>,
) -> Result<Response, DispatchError> {
    let tenant = tenant_id(&headers)?;
    let notification = state
        .orchestrator
        .send_whatsapp(
            tenant,
            body.user_id,
            body.recipient,
            body.message,
            WhatsAppOptions {
                template_id: body.template_id,
                channel_id: body.channel_id,
                template_name: body.template_name,
                template_params: body.template_params,
            },
        )
        .await?;

    Ok(Json(ApiResponse::success(notification, "WhatsApp message processed".to_string()))
        .into_response())
}

#[derive(Debug, Deserialize)]
struct SendPushRequest {
    user_id: Uuid,
    device_token: String,
    title: String,
    content: String,
    template_id: Option<Uuid>,
}

async fn send_push(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<SendPushRequest>,
) -> Result<Response, DispatchError> {
    let tenant = tenant_id(&headers)?;
    let notification = state
        .orchestrator
        .send_push(
            tenant,
            body.user_id,
            body.device_token,
            body.title,
            body.content,
            body.template_id,
        )
        .await?;

    Ok(Json(ApiResponse::success(notification, "Push processed".to_string())).into_response())
}

#[derive(Debug, Deserialize)]
struct SendInAppRequest {
    user_id: Uuid,
    title: String,
    content: String,
    template_id: Option<Uuid>,
}

async fn send_in_app(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<SendInAppRequest>,
) -> Result<Response, DispatchError> {
    let tenant = tenant_id(&headers)?;
    let notification = state
        .orchestrator
        .send_in_app(tenant, body.user_id, body.title, body.content, body.template_id)
        .await?;

    Ok(Json(ApiResponse::success(notification, "In-app notification delivered".to_string()))
        .into_response())
}

#[derive(Debug, Deserialize)]
struct SendFromTemplateRequest {
    user_id: Uuid,
    template_id: Uuid,
    recipient: String,
    #[serde(default)]
    variables: HashMap<String, JsonValue>,
}

async fn send_from_template(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<SendFromTemplateRequest>,
) -> Result<Response, DispatchError> {
    let tenant = tenant_id(&headers)?;
    let notification = state
        .orchestrator
        .send_from_template(
            tenant,
            body.user_id,
            body.template_id,
            body.recipient,
            body.variables,
        )
        .await?;

    Ok(Json(ApiResponse::success(notification, "Template send processed".to_string()))
        .into_response())
}

async fn list_notifications(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(filter): Query<NotificationFilter>,
) -> Result<Response, DispatchError> {
    let tenant = tenant_id(&headers)?;
    let notifications = state.store.notifications(tenant, filter).await?;

    Ok(Json(ApiResponse::success(notifications, "Notifications".to_string())).into_response())
}

// ---------------------------------------------------------------------------
// Templates
// ---------------------------------------------------------------------------

async fn create_template(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateTemplate>,
) -> Result<Response, DispatchError> {
    let tenant = tenant_id(&headers)?;
    let template = state.store.create_template(tenant, body).await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(template, "Template created".to_string())),
    )
        .into_response())
}

async fn list_templates(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, DispatchError> {
    let tenant = tenant_id(&headers)?;
    let templates = state.store.templates(tenant).await?;

    Ok(Json(ApiResponse::success(templates, "Templates".to_string())).into_response())
}

// ---------------------------------------------------------------------------
// Realtime gateway
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct WsQuery {
    token: Option<String>,
}

/// Token verification happens before the upgrade completes; a failed
/// handshake never joins a room or receives an event.
async fn ws_upgrade(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let token = query.token.or_else(|| {
        headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::to_string)
    });

    let Some(token) = token else {
        return StatusCode::UNAUTHORIZED.into_response();
    };

    let claims = match verify_token(&state.config.jwt_secret, &token) {
        Ok(claims) => claims,
        Err(_) => return StatusCode::UNAUTHORIZED.into_response(),
    };

    let dispatcher = state.gateway.clone();
    let store = state.store.clone();

    ws.on_upgrade(move |socket| {
        connection::handle_connection(socket, dispatcher, store, claims.sub, claims.tenant_id)
    })
}
