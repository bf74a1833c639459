use std::sync::Arc;

use axum::{
    Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

use crate::{
    clients::health::HealthChecker,
    error::{ServiceError, SmartSendError},
    models::{
        health::HealthStatus,
        notification::{CreateNotification, Notification, SendEmail, SmartSendRequest},
        response::ApiResponse,
    },
    service::NotificationService,
    smart_send::{SmartSendReport, SmartSender},
};

pub struct AppState {
    pub service: Arc<NotificationService>,
    pub smart_sender: Arc<SmartSender>,
    pub health_checker: HealthChecker,
    pub admin_email: String,
}

pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiResponse::<()>::error(self.message, "Request failed");
        (self.status, Json(body)).into_response()
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        let status = match &err {
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl From<SmartSendError> for ApiError {
    fn from(err: SmartSendError) -> Self {
        Self {
            status: StatusCode::BAD_GATEWAY,
            message: err.to_string(),
        }
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

#[derive(Debug, Deserialize)]
pub struct SendQuery {
    to: String,
}

#[derive(Debug, Deserialize)]
pub struct RecipientQuery {
    user_id: Option<String>,
}

#[derive(Debug, serde::Serialize)]
pub struct CreatedId {
    id: Uuid,
}

pub fn router(state: Arc<AppState>) -> Router {
    let notifications = Router::new()
        .route("/", get(list_notifications).post(create_notification))
        .route("/send", post(send_email))
        .route("/smart-send", post(smart_send))
        .route("/{id}", get(get_notification).delete(delete_notification));

    Router::new()
        .route("/health", get(health_check))
        .route("/api/ping", get(ping))
        .nest("/api/notifications", notifications)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run_api_server(
    state: Arc<AppState>,
    port: u16,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await?;

    info!(address = %addr, "HTTP server started");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    info!("HTTP server stopped");
    Ok(())
}

async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_checker.check_all().await;

    let status_code = match health.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

async fn ping() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "message": "pong" }))
}

async fn send_email(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SendQuery>,
    Json(request): Json<SendEmail>,
) -> ApiResult<()> {
    let to = if query.to == "admin" {
        state.admin_email.as_str()
    } else {
        query.to.as_str()
    };

    state.service.send_message(request, to).await?;
    Ok(Json(ApiResponse::success((), "Email queued")))
}

async fn list_notifications(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RecipientQuery>,
) -> ApiResult<Vec<Notification>> {
    let notifications = match query.user_id.as_deref().filter(|id| !id.is_empty()) {
        Some(user_id) => state.service.notifications_by_recipient(user_id).await?,
        None => state.service.notifications().await?,
    };

    Ok(Json(ApiResponse::success(notifications, "Notifications retrieved")))
}

async fn get_notification(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Notification> {
    let notification = state.service.notification(id).await?;
    Ok(Json(ApiResponse::success(notification, "Notification retrieved")))
}

async fn create_notification(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateNotification>,
) -> ApiResult<CreatedId> {
    let id = state.service.create_notification(request).await?;
    Ok(Json(ApiResponse::success(CreatedId { id }, "Notification created")))
}

async fn delete_notification(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<()> {
    state.service.delete_notification(id).await?;
    Ok(Json(ApiResponse::success((), "Notification deleted")))
}

async fn smart_send(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SmartSendRequest>,
) -> ApiResult<SmartSendReport> {
    let report = state.smart_sender.send(request).await?;
    Ok(Json(ApiResponse::success(report, "Notifications dispatched")))
}
