use std::{collections::HashMap, time::Instant};

use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use sqlx::{FromRow, PgPool, postgres::PgPoolOptions, types::Json};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::{
    clients::{AuditSink, NotificationStore, health::HealthProbe},
    error::StoreError,
    models::{audit::CreateAuditLog, notification::Notification},
};

#[derive(FromRow)]
struct NotificationRow {
    id: Uuid,
    user_id: String,
    subject: String,
    body: String,
    custom: Json<HashMap<String, String>>,
    is_new: bool,
}

impl From<NotificationRow> for Notification {
    fn from(row: NotificationRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            subject: row.subject,
            body: row.body,
            custom: row.custom.0,
            is_new: row.is_new,
        }
    }
}

pub struct DatabaseClient {
    pool: PgPool,
}

impl DatabaseClient {
    pub async fn connect(database_url: &str) -> Result<Self, Error> {
        info!("Connecting to PostgreSQL database");

        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| anyhow!("Failed to connect to database: {}", e))?;

        info!("PostgreSQL connection established");

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), Error> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| anyhow!("Failed to run migrations: {}", e))?;

        info!("Database migrations applied");
        Ok(())
    }
}

const SELECT_NOTIFICATION: &str =
    "SELECT id, user_id, subject, body, custom, is_new FROM notifications";

#[async_trait]
impl NotificationStore for DatabaseClient {
    async fn all(&self) -> Result<Vec<Notification>, StoreError> {
        let rows = sqlx::query_as::<_, NotificationRow>(&format!("{} ORDER BY created_at", SELECT_NOTIFICATION))
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(Notification::from).collect())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Notification>, StoreError> {
        let row = sqlx::query_as::<_, NotificationRow>(&format!("{} WHERE id = $1", SELECT_NOTIFICATION))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Notification::from))
    }

    async fn by_recipient(&self, user_id: &str) -> Result<Vec<Notification>, StoreError> {
        let rows = sqlx::query_as::<_, NotificationRow>(&format!(
            "{} WHERE user_id = $1 ORDER BY created_at",
            SELECT_NOTIFICATION
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Notification::from).collect())
    }

    async fn insert(&self, notification: &Notification) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO notifications (id, user_id, subject, body, custom, is_new)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(notification.id)
        .bind(&notification.user_id)
        .bind(&notification.subject)
        .bind(&notification.body)
        .bind(Json(&notification.custom))
        .bind(notification.is_new)
        .execute(&self.pool)
        .await?;

        debug!(id = %notification.id, "Notification row inserted");
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM notifications WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn mark_read(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE notifications SET is_new = FALSE WHERE id = $1 AND is_new")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl AuditSink for DatabaseClient {
    async fn record(&self, log: CreateAuditLog) -> Result<(), StoreError> {
        let status = log.status.to_string();

        sqlx::query(
            r#"
            INSERT INTO audit_logs (
                task_kind,
                notification_id,
                user_id,
                status,
                error_message,
                metadata
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&log.task_kind)
        .bind(log.notification_id)
        .bind(&log.user_id)
        .bind(&status)
        .bind(&log.error_message)
        .bind(&log.metadata)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!(
                error = %e,
                task_kind = %log.task_kind,
                "Failed to write audit log to database"
            );
            StoreError::from(e)
        })?;

        debug!(task_kind = %log.task_kind, status = %status, "Audit log written to database");

        Ok(())
    }
}

#[async_trait]
impl HealthProbe for DatabaseClient {
    fn name(&self) -> &'static str {
        "database"
    }

    async fn probe(&self) -> Result<u64, String> {
        let start = Instant::now();

        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| format!("Health check query failed: {}", e))?;

        Ok(start.elapsed().as_millis() as u64)
    }
}
