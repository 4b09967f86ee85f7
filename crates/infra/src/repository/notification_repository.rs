//! # NotificationRepository
//!
//! 管理者向け通知の永続化を担当するリポジトリ。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use leadhub_domain::{
    contact::ContactId,
    notification::{Notification, NotificationId, NotificationKind, NotificationRecord},
};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::InfraError;

/// 通知リポジトリトレイト
#[async_trait]
pub trait NotificationRepository: Send + Sync {
    /// 通知を挿入する
    async fn insert(&self, notification: &Notification) -> Result<(), InfraError>;

    /// 新しい順に最大 `limit` 件取得する
    async fn list_recent(&self, limit: i64) -> Result<Vec<Notification>, InfraError>;

    /// 未読件数を数える
    async fn count_unread(&self) -> Result<i64, InfraError>;
}

/// PostgreSQL 実装の NotificationRepository
#[derive(Debug, Clone)]
pub struct PostgresNotificationRepository {
    pool: PgPool,
}

impl PostgresNotificationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct NotificationRow {
    id:         Uuid,
    kind:       String,
    title:      String,
    message:    String,
    contact_id: Option<Uuid>,
    read:       bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<NotificationRow> for Notification {
    type Error = InfraError;

    fn try_from(row: NotificationRow) -> Result<Self, Self::Error> {
        let kind: NotificationKind = row
            .kind
            .parse()
            .map_err(|_| InfraError::invalid_data(format!("notifications.kind: {}", row.kind)))?;

        Ok(Notification::from_db(NotificationRecord {
            id: NotificationId::from_uuid(row.id),
            kind,
            title: row.title,
            message: row.message,
            contact_id: row.contact_id.map(ContactId::from_uuid),
            read: row.read,
            created_at: row.created_at,
        }))
    }
}

#[async_trait]
impl NotificationRepository for PostgresNotificationRepository {
    #[tracing::instrument(skip_all, level = "debug", fields(kind = %notification.kind()))]
    async fn insert(&self, notification: &Notification) -> Result<(), InfraError> {
        let kind: &str = notification.kind().into();
        sqlx::query(
            r#"
            INSERT INTO notifications (id, kind, title, message, contact_id, read, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(notification.id().as_uuid())
        .bind(kind)
        .bind(notification.title())
        .bind(notification.message())
        .bind(notification.contact_id().map(|id| *id.as_uuid()))
        .bind(notification.is_read())
        .bind(notification.created_at())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[tracing::instrument(skip_all, level = "debug")]
    async fn list_recent(&self, limit: i64) -> Result<Vec<Notification>, InfraError> {
        let rows = sqlx::query_as::<_, NotificationRow>(
            r#"
            SELECT id, kind, title, message, contact_id, read, created_at
            FROM notifications
            ORDER BY created_at DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Notification::try_from).collect()
    }

    #[tracing::instrument(skip_all, level = "debug")]
    async fn count_unread(&self) -> Result<i64, InfraError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM notifications WHERE NOT read")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
