//! # 通知 API ハンドラ
//!
//! 管理画面のベルアイコン用に、最近の通知と未読件数を返す。
//!
//! ```text
//! GET /api/notifications?limit=20
//! ```

use std::sync::Arc;

use axum::{
    Json,
    extract::{Query, State},
};
use chrono::{DateTime, Utc};
use leadhub_domain::notification::{Notification, NotificationKind};
use leadhub_infra::repository::NotificationRepository;
use leadhub_shared::ApiResponse;
use serde::{Deserialize, Serialize};

use crate::error::AdminError;

const DEFAULT_LIMIT: i64 = 20;
const MAX_LIMIT: i64 = 100;

/// 通知ハンドラーの State
pub struct NotificationState {
    pub notification_repo: Arc<dyn NotificationRepository>,
}

#[derive(Debug, Deserialize)]
pub struct ListNotificationsQuery {
    pub limit: Option<i64>,
}

/// 通知 DTO
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationDto {
    pub id:         String,
    pub kind:       NotificationKind,
    pub title:      String,
    pub message:    String,
    pub contact_id: Option<String>,
    pub read:       bool,
    pub created_at: DateTime<Utc>,
}

impl From<&Notification> for NotificationDto {
    fn from(notification: &Notification) -> Self {
        Self {
            id:         notification.id().to_string(),
            kind:       notification.kind(),
            title:      notification.title().to_string(),
            message:    notification.message().to_string(),
            contact_id: notification.contact_id().map(ToString::to_string),
            read:       notification.is_read(),
            created_at: notification.created_at(),
        }
    }
}

/// 通知一覧レスポンス
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationListDto {
    pub notifications: Vec<NotificationDto>,
    pub unread_count:  i64,
}

/// 最近の通知と未読件数を取得する
///
/// `limit` は 1〜100 に丸める（省略時は 20）。
#[tracing::instrument(skip_all)]
pub async fn list_notifications(
    State(state): State<Arc<NotificationState>>,
    Query(query): Query<ListNotificationsQuery>,
) -> Result<Json<ApiResponse<NotificationListDto>>, AdminError> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);

    let notifications = state.notification_repo.list_recent(limit).await?;
    let unread_count = state.notification_repo.count_unread().await?;

    Ok(Json(ApiResponse::new(NotificationListDto {
        notifications: notifications.iter().map(NotificationDto::from).collect(),
        unread_count,
    })))
}
