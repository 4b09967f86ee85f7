//! # 問い合わせ API ハンドラ
//!
//! 問い合わせの一覧と、問い合わせへの返信を扱う。
//!
//! ## エンドポイント
//!
//! ```text
//! GET  /api/contacts?status={new|replied|archived}
//! POST /api/contacts/{id}/reply
//! ```

use std::sync::Arc;

use axum::{
    Extension,
    Json,
    extract::{Path, Query, State},
};
use chrono::{DateTime, Utc};
use leadhub_domain::{
    contact::{Contact, ContactId, ContactStatus},
    email::{DeliveryOutcome, ManualDispatch, ProviderId},
};
use leadhub_infra::repository::ContactRepository;
use leadhub_shared::ApiResponse;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::validate_request;
use crate::{
    error::AdminError,
    middleware::AdminPrincipal,
    usecase::{ReplyInput, ReplyOutput, ReplyUseCaseImpl},
};

/// 問い合わせハンドラーの State
pub struct ContactState {
    pub contact_repo: Arc<dyn ContactRepository>,
    pub reply:        ReplyUseCaseImpl,
}

/// 一覧のクエリパラメータ
#[derive(Debug, Deserialize)]
pub struct ListContactsQuery {
    pub status: Option<ContactStatus>,
}

/// 問い合わせ DTO
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactDto {
    pub id:            String,
    pub name:          String,
    pub email:         String,
    pub company:       Option<String>,
    pub message:       String,
    pub status:        ContactStatus,
    pub reply_subject: Option<String>,
    pub replied_at:    Option<DateTime<Utc>>,
    pub created_at:    DateTime<Utc>,
}

impl From<&Contact> for ContactDto {
    fn from(contact: &Contact) -> Self {
        Self {
            id:            contact.id().to_string(),
            name:          contact.name().to_string(),
            email:         contact.email().to_string(),
            company:       contact.company().map(str::to_string),
            message:       contact.message().to_string(),
            status:        contact.status(),
            reply_subject: contact.reply_subject().map(str::to_string),
            replied_at:    contact.replied_at(),
            created_at:    contact.created_at(),
        }
    }
}

/// 返信リクエスト
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ReplyRequest {
    #[validate(length(min = 1, max = 200, message = "件名は 1〜200 文字で入力してください"))]
    pub subject:     String,
    #[validate(length(min = 1, message = "本文は必須です"))]
    pub message:     String,
    #[validate(email(message = "管理者のメールアドレスが不正です"))]
    pub admin_email: String,
}

/// 返信レスポンス
///
/// 管理画面と取り決めた形状のため `ApiResponse` で包まない。
/// `messageId` は配信済みのときだけ値を持つ（手動送信待ちは `null`）。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyResponse {
    pub success:        bool,
    pub message_id:     Option<String>,
    pub outcome:        DeliveryOutcome,
    pub provider_id:    ProviderId,
    pub contact_status: ContactStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic:     Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manual:         Option<ManualDispatch>,
}

impl From<ReplyOutput> for ReplyResponse {
    fn from(output: ReplyOutput) -> Self {
        let receipt = output.receipt;
        Self {
            success:        true,
            message_id:     receipt.external_message_id,
            outcome:        receipt.outcome,
            provider_id:    receipt.provider_id,
            contact_status: output.contact_status,
            diagnostic:     receipt.diagnostic,
            manual:         receipt.manual,
        }
    }
}

/// 問い合わせ一覧を取得する（新しい順）
///
/// ## エンドポイント
/// GET /api/contacts
#[tracing::instrument(skip_all)]
pub async fn list_contacts(
    State(state): State<Arc<ContactState>>,
    Query(query): Query<ListContactsQuery>,
) -> Result<Json<ApiResponse<Vec<ContactDto>>>, AdminError> {
    let contacts = state.contact_repo.list(query.status).await?;

    Ok(Json(ApiResponse::new(
        contacts.iter().map(ContactDto::from).collect(),
    )))
}

/// 問い合わせに返信する
///
/// すべての送信プロバイダが失敗しても 200 を返す。その場合は
/// `outcome` が `deferredManual` になり、`manual` に手動送信用の内容が入る。
///
/// ## エンドポイント
/// POST /api/contacts/{id}/reply
#[tracing::instrument(skip_all, fields(%contact_id, admin = %principal.user_id))]
pub async fn reply_to_contact(
    State(state): State<Arc<ContactState>>,
    Path(contact_id): Path<Uuid>,
    Extension(principal): Extension<AdminPrincipal>,
    Json(req): Json<ReplyRequest>,
) -> Result<Json<ReplyResponse>, AdminError> {
    validate_request(&req)?;
    if req.subject.trim().is_empty() || req.message.trim().is_empty() {
        return Err(AdminError::Validation(
            "件名と本文は空白のみにできません".to_string(),
        ));
    }

    let output = state
        .reply
        .reply(
            &ContactId::from_uuid(contact_id),
            ReplyInput {
                subject:     req.subject,
                message:     req.message,
                admin_email: req.admin_email,
            },
        )
        .await?;

    Ok(Json(ReplyResponse::from(output)))
}
