//! # メール送信 API ハンドラ
//!
//! 運用担当者向けに、送信プロバイダの状態確認・再初期化・テスト送信を提供する。
//!
//! ## エンドポイント
//!
//! ```text
//! GET  /api/email/status?probe=true
//! POST /api/email/reinitialize
//! POST /api/email/test
//! ```

use std::sync::Arc;

use axum::{
    Json,
    extract::{Query, State},
};
use leadhub_domain::email::{AdapterStatus, EmailMessage, Receipt};
use leadhub_shared::ApiResponse;
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::validate_request;
use crate::{
    error::AdminError,
    usecase::{EmailDispatcher, EmailStatusReporter},
};

const TEST_EMAIL_SUBJECT: &str = "[LeadHub] メール送信テスト";
const TEST_EMAIL_BODY: &str =
    "このメールは LeadHub 管理画面からの送信テストです。\n届いていれば送信設定は正常です。";

/// メール送信ハンドラーの State
pub struct EmailState {
    pub dispatcher: Arc<EmailDispatcher>,
    pub reporter:   EmailStatusReporter,
}

/// 状態確認のクエリパラメータ
#[derive(Debug, Default, Deserialize)]
pub struct StatusQuery {
    /// true のときだけ各プロバイダへの疎通確認を行う
    #[serde(default)]
    pub probe: bool,
}

/// 再初期化レスポンス
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReinitializeResponse {
    /// 最優先のプロバイダが使えるか
    pub active_usable: bool,
    pub providers:     Vec<AdapterStatus>,
}

/// テスト送信リクエスト
#[derive(Debug, Deserialize, Validate)]
pub struct TestEmailRequest {
    #[validate(email(message = "宛先のメールアドレスが不正です"))]
    pub to: String,
}

/// 送信プロバイダの状態一覧を取得する
///
/// ## エンドポイント
/// GET /api/email/status
#[tracing::instrument(skip_all, fields(probe = query.probe))]
pub async fn get_email_status(
    State(state): State<Arc<EmailState>>,
    Query(query): Query<StatusQuery>,
) -> Json<ApiResponse<Vec<AdapterStatus>>> {
    Json(ApiResponse::new(state.reporter.statuses(query.probe).await))
}

/// 環境変数を読み直して送信プロバイダを再構成する
///
/// ## エンドポイント
/// POST /api/email/reinitialize
#[tracing::instrument(skip_all)]
pub async fn reinitialize_email_providers(
    State(state): State<Arc<EmailState>>,
) -> Json<ApiResponse<ReinitializeResponse>> {
    let active_usable = state.dispatcher.reinitialize().await;
    let providers = state.reporter.statuses(false).await;

    Json(ApiResponse::new(ReinitializeResponse {
        active_usable,
        providers,
    }))
}

/// 送信設定の確認用にテストメールを送る
///
/// 返信と同じフォールバックを通るため、全滅時は手動送信の受領証が返る。
///
/// ## エンドポイント
/// POST /api/email/test
#[tracing::instrument(skip_all)]
pub async fn send_test_email(
    State(state): State<Arc<EmailState>>,
    Json(req): Json<TestEmailRequest>,
) -> Result<Json<ApiResponse<Receipt>>, AdminError> {
    validate_request(&req)?;

    let message = EmailMessage::new([req.to], TEST_EMAIL_SUBJECT, TEST_EMAIL_BODY)?;
    let receipt = state.dispatcher.dispatch(&message).await;

    Ok(Json(ApiResponse::new(receipt)))
}
