//! # 管理 API エラー定義
//!
//! 管理 API 固有のエラーと、HTTP レスポンス（RFC 9457 Problem Details）への変換を定義する。
//!
//! メール送信の失敗はここには現れない。送信は必ず受領証を返すため、
//! 返信 API がエラーになるのは入力不備・問い合わせ不在・内部障害のときだけ。

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use leadhub_domain::DomainError;
use leadhub_infra::InfraError;
use leadhub_shared::{
    ErrorResponse,
    event_log::error::{category, kind},
};
use thiserror::Error;

/// 管理 API で発生するエラー
#[derive(Debug, Error)]
pub enum AdminError {
    /// リソースが見つからない
    #[error("リソースが見つかりません: {0}")]
    NotFound(String),

    /// リクエストボディの検証エラー
    #[error("入力値が不正です: {0}")]
    Validation(String),

    /// データベースエラー
    #[error("データベースエラー: {0}")]
    Database(#[from] InfraError),

    /// 内部エラー
    #[error("内部エラー: {0}")]
    Internal(String),
}

impl From<DomainError> for AdminError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(msg) => Self::Validation(msg),
            DomainError::NotFound { .. } => Self::NotFound(err.to_string()),
        }
    }
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        let body = match &self {
            AdminError::NotFound(msg) => ErrorResponse::not_found(msg.clone()),
            AdminError::Validation(msg) => ErrorResponse::validation_error(msg.clone()),
            AdminError::Database(e) => {
                tracing::error!(
                    error.category = category::INFRASTRUCTURE,
                    error.kind = kind::DATABASE,
                    "データベースエラー: {}",
                    e
                );
                ErrorResponse::internal_error()
            }
            AdminError::Internal(msg) => {
                tracing::error!("内部エラー: {}", msg);
                ErrorResponse::internal_error()
            }
        };

        let status =
            StatusCode::from_u16(body.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(body)).into_response()
    }
}

/// 401 Unauthorized レスポンス
pub fn unauthorized_response(detail: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorResponse::unauthorized(detail)),
    )
        .into_response()
}

/// 403 Forbidden レスポンス
pub fn forbidden_response(detail: &str) -> Response {
    (
        StatusCode::FORBIDDEN,
        Json(ErrorResponse::forbidden(detail)),
    )
        .into_response()
}
