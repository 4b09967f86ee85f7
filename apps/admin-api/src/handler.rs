//! # HTTP リクエストハンドラ
//!
//! axum のルートに対応するハンドラ関数を定義する。
//!
//! ## 設計方針
//!
//! - 各ハンドラはサブモジュールに配置
//! - 親モジュール（この `handler.rs`）で re-export し、フラットな API を提供
//! - ハンドラは薄く保ち、ビジネスロジックはユースケース層に委譲

pub mod contact;
pub mod email;
pub mod health;
pub mod notification;

pub use contact::{ContactState, list_contacts, reply_to_contact};
pub use email::{EmailState, get_email_status, reinitialize_email_providers, send_test_email};
pub use health::health_check;
pub use notification::{NotificationState, list_notifications};

use validator::Validate;

use crate::error::AdminError;

/// リクエストボディを検証する
fn validate_request<T: Validate>(request: &T) -> Result<(), AdminError> {
    request
        .validate()
        .map_err(|e| AdminError::Validation(e.to_string()))
}
