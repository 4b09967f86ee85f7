//! # ビジネスイベントログの構造化ヘルパー
//!
//! `jq` で調査しやすいよう、ログフィールドの命名規約とヘルパーマクロを提供する。
//!
//! ## ビジネスイベント
//!
//! [`log_business_event!`] マクロで出力する。`event.kind = "business_event"` マーカーが
//! 自動付与され、`jq 'select(.["event.kind"] == "business_event")'` でフィルタできる。
//!
//! ## フィールド命名規約
//!
//! ドット記法（`event.category`、`error.kind`）を使用する。JSON 出力ではフラットなキーになる。

/// ビジネスイベントを構造化ログとして出力する。
///
/// `event.kind = "business_event"` マーカーを自動付与し、
/// `tracing::info!` レベルで出力する。
///
/// ## 必須フィールド（慣例）
///
/// - `event.category`: イベントカテゴリ（[`event::category`] の定数を使用）
/// - `event.action`: アクション名（[`event::action`] の定数を使用）
/// - `event.result`: 結果（[`event::result`] の定数を使用）
#[macro_export]
macro_rules! log_business_event {
    ($($args:tt)*) => {
        ::tracing::info!(
            event.kind = "business_event",
            $($args)*
        )
    };
}

/// イベントフィールドの定数
pub mod event {
    /// イベントカテゴリ
    pub mod category {
        pub const EMAIL: &str = "email";
        pub const CONTACT: &str = "contact";
    }

    /// イベントアクション
    pub mod action {
        // メール送信
        pub const EMAIL_DELIVERED: &str = "email.delivered";
        pub const EMAIL_ATTEMPT_FAILED: &str = "email.attempt_failed";
        pub const EMAIL_DEFERRED_MANUAL: &str = "email.deferred_manual";
        pub const EMAIL_PROVIDERS_REINITIALIZED: &str = "email.providers_reinitialized";

        // 問い合わせ
        pub const CONTACT_REPLIED: &str = "contact.replied";
    }

    /// エンティティ種別
    pub mod entity_type {
        pub const CONTACT: &str = "contact";
    }

    /// イベント結果
    pub mod result {
        pub const SUCCESS: &str = "success";
        pub const FAILURE: &str = "failure";
    }
}

/// エラーコンテキストフィールドの定数
pub mod error {
    /// エラーカテゴリ
    pub mod category {
        /// インフラストラクチャ（DB）
        pub const INFRASTRUCTURE: &str = "infrastructure";
        /// 外部サービス呼び出し（メール送信プロバイダ）
        pub const EXTERNAL_SERVICE: &str = "external_service";
    }

    /// エラー種別
    pub mod kind {
        pub const DATABASE: &str = "database";
        pub const EMAIL_CONFIGURATION: &str = "email_configuration";
        pub const EMAIL_TRANSPORT: &str = "email_transport";
        pub const TEMPLATE: &str = "template";
    }
}
