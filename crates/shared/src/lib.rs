//! # LeadHub 共有ユーティリティ
//!
//! このクレートは、LeadHub の各クレート（domain / infra / admin-api）で
//! 共通に使用するユーティリティを提供する。
//!
//! ## 設計方針
//!
//! - ビジネスロジックを含まない純粋なユーティリティのみを配置
//! - axum などの Web フレームワークには依存しない
//! - 外部クレートへの依存は最小限に抑える（トレーシングは feature で有効化）

pub mod api_response;
pub mod error_response;
pub mod event_log;
pub mod health;
pub mod observability;

pub use api_response::ApiResponse;
pub use error_response::ErrorResponse;
pub use health::HealthResponse;
