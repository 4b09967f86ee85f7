//! # ヘルスチェックハンドラ
//!
//! 管理 API の稼働状態を確認するためのエンドポイント。認証は不要。
//!
//! ```text
//! GET /health
//! ```

use axum::Json;
use leadhub_shared::HealthResponse;

/// ヘルスチェックエンドポイント
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse::healthy(env!("CARGO_PKG_VERSION")))
}
