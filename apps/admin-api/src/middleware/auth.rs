//! # 管理者認証ミドルウェア
//!
//! `Authorization: Bearer <JWT>` を HS256 で検証し、管理者ロールのみを通す。
//!
//! - トークンなし・署名不正・期限切れ: 401 Unauthorized
//! - 管理者以外のロール: 403 Forbidden
//!
//! 検証に通ったリクエストには [`AdminPrincipal`] を extensions に格納する。
//!
//! ## 使い方
//!
//! ```rust,ignore
//! use axum::middleware::from_fn_with_state;
//!
//! Router::new()
//!     .route("/api/email/status", get(get_email_status))
//!     .layer(from_fn_with_state(AuthState::new(&jwt_secret), require_admin))
//! ```

use axum::{
    body::Body,
    extract::State,
    http::{Request, header},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};

use crate::error::{forbidden_response, unauthorized_response};

/// 管理者ロール名
pub const ADMIN_ROLE: &str = "admin";

/// JWT のクレーム
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminClaims {
    /// ユーザー ID
    pub sub:   String,
    pub email: String,
    pub role:  String,
    /// 有効期限（UNIX 秒）
    pub exp:   u64,
}

/// 認証済みの管理者
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminPrincipal {
    pub user_id: String,
    pub email:   String,
}

/// 認証ミドルウェアの状態
#[derive(Clone)]
pub struct AuthState {
    decoding_key: DecodingKey,
    validation:   Validation,
}

impl AuthState {
    pub fn new(secret: &str) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation:   Validation::new(Algorithm::HS256),
        }
    }
}

/// 管理者認証ミドルウェア
pub async fn require_admin(
    State(state): State<AuthState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let Some(token) = bearer_token(&request) else {
        return unauthorized_response("認証が必要です");
    };

    let claims = match decode::<AdminClaims>(token, &state.decoding_key, &state.validation) {
        Ok(data) => data.claims,
        Err(e) => {
            tracing::debug!(error = %e, "JWT の検証に失敗しました");
            return unauthorized_response("認証トークンが無効です");
        }
    };

    if claims.role != ADMIN_ROLE {
        tracing::warn!(user_id = %claims.sub, role = %claims.role, "管理者以外のアクセスを拒否しました");
        return forbidden_response("この操作には管理者権限が必要です");
    }

    request.extensions_mut().insert(AdminPrincipal {
        user_id: claims.sub,
        email:   claims.email,
    });

    next.run(request).await
}

fn bearer_token(request: &Request<Body>) -> Option<&str> {
    request
        .headers()
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}
