//! # ミドルウェア
//!
//! 管理 API 用のミドルウェアを提供する。

mod auth;

pub use auth::{AdminClaims, AdminPrincipal, AuthState, ADMIN_ROLE, require_admin};
