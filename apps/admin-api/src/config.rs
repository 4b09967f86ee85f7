//! # 管理 API 設定
//!
//! 環境変数から管理 API サーバーの設定を読み込む。
//! 送信プロバイダの設定は再初期化のたびに読み直すため、ここでは扱わない。

use std::env;

use anyhow::Context as _;

/// 管理 API サーバーの設定
#[derive(Debug, Clone)]
pub struct AdminApiConfig {
    /// バインドアドレス
    pub host:         String,
    /// ポート番号
    pub port:         u16,
    /// データベース接続 URL
    pub database_url: String,
    /// 管理者トークン検証用の共有鍵（HS256）
    pub jwt_secret:   String,
    /// 管理画面のオリジン（CORS 許可用）
    pub ui_origin:    Option<String>,
}

impl AdminApiConfig {
    /// 環境変数から設定を読み込む
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            host:         env::var("ADMIN_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port:         env::var("ADMIN_PORT")
                .unwrap_or_else(|_| "3001".to_string())
                .parse()
                .context("ADMIN_PORT は有効なポート番号である必要があります")?,
            database_url: env::var("DATABASE_URL").context("DATABASE_URL が設定されていません")?,
            jwt_secret:   env::var("JWT_SECRET")
                .ok()
                .filter(|s| !s.is_empty())
                .context("JWT_SECRET が設定されていません")?,
            ui_origin:    env::var("ADMIN_UI_ORIGIN").ok().filter(|s| !s.is_empty()),
        })
    }
}
