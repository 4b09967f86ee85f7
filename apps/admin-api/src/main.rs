//! # 管理 API サーバー
//!
//! リードマグネット管理画面のバックエンドサーバー。
//!
//! ## 起動方法
//!
//! ```bash
//! cargo run -p leadhub-admin-api
//! ```
//!
//! ## 環境変数
//!
//! | 変数名 | 必須 | 説明 |
//! |--------|------|------|
//! | `ADMIN_HOST` | No | バインドアドレス（既定 `0.0.0.0`） |
//! | `ADMIN_PORT` | No | ポート番号（既定 `3001`） |
//! | `DATABASE_URL` | **Yes** | PostgreSQL 接続 URL |
//! | `JWT_SECRET` | **Yes** | 管理者トークン検証用の共有鍵 |
//! | `ADMIN_UI_ORIGIN` | No | CORS を許可する管理画面のオリジン |
//! | `EMAIL_*` / `SMTP_*` / `SMTP_ALT_*` | No | 送信プロバイダの設定 |
//! | `LOG_FORMAT` | No | `json` または `pretty` |

mod config;

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context as _;
use axum::http::HeaderValue;
use config::AdminApiConfig;
use leadhub_admin_api::{
    app_builder::{AppDependencies, build_app},
    middleware::AuthState,
    usecase::{EmailDispatcher, reply::ReplyTemplateRenderer},
};
use leadhub_domain::clock::SystemClock;
use leadhub_infra::{
    db,
    email::ProcessEnv,
    repository::{PostgresContactRepository, PostgresNotificationRepository},
};
use leadhub_shared::observability::{TracingConfig, init_tracing};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env ファイルを読み込む（存在する場合）
    dotenvy::dotenv().ok();

    init_tracing(TracingConfig::from_env("admin-api"));

    let config = AdminApiConfig::from_env().context("設定の読み込みに失敗しました")?;

    tracing::info!(
        "管理 API サーバーを起動します: {}:{}",
        config.host,
        config.port
    );

    let pool = db::create_pool(&config.database_url)
        .await
        .context("データベース接続に失敗しました")?;
    db::run_migrations(&pool)
        .await
        .context("マイグレーションに失敗しました")?;
    tracing::info!("データベースに接続しました");

    let dispatcher = Arc::new(EmailDispatcher::from_env(Arc::new(ProcessEnv)));
    if !dispatcher.roster().await.active_usable() {
        tracing::warn!("最優先の送信プロバイダが未設定です。返信は手動送信になる可能性があります");
    }

    let ui_origin = config
        .ui_origin
        .as_deref()
        .map(HeaderValue::from_str)
        .transpose()
        .context("ADMIN_UI_ORIGIN がヘッダー値として不正です")?;

    let app = build_app(AppDependencies {
        contact_repo: Arc::new(PostgresContactRepository::new(pool.clone())),
        notification_repo: Arc::new(PostgresNotificationRepository::new(pool)),
        dispatcher,
        renderer: ReplyTemplateRenderer::new()?,
        clock: Arc::new(SystemClock),
        auth: AuthState::new(&config.jwt_secret),
        ui_origin,
    });

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("アドレスのパースに失敗しました")?;

    let listener = TcpListener::bind(addr).await?;
    tracing::info!("管理 API サーバーが起動しました: {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
