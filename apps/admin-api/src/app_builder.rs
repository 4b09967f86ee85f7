//! # 管理 API アプリケーション構築
//!
//! State の組み立てとルーター定義を担当する。
//! `main.rs` はインフラ初期化とサーバー起動に集中し、
//! 結合テストは同じルーターをモックの依存で組み立てる。

use std::sync::Arc;

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware::from_fn_with_state,
    routing::{get, post},
};
use leadhub_domain::clock::Clock;
use leadhub_infra::repository::{ContactRepository, NotificationRepository};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handler::{
        ContactState,
        EmailState,
        NotificationState,
        get_email_status,
        health_check,
        list_contacts,
        list_notifications,
        reinitialize_email_providers,
        reply_to_contact,
        send_test_email,
    },
    middleware::{AuthState, require_admin},
    usecase::{EmailDispatcher, EmailStatusReporter, ReplyUseCaseImpl, reply::ReplyTemplateRenderer},
};

/// ルーター構築に必要な依存
pub struct AppDependencies {
    pub contact_repo:      Arc<dyn ContactRepository>,
    pub notification_repo: Arc<dyn NotificationRepository>,
    pub dispatcher:        Arc<EmailDispatcher>,
    pub renderer:          ReplyTemplateRenderer,
    pub clock:             Arc<dyn Clock>,
    pub auth:              AuthState,
    /// 管理画面のオリジン（未設定なら CORS ヘッダーを付けない）
    pub ui_origin:         Option<HeaderValue>,
}

/// State の組み立てとルーター定義を行う
pub fn build_app(deps: AppDependencies) -> Router {
    let contact_state = Arc::new(ContactState {
        contact_repo: deps.contact_repo.clone(),
        reply:        ReplyUseCaseImpl::new(
            deps.contact_repo,
            deps.notification_repo.clone(),
            deps.dispatcher.clone(),
            deps.renderer,
            deps.clock,
        ),
    });

    let notification_state = Arc::new(NotificationState {
        notification_repo: deps.notification_repo,
    });

    let email_state = Arc::new(EmailState {
        dispatcher: deps.dispatcher.clone(),
        reporter:   EmailStatusReporter::new(deps.dispatcher),
    });

    // /health 以外はすべて管理者認証が必要
    let mut app = Router::new()
        .route("/health", get(health_check))
        .merge(
            Router::new()
                .route("/api/contacts", get(list_contacts))
                .route("/api/contacts/{id}/reply", post(reply_to_contact))
                .layer(from_fn_with_state(deps.auth.clone(), require_admin))
                .with_state(contact_state),
        )
        .merge(
            Router::new()
                .route("/api/notifications", get(list_notifications))
                .layer(from_fn_with_state(deps.auth.clone(), require_admin))
                .with_state(notification_state),
        )
        .merge(
            Router::new()
                .route("/api/email/status", get(get_email_status))
                .route("/api/email/reinitialize", post(reinitialize_email_providers))
                .route("/api/email/test", post(send_test_email))
                .layer(from_fn_with_state(deps.auth, require_admin))
                .with_state(email_state),
        );

    if let Some(origin) = deps.ui_origin {
        app = app.layer(
            CorsLayer::new()
                .allow_origin(origin)
                .allow_methods([Method::GET, Method::POST])
                .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]),
        );
    }

    app.layer(TraceLayer::new_for_http())
}
