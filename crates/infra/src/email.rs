//! # メール送信プロバイダ
//!
//! 返信メールを実際に届けるアダプタ群を提供する。
//!
//! ## 設計方針
//!
//! - **trait による抽象化**: [`ProviderAdapter`] で送信方法を抽象化する
//! - **3 種類の実装**: SMTP、HTTP API、手動送信（ネットワークを使わない）
//! - **環境変数で構成**: [`EmailProvidersConfig::load`] がプロバイダごとの
//!   設定を読み込み、[`build_adapter`] が種別に応じたアダプタを組み立てる
//!
//! 送信の順序制御や再試行はここでは扱わない。呼び出し側のディスパッチャが
//! 各アダプタを順番に試す。

mod config;
mod http_api;
mod manual;
mod smtp;

use std::sync::Arc;

use async_trait::async_trait;
pub use config::{
    EmailProvidersConfig,
    EnvSource,
    HttpApiSettings,
    ProcessEnv,
    ProviderConfig,
    ProviderSettings,
    Secret,
    SmtpSettings,
    SmtpTimeoutProfile,
    SmtpTls,
    StaticEnv,
};
pub use http_api::HttpApiAdapter;
use leadhub_domain::email::{EmailError, EmailMessage, ProviderId, ProviderKind, Receipt};
pub use manual::ManualAdapter;
pub use smtp::SmtpAdapter;

/// メール送信プロバイダのアダプタ
///
/// 1 回の `send` は 1 回の送信試行に対応する。アダプタ自身は再試行しない。
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// 設定を検証してアダプタを構築する
    ///
    /// 必須の認証情報が欠けている場合は `EmailError::Configuration` を返す。
    fn configure(config: &ProviderConfig) -> Result<Self, EmailError>
    where
        Self: Sized;

    fn provider_id(&self) -> &ProviderId;

    fn display_name(&self) -> &str;

    fn kind(&self) -> ProviderKind;

    /// メールを 1 回送信する
    ///
    /// 成功時は受領証を返す。失敗時は `EmailError::Transport` を返し、
    /// 呼び出し側が次のプロバイダに切り替える。
    async fn send(&self, message: &EmailMessage) -> Result<Receipt, EmailError>;

    /// 送信せずに疎通だけを確認する
    async fn probe(&self) -> bool;
}

/// 設定の種別に応じたアダプタを構築する
pub fn build_adapter(config: &ProviderConfig) -> Result<Arc<dyn ProviderAdapter>, EmailError> {
    let adapter: Arc<dyn ProviderAdapter> = match &config.settings {
        ProviderSettings::Smtp(_) => Arc::new(SmtpAdapter::configure(config)?),
        ProviderSettings::HttpApi(_) => Arc::new(HttpApiAdapter::configure(config)?),
        ProviderSettings::Manual => Arc::new(ManualAdapter::configure(config)?),
    };
    Ok(adapter)
}

/// 送信元アドレスを決める（メッセージ側の指定を優先する）
fn resolve_sender<'a>(message: &'a EmailMessage, configured: &'a str) -> &'a str {
    message.sender_override().unwrap_or(configured)
}
