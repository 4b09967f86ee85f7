//! 手動送信アダプタ
//!
//! ネットワークを一切使わず、管理者が自分のメールクライアントで送れるように
//! 宛先・件名・本文と `mailto:` リンクを受領証に詰めて返す。
//! 他のすべてのプロバイダが失敗したときの最後の受け皿になるため、失敗しない。

use async_trait::async_trait;
use leadhub_domain::email::{EmailError, EmailMessage, ProviderId, ProviderKind, Receipt};

use super::{ProviderAdapter, ProviderConfig, ProviderSettings};

/// 手動送信アダプタ
#[derive(Debug, Clone)]
pub struct ManualAdapter {
    id:           ProviderId,
    display_name: String,
}

impl ManualAdapter {
    pub fn new() -> Self {
        let config = ProviderConfig::manual();
        Self {
            id:           config.id,
            display_name: config.display_name,
        }
    }

    /// 手動送信用の受領証を作る
    ///
    /// `diagnostic` には先行プロバイダの失敗理由を渡す。
    pub fn prepare(&self, message: &EmailMessage, diagnostic: Option<String>) -> Receipt {
        tracing::info!(
            recipients = message.recipients().len(),
            "メールを手動送信用に準備しました"
        );
        Receipt::deferred_manual(self.id.clone(), message, diagnostic)
    }
}

impl Default for ManualAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProviderAdapter for ManualAdapter {
    fn configure(config: &ProviderConfig) -> Result<Self, EmailError> {
        match config.settings {
            ProviderSettings::Manual => Ok(Self {
                id:           config.id.clone(),
                display_name: config.display_name.clone(),
            }),
            _ => Err(EmailError::Configuration(format!(
                "{} は手動送信の設定ではありません",
                config.id
            ))),
        }
    }

    fn provider_id(&self) -> &ProviderId {
        &self.id
    }

    fn display_name(&self) -> &str {
        &self.display_name
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Manual
    }

    async fn send(&self, message: &EmailMessage) -> Result<Receipt, EmailError> {
        Ok(self.prepare(message, None))
    }

    async fn probe(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use leadhub_domain::email::DeliveryOutcome;
    use pretty_assertions::assert_eq;

    use super::*;

    fn message() -> EmailMessage {
        EmailMessage::new(["a@b.com"], "S", "T").unwrap()
    }

    #[tokio::test]
    async fn test_送信は常に手動送信待ちの受領証を返す() {
        let adapter = ManualAdapter::new();

        let receipt = adapter.send(&message()).await.unwrap();

        assert_eq!(receipt.outcome, DeliveryOutcome::DeferredManual);
        assert_eq!(receipt.provider_id, ProviderId::manual());
        assert_eq!(receipt.external_message_id, None);
        let manual = receipt.manual.unwrap();
        assert_eq!(manual.to, vec!["a@b.com".to_string()]);
        assert_eq!(manual.subject, "S");
        assert_eq!(manual.text_body, "T");
        assert_eq!(manual.mailto_link, "mailto:a@b.com?subject=S&body=T");
    }

    #[test]
    fn test_prepareは診断メッセージを受領証に載せる() {
        let receipt = ManualAdapter::new().prepare(
            &message(),
            Some("smtp: タイムアウト; http-api: 401".to_string()),
        );

        assert_eq!(
            receipt.diagnostic.as_deref(),
            Some("smtp: タイムアウト; http-api: 401")
        );
    }

    #[tokio::test]
    async fn test_疎通確認は常に成功する() {
        assert!(ManualAdapter::new().probe().await);
    }

    #[test]
    fn test_手動送信以外の設定は拒否する() {
        let mut config = ProviderConfig::manual();
        config.settings = ProviderSettings::HttpApi(crate::email::HttpApiSettings {
            base_url:     "https://api.resend.com".to_string(),
            api_key:      None,
            from_address: None,
            timeout:      std::time::Duration::from_secs(1),
            probe_path:   "domains".to_string(),
        });

        assert!(matches!(
            ManualAdapter::configure(&config),
            Err(EmailError::Configuration(_))
        ));
    }
}
