//! # 送信プロバイダの状態確認
//!
//! 運用担当者向けに、各プロバイダの設定状況と健全性を報告する。
//! 疎通確認はメールを送らず、接続と認証だけを行う。

use std::sync::Arc;

use leadhub_domain::email::{AdapterHealth, AdapterStatus, ProviderKind};
use leadhub_infra::email::ProviderAdapter;

use super::dispatcher::{EmailDispatcher, ProviderSlot};

/// 送信プロバイダの状態レポーター
#[derive(Clone)]
pub struct EmailStatusReporter {
    dispatcher: Arc<EmailDispatcher>,
}

impl EmailStatusReporter {
    pub fn new(dispatcher: Arc<EmailDispatcher>) -> Self {
        Self { dispatcher }
    }

    /// すべてのプロバイダの状態を優先順に返す（末尾は手動送信）
    ///
    /// `probe` が true のときだけ疎通確認を行い、`last_probe_ok` を埋める。
    pub async fn statuses(&self, probe: bool) -> Vec<AdapterStatus> {
        let roster = self.dispatcher.roster().await;

        let mut statuses = Vec::with_capacity(roster.slots().len() + 1);
        for slot in roster.slots() {
            statuses.push(self.status_of(slot, probe).await);
        }

        let manual = roster.manual();
        statuses.push(AdapterStatus {
            provider_id:         manual.provider_id().clone(),
            display_name:        manual.display_name().to_string(),
            kind:                ProviderKind::Manual,
            configured:          true,
            last_probe_ok:       probe.then_some(true),
            health:              AdapterHealth::Configured,
            configuration_error: None,
        });

        statuses
    }

    /// 1 つのプロバイダの状態を返す
    ///
    /// 疎通確認の結果は健全性の判定にも使う。
    pub async fn status_of(&self, slot: &ProviderSlot, probe: bool) -> AdapterStatus {
        let last_probe_ok = match slot.adapter() {
            Some(adapter) if probe => {
                let ok = adapter.probe().await;
                slot.record_outcome(ok);
                if !ok {
                    tracing::warn!(provider = %slot.id(), "送信プロバイダの疎通確認に失敗しました");
                }
                Some(ok)
            }
            _ => None,
        };

        AdapterStatus {
            provider_id: slot.id().clone(),
            display_name: slot.display_name().to_string(),
            kind: slot.kind(),
            configured: slot.is_usable(),
            last_probe_ok,
            health: AdapterHealth::derive(slot.is_usable(), slot.last_outcome()),
            configuration_error: slot.configuration_error().map(str::to_string),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use leadhub_domain::email::{EmailMessage, TransportFailure};
    use leadhub_infra::{
        email::StaticEnv,
        mock::MockProviderAdapter,
    };
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::usecase::email::dispatcher::ProviderRoster;

    fn reporter_with(adapters: Vec<Arc<dyn ProviderAdapter>>) -> (Arc<EmailDispatcher>, EmailStatusReporter) {
        let dispatcher = Arc::new(EmailDispatcher::new(
            Arc::new(StaticEnv::new()),
            ProviderRoster::from_adapters(adapters, Duration::ZERO),
        ));
        (dispatcher.clone(), EmailStatusReporter::new(dispatcher))
    }

    #[tokio::test]
    async fn test_疎通確認の指定がなければ接続しない() {
        let api = MockProviderAdapter::delivering("http-api", None);
        let (_, sut) = reporter_with(vec![Arc::new(api.clone())]);

        let statuses = sut.statuses(false).await;

        assert_eq!(api.probe_count(), 0);
        assert_eq!(statuses.len(), 2);
        assert_eq!(statuses[0].last_probe_ok, None);
        assert_eq!(statuses[0].health, AdapterHealth::Configured);
        assert_eq!(statuses[1].kind, ProviderKind::Manual);
        assert_eq!(statuses[1].last_probe_ok, None);
    }

    #[tokio::test]
    async fn test_疎通確認に失敗するとdegradedになり成功すると戻る() {
        let api = MockProviderAdapter::delivering("http-api", None).with_probe(false);
        let (dispatcher, sut) = reporter_with(vec![Arc::new(api.clone())]);

        let statuses = sut.statuses(true).await;
        assert_eq!(statuses[0].last_probe_ok, Some(false));
        assert_eq!(statuses[0].health, AdapterHealth::Degraded);

        // 送信に成功すれば Configured に戻る
        let message = EmailMessage::new(["a@b.com"], "S", "T").unwrap();
        dispatcher.dispatch(&message).await;

        let statuses = sut.statuses(false).await;
        assert_eq!(statuses[0].health, AdapterHealth::Configured);
        assert_eq!(api.probe_count(), 1);
    }

    #[tokio::test]
    async fn test_送信失敗もdegradedとして報告される() {
        let smtp = MockProviderAdapter::failing(
            "smtp",
            TransportFailure::Connection("connection refused".to_string()),
        )
        .with_kind(ProviderKind::Smtp);
        let (dispatcher, sut) = reporter_with(vec![Arc::new(smtp)]);

        let message = EmailMessage::new(["a@b.com"], "S", "T").unwrap();
        dispatcher.dispatch(&message).await;

        let statuses = sut.statuses(false).await;
        assert_eq!(statuses[0].kind, ProviderKind::Smtp);
        assert_eq!(statuses[0].health, AdapterHealth::Degraded);
    }

    #[tokio::test]
    async fn test_設定不備のプロバイダはunconfiguredで理由が添えられる() {
        let env = StaticEnv::from_pairs([("EMAIL_PROVIDER_ORDER", "smtp")]);
        let dispatcher = Arc::new(EmailDispatcher::from_env(Arc::new(env)));
        let sut = EmailStatusReporter::new(dispatcher);

        let statuses = sut.statuses(true).await;

        assert_eq!(statuses[0].provider_id.as_str(), "smtp");
        assert!(!statuses[0].configured);
        assert_eq!(statuses[0].health, AdapterHealth::Unconfigured);
        assert_eq!(statuses[0].last_probe_ok, None);
        assert!(statuses[0].configuration_error.is_some());
        assert_eq!(statuses[1].last_probe_ok, Some(true));
    }
}
