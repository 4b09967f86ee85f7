//! # メール送信ディスパッチャ
//!
//! 設定された送信プロバイダを優先順に 1 回ずつ試し、最初に成功した受領証を返す。
//! すべて失敗した場合は手動送信アダプタに引き継ぐため、呼び出し側は必ず受領証を得る。
//!
//! ## 状態の持ち方
//!
//! プロバイダ一覧（[`ProviderRoster`]）は `Arc` で丸ごと差し替える。
//! 送信中のリクエストは開始時点の一覧を最後まで使い、再初期化と競合しない。

use std::{
    sync::{
        Arc,
        atomic::{AtomicU8, Ordering},
    },
    time::Duration,
};

use leadhub_domain::email::{
    EmailError,
    EmailMessage,
    ProviderId,
    ProviderKind,
    Receipt,
};
use leadhub_infra::email::{
    EmailProvidersConfig,
    EnvSource,
    ManualAdapter,
    ProviderAdapter,
    ProviderConfig,
    build_adapter,
};
use leadhub_shared::{
    event_log::{
        error::{category, kind},
        event,
    },
    log_business_event,
};
use tokio::sync::RwLock;

/// 使えるプロバイダが 1 つもなかったときの診断メッセージ
pub const NO_USABLE_PROVIDER: &str = "利用可能な送信プロバイダがありません";

/// 直近の送信・疎通確認の結果
///
/// 0: 未確定、1: 成功、2: 失敗
#[derive(Debug, Default)]
struct LastOutcome(AtomicU8);

impl LastOutcome {
    fn record(&self, ok: bool) {
        self.0.store(if ok { 1 } else { 2 }, Ordering::Relaxed);
    }

    fn get(&self) -> Option<bool> {
        match self.0.load(Ordering::Relaxed) {
            1 => Some(true),
            2 => Some(false),
            _ => None,
        }
    }
}

/// プロバイダ一覧の 1 枠
///
/// 設定不備で構築できなかったプロバイダも、状態確認のために枠としては残す。
pub struct ProviderSlot {
    id:           ProviderId,
    display_name: String,
    kind:         ProviderKind,
    adapter:      Result<Arc<dyn ProviderAdapter>, String>,
    last_outcome: LastOutcome,
}

impl ProviderSlot {
    fn from_config(config: &ProviderConfig) -> Self {
        let adapter = build_adapter(config).map_err(|e| {
            tracing::warn!(
                provider = %config.id,
                error.category = category::EXTERNAL_SERVICE,
                error.kind = kind::EMAIL_CONFIGURATION,
                "送信プロバイダを構成できません: {}",
                e
            );
            match e {
                EmailError::Configuration(msg) => msg,
                other => other.to_string(),
            }
        });

        Self {
            id: config.id.clone(),
            display_name: config.display_name.clone(),
            kind: config.settings.kind(),
            adapter,
            last_outcome: LastOutcome::default(),
        }
    }

    fn from_adapter(adapter: Arc<dyn ProviderAdapter>) -> Self {
        Self {
            id:           adapter.provider_id().clone(),
            display_name: adapter.display_name().to_string(),
            kind:         adapter.kind(),
            adapter:      Ok(adapter),
            last_outcome: LastOutcome::default(),
        }
    }

    pub fn id(&self) -> &ProviderId {
        &self.id
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn kind(&self) -> ProviderKind {
        self.kind
    }

    /// 構築済みのアダプタ（設定不備なら `None`）
    pub fn adapter(&self) -> Option<&Arc<dyn ProviderAdapter>> {
        self.adapter.as_ref().ok()
    }

    pub fn is_usable(&self) -> bool {
        self.adapter.is_ok()
    }

    pub fn configuration_error(&self) -> Option<&str> {
        self.adapter.as_ref().err().map(String::as_str)
    }

    pub fn last_outcome(&self) -> Option<bool> {
        self.last_outcome.get()
    }

    pub fn record_outcome(&self, ok: bool) {
        self.last_outcome.record(ok);
    }
}

/// 優先順に並んだプロバイダ一覧
///
/// 手動送信アダプタは常に末尾の受け皿として別に持つ。
pub struct ProviderRoster {
    slots:       Vec<ProviderSlot>,
    manual:      ManualAdapter,
    retry_delay: Duration,
}

impl ProviderRoster {
    /// 設定からアダプタを構築する
    ///
    /// 構築に失敗したプロバイダは送信対象から外れる（枠は残る）。
    pub fn from_config(config: &EmailProvidersConfig) -> Self {
        Self {
            slots:       config.providers.iter().map(ProviderSlot::from_config).collect(),
            manual:      ManualAdapter::new(),
            retry_delay: config.retry_delay,
        }
    }

    /// 構築済みのアダプタから一覧を作る
    pub fn from_adapters(adapters: Vec<Arc<dyn ProviderAdapter>>, retry_delay: Duration) -> Self {
        Self {
            slots: adapters.into_iter().map(ProviderSlot::from_adapter).collect(),
            manual: ManualAdapter::new(),
            retry_delay,
        }
    }

    pub fn slots(&self) -> &[ProviderSlot] {
        &self.slots
    }

    pub fn manual(&self) -> &ManualAdapter {
        &self.manual
    }

    pub fn retry_delay(&self) -> Duration {
        self.retry_delay
    }

    /// 先頭（最優先）のプロバイダが使えるか
    pub fn active_usable(&self) -> bool {
        self.slots.first().is_some_and(ProviderSlot::is_usable)
    }

    fn usable_slots(&self) -> impl Iterator<Item = (&ProviderSlot, &Arc<dyn ProviderAdapter>)> {
        self.slots
            .iter()
            .filter_map(|slot| slot.adapter().map(|adapter| (slot, adapter)))
    }
}

/// メール送信ディスパッチャ
pub struct EmailDispatcher {
    env:    Arc<dyn EnvSource>,
    roster: RwLock<Arc<ProviderRoster>>,
}

impl EmailDispatcher {
    /// 環境変数からプロバイダ一覧を構築する
    pub fn from_env(env: Arc<dyn EnvSource>) -> Self {
        let roster = ProviderRoster::from_config(&EmailProvidersConfig::load(env.as_ref()));
        Self::new(env, roster)
    }

    /// 一覧を指定して作成する（`reinitialize` は `env` から読み直す）
    pub fn new(env: Arc<dyn EnvSource>, roster: ProviderRoster) -> Self {
        Self {
            env,
            roster: RwLock::new(Arc::new(roster)),
        }
    }

    /// 現在のプロバイダ一覧
    pub async fn roster(&self) -> Arc<ProviderRoster> {
        self.roster.read().await.clone()
    }

    /// メールを送信する
    ///
    /// 使えるプロバイダを優先順に 1 回ずつ試す。試行の間には `retry_delay` だけ待つが、
    /// 最後の試行の後には待たない。すべて失敗した場合は、各プロバイダの失敗理由を
    /// `"{id}: {理由}"` 形式で `; ` 区切りに連結した診断付きで手動送信に引き継ぐ。
    pub async fn dispatch(&self, message: &EmailMessage) -> Receipt {
        let roster = self.roster().await;
        let mut failures: Vec<String> = Vec::new();

        for (attempt, (slot, adapter)) in roster.usable_slots().enumerate() {
            if attempt > 0 && !roster.retry_delay.is_zero() {
                tokio::time::sleep(roster.retry_delay).await;
            }

            match adapter.send(message).await {
                Ok(receipt) => {
                    slot.record_outcome(true);
                    log_business_event!(
                        event.category = event::category::EMAIL,
                        event.action = event::action::EMAIL_DELIVERED,
                        event.result = event::result::SUCCESS,
                        provider = %slot.id,
                        attempt = attempt + 1,
                        recipients = message.recipients().len(),
                        "メールを送信しました"
                    );
                    return receipt;
                }
                Err(e) => {
                    slot.record_outcome(false);
                    let reason = match e {
                        EmailError::Transport(failure) => failure.to_string(),
                        other => other.to_string(),
                    };
                    log_business_event!(
                        event.category = event::category::EMAIL,
                        event.action = event::action::EMAIL_ATTEMPT_FAILED,
                        event.result = event::result::FAILURE,
                        provider = %slot.id,
                        attempt = attempt + 1,
                        error.category = category::EXTERNAL_SERVICE,
                        error.kind = kind::EMAIL_TRANSPORT,
                        reason = %reason,
                        "送信プロバイダでの送信に失敗しました"
                    );
                    failures.push(format!("{}: {reason}", slot.id));
                }
            }
        }

        let diagnostic = if failures.is_empty() {
            NO_USABLE_PROVIDER.to_string()
        } else {
            failures.join("; ")
        };

        log_business_event!(
            event.category = event::category::EMAIL,
            event.action = event::action::EMAIL_DEFERRED_MANUAL,
            event.result = event::result::FAILURE,
            attempts = failures.len(),
            diagnostic = %diagnostic,
            "すべての送信プロバイダが失敗したため手動送信に切り替えます"
        );

        roster.manual.prepare(message, Some(diagnostic))
    }

    /// 設定を読み直してプロバイダ一覧を作り直す
    ///
    /// 健全性の記録もリセットされる。最優先のプロバイダが使えるかを返す。
    pub async fn reinitialize(&self) -> bool {
        let config = EmailProvidersConfig::load(self.env.as_ref());
        let roster = Arc::new(ProviderRoster::from_config(&config));
        let active_usable = roster.active_usable();
        let usable = roster.usable_slots().count();

        *self.roster.write().await = roster;

        log_business_event!(
            event.category = event::category::EMAIL,
            event.action = event::action::EMAIL_PROVIDERS_REINITIALIZED,
            event.result = event::result::SUCCESS,
            active_usable,
            usable_providers = usable,
            "送信プロバイダを再初期化しました"
        );

        active_usable
    }
}

#[cfg(test)]
mod tests {
    use leadhub_domain::email::{DeliveryOutcome, TransportFailure, TransportPhase};
    use leadhub_infra::{email::StaticEnv, mock::MockProviderAdapter};
    use pretty_assertions::assert_eq;

    use super::*;

    fn message() -> EmailMessage {
        EmailMessage::new(["a@b.com"], "S", "T").unwrap()
    }

    fn dispatcher_with(adapters: &[&MockProviderAdapter], retry_delay: Duration) -> EmailDispatcher {
        let adapters: Vec<Arc<dyn ProviderAdapter>> = adapters
            .iter()
            .map(|a| Arc::new((*a).clone()) as Arc<dyn ProviderAdapter>)
            .collect();
        EmailDispatcher::new(
            Arc::new(StaticEnv::new()),
            ProviderRoster::from_adapters(adapters, retry_delay),
        )
    }

    fn smtp_timeout() -> TransportFailure {
        TransportFailure::Timeout {
            phase:  TransportPhase::Greeting,
            budget: Duration::from_secs(5),
        }
    }

    fn api_unauthorized() -> TransportFailure {
        TransportFailure::Remote {
            status: 401,
            body:   "validation_error: API key is invalid".to_string(),
        }
    }

    #[tokio::test]
    async fn test_最初に成功したプロバイダで打ち切る() {
        let first = MockProviderAdapter::delivering("smtp", Some("<id@leadhub>"));
        let second = MockProviderAdapter::delivering("http-api", Some("em_123"));
        let sut = dispatcher_with(&[&first, &second], Duration::ZERO);

        let receipt = sut.dispatch(&message()).await;

        assert_eq!(receipt.outcome, DeliveryOutcome::Delivered);
        assert_eq!(receipt.provider_id.as_str(), "smtp");
        assert_eq!(first.send_count(), 1);
        assert_eq!(second.send_count(), 0);
    }

    #[tokio::test]
    async fn test_失敗したプロバイダの次で成功すると外部idが返る() {
        let smtp = MockProviderAdapter::failing("smtp", smtp_timeout());
        let api = MockProviderAdapter::delivering("http-api", Some("em_123"));
        let sut = dispatcher_with(&[&smtp, &api], Duration::ZERO);

        let receipt = sut.dispatch(&message()).await;

        assert_eq!(
            receipt,
            Receipt::delivered(ProviderId::new("http-api"), Some("em_123".to_string()))
        );
        assert_eq!(smtp.send_count(), 1);
        assert_eq!(api.send_count(), 1);
    }

    #[tokio::test]
    async fn test_全プロバイダが失敗すると診断付きで手動送信になる() {
        let smtp = MockProviderAdapter::failing("smtp", smtp_timeout());
        let api = MockProviderAdapter::failing("http-api", api_unauthorized());
        let sut = dispatcher_with(&[&smtp, &api], Duration::ZERO);

        let receipt = sut.dispatch(&message()).await;

        assert_eq!(receipt.outcome, DeliveryOutcome::DeferredManual);
        assert_eq!(receipt.provider_id, ProviderId::manual());
        assert_eq!(receipt.external_message_id, None);
        let diagnostic = receipt.diagnostic.unwrap();
        assert_eq!(
            diagnostic,
            format!(
                "smtp: {}; http-api: {}",
                smtp_timeout(),
                api_unauthorized()
            )
        );
        assert!(diagnostic.contains("401"));
        let manual = receipt.manual.unwrap();
        assert_eq!(manual.to, vec!["a@b.com".to_string()]);
        assert_eq!(manual.subject, "S");
        assert_eq!(manual.text_body, "T");
    }

    #[tokio::test]
    async fn test_各プロバイダは1回ずつしか試行されない() {
        let smtp = MockProviderAdapter::failing("smtp", smtp_timeout());
        let alt = MockProviderAdapter::failing("smtp-alt", smtp_timeout());
        let api = MockProviderAdapter::failing("http-api", api_unauthorized());
        let sut = dispatcher_with(&[&smtp, &alt, &api], Duration::ZERO);

        sut.dispatch(&message()).await;

        assert_eq!(
            (smtp.send_count(), alt.send_count(), api.send_count()),
            (1, 1, 1)
        );
    }

    #[tokio::test]
    async fn test_プロバイダには元のメッセージがそのまま渡る() {
        let smtp = MockProviderAdapter::failing("smtp", smtp_timeout());
        let api = MockProviderAdapter::delivering("http-api", None);
        let sut = dispatcher_with(&[&smtp, &api], Duration::ZERO);
        let message = message().with_html("<p>T</p>").with_sender("admin@leadhub.example.com");

        sut.dispatch(&message).await;

        assert_eq!(smtp.sent_messages(), vec![message.clone()]);
        assert_eq!(api.sent_messages(), vec![message]);
    }

    #[tokio::test]
    async fn test_プロバイダが1つもなければ即座に手動送信になる() {
        let sut = dispatcher_with(&[], Duration::from_secs(60));

        let receipt = sut.dispatch(&message()).await;

        assert_eq!(receipt.outcome, DeliveryOutcome::DeferredManual);
        assert_eq!(receipt.diagnostic.as_deref(), Some(NO_USABLE_PROVIDER));
    }

    #[tokio::test]
    async fn test_設定不備のプロバイダは送信対象から外れる() {
        let env = StaticEnv::from_pairs([("EMAIL_PROVIDER_ORDER", "smtp,http-api")]);
        let sut = EmailDispatcher::from_env(Arc::new(env));

        let receipt = sut.dispatch(&message()).await;

        let roster = sut.roster().await;
        assert_eq!(roster.slots().len(), 2);
        assert!(roster.slots().iter().all(|slot| !slot.is_usable()));
        assert!(!roster.active_usable());
        assert_eq!(receipt.provider_id, ProviderId::manual());
        assert_eq!(receipt.diagnostic.as_deref(), Some(NO_USABLE_PROVIDER));
    }

    #[tokio::test(start_paused = true)]
    async fn test_試行の間だけ待機し最後の試行の後には待たない() {
        let smtp = MockProviderAdapter::failing("smtp", smtp_timeout());
        let api = MockProviderAdapter::failing("http-api", api_unauthorized());
        let sut = dispatcher_with(&[&smtp, &api], Duration::from_secs(1));

        let started = tokio::time::Instant::now();
        sut.dispatch(&message()).await;

        assert_eq!(started.elapsed(), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_最初の試行が成功すれば待機しない() {
        let api = MockProviderAdapter::delivering("http-api", None);
        let sut = dispatcher_with(&[&api], Duration::from_secs(1));

        let started = tokio::time::Instant::now();
        sut.dispatch(&message()).await;

        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_送信結果がプロバイダの直近の結果として記録される() {
        let smtp = MockProviderAdapter::failing("smtp", smtp_timeout());
        let api = MockProviderAdapter::delivering("http-api", None);
        let sut = dispatcher_with(&[&smtp, &api], Duration::ZERO);

        sut.dispatch(&message()).await;

        let roster = sut.roster().await;
        let outcomes: Vec<Option<bool>> =
            roster.slots().iter().map(ProviderSlot::last_outcome).collect();
        assert_eq!(outcomes, vec![Some(false), Some(true)]);
    }

    #[tokio::test]
    async fn test_再初期化で設定の変更が反映される() {
        let env = Arc::new(StaticEnv::from_pairs([
            ("EMAIL_PROVIDER_ORDER", "http-api"),
            ("EMAIL_DEFAULT_FROM", "noreply@leadhub.example.com"),
        ]));
        let sut = EmailDispatcher::from_env(env.clone());
        assert!(!sut.roster().await.active_usable());

        env.set("EMAIL_API_KEY", "re_live_key");
        let active_usable = sut.reinitialize().await;

        assert!(active_usable);
        let roster = sut.roster().await;
        assert!(roster.slots()[0].is_usable());
        assert_eq!(roster.slots()[0].configuration_error(), None);
    }

    #[tokio::test]
    async fn test_再初期化前に取得した一覧は差し替えの影響を受けない() {
        let env = Arc::new(StaticEnv::from_pairs([("EMAIL_PROVIDER_ORDER", "http-api")]));
        let sut = EmailDispatcher::from_env(env.clone());
        let before = sut.roster().await;

        env.set("EMAIL_PROVIDER_ORDER", "smtp,http-api");
        sut.reinitialize().await;

        assert_eq!(before.slots().len(), 1);
        assert_eq!(sut.roster().await.slots().len(), 2);
    }
}
