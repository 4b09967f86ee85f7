//! # 問い合わせ返信ユースケース
//!
//! 管理者が書いた返信をテンプレートで整形し、ディスパッチャ経由で送信する。
//!
//! ## 送信結果の扱い
//!
//! - **配信済み**: 問い合わせを返信済みにし、`contact_replied` 通知を残す
//! - **手動送信待ち**: 問い合わせは未返信のまま、`manual_reply_required` 通知を残す
//!
//! 送信は済んでいるため、ステータス更新や通知の保存に失敗してもエラーにはせず
//! ログに残すだけにする。管理者には受領証をそのまま返す。

mod template_renderer;

use std::sync::Arc;

use leadhub_domain::{
    DomainError,
    clock::Clock,
    contact::{ContactId, ContactStatus},
    email::{EmailMessage, Receipt},
    notification::Notification,
};
use leadhub_infra::repository::{ContactRepository, NotificationRepository};
use leadhub_shared::{
    event_log::{
        error::{category, kind},
        event,
    },
    log_business_event,
};
pub use template_renderer::{RenderedReply, ReplyTemplateRenderer};

use crate::{error::AdminError, usecase::email::EmailDispatcher};

/// 返信の入力
#[derive(Debug, Clone)]
pub struct ReplyInput {
    pub subject:     String,
    pub message:     String,
    /// 返信を書いた管理者のアドレス（Reply-To として使う）
    pub admin_email: String,
}

/// 返信の結果
#[derive(Debug, Clone)]
pub struct ReplyOutput {
    pub receipt:        Receipt,
    /// 処理後の問い合わせステータス
    pub contact_status: ContactStatus,
}

/// 問い合わせ返信ユースケース実装
pub struct ReplyUseCaseImpl {
    contact_repo:      Arc<dyn ContactRepository>,
    notification_repo: Arc<dyn NotificationRepository>,
    dispatcher:        Arc<EmailDispatcher>,
    renderer:          ReplyTemplateRenderer,
    clock:             Arc<dyn Clock>,
}

impl ReplyUseCaseImpl {
    pub fn new(
        contact_repo: Arc<dyn ContactRepository>,
        notification_repo: Arc<dyn NotificationRepository>,
        dispatcher: Arc<EmailDispatcher>,
        renderer: ReplyTemplateRenderer,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            contact_repo,
            notification_repo,
            dispatcher,
            renderer,
            clock,
        }
    }

    /// 問い合わせに返信する
    ///
    /// # エラー
    ///
    /// - 問い合わせが存在しない: `AdminError::NotFound`
    /// - 問い合わせのアドレスが不正: `AdminError::Validation`
    /// - 問い合わせの取得に失敗: `AdminError::Database`
    pub async fn reply(
        &self,
        contact_id: &ContactId,
        input: ReplyInput,
    ) -> Result<ReplyOutput, AdminError> {
        let contact = self
            .contact_repo
            .find_by_id(contact_id)
            .await?
            .ok_or_else(|| DomainError::NotFound {
                entity_type: "Contact",
                id:          contact_id.to_string(),
            })?;

        let rendered = self.renderer.render(
            &contact,
            &input.subject,
            &input.message,
            &input.admin_email,
        )?;
        let message = EmailMessage::new([contact.email()], &input.subject, rendered.text_body)?
            .with_html(rendered.html_body)
            .with_reply_to(&input.admin_email);

        let receipt = self.dispatcher.dispatch(&message).await;
        let now = self.clock.now();

        let (notification, contact_status) = if receipt.is_delivered() {
            let notification =
                Notification::contact_replied(&contact, receipt.provider_id.as_str(), now);
            let previous_status = contact.status();
            let replied = contact.replied(&input.subject, now);
            let status = match self.contact_repo.mark_replied(&replied).await {
                Ok(()) => replied.status(),
                Err(e) => {
                    tracing::error!(
                        error.category = category::INFRASTRUCTURE,
                        error.kind = kind::DATABASE,
                        contact_id = %contact_id,
                        "返信済みへの更新に失敗しました: {}",
                        e
                    );
                    previous_status
                }
            };
            (notification, status)
        } else {
            let diagnostic = receipt.diagnostic.as_deref().unwrap_or_default();
            (
                Notification::manual_reply_required(&contact, diagnostic, now),
                contact.status(),
            )
        };

        if let Err(e) = self.notification_repo.insert(&notification).await {
            tracing::error!(
                error.category = category::INFRASTRUCTURE,
                error.kind = kind::DATABASE,
                contact_id = %contact_id,
                notification_kind = %notification.kind(),
                "通知の保存に失敗しました: {}",
                e
            );
        }

        let result = if receipt.is_delivered() {
            event::result::SUCCESS
        } else {
            event::result::FAILURE
        };
        log_business_event!(
            event.category = event::category::CONTACT,
            event.action = event::action::CONTACT_REPLIED,
            event.entity_type = event::entity_type::CONTACT,
            event.entity_id = %contact_id,
            event.result = result,
            outcome = %receipt.outcome,
            provider = %receipt.provider_id,
            "問い合わせに返信しました"
        );

        Ok(ReplyOutput {
            receipt,
            contact_status,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::{DateTime, Utc};
    use leadhub_domain::{
        clock::FixedClock,
        contact::Contact,
        email::{DeliveryOutcome, TransportFailure, TransportPhase},
        notification::NotificationKind,
    };
    use leadhub_infra::{
        email::{ProviderAdapter, StaticEnv},
        mock::{MockContactRepository, MockNotificationRepository, MockProviderAdapter},
    };
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::usecase::email::ProviderRoster;

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    struct Fixture {
        contacts:      MockContactRepository,
        notifications: MockNotificationRepository,
        contact:       Contact,
        sut:           ReplyUseCaseImpl,
    }

    fn fixture(adapters: Vec<Arc<dyn ProviderAdapter>>) -> Fixture {
        let contacts = MockContactRepository::new();
        let notifications = MockNotificationRepository::new();
        let contact = Contact::new(
            ContactId::new(),
            "山田花子",
            "hanako@example.com",
            Some("Example 株式会社".to_string()),
            "資料の詳細を教えてください",
            now() - chrono::Duration::days(1),
        )
        .unwrap();
        contacts.add_contact(contact.clone());

        let dispatcher = Arc::new(EmailDispatcher::new(
            Arc::new(StaticEnv::new()),
            ProviderRoster::from_adapters(adapters, Duration::ZERO),
        ));
        let sut = ReplyUseCaseImpl::new(
            Arc::new(contacts.clone()),
            Arc::new(notifications.clone()),
            dispatcher,
            ReplyTemplateRenderer::new().unwrap(),
            Arc::new(FixedClock::new(now())),
        );

        Fixture {
            contacts,
            notifications,
            contact,
            sut,
        }
    }

    fn input() -> ReplyInput {
        ReplyInput {
            subject:     "Re: 資料について".to_string(),
            message:     "お問い合わせありがとうございます。".to_string(),
            admin_email: "sales@leadhub.example.com".to_string(),
        }
    }

    #[tokio::test]
    async fn test_配信済みなら問い合わせを返信済みにして通知を残す() {
        let api = MockProviderAdapter::delivering("http-api", Some("em_123"));
        let f = fixture(vec![Arc::new(api.clone())]);

        let output = f.sut.reply(f.contact.id(), input()).await.unwrap();

        assert_eq!(output.receipt.outcome, DeliveryOutcome::Delivered);
        assert_eq!(output.receipt.external_message_id.as_deref(), Some("em_123"));
        assert_eq!(output.contact_status, ContactStatus::Replied);

        let stored = f.contacts.get(f.contact.id()).unwrap();
        assert!(stored.is_replied());
        assert_eq!(stored.reply_subject(), Some("Re: 資料について"));
        assert_eq!(stored.replied_at(), Some(now()));

        let notifications = f.notifications.notifications();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].kind(), NotificationKind::ContactReplied);
        assert_eq!(notifications[0].contact_id(), Some(f.contact.id()));
    }

    #[tokio::test]
    async fn test_送信メッセージは問い合わせ元宛てで返信先が管理者アドレスになる() {
        let api = MockProviderAdapter::delivering("http-api", None);
        let f = fixture(vec![Arc::new(api.clone())]);

        f.sut.reply(f.contact.id(), input()).await.unwrap();

        let sent = api.sent_messages();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].recipients(), ["hanako@example.com".to_string()]);
        assert_eq!(sent[0].subject(), "Re: 資料について");
        assert_eq!(sent[0].reply_to(), Some("sales@leadhub.example.com"));
        // 送信元は各プロバイダに設定された検証済みアドレスのまま
        assert_eq!(sent[0].sender_override(), None);
        assert!(sent[0].text_body().contains("お問い合わせありがとうございます。"));
        assert!(sent[0].html_body().is_some());
    }

    #[tokio::test]
    async fn test_全プロバイダ失敗時は未返信のまま手動送信通知を残す() {
        let smtp = MockProviderAdapter::failing(
            "smtp",
            TransportFailure::Timeout {
                phase:  TransportPhase::Connect,
                budget: Duration::from_secs(5),
            },
        );
        let f = fixture(vec![Arc::new(smtp)]);

        let output = f.sut.reply(f.contact.id(), input()).await.unwrap();

        assert_eq!(output.receipt.outcome, DeliveryOutcome::DeferredManual);
        assert!(output.receipt.manual.is_some());
        assert_eq!(output.contact_status, ContactStatus::New);
        assert!(!f.contacts.get(f.contact.id()).unwrap().is_replied());

        let notifications = f.notifications.notifications();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].kind(), NotificationKind::ManualReplyRequired);
        assert!(notifications[0].message().contains("smtp: connect"));
    }

    #[tokio::test]
    async fn test_存在しない問い合わせはnot_found() {
        let f = fixture(vec![]);

        let result = f.sut.reply(&ContactId::new(), input()).await;

        assert!(matches!(result, Err(AdminError::NotFound(msg)) if msg.starts_with("Contact")));
        assert!(f.notifications.notifications().is_empty());
    }

    #[tokio::test]
    async fn test_ステータス更新に失敗しても受領証を返す() {
        let api = MockProviderAdapter::delivering("http-api", Some("em_123"));
        let f = fixture(vec![Arc::new(api)]);
        f.contacts.fail_saves();

        let output = f.sut.reply(f.contact.id(), input()).await.unwrap();

        assert!(output.receipt.is_delivered());
        assert_eq!(output.contact_status, ContactStatus::New);
        assert_eq!(f.notifications.notifications().len(), 1);
    }
}
