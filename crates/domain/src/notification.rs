//! # 管理者向け通知
//!
//! 管理画面のベルアイコンに表示する通知レコードを定義する。
//! 返信の送信結果（配信済み / 手動送信が必要）をここに残す。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::IntoStaticStr;

use crate::contact::{Contact, ContactId};

define_uuid_id! {
    /// 通知 ID
    pub struct NotificationId;
}

/// 通知種別
///
/// notifications テーブルの `kind` カラムに格納される値。
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    IntoStaticStr,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NotificationKind {
    /// 返信メールがプロバイダ経由で配信された
    ContactReplied,
    /// すべてのプロバイダが失敗し、手動送信が必要
    ManualReplyRequired,
}

/// DB から復元するときの入力値
#[derive(Debug, Clone)]
pub struct NotificationRecord {
    pub id:         NotificationId,
    pub kind:       NotificationKind,
    pub title:      String,
    pub message:    String,
    pub contact_id: Option<ContactId>,
    pub read:       bool,
    pub created_at: DateTime<Utc>,
}

/// 通知エンティティ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    id:         NotificationId,
    kind:       NotificationKind,
    title:      String,
    message:    String,
    contact_id: Option<ContactId>,
    read:       bool,
    created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
        contact_id: Option<ContactId>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: NotificationId::new(),
            kind,
            title: title.into(),
            message: message.into(),
            contact_id,
            read: false,
            created_at: now,
        }
    }

    /// 返信が配信されたことを知らせる通知
    pub fn contact_replied(contact: &Contact, provider_id: &str, now: DateTime<Utc>) -> Self {
        Self::new(
            NotificationKind::ContactReplied,
            format!("{} さんに返信しました", contact.name()),
            format!("{} 宛の返信を {provider_id} で送信しました", contact.email()),
            Some(contact.id().clone()),
            now,
        )
    }

    /// 手動送信が必要なことを知らせる通知
    pub fn manual_reply_required(contact: &Contact, diagnostic: &str, now: DateTime<Utc>) -> Self {
        Self::new(
            NotificationKind::ManualReplyRequired,
            format!("{} さんへの返信は手動送信が必要です", contact.name()),
            format!(
                "{} 宛の返信を自動送信できませんでした: {diagnostic}",
                contact.email()
            ),
            Some(contact.id().clone()),
            now,
        )
    }

    pub fn from_db(record: NotificationRecord) -> Self {
        Self {
            id:         record.id,
            kind:       record.kind,
            title:      record.title,
            message:    record.message,
            contact_id: record.contact_id,
            read:       record.read,
            created_at: record.created_at,
        }
    }

    pub fn id(&self) -> &NotificationId {
        &self.id
    }

    pub fn kind(&self) -> NotificationKind {
        self.kind
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn contact_id(&self) -> Option<&ContactId> {
        self.contact_id.as_ref()
    }

    pub fn is_read(&self) -> bool {
        self.read
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn contact() -> Contact {
        Contact::new(
            ContactId::new(),
            "山田花子",
            "hanako@example.com",
            None,
            "詳細を教えてください",
            now(),
        )
        .unwrap()
    }

    #[test]
    fn test_contact_repliedは問い合わせに紐づく未読通知を作る() {
        let contact = contact();
        let notification = Notification::contact_replied(&contact, "http-api", now());

        assert_eq!(notification.kind(), NotificationKind::ContactReplied);
        assert_eq!(notification.contact_id(), Some(contact.id()));
        assert!(!notification.is_read());
        assert!(notification.message().contains("http-api"));
    }

    #[test]
    fn test_manual_reply_requiredは診断メッセージを含む() {
        let notification =
            Notification::manual_reply_required(&contact(), "smtp: タイムアウト", now());

        assert_eq!(notification.kind(), NotificationKind::ManualReplyRequired);
        assert!(notification.message().contains("smtp: タイムアウト"));
    }

    #[test]
    fn test_通知種別の文字列変換() {
        assert_eq!(
            NotificationKind::ManualReplyRequired.to_string(),
            "manual_reply_required"
        );
        let kind: &str = NotificationKind::ContactReplied.into();
        assert_eq!(kind, "contact_replied");
    }
}
