//! # 問い合わせ（コンタクト）
//!
//! リードマグネット経由で届いた問い合わせを表現する。
//! 管理者が返信すると `Replied` に遷移する。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::IntoStaticStr;

use crate::DomainError;

define_uuid_id! {
    /// 問い合わせ ID
    pub struct ContactId;
}

/// 問い合わせステータス
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
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ContactStatus {
    /// 未対応
    New,
    /// 返信済み
    Replied,
    /// アーカイブ済み
    Archived,
}

/// DB から復元するときの入力値
#[derive(Debug, Clone)]
pub struct ContactRecord {
    pub id:            ContactId,
    pub name:          String,
    pub email:         String,
    pub company:       Option<String>,
    pub message:       String,
    pub status:        ContactStatus,
    pub reply_subject: Option<String>,
    pub replied_at:    Option<DateTime<Utc>>,
    pub created_at:    DateTime<Utc>,
    pub updated_at:    DateTime<Utc>,
}

/// 問い合わせエンティティ
///
/// # 不変条件
///
/// - `email` は `local@domain` 形式
/// - `status` が `Replied` のとき `replied_at` は必ず存在する
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contact {
    id:            ContactId,
    name:          String,
    email:         String,
    company:       Option<String>,
    message:       String,
    status:        ContactStatus,
    reply_subject: Option<String>,
    replied_at:    Option<DateTime<Utc>>,
    created_at:    DateTime<Utc>,
    updated_at:    DateTime<Utc>,
}

impl Contact {
    /// 新規の問い合わせを作成する
    pub fn new(
        id: ContactId,
        name: impl Into<String>,
        email: impl Into<String>,
        company: Option<String>,
        message: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        let email = email.into();
        validate_email(&email)?;

        Ok(Self {
            id,
            name: name.into(),
            email,
            company,
            message: message.into(),
            status: ContactStatus::New,
            reply_subject: None,
            replied_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// DB の行から復元する（バリデーションは行わない）
    pub fn from_db(record: ContactRecord) -> Self {
        Self {
            id:            record.id,
            name:          record.name,
            email:         record.email,
            company:       record.company,
            message:       record.message,
            status:        record.status,
            reply_subject: record.reply_subject,
            replied_at:    record.replied_at,
            created_at:    record.created_at,
            updated_at:    record.updated_at,
        }
    }

    pub fn id(&self) -> &ContactId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn company(&self) -> Option<&str> {
        self.company.as_deref()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn status(&self) -> ContactStatus {
        self.status
    }

    pub fn reply_subject(&self) -> Option<&str> {
        self.reply_subject.as_deref()
    }

    pub fn replied_at(&self) -> Option<DateTime<Utc>> {
        self.replied_at
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn is_replied(&self) -> bool {
        self.status == ContactStatus::Replied
    }

    /// 返信済みに遷移した新しいインスタンスを返す
    ///
    /// 再返信の場合も件名と日時を上書きする。
    pub fn replied(self, subject: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            status: ContactStatus::Replied,
            reply_subject: Some(subject.into()),
            replied_at: Some(now),
            updated_at: now,
            ..self
        }
    }
}

fn validate_email(value: &str) -> Result<(), DomainError> {
    let Some((local, domain)) = value.split_once('@') else {
        return Err(DomainError::Validation(
            "メールアドレスの形式が不正です".to_string(),
        ));
    };
    if local.is_empty() || domain.is_empty() {
        return Err(DomainError::Validation(
            "メールアドレスの形式が不正です".to_string(),
        ));
    }
    Ok(())
}
