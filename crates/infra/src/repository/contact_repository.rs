//! # ContactRepository
//!
//! 問い合わせの取得と、返信済みへの更新を担当するリポジトリ。
//! 問い合わせの作成はリードマグネット側のフォームが行うため、ここでは扱わない。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use leadhub_domain::contact::{Contact, ContactId, ContactRecord, ContactStatus};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::InfraError;

/// 問い合わせリポジトリトレイト
#[async_trait]
pub trait ContactRepository: Send + Sync {
    /// ID で問い合わせを検索する
    ///
    /// - `Ok(Some(contact))`: 見つかった場合
    /// - `Ok(None)`: 見つからない場合
    async fn find_by_id(&self, id: &ContactId) -> Result<Option<Contact>, InfraError>;

    /// 問い合わせ一覧を新しい順に取得する（`status` 指定時はそのステータスのみ）
    async fn list(&self, status: Option<ContactStatus>) -> Result<Vec<Contact>, InfraError>;

    /// 返信状態（ステータス・返信件名・返信日時）を保存する
    async fn mark_replied(&self, contact: &Contact) -> Result<(), InfraError>;
}

/// PostgreSQL 実装の ContactRepository
#[derive(Debug, Clone)]
pub struct PostgresContactRepository {
    pool: PgPool,
}

impl PostgresContactRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ContactRow {
    id:            Uuid,
    name:          String,
    email:         String,
    company:       Option<String>,
    message:       String,
    status:        String,
    reply_subject: Option<String>,
    replied_at:    Option<DateTime<Utc>>,
    created_at:    DateTime<Utc>,
    updated_at:    DateTime<Utc>,
}

impl TryFrom<ContactRow> for Contact {
    type Error = InfraError;

    fn try_from(row: ContactRow) -> Result<Self, Self::Error> {
        let status: ContactStatus = row.status.parse().map_err(|_| {
            InfraError::invalid_data(format!("contacts.status: {}", row.status))
        })?;

        Ok(Contact::from_db(ContactRecord {
            id: ContactId::from_uuid(row.id),
            name: row.name,
            email: row.email,
            company: row.company,
            message: row.message,
            status,
            reply_subject: row.reply_subject,
            replied_at: row.replied_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }))
    }
}

#[async_trait]
impl ContactRepository for PostgresContactRepository {
    #[tracing::instrument(skip_all, level = "debug", fields(%id))]
    async fn find_by_id(&self, id: &ContactId) -> Result<Option<Contact>, InfraError> {
        let row = sqlx::query_as::<_, ContactRow>(
            r#"
            SELECT id, name, email, company, message, status,
                   reply_subject, replied_at, created_at, updated_at
            FROM contacts
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Contact::try_from).transpose()
    }

    #[tracing::instrument(skip_all, level = "debug")]
    async fn list(&self, status: Option<ContactStatus>) -> Result<Vec<Contact>, InfraError> {
        let status: Option<&str> = status.map(Into::into);
        let rows = sqlx::query_as::<_, ContactRow>(
            r#"
            SELECT id, name, email, company, message, status,
                   reply_subject, replied_at, created_at, updated_at
            FROM contacts
            WHERE $1::VARCHAR IS NULL OR status = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(status)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Contact::try_from).collect()
    }

    #[tracing::instrument(skip_all, level = "debug", fields(id = %contact.id()))]
    async fn mark_replied(&self, contact: &Contact) -> Result<(), InfraError> {
        let status: &str = contact.status().into();
        let result = sqlx::query(
            r#"
            UPDATE contacts
            SET status = $2, reply_subject = $3, replied_at = $4, updated_at = $5
            WHERE id = $1
            "#,
        )
        .bind(contact.id().as_uuid())
        .bind(status)
        .bind(contact.reply_subject())
        .bind(contact.replied_at())
        .bind(contact.updated_at())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(InfraError::unexpected(format!(
                "更新対象の問い合わせが存在しません: {}",
                contact.id()
            )));
        }
        Ok(())
    }
}
