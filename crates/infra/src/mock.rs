//! # テスト用モック
//!
//! ユースケーステストで使用するインメモリのリポジトリと送信アダプタ。
//! `test-utils` feature を有効にすることで、他クレートからも利用可能。
//!
//! ```toml
//! [dev-dependencies]
//! leadhub-infra = { workspace = true, features = ["test-utils"] }
//! ```

use std::sync::{
    Arc,
    Mutex,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};

use async_trait::async_trait;
use leadhub_domain::{
    contact::{Contact, ContactId, ContactStatus},
    email::{EmailError, EmailMessage, ProviderId, ProviderKind, Receipt, TransportFailure},
    notification::Notification,
};

use crate::{
    email::{ProviderAdapter, ProviderConfig},
    error::InfraError,
    repository::{ContactRepository, NotificationRepository},
};

// ===== MockContactRepository =====

#[derive(Clone, Default)]
pub struct MockContactRepository {
    contacts:   Arc<Mutex<Vec<Contact>>>,
    fail_saves: Arc<AtomicBool>,
}

impl MockContactRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_contact(&self, contact: Contact) {
        self.contacts.lock().unwrap().push(contact);
    }

    pub fn get(&self, id: &ContactId) -> Option<Contact> {
        self.contacts
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.id() == id)
            .cloned()
    }

    /// 以降の `mark_replied` をエラーにする
    pub fn fail_saves(&self) {
        self.fail_saves.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl ContactRepository for MockContactRepository {
    async fn find_by_id(&self, id: &ContactId) -> Result<Option<Contact>, InfraError> {
        Ok(self.get(id))
    }

    async fn list(&self, status: Option<ContactStatus>) -> Result<Vec<Contact>, InfraError> {
        let mut contacts: Vec<Contact> = self
            .contacts
            .lock()
            .unwrap()
            .iter()
            .filter(|c| status.is_none_or(|s| c.status() == s))
            .cloned()
            .collect();
        contacts.sort_by_key(|c| std::cmp::Reverse(c.created_at()));
        Ok(contacts)
    }

    async fn mark_replied(&self, contact: &Contact) -> Result<(), InfraError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(InfraError::unexpected("モックの保存エラー"));
        }
        let mut contacts = self.contacts.lock().unwrap();
        match contacts.iter_mut().find(|c| c.id() == contact.id()) {
            Some(existing) => {
                *existing = contact.clone();
                Ok(())
            }
            None => Err(InfraError::unexpected("更新対象の問い合わせが存在しません")),
        }
    }
}

// ===== MockNotificationRepository =====

#[derive(Clone, Default)]
pub struct MockNotificationRepository {
    notifications: Arc<Mutex<Vec<Notification>>>,
}

impl MockNotificationRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.notifications.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationRepository for MockNotificationRepository {
    async fn insert(&self, notification: &Notification) -> Result<(), InfraError> {
        self.notifications.lock().unwrap().push(notification.clone());
        Ok(())
    }

    async fn list_recent(&self, limit: i64) -> Result<Vec<Notification>, InfraError> {
        let mut notifications = self.notifications();
        notifications.sort_by_key(|n| std::cmp::Reverse(n.created_at()));
        notifications.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(notifications)
    }

    async fn count_unread(&self) -> Result<i64, InfraError> {
        let unread = self.notifications().iter().filter(|n| !n.is_read()).count();
        Ok(i64::try_from(unread).unwrap_or(i64::MAX))
    }
}

// ===== MockProviderAdapter =====

/// 送信結果を固定したモックアダプタ
///
/// 送信回数と受け取ったメッセージを記録する。クローンは記録を共有する。
#[derive(Clone)]
pub struct MockProviderAdapter {
    id:       ProviderId,
    kind:     ProviderKind,
    outcome:  Result<Option<String>, TransportFailure>,
    probe_ok: bool,
    sent:     Arc<Mutex<Vec<EmailMessage>>>,
    probes:   Arc<AtomicUsize>,
}

impl MockProviderAdapter {
    /// 送信に成功するアダプタ（`external_id` は受領証の外部 ID）
    pub fn delivering(id: &str, external_id: Option<&str>) -> Self {
        Self::with_outcome(id, Ok(external_id.map(str::to_string)))
    }

    /// 送信に失敗するアダプタ
    pub fn failing(id: &str, failure: TransportFailure) -> Self {
        Self::with_outcome(id, Err(failure))
    }

    fn with_outcome(id: &str, outcome: Result<Option<String>, TransportFailure>) -> Self {
        let probe_ok = outcome.is_ok();
        Self {
            id: ProviderId::new(id),
            kind: ProviderKind::HttpApi,
            outcome,
            probe_ok,
            sent: Arc::new(Mutex::new(Vec::new())),
            probes: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_kind(self, kind: ProviderKind) -> Self {
        Self { kind, ..self }
    }

    pub fn with_probe(self, probe_ok: bool) -> Self {
        Self { probe_ok, ..self }
    }

    pub fn send_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn sent_messages(&self) -> Vec<EmailMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderAdapter for MockProviderAdapter {
    fn configure(config: &ProviderConfig) -> Result<Self, EmailError> {
        Ok(Self::delivering(config.id.as_str(), None).with_kind(config.settings.kind()))
    }

    fn provider_id(&self) -> &ProviderId {
        &self.id
    }

    fn display_name(&self) -> &str {
        self.id.as_str()
    }

    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn send(&self, message: &EmailMessage) -> Result<Receipt, EmailError> {
        self.sent.lock().unwrap().push(message.clone());
        match &self.outcome {
            Ok(external_id) => Ok(Receipt::delivered(self.id.clone(), external_id.clone())),
            Err(failure) => Err(failure.clone().into()),
        }
    }

    async fn probe(&self) -> bool {
        self.probes.fetch_add(1, Ordering::SeqCst);
        self.probe_ok
    }
}
