//! # メール送信
//!
//! 問い合わせへの返信メールと、その送信結果を表すドメインモデルを定義する。
//!
//! ## ドメイン用語
//!
//! | 型 | ドメイン用語 |
//! |---|------------|
//! | [`EmailMessage`] | 送信するメール（1 リクエストにつき 1 通） |
//! | [`Receipt`] | 送信受領証。配信済み、または手動送信待ち |
//! | [`ManualDispatch`] | 手動送信用に整形した本文と `mailto:` リンク |
//! | [`AdapterStatus`] | 送信プロバイダの設定・疎通状態 |
//!
//! ## 設計方針
//!
//! - **受領証は必ず 1 つ**: 送信要求に対しては配信済みか手動送信待ちの
//!   どちらかの [`Receipt`] が返り、黙って捨てられることはない
//! - **送信失敗は値で表す**: [`TransportFailure`] は呼び出し側で次のプロバイダに
//!   切り替える判断材料になる

use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum::IntoStaticStr;
use thiserror::Error;

use crate::DomainError;

/// 手動送信アダプタのプロバイダ ID
pub const MANUAL_PROVIDER_ID: &str = "manual";

/// 送信プロバイダ ID
///
/// 設定上の識別子（例: `"smtp"`, `"smtp-alt"`, `"http-api"`, `"manual"`）。
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display,
)]
#[serde(transparent)]
#[display("{_0}")]
pub struct ProviderId(String);

impl ProviderId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn manual() -> Self {
        Self(MANUAL_PROVIDER_ID.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// 送信プロバイダの種別
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
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum ProviderKind {
    /// SMTP サーバーへの送信
    Smtp,
    /// HTTP ベースのトランザクションメール API
    HttpApi,
    /// ネットワークを使わず、手動送信用の内容を返す
    Manual,
}

/// 送信するメールメッセージ
///
/// 構築後は変更できない。送信プロバイダはこの値を参照するだけで、
/// 書き換えることはない。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    to:              Vec<String>,
    subject:         String,
    text_body:       String,
    html_body:       Option<String>,
    sender_override: Option<String>,
    reply_to:        Option<String>,
}

impl EmailMessage {
    /// メールメッセージを作成する
    ///
    /// # エラー
    ///
    /// 宛先が空、または `local@domain` 形式でない宛先を含む場合は
    /// `DomainError::Validation` を返す。
    pub fn new<I, S>(
        to: I,
        subject: impl Into<String>,
        text_body: impl Into<String>,
    ) -> Result<Self, DomainError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let to: Vec<String> = to.into_iter().map(|s| s.into().trim().to_string()).collect();

        if to.is_empty() {
            return Err(DomainError::Validation("宛先は必須です".to_string()));
        }
        if let Some(invalid) = to.iter().find(|addr| !looks_like_address(addr)) {
            return Err(DomainError::Validation(format!(
                "宛先の形式が不正です: {invalid}"
            )));
        }

        Ok(Self {
            to,
            subject: subject.into(),
            text_body: text_body.into(),
            html_body: None,
            sender_override: None,
            reply_to: None,
        })
    }

    /// HTML 本文を付与する
    pub fn with_html(self, html_body: impl Into<String>) -> Self {
        Self {
            html_body: Some(html_body.into()),
            ..self
        }
    }

    /// 送信元アドレスを上書きする
    pub fn with_sender(self, sender: impl Into<String>) -> Self {
        Self {
            sender_override: Some(sender.into()),
            ..self
        }
    }

    /// 返信先（Reply-To）を指定する
    pub fn with_reply_to(self, reply_to: impl Into<String>) -> Self {
        Self {
            reply_to: Some(reply_to.into()),
            ..self
        }
    }

    pub fn recipients(&self) -> &[String] {
        &self.to
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn text_body(&self) -> &str {
        &self.text_body
    }

    pub fn html_body(&self) -> Option<&str> {
        self.html_body.as_deref()
    }

    pub fn sender_override(&self) -> Option<&str> {
        self.sender_override.as_deref()
    }

    pub fn reply_to(&self) -> Option<&str> {
        self.reply_to.as_deref()
    }

    /// メールクライアントを開く `mailto:` リンクを組み立てる
    ///
    /// 宛先・件名・本文はパーセントエンコードする（空白は `%20`）。
    /// 宛先に `?` や `&` が含まれていても、クエリとして解釈されない。
    pub fn mailto_link(&self) -> String {
        let recipients: Vec<String> = self
            .to
            .iter()
            .map(|addr| urlencoding::encode(addr).replace("%40", "@"))
            .collect();
        format!(
            "mailto:{}?subject={}&body={}",
            recipients.join(","),
            urlencoding::encode(&self.subject),
            urlencoding::encode(&self.text_body),
        )
    }
}

fn looks_like_address(value: &str) -> bool {
    matches!(value.split_once('@'), Some((local, domain)) if !local.is_empty() && !domain.is_empty())
}

/// 送信結果の種別
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, IntoStaticStr, strum::Display,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum DeliveryOutcome {
    /// プロバイダが配信を受け付けた
    Delivered,
    /// 内容を用意したので、人が手動で送る必要がある
    DeferredManual,
}

/// 手動送信用に整形したメール内容
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualDispatch {
    pub to:          Vec<String>,
    pub subject:     String,
    pub text_body:   String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html_body:   Option<String>,
    pub mailto_link: String,
}

impl ManualDispatch {
    pub fn from_message(message: &EmailMessage) -> Self {
        Self {
            to:          message.recipients().to_vec(),
            subject:     message.subject().to_string(),
            text_body:   message.text_body().to_string(),
            html_body:   message.html_body().map(str::to_string),
            mailto_link: message.mailto_link(),
        }
    }
}

/// 送信受領証
///
/// 送信要求 1 件につき必ず 1 つ返る。永続化はしない。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub outcome:             DeliveryOutcome,
    pub provider_id:         ProviderId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic:          Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manual:              Option<ManualDispatch>,
}

impl Receipt {
    /// 配信済みの受領証
    pub fn delivered(provider_id: ProviderId, external_message_id: Option<String>) -> Self {
        Self {
            outcome: DeliveryOutcome::Delivered,
            provider_id,
            external_message_id,
            diagnostic: None,
            manual: None,
        }
    }

    /// 手動送信待ちの受領証
    pub fn deferred_manual(
        provider_id: ProviderId,
        message: &EmailMessage,
        diagnostic: Option<String>,
    ) -> Self {
        Self {
            outcome: DeliveryOutcome::DeferredManual,
            provider_id,
            external_message_id: None,
            diagnostic,
            manual: Some(ManualDispatch::from_message(message)),
        }
    }

    pub fn is_delivered(&self) -> bool {
        self.outcome == DeliveryOutcome::Delivered
    }
}

/// 送信フェーズ（タイムアウトの発生箇所）
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoStaticStr, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum TransportPhase {
    /// TCP 接続
    Connect,
    /// サーバーの挨拶と EHLO / STARTTLS / AUTH
    Greeting,
    /// メッセージ本体の送信
    Data,
    /// HTTP リクエスト全体
    Request,
}

/// 1 回の送信試行の失敗理由
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportFailure {
    #[error("{phase} フェーズがタイムアウトしました（{budget:?}）")]
    Timeout {
        phase:  TransportPhase,
        budget: Duration,
    },

    #[error("接続に失敗しました: {0}")]
    Connection(String),

    #[error("認証に失敗しました: {0}")]
    Authentication(String),

    #[error("サーバーに拒否されました: {0}")]
    Rejected(String),

    /// HTTP API がエラーを返した（本文は構造化エラーをそのまま保持する）
    #[error("API エラー (HTTP {status}): {body}")]
    Remote { status: u16, body: String },

    #[error("メッセージを構築できません: {0}")]
    InvalidMessage(String),
}

/// 送信プロバイダのエラー
#[derive(Debug, Error)]
pub enum EmailError {
    /// 認証情報の欠落など。オペレーターが設定を直すまで再試行しても無駄
    #[error("設定エラー: {0}")]
    Configuration(String),

    /// 1 回の送信試行の失敗。次のプロバイダで再試行できる
    #[error("送信エラー: {0}")]
    Transport(#[from] TransportFailure),
}

/// 送信プロバイダの健全性
///
/// `Unconfigured → Configured ↔ Degraded` と遷移する。
/// `Degraded` は終端状態ではなく、次の送信や疎通確認が成功すれば戻る。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AdapterHealth {
    Unconfigured,
    Configured,
    Degraded,
}

impl AdapterHealth {
    /// 設定の成否と直近の送信・疎通確認の結果から健全性を決める
    pub fn derive(configured: bool, last_outcome_ok: Option<bool>) -> Self {
        match (configured, last_outcome_ok) {
            (false, _) => Self::Unconfigured,
            (true, Some(false)) => Self::Degraded,
            (true, _) => Self::Configured,
        }
    }
}

/// 送信プロバイダの状態（運用確認用）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdapterStatus {
    pub provider_id:         ProviderId,
    pub display_name:        String,
    pub kind:                ProviderKind,
    pub configured:          bool,
    pub last_probe_ok:       Option<bool>,
    pub health:              AdapterHealth,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub configuration_error: Option<String>,
}
