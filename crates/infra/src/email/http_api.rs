//! HTTP API 送信アダプタ
//!
//! Resend 互換のトランザクションメール API（`POST /emails`）に送信する。
//! API キーは Bearer トークンとして渡す。
//!
//! 疎通確認は `probe_path`（既定 `domains`）への GET で行う。送信専用に権限を
//! 絞ったキーはこのエンドポイントで 401 `restricted_api_key` になるが、
//! キー自体は有効なので疎通確認は成功とみなす。

use std::time::Duration;

use async_trait::async_trait;
use leadhub_domain::email::{
    EmailError,
    EmailMessage,
    ProviderId,
    ProviderKind,
    Receipt,
    TransportFailure,
    TransportPhase,
};
use serde::{Deserialize, Serialize};

use super::{ProviderAdapter, ProviderConfig, ProviderSettings, Secret, resolve_sender};

/// HTTP API 送信アダプタ
#[derive(Debug, Clone)]
pub struct HttpApiAdapter {
    id:           ProviderId,
    display_name: String,
    client:       reqwest::Client,
    base_url:     String,
    api_key:      Secret,
    from_address: String,
    timeout:      Duration,
    probe_path:   String,
}

#[derive(Debug, Serialize)]
struct SendEmailRequest<'a> {
    from:     &'a str,
    to:       &'a [String],
    subject:  &'a str,
    text:     &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    html:     Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_to: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct SendEmailResponse {
    id: String,
}

/// API が返す構造化エラー
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    name:    Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl HttpApiAdapter {
    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    fn request_failure(&self, error: &reqwest::Error) -> TransportFailure {
        if error.is_timeout() {
            TransportFailure::Timeout {
                phase:  TransportPhase::Request,
                budget: self.timeout,
            }
        } else {
            TransportFailure::Connection(error.to_string())
        }
    }
}

/// 送信専用キーで送信以外の API を呼んだときのエラー名
const RESTRICTED_API_KEY: &str = "restricted_api_key";

/// エラー応答の本文を診断用の 1 行にまとめる
fn describe_error_body(raw: &str) -> String {
    match serde_json::from_str::<ApiErrorBody>(raw) {
        Ok(ApiErrorBody {
            name: Some(name),
            message: Some(message),
        }) => format!("{name}: {message}"),
        Ok(ApiErrorBody {
            message: Some(message),
            ..
        }) => message,
        _ if raw.trim().is_empty() => "（本文なし）".to_string(),
        _ => raw.trim().to_string(),
    }
}

#[async_trait]
impl ProviderAdapter for HttpApiAdapter {
    fn configure(config: &ProviderConfig) -> Result<Self, EmailError> {
        let ProviderSettings::HttpApi(settings) = &config.settings else {
            return Err(EmailError::Configuration(format!(
                "{} は HTTP API の設定ではありません",
                config.id
            )));
        };
        let missing =
            |item: &str| EmailError::Configuration(format!("{}: {item}が未設定です", config.id));

        let api_key = settings.api_key.clone().ok_or_else(|| missing("API キー"))?;
        let from_address = settings
            .from_address
            .clone()
            .ok_or_else(|| missing("送信元アドレス"))?;

        let base_url = settings.base_url.trim_end_matches('/').to_string();
        reqwest::Url::parse(&base_url).map_err(|e| {
            EmailError::Configuration(format!("{}: API の URL が不正です: {e}", config.id))
        })?;

        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| {
                EmailError::Configuration(format!(
                    "{}: HTTP クライアントを作成できません: {e}",
                    config.id
                ))
            })?;

        Ok(Self {
            id: config.id.clone(),
            display_name: config.display_name.clone(),
            client,
            base_url,
            api_key,
            from_address,
            timeout: settings.timeout,
            probe_path: settings.probe_path.trim_start_matches('/').to_string(),
        })
    }

    fn provider_id(&self) -> &ProviderId {
        &self.id
    }

    fn display_name(&self) -> &str {
        &self.display_name
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::HttpApi
    }

    #[tracing::instrument(skip_all, fields(provider = %self.id))]
    async fn send(&self, message: &EmailMessage) -> Result<Receipt, EmailError> {
        let body = SendEmailRequest {
            from:     resolve_sender(message, &self.from_address),
            to:       message.recipients(),
            subject:  message.subject(),
            text:     message.text_body(),
            html:     message.html_body(),
            reply_to: message.reply_to(),
        };

        let response = self
            .client
            .post(self.endpoint("emails"))
            .bearer_auth(self.api_key.expose())
            .json(&body)
            .send()
            .await
            .map_err(|e| self.request_failure(&e))?;

        let status = response.status();
        if !status.is_success() {
            let raw = response.text().await.unwrap_or_default();
            return Err(TransportFailure::Remote {
                status: status.as_u16(),
                body:   describe_error_body(&raw),
            }
            .into());
        }

        let accepted: SendEmailResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                self.request_failure(&e)
            } else {
                TransportFailure::Rejected(format!("応答を解釈できません: {e}"))
            }
        })?;

        tracing::info!(external_id = %accepted.id, "HTTP API でメールを送信しました");
        Ok(Receipt::delivered(self.id.clone(), Some(accepted.id)))
    }

    async fn probe(&self) -> bool {
        let result = self
            .client
            .get(self.endpoint(&self.probe_path))
            .bearer_auth(self.api_key.expose())
            .send()
            .await;
        match result {
            Ok(response) if response.status().is_success() => true,
            Ok(response) if response.status() == reqwest::StatusCode::UNAUTHORIZED => {
                let raw = response.text().await.unwrap_or_default();
                let restricted = serde_json::from_str::<ApiErrorBody>(&raw)
                    .is_ok_and(|body| body.name.as_deref() == Some(RESTRICTED_API_KEY));
                if !restricted {
                    tracing::debug!(provider = %self.id, body = %raw, "HTTP API の認証に失敗しました");
                }
                restricted
            }
            Ok(_) => false,
            Err(e) => {
                tracing::debug!(provider = %self.id, error = %e, "HTTP API の疎通確認に失敗しました");
                false
            }
        }
    }
}
