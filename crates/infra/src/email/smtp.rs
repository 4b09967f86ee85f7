//! SMTP 送信アダプタ
//!
//! lettre の `AsyncSmtpConnection` を直接操作し、接続・挨拶・本文送信の
//! 3 フェーズにそれぞれ独立したタイムアウトを掛ける。
//! `AsyncSmtpTransport` はコマンド単位のタイムアウトしか持たないため使わない。
//!
//! TCP 接続は自前で張り、確立した時点から挨拶フェーズの期限を測る。
//! 挨拶フェーズには暗黙 TLS のハンドシェイク、バナー、EHLO、STARTTLS、AUTH が含まれる。
//!
//! タイムアウトで打ち切った場合は future ごと破棄するので、ソケットも閉じる。

use std::{
    io,
    net::SocketAddr,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

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
use lettre::{
    Message,
    message::{Mailbox, MultiPart, SinglePart, header::ContentType},
    transport::smtp::{
        self,
        authentication::{Credentials, Mechanism},
        client::{AsyncSmtpConnection, AsyncTokioStream, TlsParameters},
        extension::ClientId,
    },
};
use tokio::{
    io::{AsyncRead, AsyncWrite, ReadBuf},
    net::TcpStream,
    time::{Instant, timeout, timeout_at},
};
use tokio_rustls::{
    TlsConnector,
    client::TlsStream,
    rustls::{self, ClientConfig, RootCertStore, pki_types::ServerName},
};
use uuid::Uuid;

use super::{
    ProviderAdapter,
    ProviderConfig,
    ProviderSettings,
    SmtpTimeoutProfile,
    SmtpTls,
    resolve_sender,
};

/// SMTP 送信アダプタ
pub struct SmtpAdapter {
    id:             ProviderId,
    display_name:   String,
    host:           String,
    port:           u16,
    /// STARTTLS で昇格するときの TLS 設定
    tls_parameters: Option<TlsParameters>,
    /// 接続直後に TLS を張るときのコネクタ
    implicit_tls:   Option<(TlsConnector, ServerName<'static>)>,
    credentials:    Credentials,
    from_address:   String,
    hello_name:     ClientId,
    timeouts:       SmtpTimeoutProfile,
}

/// 暗黙 TLS のストリームを lettre に渡すためのラッパー
#[derive(Debug)]
struct ImplicitTlsStream(TlsStream<TcpStream>);

impl AsyncRead for ImplicitTlsStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.0).poll_read(cx, buf)
    }
}

impl AsyncWrite for ImplicitTlsStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.0).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.0).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.0).poll_shutdown(cx)
    }
}

impl AsyncTokioStream for ImplicitTlsStream {
    fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.0.get_ref().0.peer_addr()
    }
}

/// 公開ルート証明書を信頼する TLS コネクタ
fn implicit_tls_connector() -> Result<TlsConnector, rustls::Error> {
    let roots = RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };
    let config =
        ClientConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
            .with_safe_default_protocol_versions()?
            .with_root_certificates(roots)
            .with_no_client_auth();
    Ok(TlsConnector::from(Arc::new(config)))
}

impl SmtpAdapter {
    /// 接続・挨拶・認証まで済ませたセッションを開く
    async fn open_session(&self) -> Result<AsyncSmtpConnection, TransportFailure> {
        let connect_budget = self.timeouts.connect;
        let tcp = match timeout(
            connect_budget,
            TcpStream::connect((self.host.as_str(), self.port)),
        )
        .await
        {
            Err(_) => {
                return Err(TransportFailure::Timeout {
                    phase:  TransportPhase::Connect,
                    budget: connect_budget,
                });
            }
            Ok(Err(e)) => return Err(TransportFailure::Connection(e.to_string())),
            Ok(Ok(tcp)) => tcp,
        };

        // 接続に使わなかった時間は挨拶フェーズに持ち越さない
        let greeting_deadline = Instant::now() + self.timeouts.greeting;

        let stream: Box<dyn AsyncTokioStream> = match &self.implicit_tls {
            Some((connector, server_name)) => {
                match timeout_at(greeting_deadline, connector.connect(server_name.clone(), tcp))
                    .await
                {
                    Err(_) => return Err(self.greeting_timeout()),
                    Ok(Err(e)) => {
                        return Err(TransportFailure::Connection(format!(
                            "TLS ハンドシェイクに失敗しました: {e}"
                        )));
                    }
                    Ok(Ok(tls)) => Box::new(ImplicitTlsStream(tls)),
                }
            }
            None => Box::new(tcp),
        };

        let connect = AsyncSmtpConnection::connect_with_transport(stream, &self.hello_name);
        let mut session = match timeout_at(greeting_deadline, connect).await {
            Err(_) => return Err(self.greeting_timeout()),
            Ok(Err(e)) => return Err(response_failure(&e)),
            Ok(Ok(session)) => session,
        };

        if let Some(parameters) = &self.tls_parameters {
            match timeout_at(
                greeting_deadline,
                session.starttls(parameters.clone(), &self.hello_name),
            )
            .await
            {
                Err(_) => return Err(self.greeting_timeout()),
                Ok(Err(e)) => return Err(response_failure(&e)),
                Ok(Ok(())) => {}
            }
        }

        let auth = session.auth(&[Mechanism::Plain, Mechanism::Login], &self.credentials);
        let authenticated = timeout_at(greeting_deadline, auth).await;
        match authenticated {
            Err(_) => Err(self.greeting_timeout()),
            Ok(Err(e)) => Err(TransportFailure::Authentication(e.to_string())),
            Ok(Ok(_)) => Ok(session),
        }
    }

    fn greeting_timeout(&self) -> TransportFailure {
        TransportFailure::Timeout {
            phase:  TransportPhase::Greeting,
            budget: self.timeouts.greeting,
        }
    }

    /// lettre のメッセージを組み立てる。戻り値の 2 つ目は Message-ID
    fn build_message(&self, message: &EmailMessage) -> Result<(Message, String), TransportFailure> {
        let invalid = |e: &dyn std::fmt::Display| TransportFailure::InvalidMessage(e.to_string());

        let from: Mailbox = resolve_sender(message, &self.from_address)
            .parse()
            .map_err(|e| invalid(&e))?;
        let message_id = format!("<{}@{}>", Uuid::now_v7(), from.email.domain());

        let mut builder = Message::builder()
            .from(from)
            .subject(message.subject())
            .message_id(Some(message_id.clone()));
        for recipient in message.recipients() {
            builder = builder.to(recipient.parse().map_err(|e| invalid(&e))?);
        }
        if let Some(reply_to) = message.reply_to() {
            builder = builder.reply_to(reply_to.parse().map_err(|e| invalid(&e))?);
        }

        let built = match message.html_body() {
            Some(html) => builder.multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(message.text_body().to_string()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html.to_string()),
                    ),
            ),
            None => builder
                .header(ContentType::TEXT_PLAIN)
                .body(message.text_body().to_string()),
        };

        built
            .map(|email| (email, message_id))
            .map_err(|e| invalid(&e))
    }
}

/// 応答コードの有無で拒否と接続障害を分ける
fn response_failure(error: &smtp::Error) -> TransportFailure {
    if error.is_permanent() || error.is_transient() {
        TransportFailure::Rejected(error.to_string())
    } else {
        TransportFailure::Connection(error.to_string())
    }
}

#[async_trait]
impl ProviderAdapter for SmtpAdapter {
    fn configure(config: &ProviderConfig) -> Result<Self, EmailError> {
        let ProviderSettings::Smtp(settings) = &config.settings else {
            return Err(EmailError::Configuration(format!(
                "{} は SMTP の設定ではありません",
                config.id
            )));
        };
        let missing =
            |item: &str| EmailError::Configuration(format!("{}: {item}が未設定です", config.id));

        let host = settings.host.clone().ok_or_else(|| missing("ホスト"))?;
        let username = settings.username.clone().ok_or_else(|| missing("ユーザー名"))?;
        let password = settings.password.as_ref().ok_or_else(|| missing("パスワード"))?;
        let from_address = settings
            .from_address
            .clone()
            .ok_or_else(|| missing("送信元アドレス"))?;

        let from_mailbox: Mailbox = from_address.parse().map_err(|e| {
            EmailError::Configuration(format!("{}: 送信元アドレスが不正です: {e}", config.id))
        })?;

        let tls_error = |e: &dyn std::fmt::Display| {
            EmailError::Configuration(format!("{}: TLS 設定を作成できません: {e}", config.id))
        };
        let (tls_parameters, implicit_tls) = match settings.tls {
            SmtpTls::None => (None, None),
            SmtpTls::StartTls => (
                Some(TlsParameters::new(host.clone()).map_err(|e| tls_error(&e))?),
                None,
            ),
            SmtpTls::Implicit => {
                let connector = implicit_tls_connector().map_err(|e| tls_error(&e))?;
                let server_name = ServerName::try_from(host.clone()).map_err(|e| tls_error(&e))?;
                (None, Some((connector, server_name)))
            }
        };

        Ok(Self {
            id: config.id.clone(),
            display_name: config.display_name.clone(),
            host,
            port: settings.port,
            tls_parameters,
            implicit_tls,
            credentials: Credentials::new(username, password.expose().to_string()),
            hello_name: ClientId::Domain(from_mailbox.email.domain().to_string()),
            from_address,
            timeouts: settings.timeouts,
        })
    }

    fn provider_id(&self) -> &ProviderId {
        &self.id
    }

    fn display_name(&self) -> &str {
        &self.display_name
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Smtp
    }

    #[tracing::instrument(skip_all, fields(provider = %self.id, host = %self.host, port = self.port))]
    async fn send(&self, message: &EmailMessage) -> Result<Receipt, EmailError> {
        let (email, message_id) = self.build_message(message)?;
        let mut session = self.open_session().await?;

        let data_budget = self.timeouts.data;
        let body = email.formatted();
        match timeout(data_budget, session.send(email.envelope(), &body)).await {
            Err(_) => {
                return Err(TransportFailure::Timeout {
                    phase:  TransportPhase::Data,
                    budget: data_budget,
                }
                .into());
            }
            Ok(Err(e)) => return Err(response_failure(&e).into()),
            Ok(Ok(_)) => {}
        }

        // 受け付け済みなので QUIT の失敗は配信結果に影響しない
        if let Ok(Err(e)) = timeout(self.timeouts.greeting, session.quit()).await {
            tracing::debug!(error = %e, "QUIT に失敗しました");
        }

        tracing::info!(message_id = %message_id, "SMTP でメールを送信しました");
        Ok(Receipt::delivered(self.id.clone(), Some(message_id)))
    }

    async fn probe(&self) -> bool {
        match self.open_session().await {
            Ok(mut session) => {
                let _ = timeout(self.timeouts.greeting, session.quit()).await;
                true
            }
            Err(e) => {
                tracing::debug!(provider = %self.id, error = %e, "SMTP の疎通確認に失敗しました");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::email::{Secret, SmtpSettings};

    fn config(settings: SmtpSettings) -> ProviderConfig {
        ProviderConfig {
            id:           ProviderId::new("smtp"),
            display_name: "SMTP".to_string(),
            settings:     ProviderSettings::Smtp(settings),
        }
    }

    fn complete_settings() -> SmtpSettings {
        SmtpSettings {
            host:         Some("smtp.example.com".to_string()),
            port:         587,
            tls:          SmtpTls::StartTls,
            username:     Some("user".to_string()),
            password:     Some(Secret::new("pass")),
            from_address: Some("noreply@leadhub.example.com".to_string()),
            timeouts:     SmtpTimeoutProfile::FAST,
        }
    }

    #[test]
    fn トレイトはsendとsyncを実装している() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SmtpAdapter>();
    }

    #[test]
    fn test_必要な設定が揃っていれば構築できる() {
        let adapter = SmtpAdapter::configure(&config(complete_settings())).unwrap();

        assert_eq!(adapter.kind(), ProviderKind::Smtp);
        assert_eq!(adapter.display_name(), "SMTP");
        assert!(adapter.tls_parameters.is_some());
    }

    #[test]
    fn test_暗黙tlsなら接続直後にtlsを張りstarttlsは使わない() {
        let settings = SmtpSettings {
            port: 465,
            tls: SmtpTls::Implicit,
            ..complete_settings()
        };

        let adapter = SmtpAdapter::configure(&config(settings)).unwrap();

        assert!(adapter.implicit_tls.is_some());
        assert!(adapter.tls_parameters.is_none());
    }

    #[test]
    fn test_平文ならtlsを使わない() {
        let settings = SmtpSettings {
            tls: SmtpTls::None,
            ..complete_settings()
        };

        let adapter = SmtpAdapter::configure(&config(settings)).unwrap();

        assert!(adapter.implicit_tls.is_none());
        assert!(adapter.tls_parameters.is_none());
    }

    #[test]
    fn test_返信先があればreply_toヘッダーを付ける() {
        let adapter = SmtpAdapter::configure(&config(complete_settings())).unwrap();
        let message = EmailMessage::new(["to@example.com"], "件名", "本文")
            .unwrap()
            .with_reply_to("sales@leadhub.example.com");

        let (email, _) = adapter.build_message(&message).unwrap();
        let formatted = String::from_utf8_lossy(&email.formatted()).to_string();

        assert!(formatted.contains("Reply-To: sales@leadhub.example.com"));
        assert!(formatted.contains("From: noreply@leadhub.example.com"));
    }

    #[test]
    fn test_パスワードがなければ設定エラー() {
        let settings = SmtpSettings {
            password: None,
            ..complete_settings()
        };

        let result = SmtpAdapter::configure(&config(settings));

        assert!(matches!(
            result,
            Err(EmailError::Configuration(msg)) if msg.contains("パスワード")
        ));
    }

    #[test]
    fn test_送信元アドレスが不正なら設定エラー() {
        let settings = SmtpSettings {
            from_address: Some("not an address".to_string()),
            ..complete_settings()
        };

        assert!(matches!(
            SmtpAdapter::configure(&config(settings)),
            Err(EmailError::Configuration(_))
        ));
    }

    #[test]
    fn test_html本文があればマルチパートで組み立てる() {
        let adapter = SmtpAdapter::configure(&config(complete_settings())).unwrap();
        let message = EmailMessage::new(["to@example.com"], "件名", "本文")
            .unwrap()
            .with_html("<p>本文</p>");

        let (email, message_id) = adapter.build_message(&message).unwrap();
        let formatted = String::from_utf8_lossy(&email.formatted()).to_string();

        assert!(message_id.ends_with("@leadhub.example.com>"));
        assert!(formatted.contains("multipart/alternative"));
        assert!(formatted.contains(&message_id));
    }

    #[test]
    fn test_送信元の上書きが不正なアドレスならメッセージ構築エラー() {
        let adapter = SmtpAdapter::configure(&config(complete_settings())).unwrap();
        let message = EmailMessage::new(["to@example.com"], "件名", "本文")
            .unwrap()
            .with_sender("broken sender");

        assert!(matches!(
            adapter.build_message(&message),
            Err(TransportFailure::InvalidMessage(_))
        ));
    }
}
