//! SMTP アダプタの統合テスト
//!
//! ローカルに最小限の SMTP 応答を返すサーバーを立て、フェーズごとの
//! タイムアウトと失敗の分類を確認する。

use std::{net::SocketAddr, time::Duration};

use leadhub_domain::email::{
    DeliveryOutcome,
    EmailError,
    EmailMessage,
    ProviderId,
    TransportFailure,
    TransportPhase,
};
use leadhub_infra::email::{
    ProviderAdapter,
    ProviderConfig,
    ProviderSettings,
    Secret,
    SmtpAdapter,
    SmtpSettings,
    SmtpTimeoutProfile,
    SmtpTls,
};
use pretty_assertions::assert_eq;
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
    task::JoinHandle,
};

const TEST_TIMEOUTS: SmtpTimeoutProfile = SmtpTimeoutProfile {
    connect:  Duration::from_millis(500),
    greeting: Duration::from_millis(300),
    data:     Duration::from_secs(2),
};

fn adapter(addr: SocketAddr) -> SmtpAdapter {
    adapter_with_timeouts(addr, TEST_TIMEOUTS)
}

fn adapter_with_timeouts(addr: SocketAddr, timeouts: SmtpTimeoutProfile) -> SmtpAdapter {
    SmtpAdapter::configure(&ProviderConfig {
        id:           ProviderId::new("smtp"),
        display_name: "SMTP".to_string(),
        settings:     ProviderSettings::Smtp(SmtpSettings {
            host:         Some(addr.ip().to_string()),
            port:         addr.port(),
            tls:          SmtpTls::None,
            username:     Some("user".to_string()),
            password:     Some(Secret::new("pass")),
            from_address: Some("noreply@leadhub.example.com".to_string()),
            timeouts,
        }),
    })
    .unwrap()
}

fn message() -> EmailMessage {
    EmailMessage::new(["hanako@example.com"], "Re: inquiry", "Thanks for reaching out").unwrap()
}

/// テスト用 SMTP サーバーの振る舞い
#[derive(Debug, Clone, Copy)]
struct Script {
    /// 接続からバナー送信までの待ち時間
    banner_delay:  Duration,
    auth_ok:       bool,
    /// `MAIL FROM` に応答せず黙り込む
    stall_on_mail: bool,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            banner_delay:  Duration::ZERO,
            auth_ok:       true,
            stall_on_mail: false,
        }
    }
}

/// 1 接続だけ受け付け、スクリプト通りに応答する SMTP サーバー
///
/// 受け取ったコマンド行を返す。
async fn spawn_smtp_server(auth_ok: bool) -> (SocketAddr, JoinHandle<Vec<String>>) {
    spawn_scripted_server(Script {
        auth_ok,
        ..Script::default()
    })
    .await
}

async fn spawn_scripted_server(script: Script) -> (SocketAddr, JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        serve_smtp(stream, script).await
    });

    (addr, handle)
}

async fn serve_smtp(stream: TcpStream, script: Script) -> Vec<String> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();
    let mut commands = Vec::new();
    let mut in_data = false;

    tokio::time::sleep(script.banner_delay).await;
    if writer
        .write_all(b"220 fake.local ESMTP ready\r\n")
        .await
        .is_err()
    {
        return commands;
    }

    while let Ok(Some(line)) = lines.next_line().await {
        if in_data {
            if line == "." {
                in_data = false;
                writer.write_all(b"250 2.0.0 queued\r\n").await.unwrap();
            }
            continue;
        }

        let upper = line.to_ascii_uppercase();
        commands.push(line);

        let reply: &[u8] = if upper.starts_with("EHLO") {
            b"250-fake.local\r\n250-AUTH PLAIN LOGIN\r\n250 8BITMIME\r\n"
        } else if upper.starts_with("AUTH") {
            if script.auth_ok {
                b"235 2.7.0 Authentication successful\r\n"
            } else {
                b"535 5.7.8 Authentication credentials invalid\r\n"
            }
        } else if upper.starts_with("MAIL") && script.stall_on_mail {
            tokio::time::sleep(Duration::from_secs(10)).await;
            break;
        } else if upper.starts_with("DATA") {
            in_data = true;
            b"354 End data with <CR><LF>.<CR><LF>\r\n"
        } else if upper.starts_with("QUIT") {
            writer.write_all(b"221 2.0.0 Bye\r\n").await.unwrap();
            break;
        } else {
            b"250 2.1.0 OK\r\n"
        };
        writer.write_all(reply).await.unwrap();
    }

    commands
}

#[tokio::test]
async fn test_送信に成功するとmessage_idを外部idとして返す() {
    let (addr, server) = spawn_smtp_server(true).await;

    let receipt = adapter(addr).send(&message()).await.unwrap();
    let commands = server.await.unwrap();

    assert_eq!(receipt.outcome, DeliveryOutcome::Delivered);
    assert_eq!(receipt.provider_id, ProviderId::new("smtp"));
    let message_id = receipt.external_message_id.unwrap();
    assert!(message_id.ends_with("@leadhub.example.com>"));

    assert!(commands.iter().any(|c| c.starts_with("AUTH PLAIN")));
    assert!(
        commands
            .iter()
            .any(|c| c.starts_with("MAIL FROM:<noreply@leadhub.example.com>"))
    );
    assert!(
        commands
            .iter()
            .any(|c| c.starts_with("RCPT TO:<hanako@example.com>"))
    );
}

#[tokio::test]
async fn test_認証が拒否されると認証失敗になる() {
    let (addr, _server) = spawn_smtp_server(false).await;

    let result = adapter(addr).send(&message()).await;

    assert!(matches!(
        result,
        Err(EmailError::Transport(TransportFailure::Authentication(_)))
    ));
}

#[tokio::test]
async fn test_挨拶が来なければ挨拶フェーズのタイムアウトになる() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    // 接続は受け付けるがバナーを送らない
    let _server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
        drop(stream);
    });

    let started = std::time::Instant::now();
    let result = adapter(addr).send(&message()).await;

    assert!(matches!(
        result,
        Err(EmailError::Transport(TransportFailure::Timeout {
            phase: TransportPhase::Greeting,
            ..
        }))
    ));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_疎通確認は閉じたポートに対して失敗する() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    assert!(!adapter(addr).probe().await);
}

#[tokio::test]
async fn test_疎通確認は認証まで成功すればtrue() {
    let (addr, server) = spawn_smtp_server(true).await;

    assert!(adapter(addr).probe().await);
    let commands = server.await.unwrap();

    assert!(!commands.iter().any(|c| c.starts_with("MAIL FROM")));
}

#[tokio::test]
async fn test_挨拶の予算は接続の残り時間を持ち越さない() {
    // 接続は即座に確立し、バナーは挨拶の予算を過ぎてから届く
    // （接続と挨拶の合計予算には収まる）
    let (addr, _server) = spawn_scripted_server(Script {
        banner_delay: Duration::from_millis(600),
        ..Script::default()
    })
    .await;

    let started = std::time::Instant::now();
    let result = adapter(addr).send(&message()).await;
    let elapsed = started.elapsed();

    assert!(matches!(
        result,
        Err(EmailError::Transport(TransportFailure::Timeout {
            phase: TransportPhase::Greeting,
            budget,
        })) if budget == TEST_TIMEOUTS.greeting
    ));
    assert!(elapsed < Duration::from_millis(600));
}

#[tokio::test]
async fn test_バナーが挨拶の予算を過ぎて届くと疎通確認は失敗する() {
    let (addr, _server) = spawn_scripted_server(Script {
        banner_delay: Duration::from_millis(600),
        ..Script::default()
    })
    .await;

    assert!(!adapter(addr).probe().await);
}

#[tokio::test]
async fn test_本文送信中に応答が止まると本文フェーズのタイムアウトになる() {
    let (addr, _server) = spawn_scripted_server(Script {
        stall_on_mail: true,
        ..Script::default()
    })
    .await;
    let timeouts = SmtpTimeoutProfile {
        data: Duration::from_millis(400),
        ..TEST_TIMEOUTS
    };

    let started = std::time::Instant::now();
    let result = adapter_with_timeouts(addr, timeouts).send(&message()).await;
    let elapsed = started.elapsed();

    assert!(matches!(
        result,
        Err(EmailError::Transport(TransportFailure::Timeout {
            phase: TransportPhase::Data,
            budget,
        })) if budget == Duration::from_millis(400)
    ));
    assert!(elapsed >= Duration::from_millis(400));
    assert!(elapsed < Duration::from_secs(2));
}
