//! # ログ出力の初期化
//!
//! `tracing-subscriber` の組み立てを 1 か所にまとめる。
//! 本番では 1 行 1 JSON、手元では人が読む形式で出す。
//!
//! | 変数 | 既定値 |
//! |------|--------|
//! | `LOG_FORMAT` | `pretty`（`json` で JSON 出力） |
//! | `RUST_LOG` | [`DEFAULT_FILTER`] |

/// `RUST_LOG` が未設定のときのフィルタ
///
/// 送信プロバイダの試行ログ（`leadhub_*`）とリクエストのトレースは debug まで出す。
pub const DEFAULT_FILTER: &str = "info,leadhub=debug,tower_http=debug";

/// ログ出力形式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
}

impl LogFormat {
    /// 前後の空白と大文字小文字を無視して解釈する
    ///
    /// 解釈できない値は `Pretty` として扱う。subscriber の初期化前に呼ばれるため、
    /// 警告は stderr に直接書く。
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Self::Json,
            "pretty" | "" => Self::Pretty,
            other => {
                eprintln!("LOG_FORMAT={other:?} は未知の形式のため pretty で出力します");
                Self::Pretty
            }
        }
    }
}

/// ログ初期化の設定
#[derive(Debug, Clone)]
pub struct TracingConfig {
    pub service_name:   String,
    pub log_format:     LogFormat,
    pub default_filter: String,
}

impl TracingConfig {
    pub fn new(service_name: impl Into<String>, log_format: LogFormat) -> Self {
        Self {
            service_name: service_name.into(),
            log_format,
            default_filter: DEFAULT_FILTER.to_string(),
        }
    }

    /// `LOG_FORMAT` を読んで設定を作る
    pub fn from_env(service_name: impl Into<String>) -> Self {
        let log_format = std::env::var("LOG_FORMAT")
            .map(|raw| LogFormat::parse(&raw))
            .unwrap_or_default();
        Self::new(service_name, log_format)
    }
}

/// グローバル subscriber を登録する
///
/// `ErrorLayer` を積むので、`InfraError` が捕まえる `SpanTrace` には
/// 送信や DB 呼び出しのスパンが残る。
#[cfg(feature = "observability")]
pub fn init_tracing(config: TracingConfig) {
    use tracing_subscriber::{EnvFilter, Layer as _, layer::SubscriberExt, util::SubscriberInitExt};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_filter));

    let output = match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_span_list(false)
            .boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer().with_target(false).boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(output)
        .with(tracing_error::ErrorLayer::default())
        .init();

    tracing::info!(
        service = %config.service_name,
        format = ?config.log_format,
        "ログ出力を開始しました"
    );
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("json", LogFormat::Json)]
    #[case(" JSON ", LogFormat::Json)]
    #[case("pretty", LogFormat::Pretty)]
    #[case("", LogFormat::Pretty)]
    #[case("yaml", LogFormat::Pretty)]
    fn test_log_formatの解釈(#[case] raw: &str, #[case] expected: LogFormat) {
        assert_eq!(LogFormat::parse(raw), expected);
    }

    #[test]
    fn test_既定のフィルタはleadhubをdebugまで出す() {
        let config = TracingConfig::new("admin-api", LogFormat::Json);

        assert_eq!(config.service_name, "admin-api");
        assert_eq!(config.default_filter, DEFAULT_FILTER);
        assert!(config.default_filter.contains("leadhub=debug"));
    }
}
