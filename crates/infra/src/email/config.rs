//! # 送信プロバイダの設定
//!
//! 環境変数からプロバイダごとの設定を読み込む。
//!
//! 読み込み自体は失敗しない。値が欠けていても設定オブジェクトは作られ、
//! 必須項目の検証はアダプタの構築時（`ProviderAdapter::configure`）に行う。
//! これにより、認証情報が未設定のプロバイダも状態一覧に「未設定」として表示できる。
//!
//! | 変数 | 既定値 | 用途 |
//! |------|--------|------|
//! | `SMTP_HOST` / `SMTP_PORT` / `SMTP_TLS` | - / 587 / starttls | プライマリ SMTP |
//! | `SMTP_USER` / `SMTP_PASS` / `SMTP_FROM` | - | プライマリ SMTP の認証と送信元 |
//! | `SMTP_TIMEOUT_PROFILE` | standard | fast / standard / patient |
//! | `SMTP_ALT_*` | 465 / implicit / patient | 代替 SMTP（同じ変数名に `ALT_` を付与） |
//! | `EMAIL_API_KEY` / `EMAIL_API_BASE_URL` | - / `https://api.resend.com` | HTTP API |
//! | `EMAIL_API_FROM` / `EMAIL_API_TIMEOUT_SECS` | - / 15 | HTTP API の送信元とタイムアウト |
//! | `EMAIL_API_PROBE_PATH` | `domains` | HTTP API の疎通確認に使うパス |
//! | `EMAIL_PROVIDER_ORDER` | `smtp,smtp-alt,http-api` | 試行順 |
//! | `EMAIL_RETRY_DELAY_MS` | 1000 | 試行間の待機 |
//! | `EMAIL_DEFAULT_FROM` | - | 個別の送信元が未設定のときに使う |

use std::{collections::HashMap, fmt, str::FromStr, sync::Mutex, time::Duration};

use leadhub_domain::email::{MANUAL_PROVIDER_ID, ProviderId, ProviderKind};

/// 環境変数の読み取り元
///
/// 再初期化のたびに読み直すため、プロセス環境を直接参照せずにこの trait を挟む。
/// テストでは [`StaticEnv`] を使う。
pub trait EnvSource: Send + Sync {
    /// 値を取得する（未設定・空文字列は `None`）
    fn get(&self, key: &str) -> Option<String>;
}

/// プロセスの環境変数
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok().filter(|value| !value.trim().is_empty())
    }
}

/// 書き換え可能なインメモリの環境変数
#[derive(Debug, Default)]
pub struct StaticEnv {
    vars: Mutex<HashMap<String, String>>,
}

impl StaticEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let vars = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self {
            vars: Mutex::new(vars),
        }
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        if let Ok(mut vars) = self.vars.lock() {
            vars.insert(key.into(), value.into());
        }
    }

    pub fn remove(&self, key: &str) {
        if let Ok(mut vars) = self.vars.lock() {
            vars.remove(key);
        }
    }
}

impl EnvSource for StaticEnv {
    fn get(&self, key: &str) -> Option<String> {
        let vars = self.vars.lock().ok()?;
        vars.get(key).filter(|value| !value.trim().is_empty()).cloned()
    }
}

/// ログに出さない秘密値
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// SMTP の TLS モード
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum SmtpTls {
    /// 平文（ローカルの開発用リレー向け）
    None,
    /// 平文で接続してから STARTTLS で昇格する（587 番）
    StartTls,
    /// 接続直後から TLS（465 番）
    Implicit,
}

/// SMTP の 3 フェーズそれぞれのタイムアウト
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SmtpTimeoutProfile {
    pub connect:  Duration,
    pub greeting: Duration,
    pub data:     Duration,
}

impl SmtpTimeoutProfile {
    pub const FAST: Self = Self {
        connect:  Duration::from_secs(5),
        greeting: Duration::from_secs(5),
        data:     Duration::from_secs(10),
    };
    pub const PATIENT: Self = Self {
        connect:  Duration::from_secs(15),
        greeting: Duration::from_secs(20),
        data:     Duration::from_secs(30),
    };
    pub const STANDARD: Self = Self {
        connect:  Duration::from_secs(10),
        greeting: Duration::from_secs(10),
        data:     Duration::from_secs(20),
    };
}

impl FromStr for SmtpTimeoutProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fast" => Ok(Self::FAST),
            "standard" => Ok(Self::STANDARD),
            "patient" => Ok(Self::PATIENT),
            other => Err(format!("未知のタイムアウトプロファイル: {other}")),
        }
    }
}

/// SMTP アダプタの設定
#[derive(Debug, Clone)]
pub struct SmtpSettings {
    pub host:         Option<String>,
    pub port:         u16,
    pub tls:          SmtpTls,
    pub username:     Option<String>,
    pub password:     Option<Secret>,
    pub from_address: Option<String>,
    pub timeouts:     SmtpTimeoutProfile,
}

/// HTTP API アダプタの設定
#[derive(Debug, Clone)]
pub struct HttpApiSettings {
    pub base_url:     String,
    pub api_key:      Option<Secret>,
    pub from_address: Option<String>,
    pub timeout:      Duration,
    /// 疎通確認で GET するパス（`base_url` からの相対）
    pub probe_path:   String,
}

/// 種別ごとの設定
#[derive(Debug, Clone)]
pub enum ProviderSettings {
    Smtp(SmtpSettings),
    HttpApi(HttpApiSettings),
    Manual,
}

impl ProviderSettings {
    pub fn kind(&self) -> ProviderKind {
        match self {
            Self::Smtp(_) => ProviderKind::Smtp,
            Self::HttpApi(_) => ProviderKind::HttpApi,
            Self::Manual => ProviderKind::Manual,
        }
    }
}

/// 1 つのプロバイダの設定
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub id:           ProviderId,
    pub display_name: String,
    pub settings:     ProviderSettings,
}

impl ProviderConfig {
    /// 手動送信アダプタの設定
    pub fn manual() -> Self {
        Self {
            id:           ProviderId::manual(),
            display_name: "手動送信".to_string(),
            settings:     ProviderSettings::Manual,
        }
    }
}

/// 送信プロバイダ全体の設定
///
/// `providers` はネットワーク送信を行うプロバイダのみを試行順に並べたもの。
/// 手動送信は常に最後に試すため、ここには含めない。
#[derive(Debug, Clone)]
pub struct EmailProvidersConfig {
    pub providers:   Vec<ProviderConfig>,
    pub retry_delay: Duration,
}

const DEFAULT_PROVIDER_ORDER: &str = "smtp,smtp-alt,http-api";
const DEFAULT_RETRY_DELAY_MS: u64 = 1000;
const DEFAULT_API_BASE_URL: &str = "https://api.resend.com";
const DEFAULT_API_TIMEOUT_SECS: u64 = 15;
const DEFAULT_API_PROBE_PATH: &str = "domains";

/// SMTP プロバイダごとの変数名の接頭辞と既定値
struct SmtpSlot {
    id:              &'static str,
    display_name:    &'static str,
    prefix:          &'static str,
    default_port:    u16,
    default_tls:     SmtpTls,
    default_profile: SmtpTimeoutProfile,
}

const PRIMARY_SMTP: SmtpSlot = SmtpSlot {
    id:              "smtp",
    display_name:    "SMTP",
    prefix:          "SMTP",
    default_port:    587,
    default_tls:     SmtpTls::StartTls,
    default_profile: SmtpTimeoutProfile::STANDARD,
};

const ALTERNATE_SMTP: SmtpSlot = SmtpSlot {
    id:              "smtp-alt",
    display_name:    "SMTP（代替）",
    prefix:          "SMTP_ALT",
    default_port:    465,
    default_tls:     SmtpTls::Implicit,
    default_profile: SmtpTimeoutProfile::PATIENT,
};

impl EmailProvidersConfig {
    /// 環境変数から読み込む
    pub fn load(env: &dyn EnvSource) -> Self {
        let default_from = env.get("EMAIL_DEFAULT_FROM");
        let order = env
            .get("EMAIL_PROVIDER_ORDER")
            .unwrap_or_else(|| DEFAULT_PROVIDER_ORDER.to_string());

        let mut providers: Vec<ProviderConfig> = Vec::new();
        for token in order.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            let config = match token {
                "smtp" => smtp_config(env, &PRIMARY_SMTP, default_from.as_deref()),
                "smtp-alt" => smtp_config(env, &ALTERNATE_SMTP, default_from.as_deref()),
                "http-api" => http_api_config(env, default_from.as_deref()),
                MANUAL_PROVIDER_ID => {
                    tracing::debug!("手動送信は常に最後に試すため、順序指定を無視します");
                    continue;
                }
                other => {
                    tracing::warn!(provider = other, "未知のプロバイダ指定を無視します");
                    continue;
                }
            };
            if providers.iter().any(|p| p.id == config.id) {
                tracing::warn!(provider = token, "重複したプロバイダ指定を無視します");
                continue;
            }
            providers.push(config);
        }

        let retry_delay = Duration::from_millis(parse_or_default(
            env,
            "EMAIL_RETRY_DELAY_MS",
            DEFAULT_RETRY_DELAY_MS,
        ));

        Self {
            providers,
            retry_delay,
        }
    }
}

fn smtp_config(env: &dyn EnvSource, slot: &SmtpSlot, default_from: Option<&str>) -> ProviderConfig {
    let key = |name: &str| format!("{}_{name}", slot.prefix);

    let settings = SmtpSettings {
        host:         env.get(&key("HOST")),
        port:         parse_or_default(env, &key("PORT"), slot.default_port),
        tls:          parse_or_default(env, &key("TLS"), slot.default_tls),
        username:     env.get(&key("USER")),
        password:     env.get(&key("PASS")).map(Secret::new),
        from_address: env.get(&key("FROM")).or_else(|| default_from.map(str::to_string)),
        timeouts:     parse_or_default(env, &key("TIMEOUT_PROFILE"), slot.default_profile),
    };

    ProviderConfig {
        id:           ProviderId::new(slot.id),
        display_name: slot.display_name.to_string(),
        settings:     ProviderSettings::Smtp(settings),
    }
}

fn http_api_config(env: &dyn EnvSource, default_from: Option<&str>) -> ProviderConfig {
    let settings = HttpApiSettings {
        base_url:     env
            .get("EMAIL_API_BASE_URL")
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string()),
        api_key:      env.get("EMAIL_API_KEY").map(Secret::new),
        from_address: env
            .get("EMAIL_API_FROM")
            .or_else(|| default_from.map(str::to_string)),
        timeout:      Duration::from_secs(parse_or_default(
            env,
            "EMAIL_API_TIMEOUT_SECS",
            DEFAULT_API_TIMEOUT_SECS,
        )),
        probe_path:   env
            .get("EMAIL_API_PROBE_PATH")
            .unwrap_or_else(|| DEFAULT_API_PROBE_PATH.to_string()),
    };

    ProviderConfig {
        id:           ProviderId::new("http-api"),
        display_name: "HTTP API".to_string(),
        settings:     ProviderSettings::HttpApi(settings),
    }
}

/// 値を解釈する。不正な値は警告を出して既定値を使う
fn parse_or_default<T>(env: &dyn EnvSource, key: &str, default: T) -> T
where
    T: FromStr,
    T::Err: fmt::Display,
{
    let Some(raw) = env.get(key) else {
        return default;
    };
    match raw.trim().parse() {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(key, value = %raw, error = %e, "環境変数の値が不正なため既定値を使います");
            default
        }
    }
}
