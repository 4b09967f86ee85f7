//! # メール送信ユースケース
//!
//! - `dispatcher`: 送信プロバイダを優先順に試し、全滅時は手動送信に切り替える
//! - `status`: 送信プロバイダの設定状況と健全性の報告

pub mod dispatcher;
pub mod status;

pub use dispatcher::{EmailDispatcher, NO_USABLE_PROVIDER, ProviderRoster, ProviderSlot};
pub use status::EmailStatusReporter;
