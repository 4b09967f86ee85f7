//! # ユースケース層
//!
//! 管理 API のビジネスロジックを実装する。
//!
//! ## 設計方針
//!
//! - **依存性注入**: リポジトリを `Arc<dyn Trait>` で外部から注入
//! - **薄いハンドラ**: ハンドラは薄く保ち、ロジックはユースケースに集約
//!
//! ## モジュール構成
//!
//! - `email`: 送信プロバイダのフォールバックと状態確認
//! - `reply`: 問い合わせへの返信

pub mod email;
pub mod reply;

pub use email::{EmailDispatcher, EmailStatusReporter};
pub use reply::{ReplyInput, ReplyOutput, ReplyUseCaseImpl};
