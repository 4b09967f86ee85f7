//! # LeadHub ドメイン層
//!
//! 管理バックオフィスのドメインモデルを定義する。
//!
//! ## 設計方針
//!
//! - **エンティティ**: 一意の識別子を持つオブジェクト（問い合わせ、通知）
//! - **値オブジェクト**: 識別子を持たない不変オブジェクト（メールメッセージ、受領証）
//! - **ドメインエラー**: ビジネスルール違反を表現するエラー型
//!
//! ## 依存関係の方向
//!
//! ```text
//! admin-api → infra → domain
//!      ↘        ↘
//!        shared   shared
//! ```
//!
//! ドメイン層はインフラ層（DB、メール送信プロバイダ）に一切依存しない。
//!
//! ## モジュール構成
//!
//! - [`contact`] - 問い合わせ（リード）エンティティ
//! - [`email`] - メールメッセージ、送信受領証、プロバイダ状態
//! - [`notification`] - 管理者向け通知レコード
//! - [`clock`] - 時刻プロバイダ

#[macro_use]
mod macros;

pub mod clock;
pub mod contact;
pub mod email;
pub mod error;
pub mod notification;

pub use error::DomainError;
