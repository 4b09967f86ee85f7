//! # LeadHub インフラ層
//!
//! 外部システムとの接続・通信を担当するインフラストラクチャ層。
//!
//! ## 責務
//!
//! - **データベース接続**: PostgreSQL への接続プール管理
//! - **リポジトリ実装**: 問い合わせ・通知の永続化
//! - **メール送信アダプタ**: SMTP / HTTP API / 手動送信の 3 種類
//!
//! ## 依存関係
//!
//! ```text
//! admin-api → infra → domain
//!     ↘
//!       shared
//! ```
//!
//! ## モジュール構成
//!
//! - [`db`] - PostgreSQL データベース接続管理
//! - [`email`] - メール送信プロバイダのアダプタと設定読み込み
//! - [`error`] - インフラ層エラー定義
//! - [`repository`] - リポジトリ実装

pub mod db;
pub mod email;
pub mod error;
pub mod repository;

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

pub use error::{InfraError, InfraErrorKind};
