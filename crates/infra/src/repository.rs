//! # リポジトリ実装
//!
//! - **データベース抽象化**: sqlx を使用し、PostgreSQL 固有の処理をカプセル化
//! - **テスタビリティ**: トレイト経由でモック可能な設計

pub mod contact_repository;
pub mod notification_repository;

pub use contact_repository::{ContactRepository, PostgresContactRepository};
pub use notification_repository::{NotificationRepository, PostgresNotificationRepository};
