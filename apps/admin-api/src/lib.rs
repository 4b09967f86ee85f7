//! # 管理 API ライブラリ
//!
//! リードマグネット管理画面のバックエンド。問い合わせへの返信を、
//! 複数の送信プロバイダを順に試して届ける。
//!
//! ## モジュール構成
//!
//! - `app_builder`: ルーター組み立て
//! - `handler`: HTTP ハンドラ
//! - `middleware`: 管理者認証
//! - `usecase`: 返信・メール送信のビジネスロジック

pub mod app_builder;
pub mod error;
pub mod handler;
pub mod middleware;
pub mod usecase;

pub use error::AdminError;
