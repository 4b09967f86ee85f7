//! # API レスポンスエンベロープ
//!
//! 管理 API の統一レスポンス形式 `{ "data": T }` を提供する。

use serde::{Deserialize, Serialize};

/// 管理 API の統一レスポンス型
///
/// 一覧・状態取得系のエンドポイントは `{ "data": T }` 形式でレスポンスを返す。
/// 返信 API のように呼び出し元 UI と形状を取り決めているエンドポイントは対象外。
///
/// ## 使用例
///
/// ```
/// use leadhub_shared::ApiResponse;
///
/// let response = ApiResponse::new("hello");
/// assert_eq!(response.data, "hello");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub data: T,
}

impl<T> ApiResponse<T> {
    /// 新しい `ApiResponse` を作成する
    pub fn new(data: T) -> Self {
        Self { data }
    }
}
