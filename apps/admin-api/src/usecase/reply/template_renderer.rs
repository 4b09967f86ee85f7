//! # 返信テンプレートレンダラー
//!
//! tera テンプレートエンジンで返信メールを HTML/plaintext 両形式で生成する。
//!
//! ## 設計方針
//!
//! - **`include_str!` によるコンパイル時埋め込み**: テンプレートはバイナリに埋め込まれる
//! - **元の問い合わせを引用**: 受信者が何への返信か分かるよう、問い合わせ本文を末尾に添える

use leadhub_domain::contact::Contact;
use leadhub_shared::event_log::error::{category, kind};
use tera::{Context, Tera};

use crate::error::AdminError;

/// レンダリング結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedReply {
    pub text_body: String,
    pub html_body: String,
}

/// 返信テンプレートレンダラー
pub struct ReplyTemplateRenderer {
    engine: Tera,
}

impl ReplyTemplateRenderer {
    /// `include_str!` で埋め込んだテンプレートを tera に登録する
    pub fn new() -> Result<Self, AdminError> {
        let mut engine = Tera::default();

        engine
            .add_raw_templates(vec![
                ("reply.html", include_str!("../../../templates/reply.html")),
                ("reply.txt", include_str!("../../../templates/reply.txt")),
            ])
            .map_err(|e| AdminError::Internal(format!("テンプレート登録エラー: {e}")))?;

        Ok(Self { engine })
    }

    /// 問い合わせへの返信本文を生成する
    ///
    /// HTML 版は tera の自動エスケープに加え、改行を `<br>` に変換する。
    pub fn render(
        &self,
        contact: &Contact,
        subject: &str,
        reply_body: &str,
        admin_email: &str,
    ) -> Result<RenderedReply, AdminError> {
        let mut context = Context::new();
        context.insert("subject", subject);
        context.insert("contact_name", contact.name());
        context.insert("reply_body", reply_body);
        context.insert("original_message", contact.message());
        context.insert(
            "submitted_at",
            &contact.created_at().format("%Y-%m-%d").to_string(),
        );
        context.insert("admin_email", admin_email);

        let html_body = self
            .engine
            .render("reply.html", &context)
            .map_err(render_error)?;

        let text_body = self
            .engine
            .render("reply.txt", &context)
            .map_err(render_error)?;

        Ok(RenderedReply {
            text_body,
            html_body,
        })
    }
}

fn render_error(e: tera::Error) -> AdminError {
    tracing::error!(
        error.category = category::INFRASTRUCTURE,
        error.kind = kind::TEMPLATE,
        "テンプレート描画エラー: {}",
        e
    );
    AdminError::Internal(format!("テンプレート描画エラー: {e}"))
}
