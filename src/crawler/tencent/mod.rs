//! # 騰訊財經採集模組
//!
//! 即時報價介面 `https://qt.gtimg.cn/q=<code>`，回傳 GBK 編碼的純文字：
//!
//! ```text
//! v_sz000001="51~平安银行~000001~10.50~10.00~...";
//! ```
//!
//! 欄位以 `~` 分隔，第 3 欄為目前成交價，第 4 欄為昨收價。

use crate::{config::SETTINGS, util::http::HttpTransport};

/// 即時報價解析
pub mod quote;

/// 騰訊財經報價主機的預設域名
pub const HOST: &str = "qt.gtimg.cn";

/// 騰訊財經採集器
///
/// 傳輸層可替換，正式環境使用共用的 [`HttpTransport`]。
pub struct Tencent<T> {
    transport: T,
    host: String,
}

impl<T> Tencent<T> {
    pub fn new(transport: T, host: impl Into<String>) -> Self {
        Tencent {
            transport,
            host: host.into(),
        }
    }
}

impl Tencent<HttpTransport> {
    /// 依設定檔建立
    pub fn from_settings() -> Self {
        Self::new(HttpTransport, SETTINGS.quote.host.clone())
    }
}
