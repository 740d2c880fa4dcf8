use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::{declare::Quote, util::http::TransportError};

/// 騰訊財經
pub mod tencent;

/// 報價中的數值欄位
#[derive(Debug, Copy, Clone, PartialEq, Eq, strum::Display)]
pub enum QuoteField {
    /// 第 3 欄
    #[strum(serialize = "price")]
    Price,
    /// 第 4 欄
    #[strum(serialize = "previous close")]
    PreviousClose,
}

/// 取得報價失敗的原因
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("invalid security code '{0}', expected something like sz302132 or sh600745")]
    InvalidFormat(String),
    #[error("network request failed: {0}")]
    NetworkFailure(String),
    #[error("request timed out")]
    Timeout,
    #[error("server returned HTTP {0}")]
    ServerError(u16),
    #[error("server returned an empty response")]
    EmptyResponse,
    #[error("failed to parse response ({reason}): {preview}")]
    ParseFailure {
        reason: &'static str,
        /// 最多 50 個字元的原始內容
        preview: String,
    },
    #[error("invalid {field} value '{raw}'")]
    InvalidNumeric { field: QuoteField, raw: String },
    #[error("security may be suspended or the code is wrong, price: {price}, previous close: {previous_close}")]
    NonPositivePrice {
        price: Decimal,
        previous_close: Decimal,
    },
}

impl From<TransportError> for FetchError {
    fn from(why: TransportError) -> Self {
        match why {
            TransportError::Timeout => FetchError::Timeout,
            TransportError::Network(msg) => FetchError::NetworkFailure(msg),
        }
    }
}

/// 一次取價的結果
pub type FetchOutcome = Result<Quote, FetchError>;

/// 取得單一證券的即時報價
///
/// Implementations never panic and never retry; every failure comes back as
/// a classified [`FetchError`].
#[async_trait]
pub trait QuoteFetcher: Send + Sync {
    async fn fetch(&self, code: &str) -> FetchOutcome;
}
