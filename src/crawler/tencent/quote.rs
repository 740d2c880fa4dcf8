use async_trait::async_trait;
use concat_string::concat_string;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::{
    crawler::{tencent::Tencent, FetchError, FetchOutcome, QuoteField, QuoteFetcher},
    declare::{Quote, SecurityCode},
    util::{
        datetime,
        http::{RawResponse, Transport},
        text,
    },
};

/// 取出第一段雙引號內的內容
static PAYLOAD_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""([^"]*)""#).expect("payload pattern"));

/// 錯誤訊息中原始內容的最大長度
const PREVIEW_CHARS: usize = 50;

/// 至少要有到昨收價(第 4 欄)的欄位
const MIN_FIELDS: usize = 5;
const PRICE_INDEX: usize = 3;
const PREVIOUS_CLOSE_INDEX: usize = 4;

#[async_trait]
impl<T: Transport> QuoteFetcher for Tencent<T> {
    async fn fetch(&self, code: &str) -> FetchOutcome {
        let code = code.parse::<SecurityCode>()?;
        let url = concat_string!(
            "https://",
            self.host,
            "/q=",
            code.as_str(),
            "&_t=",
            datetime::timestamp_millis().to_string()
        );

        let response = self.transport.get(&url).await?;
        let text = decode(response)?;

        parse(&text)
    }
}

/// 檢查狀態碼後以 GBK 解碼，遠端不理會 Accept-Charset 一律回 GBK
fn decode(response: RawResponse) -> Result<String, FetchError> {
    if !response.is_success() {
        return Err(FetchError::ServerError(response.status));
    }

    if response.body.is_empty() {
        return Err(FetchError::EmptyResponse);
    }

    Ok(text::gbk_2_utf8(&response.body))
}

/// 解析 `v_<code>="f0~f1~...";` 格式的報價
pub fn parse(text: &str) -> FetchOutcome {
    let payload = PAYLOAD_PATTERN
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .ok_or_else(|| FetchError::ParseFailure {
            reason: "no quoted payload",
            preview: text::preview(text, PREVIEW_CHARS),
        })?;

    let fields: Vec<&str> = payload.split('~').collect();
    if fields.len() < MIN_FIELDS {
        return Err(FetchError::ParseFailure {
            reason: "too few fields, the code may not exist",
            preview: text::preview(payload, PREVIEW_CHARS),
        });
    }

    let price = parse_field(fields[PRICE_INDEX], QuoteField::Price)?;
    let previous_close = parse_field(fields[PREVIOUS_CLOSE_INDEX], QuoteField::PreviousClose)?;

    Quote::new(price, previous_close).ok_or(FetchError::NonPositivePrice {
        price,
        previous_close,
    })
}

fn parse_field(raw: &str, field: QuoteField) -> Result<rust_decimal::Decimal, FetchError> {
    text::parse_decimal(raw).map_err(|_| FetchError::InvalidNumeric {
        field,
        raw: raw.to_string(),
    })
}
