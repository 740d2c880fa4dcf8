use std::{fmt, str::FromStr};

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;

use crate::crawler::FetchError;

/// 市場別前綴 + 六碼，例︰sz000001、SH600745
static SECURITY_CODE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(sz|sh)\d{6}$").expect("security code pattern"));

/// 證券代碼
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SecurityCode(String);

impl SecurityCode {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 只檢查格式，不保證交易所真的有這檔股票
    pub fn is_valid(code: &str) -> bool {
        SECURITY_CODE_PATTERN.is_match(code)
    }
}

impl FromStr for SecurityCode {
    type Err = FetchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || !Self::is_valid(s) {
            return Err(FetchError::InvalidFormat(s.to_string()));
        }

        Ok(SecurityCode(s.to_string()))
    }
}

impl fmt::Display for SecurityCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 即時報價
///
/// Only built through [`Quote::new`], so both prices are always strictly positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quote {
    price: Decimal,
    previous_close: Decimal,
}

impl Quote {
    /// Returns `None` unless both values are greater than zero.
    pub fn new(price: Decimal, previous_close: Decimal) -> Option<Self> {
        if price <= Decimal::ZERO || previous_close <= Decimal::ZERO {
            return None;
        }

        Some(Quote {
            price,
            previous_close,
        })
    }

    /// 目前成交價
    pub fn price(&self) -> Decimal {
        self.price
    }

    /// 昨收價
    pub fn previous_close(&self) -> Decimal {
        self.previous_close
    }

    /// 漲跌
    pub fn change(&self) -> Decimal {
        self.price - self.previous_close
    }

    /// 漲跌幅(%)，四捨五入至小數第二位
    ///
    /// Returns `None` when the ratio overflows `Decimal`, e.g. for an absurd
    /// price against a tiny previous close.
    pub fn change_percent(&self) -> Option<Decimal> {
        self.change()
            .checked_div(self.previous_close)?
            .checked_mul(dec!(100))
            .map(|p| p.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
    }

    pub fn trend(&self) -> Trend {
        match self.price.cmp(&self.previous_close) {
            std::cmp::Ordering::Greater => Trend::Up,
            std::cmp::Ordering::Less => Trend::Down,
            std::cmp::Ordering::Equal => Trend::Flat,
        }
    }
}

/// 相對昨收的走勢
#[derive(Debug, Copy, Clone, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
    Flat,
}

/// 下次開盤的粗略描述，僅供顯示
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum NextOpen {
    /// 今天 09:30
    TodayMorning,
    /// 今天 13:00
    TodayAfternoon,
    /// 明天 09:30
    Tomorrow,
    /// 下週一 09:30
    NextMonday(NaiveDate),
    Unknown,
}

impl fmt::Display for NextOpen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NextOpen::TodayMorning => f.write_str("today 09:30"),
            NextOpen::TodayAfternoon => f.write_str("today 13:00"),
            NextOpen::Tomorrow => f.write_str("tomorrow 09:30"),
            NextOpen::NextMonday(date) => write!(f, "next Monday 09:30 ({})", date.format("%m-%d")),
            NextOpen::Unknown => f.write_str("unknown"),
        }
    }
}

/// 交易時段狀態
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SessionState {
    Open,
    Closed(NextOpen),
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Open => f.write_str("market open"),
            SessionState::Closed(next) => write!(f, "market closed, next open: {}", next),
        }
    }
}
