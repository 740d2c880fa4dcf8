//! 把每次輪詢的結果轉成畫面要呈現的狀態，不涉及任何繪製

use rust_decimal::Decimal;

use crate::{
    declare::{Quote, Trend},
    scheduler::Update,
};

/// 顯示色調
#[derive(Debug, Copy, Clone, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Tone {
    /// 漲
    Up,
    /// 跌
    Down,
    /// 平盤
    Flat,
    Error,
    Unconfigured,
}

impl From<Trend> for Tone {
    fn from(trend: Trend) -> Self {
        match trend {
            Trend::Up => Tone::Up,
            Trend::Down => Tone::Down,
            Trend::Flat => Tone::Flat,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayState {
    /// 主要顯示的文字
    pub text: String,
    pub tone: Tone,
    /// 多行的補充說明
    pub tooltip: String,
}

pub fn project(update: &Update) -> DisplayState {
    match update {
        Update::Unconfigured => DisplayState {
            text: "--".to_string(),
            tone: Tone::Unconfigured,
            tooltip: "No security code configured\nrun `stock_bubble set-code <CODE>`".to_string(),
        },
        Update::Fetched {
            code,
            outcome: Ok(quote),
            session,
        } => DisplayState {
            text: format!("{:.2}", quote.price().round_dp(2)),
            tone: quote.trend().into(),
            tooltip: format!("{}\n{}", quote_lines(code, quote), session),
        },
        Update::Fetched {
            code,
            outcome: Err(why),
            session,
        } => DisplayState {
            text: "Err".to_string(),
            tone: Tone::Error,
            tooltip: format!("Code: {}\nError: {}\n{}", code, why, session),
        },
    }
}

fn quote_lines(code: &str, quote: &Quote) -> String {
    format!(
        "Code: {}\nPrice: {:.2}\nPrevious close: {:.2}\nChange: {} ({})",
        code,
        quote.price().round_dp(2),
        quote.previous_close().round_dp(2),
        signed(quote.change()),
        quote
            .change_percent()
            .map(|p| format!("{}%", signed(p)))
            .unwrap_or_else(|| "--".to_string())
    )
}

/// 正數前面補 "+"
fn signed(value: Decimal) -> String {
    let value = value.round_dp(2);
    if value > Decimal::ZERO {
        format!("+{:.2}", value)
    } else {
        format!("{:.2}", value)
    }
}
