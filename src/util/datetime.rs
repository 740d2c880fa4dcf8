use chrono::{Datelike, Local, NaiveDate, NaiveDateTime, Weekday};

/// A trait representing the weekend concept.
pub trait Weekend {
    /// Determines if a given date is a weekend.
    ///
    /// Returns `true` if the date is on a Saturday or Sunday, and `false` otherwise.
    fn is_weekend(&self) -> bool;
}

impl Weekend for NaiveDate {
    /// Treats Saturday and Sunday as weekends.
    fn is_weekend(&self) -> bool {
        matches!(self.weekday(), Weekday::Sat | Weekday::Sun)
    }
}

impl Weekend for NaiveDateTime {
    fn is_weekend(&self) -> bool {
        self.date().is_weekend()
    }
}

/// 目前的 Unix 毫秒時間戳，用來讓遠端不要回傳快取資料
pub fn timestamp_millis() -> i64 {
    Local::now().timestamp_millis()
}
