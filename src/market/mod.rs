//! 交易時段判斷
//!
//! Everything here is derived from local wall-clock time only. Exchange
//! holidays are not modelled, so on a holiday the market is reported open
//! and the next-open estimate can be a day early.

use chrono::{Datelike, Duration, Local, NaiveDateTime, NaiveTime, Weekday};

use crate::{
    declare::{NextOpen, SessionState},
    util::datetime::Weekend,
};

/// 上午盤開盤
const MORNING_OPEN: NaiveTime = hm(9, 30);
/// 上午盤收盤
const MORNING_CLOSE: NaiveTime = hm(11, 30);
/// 下午盤開盤
const AFTERNOON_OPEN: NaiveTime = hm(13, 0);
/// 下午盤收盤
const AFTERNOON_CLOSE: NaiveTime = hm(15, 0);

const fn hm(hour: u32, min: u32) -> NaiveTime {
    match NaiveTime::from_hms_opt(hour, min, 0) {
        Some(t) => t,
        None => panic!("invalid session boundary"),
    }
}

/// 時間來源，測試時可替換成固定時間
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// 使用本機時區的系統時間
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalClock;

impl Clock for LocalClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// 判斷目前是否為交易時間，上下午盤的開收盤時間點都算在盤中
pub fn is_open(now: NaiveDateTime) -> bool {
    if now.is_weekend() {
        return false;
    }

    let time = now.time();

    (time >= MORNING_OPEN && time <= MORNING_CLOSE)
        || (time >= AFTERNOON_OPEN && time <= AFTERNOON_CLOSE)
}

/// 推估下次開盤時間
pub fn next_open(now: NaiveDateTime) -> NextOpen {
    let today = now.date();
    let time = now.time();
    let weekday = today.weekday();

    // 週五收盤後到週日，下次開盤都是下週一
    match weekday {
        Weekday::Fri if time > AFTERNOON_CLOSE => {
            return NextOpen::NextMonday(today + Duration::days(3));
        }
        Weekday::Sat => return NextOpen::NextMonday(today + Duration::days(2)),
        Weekday::Sun => return NextOpen::NextMonday(today + Duration::days(1)),
        _ => {}
    }

    if time < MORNING_OPEN {
        return NextOpen::TodayMorning;
    }

    if time > MORNING_CLOSE && time < AFTERNOON_OPEN {
        return NextOpen::TodayAfternoon;
    }

    if time > AFTERNOON_CLOSE {
        let tomorrow = today + Duration::days(1);
        if tomorrow.weekday() == Weekday::Sat {
            return NextOpen::NextMonday(tomorrow + Duration::days(2));
        }

        return NextOpen::Tomorrow;
    }

    NextOpen::Unknown
}

/// 取得當下的交易時段狀態
pub fn session(now: NaiveDateTime) -> SessionState {
    if is_open(now) {
        SessionState::Open
    } else {
        SessionState::Closed(next_open(now))
    }
}
