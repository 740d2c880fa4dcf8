//! 依交易時段切換輪詢頻率的排程
//!
//! One event loop owns all scheduling state. It waits on the single active
//! interval, the command channel and the fetch that is in flight, so a slow
//! fetch never blocks ticks or refresh requests from being received.

use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
    time::Duration,
};

use tokio::{
    sync::{mpsc, watch},
    task::{JoinHandle, JoinSet},
    time::{self, Instant, Interval, MissedTickBehavior},
};

use crate::{
    config::SETTINGS,
    crawler::{FetchOutcome, QuoteFetcher},
    declare::SessionState,
    logging::{self, error_log::ErrorSink},
    market::{self, Clock},
};

/// 排程模式
#[derive(Debug, Copy, Clone, PartialEq, Eq, strum::Display)]
pub enum Mode {
    /// 盤中，快速輪詢
    ActiveSession,
    /// 休市，慢速檢查是否開盤
    WaitingForOpen,
}

impl Mode {
    fn observe(open: bool) -> Self {
        if open {
            Mode::ActiveSession
        } else {
            Mode::WaitingForOpen
        }
    }
}

/// 兩種模式各自的輪詢間隔
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Cadence {
    pub active: Duration,
    pub waiting: Duration,
}

impl Cadence {
    pub fn from_settings() -> Self {
        // 間隔為 0 時 tokio interval 會 panic
        Cadence {
            active: Duration::from_secs(SETTINGS.schedule.active_interval_secs.max(1)),
            waiting: Duration::from_secs(SETTINGS.schedule.waiting_interval_secs.max(1)),
        }
    }

    pub fn period(&self, mode: Mode) -> Duration {
        match mode {
            Mode::ActiveSession => self.active,
            Mode::WaitingForOpen => self.waiting,
        }
    }
}

impl Default for Cadence {
    fn default() -> Self {
        Cadence {
            active: Duration::from_secs(60),
            waiting: Duration::from_secs(5 * 60),
        }
    }
}

/// 交給畫面層的通知
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Update {
    /// 尚未設定代碼，不會抓取報價
    Unconfigured,
    Fetched {
        code: String,
        outcome: FetchOutcome,
        session: SessionState,
    },
}

/// 接收每次輪詢結果的對象
pub trait Observer: Send + Sync {
    fn publish(&self, update: Update);
}

impl<F> Observer for F
where
    F: Fn(Update) + Send + Sync,
{
    fn publish(&self, update: Update) {
        self(update)
    }
}

/// 目前的排程狀態，未設定代碼時兩者皆為 None
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct Status {
    pub mode: Option<Mode>,
    pub period: Option<Duration>,
}

#[derive(Debug)]
enum Command {
    Refresh,
    Configure(Option<String>),
    Shutdown,
}

#[derive(Debug, Copy, Clone, strum::Display)]
#[strum(serialize_all = "snake_case")]
enum Trigger {
    DemandRefresh,
    Tick,
}

/// 一輪事件迴圈等到的事件
enum Event {
    Tick,
    Command(Option<Command>),
    Fetched(Result<(String, FetchOutcome), tokio::task::JoinError>),
}

pub struct PollingScheduler {
    clock: Arc<dyn Clock>,
    fetcher: Arc<dyn QuoteFetcher>,
    observer: Arc<dyn Observer>,
    error_sink: Arc<dyn ErrorSink>,
    cadence: Cadence,
    code: Option<String>,
    mode: Option<Mode>,
    schedule: Option<Interval>,
    /// 最多只有一個進行中的請求
    fetches: JoinSet<(String, FetchOutcome)>,
    /// 請求進行中又收到觸發，完成後再補抓一次
    pending: bool,
    status: watch::Sender<Status>,
}

impl PollingScheduler {
    pub fn new(
        clock: Arc<dyn Clock>,
        fetcher: Arc<dyn QuoteFetcher>,
        observer: Arc<dyn Observer>,
        error_sink: Arc<dyn ErrorSink>,
        cadence: Cadence,
    ) -> Self {
        let (status, _) = watch::channel(Status::default());

        PollingScheduler {
            clock,
            fetcher,
            observer,
            error_sink,
            cadence,
            code: None,
            mode: None,
            schedule: None,
            fetches: JoinSet::new(),
            pending: false,
            status,
        }
    }

    /// 啟動事件迴圈，立即判斷時段並抓一次報價
    pub fn spawn(mut self, code: Option<String>) -> SchedulerHandle {
        self.code = normalize(code);
        let (commands, rx) = mpsc::unbounded_channel();
        let status = self.status.subscribe();
        let task = tokio::spawn(self.run(rx));

        SchedulerHandle {
            commands,
            status,
            task,
        }
    }

    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        self.evaluate(Trigger::DemandRefresh);

        loop {
            let event = tokio::select! {
                _ = next_tick(&mut self.schedule) => Event::Tick,
                cmd = commands.recv() => Event::Command(cmd),
                Some(done) = self.fetches.join_next() => Event::Fetched(done),
            };

            match event {
                Event::Tick => self.evaluate(Trigger::Tick),
                Event::Command(Some(Command::Refresh)) => self.evaluate(Trigger::DemandRefresh),
                Event::Command(Some(Command::Configure(code))) => {
                    self.code = normalize(code);
                    self.evaluate(Trigger::DemandRefresh);
                }
                Event::Command(Some(Command::Shutdown)) | Event::Command(None) => break,
                Event::Fetched(Ok((code, outcome))) => self.on_fetched(code, outcome),
                Event::Fetched(Err(why)) => {
                    logging::error_file_async(format!("Quote fetch task failed because {:?}", why));
                    self.fetch_pending();
                }
            }
        }

        logging::info_file_async("Polling scheduler stopped".to_string());
    }

    /// 重新判斷時段、必要時切換模式，接著抓一次報價
    fn evaluate(&mut self, trigger: Trigger) {
        if self.code.is_none() {
            self.stop();
            self.publish(Update::Unconfigured);
            return;
        }

        let now = self.clock.now();
        let observed = Mode::observe(market::is_open(now));
        if self.mode != Some(observed) {
            self.transition(observed);
        }

        logging::debug_file_async(format!(
            "{} at {} in {:?}",
            trigger,
            now.format("%F %X"),
            self.mode
        ));

        self.request_fetch();
    }

    fn transition(&mut self, mode: Mode) {
        let period = self.cadence.period(mode);
        // 切換後重新計時，第一次 tick 在一個週期之後
        let mut interval = time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        logging::info_file_async(format!(
            "Polling mode {:?} -> {} every {:?}",
            self.mode, mode, period
        ));

        self.mode = Some(mode);
        self.schedule = Some(interval);
        self.status.send_replace(Status {
            mode: Some(mode),
            period: Some(period),
        });
    }

    fn stop(&mut self) {
        if self.mode.is_some() {
            logging::info_file_async("Polling stopped, no security code configured".to_string());
        }

        self.mode = None;
        self.schedule = None;
        self.pending = false;
        self.status.send_replace(Status::default());
    }

    fn request_fetch(&mut self) {
        if !self.fetches.is_empty() {
            self.pending = true;
            return;
        }

        let Some(code) = self.code.clone() else {
            return;
        };

        let fetcher = self.fetcher.clone();
        self.fetches.spawn(async move {
            let outcome = fetcher.fetch(&code).await;
            (code, outcome)
        });
    }

    fn fetch_pending(&mut self) {
        if self.pending {
            self.pending = false;
            self.request_fetch();
        }
    }

    /// 畫面層出錯時只記錄，事件迴圈繼續運作
    fn publish(&self, update: Update) {
        let observer = &self.observer;
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| observer.publish(update))) {
            let msg = format!("Observer panicked: {}", panic_message(payload.as_ref()));
            self.error_sink.append(&msg);
            logging::error_file_async(msg);
        }
    }

    fn on_fetched(&mut self, code: String, outcome: FetchOutcome) {
        if let Err(why) = &outcome {
            let msg = format!("Failed to fetch quote({}) because {}; {:?}", code, why, why);
            self.error_sink.append(&msg);
            logging::error_file_async(msg);
        }

        // 代碼已變更，舊的結果不再顯示
        if self.code.as_deref() == Some(code.as_str()) {
            let session = market::session(self.clock.now());
            self.publish(Update::Fetched {
                code,
                outcome,
                session,
            });
        } else {
            logging::warn_file_async(format!("Discard stale quote of {}", code));
        }

        self.fetch_pending();
    }
}

/// 取出 panic 訊息，無法辨識時回傳固定字串
fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "unknown panic"
    }
}

/// 空字串或只有空白視為未設定
fn normalize(code: Option<String>) -> Option<String> {
    code.map(|c| c.trim().to_string()).filter(|c| !c.is_empty())
}

/// 沒有排程時永遠不會完成
async fn next_tick(schedule: &mut Option<Interval>) {
    match schedule {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// 控制執行中排程的把手
pub struct SchedulerHandle {
    commands: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<Status>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// 立即重新判斷時段並抓一次報價
    pub fn refresh(&self) {
        self.send(Command::Refresh);
    }

    /// 變更代碼，None 或空白代表取消設定
    pub fn configure(&self, code: Option<String>) {
        self.send(Command::Configure(code));
    }

    pub fn status(&self) -> Status {
        *self.status.borrow()
    }

    pub async fn shutdown(self) {
        self.send(Command::Shutdown);
        if let Err(why) = self.task.await {
            logging::error_file_async(format!("Polling scheduler ended abnormally: {:?}", why));
        }
    }

    fn send(&self, command: Command) {
        if let Err(why) = self.commands.send(command) {
            logging::error_file_async(format!("Polling scheduler is gone: {:?}", why));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    };

    use async_trait::async_trait;
    use chrono::{NaiveDate, NaiveDateTime};
    use rust_decimal_macros::dec;

    use super::*;
    use crate::{
        crawler::FetchError,
        declare::{NextOpen, Quote},
    };

    struct FakeClock(Mutex<NaiveDateTime>);

    impl FakeClock {
        fn at(y: i32, m: u32, d: u32, hour: u32, min: u32) -> Arc<Self> {
            Arc::new(FakeClock(Mutex::new(Self::time(y, m, d, hour, min))))
        }

        fn time(y: i32, m: u32, d: u32, hour: u32, min: u32) -> NaiveDateTime {
            NaiveDate::from_ymd_opt(y, m, d)
                .unwrap()
                .and_hms_opt(hour, min, 0)
                .unwrap()
        }

        fn set(&self, y: i32, m: u32, d: u32, hour: u32, min: u32) {
            *self.0.lock().unwrap() = Self::time(y, m, d, hour, min);
        }
    }

    impl Clock for FakeClock {
        fn now(&self) -> NaiveDateTime {
            *self.0.lock().unwrap()
        }
    }

    struct FakeFetcher {
        calls: AtomicUsize,
        running: AtomicUsize,
        max_running: AtomicUsize,
        delay: Duration,
        outcome: FetchOutcome,
    }

    impl FakeFetcher {
        fn new(outcome: FetchOutcome, delay: Duration) -> Arc<Self> {
            Arc::new(FakeFetcher {
                calls: AtomicUsize::new(0),
                running: AtomicUsize::new(0),
                max_running: AtomicUsize::new(0),
                delay,
                outcome,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl QuoteFetcher for FakeFetcher {
        async fn fetch(&self, _code: &str) -> FetchOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_running.fetch_max(running, Ordering::SeqCst);

            if !self.delay.is_zero() {
                time::sleep(self.delay).await;
            }

            self.running.fetch_sub(1, Ordering::SeqCst);
            self.outcome.clone()
        }
    }

    #[derive(Default)]
    struct RecordingSink(Mutex<Vec<String>>);

    impl ErrorSink for RecordingSink {
        fn append(&self, message: &str) {
            self.0.lock().unwrap().push(message.to_string());
        }
    }

    struct Harness {
        handle: SchedulerHandle,
        updates: mpsc::UnboundedReceiver<Update>,
        sink: Arc<RecordingSink>,
    }

    fn start(
        clock: Arc<FakeClock>,
        fetcher: Arc<FakeFetcher>,
        code: Option<&str>,
    ) -> Harness {
        let (tx, updates) = mpsc::unbounded_channel();
        let observer = move |update: Update| {
            let _ = tx.send(update);
        };
        let sink = Arc::new(RecordingSink::default());
        let scheduler = PollingScheduler::new(
            clock,
            fetcher,
            Arc::new(observer),
            sink.clone(),
            Cadence::default(),
        );

        Harness {
            handle: scheduler.spawn(code.map(str::to_string)),
            updates,
            sink,
        }
    }

    fn quote() -> FetchOutcome {
        Ok(Quote::new(dec!(10.50), dec!(10.00)).unwrap())
    }

    const MINUTE: Duration = Duration::from_secs(60);

    #[tokio::test(start_paused = true)]
    async fn test_open_market_fetches_once_before_first_tick() {
        // 2024-06-03 星期一
        let clock = FakeClock::at(2024, 6, 3, 10, 0);
        let fetcher = FakeFetcher::new(quote(), Duration::ZERO);
        let started = Instant::now();
        let mut h = start(clock, fetcher.clone(), Some("sz000001"));

        let update = h.updates.recv().await.unwrap();

        assert!(started.elapsed() < MINUTE);
        assert_eq!(fetcher.calls(), 1);
        assert_eq!(
            update,
            Update::Fetched {
                code: "sz000001".to_string(),
                outcome: quote(),
                session: SessionState::Open,
            }
        );
        assert_eq!(
            h.handle.status(),
            Status {
                mode: Some(Mode::ActiveSession),
                period: Some(MINUTE),
            }
        );

        h.handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_keeps_cadence_under_sustained_failure() {
        let clock = FakeClock::at(2024, 6, 3, 10, 0);
        let fetcher = FakeFetcher::new(
            Err(FetchError::NetworkFailure("refused".to_string())),
            Duration::ZERO,
        );
        let started = Instant::now();
        let mut h = start(clock, fetcher.clone(), Some("sz000001"));

        for cycle in 0..4u32 {
            let update = h.updates.recv().await.unwrap();
            assert!(matches!(
                update,
                Update::Fetched {
                    outcome: Err(FetchError::NetworkFailure(_)),
                    ..
                }
            ));
            assert_eq!(started.elapsed().as_secs(), 60 * cycle as u64);
            assert_eq!(h.handle.status().mode, Some(Mode::ActiveSession));
            assert_eq!(h.handle.status().period, Some(MINUTE));
        }

        assert_eq!(fetcher.calls(), 4);
        let logged = h.sink.0.lock().unwrap().clone();
        assert_eq!(logged.len(), 4);
        assert!(logged[0].contains("sz000001"));
        assert!(logged[0].contains("refused"));

        h.handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_switches_cadence_at_session_edges() {
        let clock = FakeClock::at(2024, 6, 3, 11, 29);
        let fetcher = FakeFetcher::new(quote(), Duration::ZERO);
        let started = Instant::now();
        let mut h = start(clock.clone(), fetcher.clone(), Some("sh600745"));

        h.updates.recv().await.unwrap();
        assert_eq!(h.handle.status().mode, Some(Mode::ActiveSession));

        // 午休：下一次 tick 轉為慢速
        clock.set(2024, 6, 3, 12, 0);
        let update = h.updates.recv().await.unwrap();
        assert_eq!(started.elapsed(), MINUTE);
        assert!(matches!(
            update,
            Update::Fetched {
                session: SessionState::Closed(NextOpen::TodayAfternoon),
                ..
            }
        ));
        assert_eq!(
            h.handle.status(),
            Status {
                mode: Some(Mode::WaitingForOpen),
                period: Some(5 * MINUTE),
            }
        );

        // 仍在休市，維持慢速
        h.updates.recv().await.unwrap();
        assert_eq!(started.elapsed(), 6 * MINUTE);
        assert_eq!(h.handle.status().mode, Some(Mode::WaitingForOpen));

        // 下午開盤
        clock.set(2024, 6, 3, 13, 0);
        h.updates.recv().await.unwrap();
        assert_eq!(started.elapsed(), 11 * MINUTE);
        assert_eq!(h.handle.status().mode, Some(Mode::ActiveSession));

        h.updates.recv().await.unwrap();
        assert_eq!(started.elapsed(), 12 * MINUTE);
        assert_eq!(fetcher.calls(), 5);

        h.handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_while_closed_keeps_slow_cadence() {
        // 2024-06-08 星期六
        let clock = FakeClock::at(2024, 6, 8, 10, 0);
        let fetcher = FakeFetcher::new(quote(), Duration::ZERO);
        let started = Instant::now();
        let mut h = start(clock, fetcher.clone(), Some("sz000001"));

        let update = h.updates.recv().await.unwrap();
        let monday = NaiveDate::from_ymd_opt(2024, 6, 10).unwrap();
        assert!(matches!(
            update,
            Update::Fetched {
                session: SessionState::Closed(NextOpen::NextMonday(d)),
                ..
            } if d == monday
        ));

        time::sleep(2 * MINUTE).await;
        h.handle.refresh();
        h.updates.recv().await.unwrap();
        assert_eq!(fetcher.calls(), 2);
        assert_eq!(
            h.handle.status(),
            Status {
                mode: Some(Mode::WaitingForOpen),
                period: Some(5 * MINUTE),
            }
        );

        // 原本的慢速排程沒有被重設
        h.updates.recv().await.unwrap();
        assert_eq!(started.elapsed(), 5 * MINUTE);
        assert_eq!(fetcher.calls(), 3);

        h.handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_unconfigured_never_fetches() {
        let clock = FakeClock::at(2024, 6, 3, 10, 0);
        let fetcher = FakeFetcher::new(quote(), Duration::ZERO);
        let mut h = start(clock, fetcher.clone(), Some("   "));

        assert_eq!(h.updates.recv().await.unwrap(), Update::Unconfigured);
        assert_eq!(h.handle.status(), Status::default());

        time::sleep(10 * MINUTE).await;
        assert!(h.updates.try_recv().is_err());
        assert_eq!(fetcher.calls(), 0);

        h.handle.configure(Some("sz000001".to_string()));
        assert!(matches!(
            h.updates.recv().await.unwrap(),
            Update::Fetched { .. }
        ));
        assert_eq!(fetcher.calls(), 1);
        assert_eq!(h.handle.status().mode, Some(Mode::ActiveSession));

        h.handle.configure(None);
        assert_eq!(h.updates.recv().await.unwrap(), Update::Unconfigured);
        assert_eq!(h.handle.status(), Status::default());

        h.handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_triggers_during_fetch_are_coalesced() {
        let clock = FakeClock::at(2024, 6, 3, 10, 0);
        let fetcher = FakeFetcher::new(quote(), Duration::from_secs(5));
        let started = Instant::now();
        let mut h = start(clock, fetcher.clone(), Some("sz000001"));

        time::sleep(Duration::from_secs(1)).await;
        h.handle.refresh();
        h.handle.refresh();
        h.handle.refresh();

        h.updates.recv().await.unwrap();
        assert_eq!(started.elapsed(), Duration::from_secs(5));
        h.updates.recv().await.unwrap();
        assert_eq!(started.elapsed(), Duration::from_secs(10));

        assert_eq!(fetcher.calls(), 2);
        assert_eq!(fetcher.max_running.load(Ordering::SeqCst), 1);

        h.handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_outcome_of_previous_code_is_discarded() {
        let clock = FakeClock::at(2024, 6, 3, 10, 0);
        let fetcher = FakeFetcher::new(quote(), Duration::from_secs(5));
        let mut h = start(clock, fetcher.clone(), Some("sz000001"));

        time::sleep(Duration::from_secs(1)).await;
        h.handle.configure(Some("sh600745".to_string()));

        match h.updates.recv().await.unwrap() {
            Update::Fetched { code, .. } => assert_eq!(code, "sh600745"),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(fetcher.calls(), 2);

        h.handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_at_open_switches_to_fast_cadence() {
        let clock = FakeClock::at(2024, 6, 3, 12, 0);
        let fetcher = FakeFetcher::new(quote(), Duration::ZERO);
        let started = Instant::now();
        let mut h = start(clock.clone(), fetcher.clone(), Some("sz000001"));

        h.updates.recv().await.unwrap();
        assert_eq!(
            h.handle.status(),
            Status {
                mode: Some(Mode::WaitingForOpen),
                period: Some(5 * MINUTE),
            }
        );

        time::sleep(2 * MINUTE).await;
        clock.set(2024, 6, 3, 13, 0);
        h.handle.refresh();

        let update = h.updates.recv().await.unwrap();
        assert!(matches!(
            update,
            Update::Fetched {
                session: SessionState::Open,
                ..
            }
        ));
        assert_eq!(fetcher.calls(), 2);
        assert_eq!(
            h.handle.status(),
            Status {
                mode: Some(Mode::ActiveSession),
                period: Some(MINUTE),
            }
        );

        // 新排程從 refresh 起算，不再等原本的 5 分鐘
        h.updates.recv().await.unwrap();
        assert_eq!(started.elapsed(), 3 * MINUTE);
        assert_eq!(fetcher.calls(), 3);

        h.handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_observer_panic_keeps_polling() {
        let clock = FakeClock::at(2024, 6, 3, 10, 0);
        let fetcher = FakeFetcher::new(quote(), Duration::ZERO);
        let (tx, mut updates) = mpsc::unbounded_channel();
        let observer = move |update: Update| {
            let _ = tx.send(update);
            panic!("render failed");
        };
        let sink = Arc::new(RecordingSink::default());
        let handle = PollingScheduler::new(
            clock,
            fetcher.clone(),
            Arc::new(observer),
            sink.clone(),
            Cadence::default(),
        )
        .spawn(Some("sz000001".to_string()));

        let started = Instant::now();
        for cycle in 0..3u64 {
            assert!(matches!(
                updates.recv().await.unwrap(),
                Update::Fetched { outcome: Ok(_), .. }
            ));
            assert_eq!(started.elapsed().as_secs(), 60 * cycle);
        }

        assert_eq!(fetcher.calls(), 3);
        assert_eq!(handle.status().mode, Some(Mode::ActiveSession));
        let logged = sink.0.lock().unwrap().clone();
        assert_eq!(logged.len(), 3);
        assert_eq!(logged[0], "Observer panicked: render failed");

        handle.shutdown().await;
    }
}
