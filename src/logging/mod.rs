use std::{
    fmt::Write as _,
    fs::{self, OpenOptions},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
    thread,
};

use chrono::{format::DelayedFormat, Local};
use crossbeam_channel::{unbounded, Sender};
use log::Level;
use once_cell::sync::Lazy;

pub mod error_log;

static LOGGER: Lazy<Logger> = Lazy::new(|| Logger::new("default"));

/// 批次寫檔的緩衝大小
const LINE_CAPACITY: usize = 2048;

pub struct Logger {
    info_writer: Option<Sender<String>>,
    warn_writer: Option<Sender<String>>,
    error_writer: Option<Sender<String>>,
    debug_writer: Option<Sender<String>>,
}

impl Logger {
    pub fn new(log_name: &str) -> Self {
        Logger {
            info_writer: Self::create_writer(log_name, Level::Info),
            warn_writer: Self::create_writer(log_name, Level::Warn),
            error_writer: Self::create_writer(log_name, Level::Error),
            debug_writer: Self::create_writer(log_name, Level::Debug),
        }
    }

    pub fn info(&self, log: String) {
        self.send(log, Level::Info, &self.info_writer);
    }

    pub fn warn(&self, log: String) {
        self.send(log, Level::Warn, &self.warn_writer);
    }

    pub fn error(&self, log: String) {
        self.send(log, Level::Error, &self.error_writer);
    }

    pub fn debug(&self, log: String) {
        self.send(log, Level::Debug, &self.debug_writer);
    }

    fn send(&self, msg: String, level: Level, writer: &Option<Sender<String>>) {
        let Some(writer) = writer else {
            // 無法寫檔時至少輸出到 console
            console(level, msg);
            return;
        };

        if let Err(why) = writer.send(msg) {
            error_console(why.to_string());
        }
    }

    fn create_writer(log_name: &str, level: Level) -> Option<Sender<String>> {
        let name = format!("{}_{}", log_name, level.as_str().to_lowercase());
        let log_path = match Self::get_log_path(&name) {
            Some(p) => p,
            None => {
                error_console("Failed to create log directory.".to_string());
                return None;
            }
        };

        let file = match OpenOptions::new().create(true).append(true).open(&log_path) {
            Ok(f) => f,
            Err(why) => {
                error_console(format!("Failed to open log file {:?}: {}", log_path, why));
                return None;
            }
        };

        let (tx, rx) = unbounded::<String>();

        // 寫入檔案的操作使用另一個線程處理
        thread::spawn(move || {
            let mut writer = BufWriter::new(file);
            let mut line = String::with_capacity(LINE_CAPACITY);

            for received in &rx {
                if writeln!(&mut line, "{} {}", Local::now().format("%F %X%.6f"), received).is_err() {
                    continue;
                }

                if rx.is_empty() || line.len() >= LINE_CAPACITY {
                    if let Err(why) = writer.write_all(line.as_bytes()) {
                        error_console(format!(
                            "Failed to write to log file. because:{:#?}\r\nmsg:{}",
                            why, line
                        ));
                    }

                    if let Err(why) = writer.flush() {
                        error_console(format!("Failed to flush log file. because:{:#?}", why));
                    }

                    line.clear();
                }
            }
        });

        Some(tx)
    }

    fn get_log_path(name: &str) -> Option<PathBuf> {
        let path = Path::new("log");

        if !path.exists() {
            fs::create_dir_all(path).ok()?;
        }

        let mut log_path = PathBuf::from(path);
        log_path.push(format!("{}_{}.log", Local::now().format("%Y-%m-%d"), name));

        Some(log_path)
    }
}

pub fn info_file_async(log: String) {
    LOGGER.info(log);
}

pub fn warn_file_async(log: String) {
    LOGGER.warn(log);
}

pub fn error_file_async(log: String) {
    LOGGER.error(log);
}

pub fn debug_file_async(log: String) {
    LOGGER.debug(log);
}

fn console(level: Level, log: String) {
    println!(
        "{} {} {}",
        Local::now().format("%Y-%m-%d %H:%M:%S.%3f"),
        level,
        log
    );
}

pub fn error_console(log: String) {
    println!(
        "{} Error {}",
        DelayedFormat::to_string(&Local::now().format("%Y-%m-%d %H:%M:%S.%3f")),
        log
    );
}
