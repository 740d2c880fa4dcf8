//! 報價失敗的錯誤紀錄
//!
//! One append-only text file, each entry stamped and followed by a blank
//! line. It only ever grows during polling; `clear` exists for the `log clear`
//! command. Appends go through a channel to a writer thread, the same way the
//! file logger does, so callers on the async runtime never touch the disk.

use std::{
    fs::{self, OpenOptions},
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
    thread,
};

use anyhow::{Context, Result};
use chrono::Local;
use crossbeam_channel::{unbounded, Sender};
use once_cell::sync::OnceCell;

use crate::logging;

pub const ERROR_LOG_FILE: &str = "error.log";

/// 接收失敗細節的對象
pub trait ErrorSink: Send + Sync {
    fn append(&self, message: &str);
}

#[derive(Debug, Clone)]
pub struct ErrorLog {
    path: PathBuf,
    /// 第一次 append 時才建立寫檔線程
    writer: OnceCell<Sender<String>>,
}

impl ErrorLog {
    pub fn new(path: PathBuf) -> Self {
        ErrorLog {
            path,
            writer: OnceCell::new(),
        }
    }

    /// 放在資料目錄下的 error.log
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(ERROR_LOG_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn writer(&self) -> &Sender<String> {
        self.writer.get_or_init(|| {
            let (tx, rx) = unbounded::<String>();
            let path = self.path.clone();

            thread::spawn(move || {
                for entry in &rx {
                    if let Err(why) = write_entry(&path, &entry) {
                        logging::error_console(format!(
                            "Failed to append to {:?} because {:?}",
                            path, why
                        ));
                    }
                }
            });

            tx
        })
    }

    /// 讀取全部內容，檔案不存在時回傳 None
    pub fn read(&self) -> Result<Option<String>> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(Some(content)),
            Err(why) if why.kind() == ErrorKind::NotFound => Ok(None),
            Err(why) => Err(why).with_context(|| format!("Failed to read {:?}", self.path)),
        }
    }

    /// 檔案大小(KB)，不存在時為 0
    pub fn size_kb(&self) -> f64 {
        fs::metadata(&self.path)
            .map(|m| m.len() as f64 / 1024.0)
            .unwrap_or(0.0)
    }

    /// 清空內容但保留檔案
    pub fn clear(&self) -> Result<()> {
        if !self.path.exists() {
            return Ok(());
        }

        fs::write(&self.path, "").with_context(|| format!("Failed to clear {:?}", self.path))
    }
}

impl ErrorSink for ErrorLog {
    /// 時間戳記在呼叫當下產生，寫檔交給背景線程
    fn append(&self, message: &str) {
        let entry = format!(
            "[{}] {}\n\n",
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            message
        );

        if let Err(why) = self.writer().send(entry) {
            logging::error_console(format!("Error log writer is gone: {}", why));
        }
    }
}

fn write_entry(path: &Path, entry: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(entry.as_bytes())?;

    Ok(())
}
