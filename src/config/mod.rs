use std::{env, path::PathBuf, str::FromStr};

use config::{Config as config_config, File as config_file};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::{crawler::tencent, logging};

pub mod stock_code;

const CONFIG_PATH: &str = "app.json";

#[derive(Serialize, Deserialize, Default, Debug, Clone)]
pub struct App {
    #[serde(default)]
    pub quote: Quote,
    #[serde(default)]
    pub schedule: Schedule,
    #[serde(default)]
    pub system: System,
}

const QUOTE_HOST: &str = "QUOTE_HOST";
const QUOTE_TIMEOUT_SECS: &str = "QUOTE_TIMEOUT_SECS";

/// 報價來源
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Quote {
    #[serde(default = "default_quote_host")]
    pub host: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

const SCHEDULE_ACTIVE_INTERVAL_SECS: &str = "SCHEDULE_ACTIVE_INTERVAL_SECS";
const SCHEDULE_WAITING_INTERVAL_SECS: &str = "SCHEDULE_WAITING_INTERVAL_SECS";

/// 輪詢頻率
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Schedule {
    /// 盤中每隔多久抓一次報價
    #[serde(default = "default_active_interval_secs")]
    pub active_interval_secs: u64,
    /// 休市時每隔多久檢查是否開盤
    #[serde(default = "default_waiting_interval_secs")]
    pub waiting_interval_secs: u64,
}

const SYSTEM_DATA_DIR: &str = "SYSTEM_DATA_DIR";

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct System {
    /// 存放代碼設定與 error.log 的目錄
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

fn default_quote_host() -> String {
    tencent::HOST.to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_active_interval_secs() -> u64 {
    60
}

fn default_waiting_interval_secs() -> u64 {
    5 * 60
}

fn default_data_dir() -> String {
    "data".to_string()
}

impl Default for Quote {
    fn default() -> Self {
        Quote {
            host: default_quote_host(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for Schedule {
    fn default() -> Self {
        Schedule {
            active_interval_secs: default_active_interval_secs(),
            waiting_interval_secs: default_waiting_interval_secs(),
        }
    }
}

impl Default for System {
    fn default() -> Self {
        System {
            data_dir: default_data_dir(),
        }
    }
}

pub static SETTINGS: Lazy<App> = Lazy::new(App::new);

impl App {
    pub fn new() -> Self {
        match Self::get() {
            Ok(app) => app,
            Err(why) => {
                logging::error_file_async(format!(
                    "I can't read the config context because {:?}",
                    why
                ));
                App::default().override_with_env()
            }
        }
    }

    fn get() -> Result<Self, config::ConfigError> {
        let config_path = config_path();
        if config_path.exists() {
            let config: App = config_config::builder()
                .add_source(config_file::from(config_path))
                .build()?
                .try_deserialize()?;
            return Ok(config.override_with_env());
        }

        Ok(App::default().override_with_env())
    }

    /// 將來至於 env 的設定值覆蓋掉 json 上的設定值
    fn override_with_env(mut self) -> Self {
        if let Ok(host) = env::var(QUOTE_HOST) {
            self.quote.host = host;
        }

        if let Ok(secs) = env::var(QUOTE_TIMEOUT_SECS) {
            self.quote.timeout_secs = u64::from_str(&secs).unwrap_or(self.quote.timeout_secs);
        }

        if let Ok(secs) = env::var(SCHEDULE_ACTIVE_INTERVAL_SECS) {
            self.schedule.active_interval_secs =
                u64::from_str(&secs).unwrap_or(self.schedule.active_interval_secs);
        }

        if let Ok(secs) = env::var(SCHEDULE_WAITING_INTERVAL_SECS) {
            self.schedule.waiting_interval_secs =
                u64::from_str(&secs).unwrap_or(self.schedule.waiting_interval_secs);
        }

        if let Ok(dir) = env::var(SYSTEM_DATA_DIR) {
            self.system.data_dir = dir;
        }

        self
    }

    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(&self.system.data_dir)
    }
}

/// 回傳設定檔的路徑
fn config_path() -> PathBuf {
    PathBuf::from(CONFIG_PATH)
}
