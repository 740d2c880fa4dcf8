use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use once_cell::sync::{Lazy, OnceCell};
use reqwest::Client;
use thiserror::Error;

use crate::{config::SETTINGS, logging::Logger};

/// 報價來源會擋掉非瀏覽器的請求
const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// A singleton instance of the reqwest client.
static CLIENT: OnceCell<Client> = OnceCell::new();

static LOGGER: Lazy<Logger> = Lazy::new(|| Logger::new("http"));

/// 傳輸層失敗的分類
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("network request failed: {0}")]
    Network(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(why: reqwest::Error) -> Self {
        if why.is_timeout() {
            TransportError::Timeout
        } else {
            TransportError::Network(why.to_string())
        }
    }
}

/// 一次 GET 的原始結果，body 尚未解碼
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// 對外發送請求的介面，測試時可替換
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &str) -> Result<RawResponse, TransportError>;
}

/// 使用共用 reqwest client 的正式實作
#[derive(Debug, Default, Clone, Copy)]
pub struct HttpTransport;

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &str) -> Result<RawResponse, TransportError> {
        let client = get_client().map_err(|why| TransportError::Network(why.to_string()))?;
        let start = Instant::now();
        let result = send(client, url).await;
        let elapsed = start.elapsed().as_millis();

        match &result {
            Ok(res) => LOGGER.info(format!("GET:{} {} {} ms", url, res.status, elapsed)),
            Err(why) => LOGGER.error(format!("GET:{} failed because {:?}. {} ms", url, why, elapsed)),
        }

        result
    }
}

async fn send(client: &Client, url: &str) -> Result<RawResponse, TransportError> {
    let response = client.get(url).send().await?;
    let status = response.status().as_u16();
    let body = response.bytes().await?.to_vec();

    Ok(RawResponse { status, body })
}

/// Returns the reqwest client singleton instance or creates one if it doesn't exist.
///
/// The overall timeout covers connecting, sending and reading the body, so a
/// stuck request always resolves within `quote.timeout_secs`.
fn get_client() -> Result<&'static Client> {
    CLIENT.get_or_try_init(|| {
        let timeout = Duration::from_secs(SETTINGS.quote.timeout_secs);

        Client::builder()
            // ===== 壓縮 =====
            .brotli(true)
            .gzip(true)
            // ===== 超時設置 =====
            .connect_timeout(timeout)
            .timeout(timeout)
            // ===== TCP 優化 =====
            .tcp_nodelay(true)
            .tcp_keepalive(Duration::from_secs(60))
            // ===== 連接池 =====
            .pool_max_idle_per_host(2)
            .pool_idle_timeout(Duration::from_secs(90))
            .redirect(reqwest::redirect::Policy::limited(5))
            // ===== Headers =====
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| anyhow!("Failed to create reqwest client: {:?}", e))
    })
}
