use std::{path::Path, sync::Arc};

use anyhow::Result;
use clap::Parser;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    signal,
};

use crate::{
    args::{Args, Command, LogAction},
    config::{stock_code, SETTINGS},
    crawler::tencent::Tencent,
    logging::error_log::ErrorLog,
    market::LocalClock,
    scheduler::{Cadence, PollingScheduler, SchedulerHandle, Update},
};

pub mod args;
pub mod config;
pub mod crawler;
pub mod declare;
pub mod display;
pub mod logging;
pub mod market;
pub mod scheduler;
pub mod util;

#[cfg(target_env = "musl")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    util::ensure_rustls_crypto_provider();

    let data_dir = SETTINGS.data_dir();

    match Args::parse().into_command() {
        Command::Run { code } => run(&data_dir, code).await,
        Command::SetCode { code } => {
            let code = stock_code::save(&data_dir, &code)?;
            println!("Security code saved: {}", code);
            Ok(())
        }
        Command::Log { action } => {
            let log = ErrorLog::in_dir(&data_dir);
            match action {
                LogAction::Show => match log.read()? {
                    Some(content) if !content.is_empty() => {
                        println!("{} ({:.2} KB)\n\n{}", log.path().display(), log.size_kb(), content)
                    }
                    _ => println!("Error log is empty"),
                },
                LogAction::Clear => {
                    log.clear()?;
                    println!("Error log cleared");
                }
            }
            Ok(())
        }
    }
}

async fn run(data_dir: &Path, code: Option<String>) -> Result<()> {
    let code = match code {
        Some(code) => Some(stock_code::save(data_dir, &code)?.to_string()),
        None => stock_code::load(data_dir)?,
    };

    let observer = |update: Update| {
        let state = display::project(&update);
        println!("[{}] {}\n{}\n", state.tone, state.text, state.tooltip);
    };

    let handle = PollingScheduler::new(
        Arc::new(LocalClock),
        Arc::new(Tencent::from_settings()),
        Arc::new(observer),
        Arc::new(ErrorLog::in_dir(data_dir)),
        Cadence::from_settings(),
    )
    .spawn(code);

    logging::info_file_async("Polling scheduler started".to_string());
    println!("Press Enter to refresh, type a code to switch, Ctrl-C to quit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = signal::ctrl_c() => break,
            line = lines.next_line() => match line {
                Ok(Some(line)) => on_input(&handle, data_dir, &line),
                Ok(None) => {
                    // stdin 已關閉，只能等 Ctrl-C
                    signal::ctrl_c().await?;
                    break;
                }
                Err(why) => {
                    logging::error_file_async(format!("Failed to read stdin because {:?}", why));
                    break;
                }
            },
        }
    }

    handle.shutdown().await;

    Ok(())
}

/// 空白行立即更新，其他內容視為新的代碼
fn on_input(handle: &SchedulerHandle, data_dir: &Path, line: &str) {
    if line.trim().is_empty() {
        handle.refresh();
        return;
    }

    match stock_code::save(data_dir, line) {
        Ok(code) => handle.configure(Some(code.to_string())),
        Err(why) => logging::error_console(format!("{:?}", why)),
    }
}
