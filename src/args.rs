//! 命令列參數
use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(version, about = "Market-aware quote poller for one Shanghai/Shenzhen security", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Poll the configured security and print every update (default).
    Run {
        /// Save this code before polling, e.g. sz000001
        #[clap(long)]
        code: Option<String>,
    },
    /// Validate and save the security code.
    SetCode {
        code: String,
    },
    /// Inspect the error log.
    Log {
        #[command(subcommand)]
        action: LogAction,
    },
}

#[derive(Debug, Subcommand)]
pub enum LogAction {
    /// Print the error log with its size.
    Show,
    /// Empty the error log.
    Clear,
}

impl Args {
    /// 未指定子命令時等同 `run`
    pub fn into_command(self) -> Command {
        self.command.unwrap_or(Command::Run { code: None })
    }
}
