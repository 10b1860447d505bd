use crate::domain::ports::ConfigProvider;
use clap::{Parser, Subcommand};
use std::time::Duration;

#[derive(Debug, Clone, Parser)]
#[command(name = "zhouyi")]
#[command(about = "Yarrow-stalk divination with streamed interpretation")]
pub struct CliConfig {
    #[arg(long, env = "ZHOUYI_API_BASE_URL", default_value = "http://localhost:8080")]
    pub api_base_url: String,

    #[arg(long, env = "ZHOUYI_AUTH_TOKEN")]
    pub auth_token: Option<String>,

    #[arg(long, default_value = "./readings.json")]
    pub store_path: String,

    #[arg(long, default_value = "400", help = "Pause between revealed lines, in milliseconds")]
    pub line_delay_ms: u64,

    #[arg(long, help = "Enable verbose output")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Cast a hexagram for a question and resolve it locally.
    Cast {
        question: String,

        /// Also request a streamed interpretation from the remote service.
        #[arg(long)]
        ask: bool,

        /// One-time unlock token from the reward flow.
        #[arg(long)]
        unlock_token: Option<String>,
    },

    /// Browse the remote reading history.
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },

    /// Browse readings saved on this machine.
    Local {
        #[command(subcommand)]
        action: LocalAction,
    },

    /// Redeem proof of a completed ad view for silver or an unlock token.
    Reward {
        #[arg(long, default_value = "admob")]
        provider: String,

        ad_proof: String,
    },
}

#[derive(Debug, Clone, Subcommand)]
pub enum HistoryAction {
    List {
        #[arg(long, default_value = "20")]
        limit: u32,

        #[arg(long, default_value = "0")]
        offset: u32,
    },
    Show {
        reading_id: i64,
    },
    Pin {
        reading_id: i64,

        #[arg(long)]
        unpin: bool,
    },
    Delete {
        reading_id: i64,
    },
}

#[derive(Debug, Clone, Subcommand)]
pub enum LocalAction {
    List {
        #[arg(long, default_value = "20")]
        limit: usize,
    },
    Delete {
        reading_id: i64,
    },
}

impl ConfigProvider for CliConfig {
    fn api_base_url(&self) -> &str {
        &self.api_base_url
    }

    fn auth_token(&self) -> Option<&str> {
        self.auth_token.as_deref()
    }

    fn store_path(&self) -> &str {
        &self.store_path
    }

    fn line_delay(&self) -> Duration {
        Duration::from_millis(self.line_delay_ms)
    }
}
