//! Tokenmeter CLI
//!
//! Command-line interface for recording and inspecting AI provider token usage

use anyhow::Context;
use clap::{Parser, Subcommand};
use futures::StreamExt;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use tokenmeter_core::{EventFilter, TokenUsage};
use tokenmeter_monitor::{
    Clock, MonitorConfig, ResetMode, SummaryOptions, SystemClock, TokenMonitor, UsageRecord,
    spawn_retention_task,
};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

const HOUR_MS: i64 = 3_600_000;

#[derive(Parser)]
#[command(name = "tokenmeter")]
#[command(about = "Tokenmeter - token usage monitor for AI providers", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file (YAML or TOML)
    #[arg(
        short,
        long,
        value_name = "FILE",
        env = "TOKENMETER_CONFIG",
        global = true
    )]
    config: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        long,
        value_name = "LEVEL",
        env = "TOKENMETER_LOG_LEVEL",
        default_value = "info",
        global = true
    )]
    log_level: String,
}

/// Query narrowing shared by `summary` and `events`
#[derive(clap::Args)]
struct QueryArgs {
    /// Only include usage from the last N hours
    #[arg(long, value_name = "HOURS")]
    since_hours: Option<u32>,

    /// Only include this provider
    #[arg(long)]
    provider: Option<String>,

    /// Only include this model
    #[arg(long)]
    model: Option<String>,
}

impl QueryArgs {
    fn filter(&self, now_ms: i64) -> EventFilter {
        let mut filter = EventFilter::default();
        if let Some(hours) = self.since_hours {
            filter = filter.since(now_ms - i64::from(hours) * HOUR_MS);
        }
        if let Some(provider) = &self.provider {
            filter = filter.provider(provider);
        }
        if let Some(model) = &self.model {
            filter = filter.model(model);
        }
        filter
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Record usage for a single request
    Record {
        #[arg(long)]
        provider: String,

        #[arg(long)]
        model: String,

        #[arg(long)]
        input: Option<u64>,

        #[arg(long)]
        output: Option<u64>,

        #[arg(long)]
        cache_read: Option<u64>,

        #[arg(long)]
        cache_write: Option<u64>,

        /// Reported total, derived from the other counters when omitted
        #[arg(long)]
        total: Option<u64>,

        #[arg(long)]
        session_id: Option<String>,

        #[arg(long)]
        agent_id: Option<String>,
    },
    /// Print an aggregated usage summary as JSON
    Summary {
        #[command(flatten)]
        query: QueryArgs,

        /// Ignore cached summaries
        #[arg(long)]
        refresh: bool,
    },
    /// Print recorded events, most recent first, one JSON object per line
    Events {
        #[command(flatten)]
        query: QueryArgs,

        /// Maximum number of events to print
        #[arg(long, default_value = "20")]
        limit: usize,
    },
    /// Check configured usage limits
    Limits,
    /// Delete recorded usage
    Reset {
        /// Keep events from the last N days instead of deleting everything
        #[arg(long, value_name = "DAYS")]
        keep_days: Option<u32>,
    },
    /// Apply the configured retention policy
    Retention {
        /// Keep running and trim on the configured interval until interrupted
        #[arg(long)]
        watch: bool,
    },
}

fn init_tracing(level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));

    // stdout carries command output
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    Ok(())
}

/// Configuration from `--config`, else the user config file if present, else defaults
fn load_config(path: Option<&str>) -> anyhow::Result<MonitorConfig> {
    let path = match path {
        Some(path) => Some(PathBuf::from(shellexpand::tilde(path).into_owned())),
        None => dirs::config_dir()
            .map(|dir| dir.join("tokenmeter").join("config.yaml"))
            .filter(|path| path.exists()),
    };

    let mut config = match path {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            MonitorConfig::from_file(&path)
                .with_context(|| format!("failed to load {}", path.display()))?
        }
        None => MonitorConfig::default(),
    };

    // Environment overrides the file
    config.merge_env();
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level)?;

    let config = load_config(cli.config.as_deref())?;
    let monitor = TokenMonitor::from_config(&config)?;
    let now = SystemClock.now_ms();

    match cli.command {
        Commands::Record {
            provider,
            model,
            input,
            output,
            cache_read,
            cache_write,
            total,
            session_id,
            agent_id,
        } => {
            let usage = TokenUsage {
                input,
                output,
                cache_read,
                cache_write,
                total,
            };
            let mut record = UsageRecord::new(provider, model, usage);
            record.session_id = session_id;
            record.agent_id = agent_id;

            monitor.record(record).await;
        }
        Commands::Summary { query, refresh } => {
            let mut options = SummaryOptions::new(query.filter(now));
            options.force_refresh = refresh;

            let summary = monitor.summary(options).await;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Commands::Events { query, limit } => {
            let mut events = monitor.events(query.filter(now)).await;
            let mut recent = VecDeque::with_capacity(limit);

            while let Some(event) = events.next().await {
                if recent.len() == limit {
                    recent.pop_front();
                }
                if limit > 0 {
                    recent.push_back(event);
                }
            }

            for event in recent.iter().rev() {
                println!("{}", serde_json::to_string(event)?);
            }
        }
        Commands::Limits => {
            let status = monitor.check_limits().await;
            let usage = monitor.limit_usage().await;

            let report = serde_json::json!({
                "status": status,
                "usage": usage,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Reset { keep_days } => {
            let mode = match keep_days {
                Some(days) => ResetMode::KeepDays(days),
                None => ResetMode::All,
            };

            if let Some(stats) = monitor.reset(mode).await? {
                println!("{}", serde_json::to_string(&stats)?);
            }
        }
        Commands::Retention { watch } => {
            let Some(policy) = monitor.retention().copied() else {
                anyhow::bail!("no retention policy configured (set retention.keepDays)");
            };

            if watch {
                let task = spawn_retention_task(Arc::new(monitor), policy);
                tokio::signal::ctrl_c()
                    .await
                    .context("failed to listen for shutdown signal")?;
                info!("Shutting down retention task");
                task.shutdown().await;
            } else if let Some(stats) = monitor.apply_retention().await? {
                println!("{}", serde_json::to_string(&stats)?);
            }
        }
    }

    Ok(())
}
