mod bot;
mod budget;
mod config;
mod cost;
mod journal;
mod notify;
mod phase;
mod research;
mod replay;
mod risk;
mod state;
mod status;
mod trading;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::Parser;
use execution_engine::PaperBroker;
use llm_client::{AnthropicJudge, LlmJudge};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use bot::{Bot, Collaborators};
use budget::BudgetKind;
use config::{AppConfig, ConfigOverrides};
use journal::{resolve_trades_dir, TradeJournal};
use notify::LogNotifier;
use replay::ReplayFeed;
use state::{resolve_state_path, StateStore};

#[derive(Parser)]
#[command(name = "sentiment-desk", about = "Social-sentiment signal-to-decision trading engine")]
struct Cli {
    /// TOML config file. Defaults apply when it doesn't exist.
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    /// Social and market data file to drive the run.
    #[arg(long)]
    replay: Option<PathBuf>,

    /// Run a single wake and exit.
    #[arg(long, default_value_t = false)]
    once: bool,

    /// Validate the config and exit.
    #[arg(long, default_value_t = false)]
    check_config: bool,

    /// Persisted kill switch; trading steps are skipped while false.
    #[arg(long)]
    enabled: Option<bool>,

    /// JSON file of tunable overrides to persist into the state.
    #[arg(long)]
    overrides: Option<PathBuf>,

    /// Emit JSON log lines.
    #[arg(long, default_value_t = false)]
    json_logs: bool,
}

const DEFAULT_LOG_FILTER: &str = "sentiment_desk=info,signal_engine=info,candidate_engine=info,\
decision_engine=info,position_engine=info,execution_engine=info,llm_client=info,warn";

fn init_logging(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn load_config(path: &Path) -> Result<AppConfig> {
    if path.exists() {
        return AppConfig::load(path).with_context(|| format!("loading {}", path.display()));
    }
    warn!("{} not found, using defaults", path.display());
    let config = AppConfig::default();
    config.validate()?;
    Ok(config)
}

fn build_judge(config: &AppConfig) -> Result<Option<Arc<dyn LlmJudge>>> {
    let llm = &config.llm;
    if !llm.enabled {
        info!("judge disabled by config");
        return Ok(None);
    }
    if llm.provider != "anthropic" {
        warn!("unsupported judge provider {:?}; running without a judge", llm.provider);
        return Ok(None);
    }
    let Ok(api_key) = std::env::var("ANTHROPIC_API_KEY") else {
        warn!("ANTHROPIC_API_KEY not set; running without a judge");
        return Ok(None);
    };
    let judge = AnthropicJudge::new(
        api_key,
        llm.model.clone(),
        llm.timeout_ms,
        llm.max_retries,
        llm.requests_per_minute,
    )?;
    let judge: Arc<dyn LlmJudge> = Arc::new(judge);
    Ok(Some(judge))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.json_logs);

    let config = load_config(&cli.config)?;
    if cli.check_config {
        println!("{} is valid", cli.config.display());
        return Ok(());
    }
    info!(
        "Loaded configuration: shadow_mode={} crypto={} options={}",
        config.trading.shadow_mode, config.trading.crypto_enabled, config.trading.options_enabled
    );

    let replay_path = cli
        .replay
        .clone()
        .or_else(|| config.replay.path.as_ref().map(PathBuf::from));
    let Some(replay_path) = replay_path else {
        bail!("no data source: pass --replay or set replay.path");
    };
    let feed = Arc::new(
        ReplayFeed::load(&replay_path)
            .with_context(|| format!("reading replay file {}", replay_path.display()))?,
    );
    let broker = Arc::new(PaperBroker::new(config.trading.paper_cash).with_market(feed.clone()));

    let trades_dir = resolve_trades_dir();
    let journal = TradeJournal::open(trades_dir.clone())?;
    let store = StateStore::new(resolve_state_path(&trades_dir));

    let collaborators = Collaborators {
        market: feed.clone(),
        broker,
        social: feed,
        judge: build_judge(&config)?,
        notifier: Arc::new(LogNotifier),
    };
    let mut bot = Bot::new(config, collaborators, store, journal, Utc::now())?;
    if let Some(enabled) = cli.enabled {
        bot.set_enabled(enabled);
    }
    if let Some(path) = &cli.overrides {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading overrides {}", path.display()))?;
        let overrides: ConfigOverrides = serde_json::from_str(&raw)?;
        bot.set_overrides(overrides)?;
    }
    info!(
        "effective config: shadow_mode={} max_positions={} min_equity_confidence={:.2}",
        bot.config().trading.shadow_mode,
        bot.config().risk.max_positions,
        bot.config().confidence.min_equity_confidence
    );
    let state = bot.state();
    info!(
        "state: enabled={} held={} judge budget left={} journal={}",
        state.enabled,
        state.positions.entries().count(),
        state.budgets.get(BudgetKind::Judge).remaining(),
        bot.journal.current_file().display()
    );

    if cli.once {
        let report = bot.wake(Utc::now()).await;
        info!(
            "wake done: {} entries, {} exits, failed steps {:?}",
            report.entries, report.exits, report.failed_steps
        );
        return Ok(());
    }
    bot.run().await;
    Ok(())
}
