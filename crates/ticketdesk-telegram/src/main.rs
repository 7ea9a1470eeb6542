//! ticketdesk service binary.
//!
//! Start everything with:
//! ```bash
//! TICKETDESK_USER_BOT_TOKEN=xxx TICKETDESK_TECH_GROUP_ID=-100123 cargo run -p ticketdesk-telegram
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use teloxide::Bot;
use tokio::sync::watch;
use tokio::time::interval;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ticketdesk_api::{ApiConfig, AppState};
use ticketdesk_core::config::{default_config_path, FaqSeed};
use ticketdesk_core::{
    blob, BotRole, CleanupJob, Engine, ExpiringCodes, FfmpegTranscoder, HelpdeskConfig,
    SessionSigner, CLEANUP_INTERVAL,
};
use ticketdesk_persistence::{FaqStore, FileTicketStore, TechnicianStore};
use ticketdesk_telegram::{BotContext, HelpdeskBot, Result, TelegramGateway};

/// How often expired link codes are swept.
const LINK_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// ticketdesk - Telegram help desk with a web dashboard API
#[derive(Parser, Debug)]
#[command(name = "ticketdesk")]
#[command(about = "Telegram support-ticket bots and dashboard API")]
struct Args {
    /// Config file (default: ~/.ticketdesk/config.toml)
    #[arg(short, long, env = "TICKETDESK_CONFIG")]
    config: Option<PathBuf>,

    /// Do not start the HTTP API
    #[arg(long)]
    no_api: bool,

    /// Verbose logging (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env.local or .env before parsing so clap sees the variables
    let _ = dotenvy::from_filename(".env.local").or_else(|_| dotenvy::dotenv());
    let args = Args::parse();

    let filter = match args.verbose {
        0 => "ticketdesk=info,ticketdesk_core=info,ticketdesk_api=info,ticketdesk_telegram=info,teloxide=warn",
        1 => "ticketdesk=debug,ticketdesk_core=debug,ticketdesk_api=debug,ticketdesk_telegram=debug,teloxide=info",
        2 => "ticketdesk=trace,ticketdesk_core=trace,ticketdesk_api=trace,ticketdesk_telegram=trace,teloxide=debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config_path = args.config.unwrap_or_else(default_config_path);
    let config = HelpdeskConfig::load(&config_path)?;
    let config = Arc::new(config);

    let store = Arc::new(FileTicketStore::open(config.data_dir()).await?);
    let technicians = Arc::new(TechnicianStore::open(config.data_dir())?);
    let faqs = Arc::new(FaqStore::open(config.data_dir())?);
    faqs.seed(config.faqs.iter().map(FaqSeed::to_faq).collect())
        .await?;
    let blobs = blob::from_config(&config.storage, &config.blob_dir()).await?;

    let user_bot = Bot::new(config.bot.user_token.clone());
    let tech_bot = if config.has_separate_tech_bot() {
        Bot::new(config.tech_token().to_string())
    } else {
        user_bot.clone()
    };

    let mut engine = Engine::new(
        Arc::clone(&config),
        store,
        technicians,
        blobs,
        Arc::new(TelegramGateway::new(user_bot.clone())),
        Arc::new(TelegramGateway::new(tech_bot.clone())),
    )
    .with_faqs(faqs);
    let ffmpeg = FfmpegTranscoder::default();
    if ffmpeg.is_available().await {
        engine = engine.with_transcoder(Arc::new(ffmpeg));
    } else {
        warn!("ffmpeg not found, browser voice notes will be sent as audio");
    }
    let engine = Arc::new(engine);
    let link_codes = Arc::new(ExpiringCodes::default());

    if !args.no_api {
        let api_config = ApiConfig::from_settings(&config.api);
        let sessions = Arc::new(SessionSigner::from_config(&config.auth));
        let state = AppState::new(
            api_config.clone(),
            Arc::clone(&engine),
            Arc::clone(&link_codes),
            sessions,
        );
        tokio::spawn(async move {
            if let Err(e) = ticketdesk_api::serve(api_config, state).await {
                tracing::error!(error = %e, "API server stopped");
            }
        });
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut cleanup = CleanupJob::new(Arc::clone(&engine), shutdown_rx.clone());
    let cleanup_task = tokio::spawn(async move { cleanup.run(CLEANUP_INTERVAL).await });

    let sweep_codes = Arc::clone(&link_codes);
    let mut sweep_shutdown = shutdown_rx;
    tokio::spawn(async move {
        let mut ticker = interval(LINK_SWEEP_INTERVAL);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = sweep_codes.sweep();
                    if removed > 0 {
                        tracing::debug!(removed, "Swept expired link codes");
                    }
                }
                _ = sweep_shutdown.changed() => break,
            }
        }
    });

    if config.has_separate_tech_bot() {
        let user = HelpdeskBot::new(
            user_bot,
            BotContext::new(BotRole::User, Arc::clone(&engine), Arc::clone(&link_codes)),
        );
        let tech = HelpdeskBot::new(
            tech_bot,
            BotContext::new(BotRole::Technician, Arc::clone(&engine), Arc::clone(&link_codes)),
        );
        let user_name = user.get_me().await?;
        let tech_name = tech.get_me().await?;
        info!(user_bot = %user_name, tech_bot = %tech_name, "Bots initialized");
        tokio::join!(user.run(), tech.run());
    } else {
        let bot = HelpdeskBot::new(
            user_bot,
            BotContext::new(BotRole::Shared, Arc::clone(&engine), Arc::clone(&link_codes)),
        );
        let name = bot.get_me().await?;
        info!(bot = %name, "Bot initialized (shared mode)");
        bot.run().await;
    }

    let _ = shutdown_tx.send(true);
    if let Err(e) = cleanup_task.await {
        warn!(error = %e, "Cleanup task ended abnormally");
    }
    info!("Shutdown complete");
    Ok(())
}
