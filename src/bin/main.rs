use lot_size_bot::{
    calculator::LotSizeCalculator, config::BotConfig, dialogue::DialogueEngine,
    polling::run_polling, state::build_session_store, telegram::TelegramClient, Bot,
};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = BotConfig::from_env()?;

    info!("Optimal Lot Size Bot - long polling");

    let client = Arc::new(TelegramClient::new(&config.telegram_api_url, &config.bot_token)?);
    let store = build_session_store(config.database_url.as_deref(), config.session_ttl);
    let engine = DialogueEngine::new(LotSizeCalculator::new(config.calculator.clone()));

    let bot = Arc::new(Bot::new(engine, store, client.clone(), config.follow_up_delay));

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
        }
    };

    run_polling(bot, client, shutdown).await?;

    info!("Bot stopped");
    Ok(())
}
