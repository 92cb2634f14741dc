use lot_size_bot::{
    api::start_server, calculator::LotSizeCalculator, config::BotConfig, dialogue::DialogueEngine,
    state::build_session_store, telegram::TelegramClient, Bot,
};
use std::sync::Arc;
use tracing::{info, warn};
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

    info!("Optimal Lot Size Bot - webhook server");
    info!("Port: {}", config.port);

    let client = Arc::new(TelegramClient::new(&config.telegram_api_url, &config.bot_token)?);
    let store = build_session_store(config.database_url.as_deref(), config.session_ttl);
    let engine = DialogueEngine::new(LotSizeCalculator::new(config.calculator.clone()));

    let webhook_url = config.webhook_url();
    if let Err(e) = client
        .set_webhook(&webhook_url, config.webhook_secret.as_deref())
        .await
    {
        warn!(url = %webhook_url, "Webhook registration failed, serving anyway: {}", e);
    }

    let bot = Arc::new(Bot::new(engine, store, client, config.follow_up_delay));

    start_server(bot, config.webhook_secret.clone(), config.port).await?;

    Ok(())
}
