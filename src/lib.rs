pub mod cli;
pub mod history;
pub mod llm;
pub mod logging;
pub mod markdown;
pub mod models;
pub mod relay;
pub mod server;

use cli::Args;
use log::info;
use relay::ChatRelay;
use server::Server;
use std::error::Error;
use std::sync::Arc;

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    info!("--- Core Configuration ---");
    info!("Chat Endpoint: {}", args.chat_base_url);
    info!("Chat Model: {}", args.chat_model);
    info!("Temperature: {}", args.temperature);
    match args.request_timeout_secs {
        Some(secs) => info!("Request Timeout: {}s", secs),
        None => info!("Request Timeout: none"),
    }
    info!("Max History: {}", args.max_history);
    info!("Trim Policy: {}", args.trim_policy);
    info!("Persistence: {} ({})", args.persist_strategy, args.conversations_path);
    info!("-------------------------");

    let relay = Arc::new(ChatRelay::from_args(&args).await?);
    let server = Server::new(args.telegram_token.clone(), relay);
    server.run().await?;

    Ok(())
}
