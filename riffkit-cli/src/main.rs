mod bot;
mod cli;
mod config;
mod console;
mod play;
mod room;

use anyhow::{Result, anyhow};
use bot::Bot;
use clap::Parser;
use cli::{Cli, Commands};
use config::{BotConfig, LiveKitCredentials};
use riffkit_relay::RoomId;

#[tokio::main]
async fn main() -> Result<()> {
    // .env first so clap's env fallbacks see it too
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    riffkit_telemetry::init_telemetry("riffkit", cli.log_format)
        .map_err(|e| anyhow!("failed to initialise logging: {e}"))?;

    let config = BotConfig::from_env()?.with_overrides(&cli.relay)?;

    match cli.command {
        Commands::Console => {
            let mut bot = Bot::start(&config, cli.relay.dry_run).await?;
            let chat_room = RoomId::from(config.chat_room.as_str());
            let result = console::run_console(&bot.relay, &mut bot.notices, chat_room).await;
            bot.close().await;
            result
        }
        Commands::Play { reference } => {
            let mut bot = Bot::start(&config, cli.relay.dry_run).await?;
            let chat_room = RoomId::from(config.chat_room.as_str());
            let result = play::play_once(&bot.relay, &mut bot.notices, chat_room, &reference).await;
            bot.close().await;
            result
        }
        Commands::ListenerUrl { identity, name } => {
            let creds = LiveKitCredentials::from_env()?;
            println!("{}", room::listener_link(&creds, &config.room, &identity, &name)?);
            Ok(())
        }
    }
}
