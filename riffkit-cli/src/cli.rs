use clap::{Args, Parser, Subcommand};
use riffkit_relay::ResolveMode;
use riffkit_telemetry::LogFormat;

#[derive(Parser)]
#[command(name = "riffkit", version)]
#[command(about = "Relay web audio into a LiveKit room from chat commands", long_about = None)]
pub struct Cli {
    /// Log output format (pretty or json)
    #[arg(long, global = true, env = "RIFFKIT_LOG_FORMAT", default_value = "pretty")]
    pub log_format: LogFormat,

    #[command(flatten)]
    pub relay: RelayArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Flags that override the environment.
#[derive(Args, Debug, Default)]
pub struct RelayArgs {
    /// LiveKit room to join
    #[arg(long, global = true)]
    pub room: Option<String>,

    /// Decoder executable
    #[arg(long, global = true)]
    pub ffmpeg: Option<String>,

    /// Resolver executable
    #[arg(long = "yt-dlp", global = true)]
    pub yt_dlp: Option<String>,

    /// Hand the decoder a direct URL or pipe the resolver into it
    #[arg(long, global = true)]
    pub resolve_mode: Option<ResolveMode>,

    /// Seconds to wait for the resolver
    #[arg(long, global = true)]
    pub resolve_timeout: Option<u64>,

    /// Decode and pace audio without joining a room
    #[arg(long, global = true)]
    pub dry_run: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Join the room and take !play / !stop commands from stdin
    Console,

    /// Join the room, play one reference to the end, then leave
    Play {
        /// URL or search reference understood by the resolver
        reference: String,
    },

    /// Print a browser link for listening in the room
    ListenerUrl {
        /// Listener identity
        #[arg(long, default_value = "listener")]
        identity: String,

        /// Listener display name
        #[arg(long, default_value = "Listener")]
        name: String,
    },
}
