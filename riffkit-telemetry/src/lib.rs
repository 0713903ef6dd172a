//! # RiffKit Telemetry
//!
//! Structured logging for the relay and the bot binary.
//!
//! ## Usage
//!
//! ```rust
//! use riffkit_telemetry::{LogFormat, init_telemetry, info};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     init_telemetry("riffkit", LogFormat::Pretty)?;
//!     info!("relay starting");
//!     Ok(())
//! }
//! ```

pub mod init;
pub mod spans;

// Re-export tracing macros for convenience
pub use tracing::{Span, debug, error, info, instrument, trace, warn};

pub use init::{LogFormat, init_telemetry};
pub use spans::*;
