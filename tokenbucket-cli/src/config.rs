//! Driver configuration and CLI argument parsing
//!
//! Every option can be given on the command line or through an environment
//! variable with the `TOKENBUCKET_` prefix.
//!
//! # Configuration Priority
//!
//! 1. CLI arguments (highest priority)
//! 2. Environment variables
//! 3. Default values (lowest priority)
//!
//! # Example Usage
//!
//! ```bash
//! # 50 tokens per second, doubled after 2 seconds
//! tokenbucket-cli --rate 50
//!
//! # Eight consumers waiting at most 10ms for a token, no rate change
//! export TOKENBUCKET_CONSUMERS=8
//! tokenbucket-cli --rate 200 --timeout-ms 10 --no-swap
//! ```

use anyhow::{Result, anyhow};
use clap::Parser;
use serde::Deserialize;
use std::time::Duration;

/// Configuration of a driver run
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Rate of the first limiter (tokens per second)
    pub rate: u32,
    /// Rate change performed during the run, if any
    pub swap: Option<SwapConfig>,
    /// Total run time
    pub duration: Duration,
    /// Number of concurrent consumer tasks
    pub consumers: usize,
    /// Timeout passed to each `get_token` call (zero blocks)
    pub timeout: Duration,
    /// Pause after a timed out `get_token` call
    pub backoff: Duration,
    /// Print the final report as JSON
    pub json: bool,
    /// Logging level (error, warn, info, debug, trace)
    pub log_level: String,
}

/// Rate change: replace the limiter with a new one partway through the run
#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
pub struct SwapConfig {
    /// Rate of the replacement limiter (tokens per second)
    pub rate: u32,
    /// Time from start until the replacement
    pub after: Duration,
}

/// Command-line arguments for the driver
///
/// All arguments can also be set via environment variables with the
/// TOKENBUCKET_ prefix. CLI arguments take precedence over environment variables.
#[derive(Parser, Debug)]
#[command(
    name = "tokenbucket-cli",
    about = "Drive a token bucket rate limiter from concurrent consumers",
    long_about = "Runs consumer tasks against a token bucket and reports how many tokens each phase admitted.\n\nBy default the limiter is replaced by one with double the rate partway through the run.\n\nEnvironment variables with TOKENBUCKET_ prefix are supported. CLI arguments take precedence over environment variables."
)]
pub struct Args {
    #[arg(
        long,
        value_name = "N",
        help = "Tokens per second (0 is treated as 1)",
        default_value_t = 50,
        env = "TOKENBUCKET_RATE"
    )]
    pub rate: u32,

    // Rate change
    #[arg(
        long,
        value_name = "N",
        help = "Tokens per second after the swap [default: twice --rate]",
        env = "TOKENBUCKET_SWAP_RATE"
    )]
    pub swap_rate: Option<u32>,
    #[arg(
        long,
        value_name = "SECS",
        help = "Seconds before the limiter is replaced",
        default_value_t = 2,
        env = "TOKENBUCKET_SWAP_AFTER_SECS"
    )]
    pub swap_after_secs: u64,
    #[arg(
        long,
        help = "Keep the first limiter for the whole run",
        env = "TOKENBUCKET_NO_SWAP"
    )]
    pub no_swap: bool,

    // Consumers
    #[arg(
        long,
        value_name = "SECS",
        help = "Total run time in seconds",
        default_value_t = 4,
        env = "TOKENBUCKET_DURATION_SECS"
    )]
    pub duration_secs: u64,
    #[arg(
        long,
        value_name = "N",
        help = "Number of concurrent consumers",
        default_value_t = 2,
        env = "TOKENBUCKET_CONSUMERS"
    )]
    pub consumers: usize,
    #[arg(
        long,
        value_name = "MS",
        help = "Timeout for each token request in milliseconds (0 blocks)",
        default_value_t = 0,
        env = "TOKENBUCKET_TIMEOUT_MS"
    )]
    pub timeout_ms: u64,
    #[arg(
        long,
        value_name = "MS",
        help = "Pause after a timed out request in milliseconds",
        default_value_t = 100,
        env = "TOKENBUCKET_BACKOFF_MS"
    )]
    pub backoff_ms: u64,

    // General options
    #[arg(long, help = "Print the report as JSON", env = "TOKENBUCKET_JSON")]
    pub json: bool,
    #[arg(
        long,
        value_name = "LEVEL",
        help = "Log level: error, warn, info, debug, trace",
        default_value = "info",
        env = "TOKENBUCKET_LOG_LEVEL"
    )]
    pub log_level: String,

    // Utility options
    #[arg(
        long,
        help = "List all environment variables and exit",
        action = clap::ArgAction::SetTrue
    )]
    pub list_env_vars: bool,
}

impl Config {
    /// Build configuration from environment variables and CLI arguments
    ///
    /// # Errors
    ///
    /// Returns an error if the resulting configuration is invalid.
    pub fn from_env_and_args() -> Result<Self> {
        let args = Args::parse();

        if args.list_env_vars {
            Self::print_env_vars();
            std::process::exit(0);
        }

        Self::from_args(args)
    }

    /// Build and validate configuration from already parsed arguments
    pub fn from_args(args: Args) -> Result<Self> {
        let swap = if args.no_swap {
            None
        } else {
            Some(SwapConfig {
                rate: args
                    .swap_rate
                    .unwrap_or_else(|| args.rate.max(1).saturating_mul(2)),
                after: Duration::from_secs(args.swap_after_secs),
            })
        };

        let config = Config {
            rate: args.rate,
            swap,
            duration: Duration::from_secs(args.duration_secs),
            consumers: args.consumers,
            timeout: Duration::from_millis(args.timeout_ms),
            backoff: Duration::from_millis(args.backoff_ms),
            json: args.json,
            log_level: args.log_level,
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if there are no consumers, the run has no duration,
    /// or the swap would happen after the run ends.
    fn validate(&self) -> Result<()> {
        if self.consumers == 0 {
            return Err(anyhow!("At least one consumer is required"));
        }

        if self.duration.is_zero() {
            return Err(anyhow!("Run duration must be at least one second"));
        }

        if let Some(swap) = self.swap.filter(|swap| swap.after >= self.duration) {
            return Err(anyhow!(
                "Swap after {}s does not happen within a {}s run. Use --no-swap to keep one limiter",
                swap.after.as_secs(),
                self.duration.as_secs()
            ));
        }

        Ok(())
    }

    /// Print all available environment variables
    pub fn print_env_vars() {
        println!("TokenBucket Environment Variables");
        println!("=================================");
        println!();
        println!("All CLI arguments can be set via environment variables.");
        println!("CLI arguments take precedence over environment variables.");
        println!();
        println!("Limiter:");
        println!("  TOKENBUCKET_RATE=<n>                Tokens per second [default: 50]");
        println!("  TOKENBUCKET_SWAP_RATE=<n>           Tokens per second after the swap [default: 2 x rate]");
        println!("  TOKENBUCKET_SWAP_AFTER_SECS=<secs>  Seconds before the swap [default: 2]");
        println!("  TOKENBUCKET_NO_SWAP=true            Keep the first limiter for the whole run");
        println!();
        println!("Consumers:");
        println!("  TOKENBUCKET_DURATION_SECS=<secs>    Total run time [default: 4]");
        println!("  TOKENBUCKET_CONSUMERS=<n>           Concurrent consumers [default: 2]");
        println!("  TOKENBUCKET_TIMEOUT_MS=<ms>         Token request timeout, 0 blocks [default: 0]");
        println!("  TOKENBUCKET_BACKOFF_MS=<ms>         Pause after a timeout [default: 100]");
        println!();
        println!("General:");
        println!("  TOKENBUCKET_JSON=true               Print the report as JSON");
        println!("  TOKENBUCKET_LOG_LEVEL=<level>       Log level: error, warn, info, debug, trace [default: info]");
    }
}
