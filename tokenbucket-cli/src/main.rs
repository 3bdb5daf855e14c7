mod config;
mod driver;

use anyhow::Result;

use crate::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse configuration from environment variables and CLI arguments
    let config = Config::from_env_and_args()?;

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("tokenbucket={}", config.log_level).parse()?)
                .add_directive(format!("tokenbucket_cli={}", config.log_level).parse()?),
        )
        .init();

    tracing::info!(
        "Starting {} consumers against {} tokens/s for {}s",
        config.consumers,
        config.rate,
        config.duration.as_secs()
    );
    if let Some(swap) = &config.swap {
        tracing::info!(
            "Limiter will be replaced after {}s with {} tokens/s",
            swap.after.as_secs(),
            swap.rate
        );
    }

    let report = driver::run(&config).await?;

    if config.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{report}");
    }

    Ok(())
}
