//! CLI command definitions and handlers

use clap::{Args, Subcommand};

use crate::core::config::AppConfig;
use crate::core::models::GenerationOptions;

/// Commands for the blessing service
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start HTTP API server
    Server {
        /// Bind address (default: HOST or 0.0.0.0)
        #[arg(long)]
        host: Option<String>,

        /// Listen port (default: PORT or 3000)
        #[arg(short, long)]
        port: Option<u16>,

        /// Development mode: rate limiting falls back to memory when the KV store fails
        #[arg(long)]
        debug: bool,
    },

    /// Generate one blessing and print it
    Generate(BlessingArgs),

    /// Print the prompt that would be sent, without calling any provider
    Prompt(BlessingArgs),
}

/// Blessing request fields shared by `generate` and `prompt`
#[derive(Args, Debug, Clone)]
pub struct BlessingArgs {
    /// Occasion, e.g. 生日
    #[arg(short, long, default_value = "")]
    pub scenario: String,

    /// Recipient, e.g. 朋友
    #[arg(short, long, default_value = "")]
    pub target_person: String,

    /// Tone (default: 温馨)
    #[arg(long)]
    pub style: Option<String>,

    /// Festival
    #[arg(short, long, default_value = "")]
    pub festival: String,

    /// Free-text description for smart mode
    #[arg(short, long)]
    pub description: Option<String>,

    /// Use smart mode
    #[arg(long)]
    pub smart: bool,
}

impl From<BlessingArgs> for GenerationOptions {
    fn from(args: BlessingArgs) -> Self {
        GenerationOptions {
            scenario: args.scenario,
            festival: args.festival,
            target_person: args.target_person,
            style: args.style,
            custom_description: args.description,
            use_smart_mode: Some(args.smart),
        }
    }
}

/// Handle server command
pub async fn handle_server(
    mut config: AppConfig,
    host: Option<String>,
    port: Option<u16>,
    debug: bool,
) -> anyhow::Result<()> {
    use crate::server::api::run_server;
    use tracing::info;

    if debug {
        config.development = true;
    }
    if let Some(host) = host {
        config.host = host;
    }
    if let Some(port) = port {
        config.port = port;
    }

    info!("Starting HTTP server on {}:{}", config.host, config.port);
    println!("🚀 Server starting on http://{}:{}", config.host, config.port);
    println!(
        "📊 API Documentation: http://{}:{}/api-docs/openapi.json",
        config.host, config.port
    );

    run_server(config).await?;

    Ok(())
}

/// Handle generate command
pub async fn handle_generate(config: AppConfig, args: BlessingArgs) -> anyhow::Result<()> {
    use crate::core::client::BlessingGenerator;
    use crate::core::validation::{sanitize, validate};
    use std::time::Instant;
    use tracing::info;

    config.validate()?;

    let options = sanitize(&args.into());
    validate(&options)?;

    let generator = BlessingGenerator::from_config(&config)?;
    if !generator.is_configured() {
        anyhow::bail!("No AI provider configured, set PRIMARY_AI_API_KEY or FALLBACK_AI_API_KEY");
    }

    let start_time = Instant::now();
    let blessing = generator.generate(&options).await?;
    info!("Generated in {:.2}s", start_time.elapsed().as_secs_f64());

    println!("\n🎉 {}", blessing.trim());

    Ok(())
}

/// Handle prompt command
pub fn handle_prompt(args: BlessingArgs) -> anyhow::Result<()> {
    use crate::core::prompt::build_prompt;
    use crate::core::validation::{sanitize, validate};

    let options = sanitize(&args.into());
    if let Err(e) = validate(&options) {
        println!("⚠️  {}", e);
    }

    let mode = if options.is_smart_mode() { "smart" } else { "template" };
    println!("📝 Prompt ({} mode):\n", mode);
    println!("{}", build_prompt(&options));

    Ok(())
}
