//! meshmeter - report the power draw of a Freifunk mesh as a virtual meter
//!
//! Usage:
//!   meshmeter                       # run once with built-in defaults
//!   meshmeter -c meshmeter.yaml     # run once with a config file
//!   meshmeter -f json               # print the summary as JSON

use anyhow::anyhow;
use argh::FromArgs;
use meshmeter::config::STORE_ENV;
use meshmeter::{Config, OutputFormat};

/// Estimate the mesh power draw, report it and print the CO2 emission
#[derive(FromArgs)]
struct Args {
    /// path to a YAML configuration file (optional, uses built-in defaults)
    #[argh(option, short = 'c')]
    config: Option<String>,

    /// output format: text, json (default: text)
    #[argh(option, short = 'f', default = "OutputFormat::Text")]
    format: OutputFormat,

    /// show version information
    #[argh(switch, short = 'V')]
    version: bool,
}

async fn run(args: &Args) -> anyhow::Result<String> {
    let config = match &args.config {
        Some(path) => Config::from_file(path)
            .map_err(|e| anyhow!("failed to load config from '{path}': {e}"))?,
        None => {
            log::debug!("No config file specified, using defaults");
            Config::default()
        }
    };
    let config = config.with_store_override(std::env::var(STORE_ENV).ok());

    let summary = meshmeter::run(&config).await?;
    let output = summary
        .render(args.format)
        .map_err(|e| anyhow!("failed to render summary: {e}"))?;
    Ok(output)
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .target(env_logger::Target::Stderr)
        .init();

    let args: Args = argh::from_env();

    if args.version {
        println!("meshmeter {}", env!("CARGO_PKG_VERSION"));
        return;
    }

    match run(&args).await {
        Ok(output) => println!("{output}"),
        Err(e) => {
            // each error already carries its cause in its message
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}
