use std::fs;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use stackpath_dns::dns::fixture::FixtureApi;
use stackpath_dns::dns::stackpath::StackPathApi;
use stackpath_dns::dns::DnsApi;
use stackpath_dns::endpoint::Changes;
use stackpath_dns::provider::StackPathProvider;
use stackpath_dns::settings::{LogFormat, Settings};
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(version, about = "Apply external-dns style changes to StackPath DNS")]
struct Args {
    /// Config file; defaults to ./config.toml, then /etc/stackpath-dns/config.toml
    #[arg(short, long)]
    config: Option<String>,

    /// Log intended changes without applying them
    #[arg(long)]
    dry_run: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the records currently held in the managed zones
    Records,
    /// Apply a JSON change set
    Apply { changes: PathBuf },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut cfg = Settings::new(args.config.as_deref())?;
    cfg.dry_run |= args.dry_run;

    let builder = tracing_subscriber::fmt().with_max_level(cfg.log_level);
    match cfg.log_format {
        LogFormat::Full => tracing::subscriber::set_global_default(builder.finish())?,
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish())?,
    }

    match &cfg.api {
        Some(api) => {
            let client = StackPathApi::new(
                api.url.as_str(),
                api.stack_id.clone(),
                api.credentials.clone(),
                api.timeout,
            )
            .await?;
            run(StackPathProvider::new(client, cfg.provider_config()), args.command).await
        }
        None => {
            warn!("test mode: serving the built-in fixture instead of StackPath");
            run(
                StackPathProvider::new(FixtureApi::stock(), cfg.provider_config()),
                args.command,
            )
            .await
        }
    }
}

async fn run<A: DnsApi>(
    provider: StackPathProvider<A>,
    command: Command,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::Records => {
            for endpoint in provider.records().await? {
                println!("{endpoint}");
            }
        }
        Command::Apply { changes } => {
            let changes: Changes = serde_json::from_str(&fs::read_to_string(&changes)?)?;
            if changes.is_empty() {
                info!("no changes to apply");
                return Ok(());
            }

            provider
                .apply_changes_until(&changes, tokio::signal::ctrl_c())
                .await?;
        }
    }

    Ok(())
}
