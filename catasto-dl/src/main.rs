//! Point d'entrée CLI pour catasto-dl

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, EnvFilter};

mod cli;

use cli::Commands;

/// Télécharger les parcelles cadastrales italiennes enrichies vers GeoJSON
#[derive(Parser)]
#[command(name = "catasto-dl")]
#[command(author, version)]
#[command(about = "Télécharger les parcelles cadastrales italiennes enrichies (API Zornade) vers GeoJSON")]
struct Cli {
    /// Augmenter la verbosité (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Mode silencieux
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Charger .env avant tout
    catasto_dl::config::load_env();

    let cli = Cli::parse();

    init_logging(cli.verbose, cli.quiet);

    match cli.command {
        Commands::Fetch(args) => {
            info!(
                bbox = ?args.bbox,
                bbox_srid = args.bbox_srid,
                srid = args.srid,
                output = %args.output.display(),
                "Fetch parcels"
            );
            let cancel = CancellationToken::new();
            watch_ctrl_c(cancel.clone());
            cli::cmd_fetch(args, cancel).await?;
        }
        Commands::CheckCredentials(args) => {
            cli::cmd_check_credentials(args).await?;
        }
    }

    Ok(())
}

/// Ctrl-C annule le run en cours
fn watch_ctrl_c(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling");
            cancel.cancel();
        }
    });
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => Level::WARN,
        (_, 0) => Level::INFO,
        (_, 1) => Level::DEBUG,
        (_, _) => Level::TRACE,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .init();
}
