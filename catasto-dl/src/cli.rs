//! Définition et implémentation des commandes CLI
//!
//! - `fetch` : bbox -> GeoJSON
//! - `check-credentials` : requête de test sur une petite bbox

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use zornade::{BoundingBox, SchemaMapper, WGS84_EPSG};

use catasto_dl::api::CredentialCheck;
use catasto_dl::{
    ApiConfig, Credentials, GeoJsonSink, HttpParcelApi, PipelineConfig, PipelineOrchestrator,
    RunStatus, SchemaConfig,
};

#[derive(Subcommand)]
pub enum Commands {
    /// Download parcels inside a bounding box to GeoJSON
    Fetch(FetchArgs),

    /// Check API credentials with a small test query
    CheckCredentials(CredentialArgs),
}

#[derive(Args)]
pub struct CredentialArgs {
    /// RapidAPI key (défaut : env ZORNADE_API_KEY)
    #[arg(long)]
    pub api_key: Option<String>,

    /// Bearer token (défaut : env ZORNADE_BEARER_TOKEN)
    #[arg(long)]
    pub bearer_token: Option<String>,
}

#[derive(Args)]
pub struct FetchArgs {
    /// Bounding box: min_x,min_y,max_x,max_y
    #[arg(long, value_parser = parse_bounds, allow_hyphen_values = true)]
    pub bbox: [f64; 4],

    /// SRID of the bounding box coordinates
    #[arg(long, default_value_t = WGS84_EPSG)]
    pub bbox_srid: u32,

    /// Target SRID of the output features
    #[arg(long, default_value_t = WGS84_EPSG)]
    pub srid: u32,

    /// Output GeoJSON file
    #[arg(short, long)]
    pub output: PathBuf,

    /// Attribute schema preset (base/full) or path to a JSON schema
    #[arg(long, default_value = "base")]
    pub schema: String,

    /// Parcels enriched per batch (1-25, adaptive by default)
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Tolerated fraction of failed parcels before the run fails
    #[arg(long, default_value_t = catasto_dl::config::DEFAULT_ERROR_TOLERANCE)]
    pub tolerance: f64,

    /// Write the run report as JSON
    #[arg(long)]
    pub report: Option<PathBuf>,

    #[command(flatten)]
    pub credentials: CredentialArgs,
}

/// Parse `min_x,min_y,max_x,max_y`
fn parse_bounds(s: &str) -> Result<[f64; 4], String> {
    let values = s
        .split(',')
        .map(|v| v.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("invalid number in bbox: {e}"))?;

    <[f64; 4]>::try_from(values)
        .map_err(|v| format!("expected 4 comma-separated values, got {}", v.len()))
}

fn resolve_credentials(args: CredentialArgs) -> Credentials {
    Credentials::from_env().with_overrides(args.api_key, args.bearer_token)
}

/// Exécute la commande fetch
pub async fn cmd_fetch(args: FetchArgs, cancel: CancellationToken) -> Result<()> {
    let [min_x, min_y, max_x, max_y] = args.bbox;
    let bbox = BoundingBox::new(min_x, min_y, max_x, max_y, args.bbox_srid);

    let schema = SchemaConfig::resolve(&args.schema)?;
    info!(schema = %schema.version, fields = schema.fields.len(), "Attribute schema");
    let mapper = SchemaMapper::new(schema);

    let api_config = ApiConfig::from_env();
    let credentials = resolve_credentials(args.credentials);
    info!(api_key = %credentials.masked_key(), endpoint = %api_config.endpoint(), "API");

    let api = HttpParcelApi::new(&api_config, &credentials)?;
    let config = PipelineConfig {
        target_epsg: args.srid,
        batch_size: args.batch_size,
        error_tolerance: args.tolerance,
        ..PipelineConfig::default()
    };

    let mut sink = GeoJsonSink::create(&args.output, args.srid)?;
    let mut orchestrator = PipelineOrchestrator::new(&api, config, api_config.page_size, mapper);
    let report = orchestrator
        .run(bbox, &credentials, &mut sink, &cancel)
        .await;

    report.display();
    if let Some(path) = &args.report {
        save_report(&report, path)?;
    }

    match report.status {
        RunStatus::Failed => bail!("Fetch failed: {}", report.message),
        RunStatus::Cancelled => {
            warn!(output = %args.output.display(), "Run cancelled, output is incomplete");
            Ok(())
        }
        _ => {
            info!(
                output = %args.output.display(),
                features = sink.count(),
                "GeoJSON written"
            );
            Ok(())
        }
    }
}

fn save_report(report: &catasto_dl::RunReport, path: &Path) -> Result<()> {
    report
        .save_to_file(path)
        .context(format!("Failed to write report: {}", path.display()))?;
    info!(path = %path.display(), "Report saved");
    Ok(())
}

/// Exécute la commande check-credentials
pub async fn cmd_check_credentials(args: CredentialArgs) -> Result<()> {
    let credentials = resolve_credentials(args);
    if let Err(message) = credentials.validate() {
        bail!("Cannot check credentials: {}", message);
    }

    let api_config = ApiConfig::from_env();
    let api = HttpParcelApi::new(&api_config, &credentials)?;
    info!(api_key = %credentials.masked_key(), "Checking credentials");

    let check = api.check_credentials().await;
    println!("{}", check);
    match check {
        CredentialCheck::Valid { .. } => Ok(()),
        CredentialCheck::RateLimited => {
            warn!("Rate limited during the check, retry later");
            Ok(())
        }
        other => bail!("Credential check failed: {}", other),
    }
}
