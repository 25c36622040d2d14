//! Command-line front end for `clawtopo-dem`.
//!
//! ```text
//! clawtopo fetch   case/domain.yaml [--source 3DEP|ESRI] [--username U --password P | --token T]
//! clawtopo resolve case/domain.yaml
//! clawtopo convert raster.tif grid.asc
//! ```

use clap::{Args, Parser, Subcommand};
use clawtopo_dem::{
    convert, default_case_dir, request_token, resolve, AuthToken, DataSource, DomainConfig,
    ExportQuery, Fetcher, ReqwestClient, TokenRequest, TopoError, TopoManager, TopoOutcome,
    DEFAULT_REFERER, DEFAULT_TOKEN_EXPIRATION_MINUTES, DEFAULT_TOKEN_PORTAL,
};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Errors surfaced by the runner.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// Failure inside the topography pipeline.
    #[error(transparent)]
    Topo(#[from] TopoError),

    /// ESRI was selected without a token or the credentials to get one.
    #[error("source {0} needs --token, or --username and --password to request one")]
    MissingCredentials(DataSource),
}

/// Prepare cached topography grids for simulation cases.
#[derive(Debug, Parser)]
#[command(name = "clawtopo", version, about)]
pub struct Cli {
    /// Increase log verbosity (-v debug, -vv trace). RUST_LOG overrides.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Runner subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Download and convert the topography for a domain unless it is cached.
    Fetch(FetchArgs),
    /// Print the download plan for a domain without touching the network.
    Resolve(DomainArgs),
    /// Convert a GeoTIFF to an ESRI ASCII grid.
    Convert {
        /// Input GeoTIFF.
        raster: PathBuf,
        /// Output ASCII grid.
        grid: PathBuf,
    },
}

/// Where to find the domain and the case it belongs to.
#[derive(Debug, Args)]
pub struct DomainArgs {
    /// Domain description (YAML).
    pub domain: PathBuf,

    /// Case directory the topography path is relative to [default: the domain file's directory].
    #[arg(long)]
    pub case_dir: Option<PathBuf>,
}

impl DomainArgs {
    fn case_dir(&self) -> PathBuf {
        match &self.case_dir {
            Some(dir) => dir.clone(),
            None => default_case_dir(&self.domain),
        }
    }
}

/// Options of the `fetch` command.
#[derive(Debug, Args)]
pub struct FetchArgs {
    #[command(flatten)]
    pub domain: DomainArgs,

    /// Elevation source: 3DEP (USGS, North America) or ESRI (World Elevation).
    #[arg(long, default_value = "3DEP", value_parser = parse_source)]
    pub source: DataSource,

    /// Pre-issued ArcGIS token for the ESRI source.
    #[arg(long, env = "ARCGIS_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// ArcGIS account used to request a token.
    #[arg(long, env = "ARCGIS_USERNAME")]
    pub username: Option<String>,

    /// ArcGIS password used to request a token.
    #[arg(long, env = "ARCGIS_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Token endpoint.
    #[arg(long, default_value = DEFAULT_TOKEN_PORTAL)]
    pub token_portal: String,

    /// Requested token lifetime in minutes.
    #[arg(long, default_value_t = DEFAULT_TOKEN_EXPIRATION_MINUTES)]
    pub token_expiration: u32,

    /// Referer the token is bound to.
    #[arg(long, default_value = DEFAULT_REFERER)]
    pub referer: String,
}

fn parse_source(s: &str) -> Result<DataSource, String> {
    s.parse::<DataSource>().map_err(|e| e.to_string())
}

/// Install the global tracing subscriber.
pub fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "warn,clawtopo_dem={0},clawtopo_runner={0}",
            level
        ))
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Execute a parsed command line.
pub fn run(cli: &Cli) -> Result<(), RunnerError> {
    match &cli.command {
        Command::Fetch(args) => fetch(args),
        Command::Resolve(args) => {
            print!("{}", describe_plan(args)?);
            Ok(())
        }
        Command::Convert { raster, grid } => {
            convert(raster, grid)?;
            println!("{}", grid.display());
            Ok(())
        }
    }
}

/// Human-readable plan for a domain, one `key: value` per line.
pub fn describe_plan(args: &DomainArgs) -> Result<String, RunnerError> {
    let domain = DomainConfig::from_yaml_file(&args.domain)?;
    let plan = resolve(&domain, &args.case_dir())?;
    let query = ExportQuery::new(&plan.extent, plan.resolution, DataSource::default())?;

    Ok(format!(
        "cache_file: {}\nraster_file: {}\nresolution: {}\nextent: {}\nsize: {} x {}\ncached: {}\n",
        plan.cache_path.display(),
        plan.raster_path().display(),
        plan.resolution,
        query.extent,
        query.size.width,
        query.size.height,
        plan.cache_path.is_file(),
    ))
}

/// Pick the token for `args.source`: a supplied one, a freshly requested one, or none.
fn obtain_token(
    client: &ReqwestClient,
    args: &FetchArgs,
) -> Result<Option<AuthToken>, RunnerError> {
    if !args.source.requires_token() {
        return Ok(None);
    }
    if let Some(token) = &args.token {
        return Ok(Some(AuthToken::new(token.clone())));
    }

    let (username, password) = match (&args.username, &args.password) {
        (Some(u), Some(p)) => (u.clone(), p.clone()),
        _ => return Err(RunnerError::MissingCredentials(args.source)),
    };

    let mut request = TokenRequest::new(&args.token_portal, username, password);
    request.expiration_minutes = args.token_expiration;
    request.referer = args.referer.clone();
    Ok(Some(request_token(client, &request)?))
}

fn fetch(args: &FetchArgs) -> Result<(), RunnerError> {
    let domain = DomainConfig::from_yaml_file(&args.domain.domain)?;
    let case_dir = args.domain.case_dir();

    let client = ReqwestClient::new()?;
    // Skip the token round-trip when the grid is already cached.
    let cached = clawtopo_dem::cache_path(&domain, &case_dir).is_file();
    let token = if cached {
        None
    } else {
        obtain_token(&client, args)?
    };

    let manager = TopoManager::with_fetcher(Fetcher::new(client)).with_source(args.source, token);
    let outcome = manager.ensure_topo(&case_dir, &domain)?;
    report(&outcome, &case_dir);
    Ok(())
}

fn report(outcome: &TopoOutcome, case_dir: &Path) {
    match outcome {
        TopoOutcome::Cached(_) => info!(case = %case_dir.display(), "Using cached topography"),
        TopoOutcome::Downloaded { report, .. } => info!(
            case = %case_dir.display(),
            bytes = report.bytes,
            attempts = report.attempts,
            waited_secs = report.waited.as_secs(),
            "Downloaded topography"
        ),
    }
    println!("{}", outcome.path().display());
}
