//! Lookup commands

use clap::{Parser, Subcommand, ValueEnum};
use serde_json::Value;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::info;

use super::CliError;
use crate::batch::BatchOptions;
use crate::client::config::{API_KEY_ENV, DEFAULT_MAX_RETRIES, MAX_BATCH_SIZE};
use crate::query::queries_from_value;
use crate::report::Verbosity;
use crate::{ClientConfig, PlacekeyClient, Query, ResultRecord};

/// Most chunks allowed in flight at once
const MAX_CONCURRENCY: usize = 10;

/// Parse and validate concurrency value
fn parse_concurrency(s: &str) -> Result<usize, String> {
    let value: usize = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;

    if value == 0 {
        return Err("concurrency must be at least 1".to_string());
    }
    if value > MAX_CONCURRENCY {
        return Err(format!(
            "concurrency {value} exceeds maximum of {MAX_CONCURRENCY}"
        ));
    }
    Ok(value)
}

/// How results are printed
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Pretty-printed JSON
    Json,
    /// One `query_id<TAB>placekey` line per record
    Human,
}

/// Placekey lookup CLI
#[derive(Parser, Debug)]
#[command(name = "placekey")]
#[command(about = "Look up Placekeys for places, one at a time or in bulk", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Placekey API key
    #[arg(long, global = true, env = API_KEY_ENV, hide_env_values = true)]
    pub api_key: Option<String>,

    /// Total attempts per request before giving up (default: 20, range: 1-100)
    #[arg(long, global = true, default_value_t = DEFAULT_MAX_RETRIES, value_parser = clap::value_parser!(u32).range(1..=100))]
    pub max_retries: u32,

    /// Text appended to the User-Agent header
    #[arg(long, global = true)]
    pub user_agent_comment: Option<String>,

    /// API base URL; requests go to `<base>/placekey` and `<base>/placekeys`
    #[arg(long, global = true, hide = true)]
    pub base_url: Option<String>,

    /// Serve Prometheus metrics on this address (e.g. 127.0.0.1:9090)
    #[arg(long, global = true)]
    pub metrics_addr: Option<SocketAddr>,

    /// Output format (json or human)
    #[arg(long, global = true, value_enum, default_value = "json")]
    pub output_format: OutputFormat,
}

/// CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Look up a single place
    Lookup(LookupArgs),

    /// Look up a JSON file of places in batches
    Bulk(BulkArgs),
}

/// Single lookup arguments
#[derive(Parser, Debug)]
pub struct LookupArgs {
    /// Place as a JSON object, e.g. '{"latitude": 37.7371, "longitude": -122.44283}'
    #[arg(long)]
    pub query: String,

    /// Extra result fields, comma separated (e.g. address_placekey,building_placekey)
    #[arg(long, value_delimiter = ',')]
    pub fields: Vec<String>,

    /// Report retries
    #[arg(long, short)]
    pub verbose: bool,
}

/// Bulk lookup arguments
#[derive(Parser, Debug)]
pub struct BulkArgs {
    /// JSON file holding an array of places
    #[arg(long)]
    pub input: PathBuf,

    /// Write results here instead of stdout
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Extra result fields, comma separated
    #[arg(long, value_delimiter = ',')]
    pub fields: Vec<String>,

    /// Places per request (at most 100)
    #[arg(long, default_value_t = MAX_BATCH_SIZE)]
    pub batch_size: usize,

    /// Batches in flight at once (default: 1, max: 10)
    #[arg(long, default_value = "1", value_parser = parse_concurrency)]
    pub concurrency: usize,

    /// Report progress and retries
    #[arg(long, short)]
    pub verbose: bool,
}

impl Cli {
    /// Client configuration from the global flags
    pub fn client_config(&self) -> Result<ClientConfig, CliError> {
        let api_key = self
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                CliError::ConfigurationError(format!(
                    "no API key given, pass --api-key or set {API_KEY_ENV}"
                ))
            })?;

        let mut config = ClientConfig::new(api_key).with_max_retries(self.max_retries);
        if let Some(comment) = &self.user_agent_comment {
            config = config.with_user_agent_comment(comment.clone());
        }
        if let Some(base) = &self.base_url {
            let base = base.trim_end_matches('/');
            config = config.with_endpoints(format!("{base}/placekey"), format!("{base}/placekeys"));
        }
        Ok(config)
    }

    fn client(&self) -> Result<PlacekeyClient, CliError> {
        Ok(PlacekeyClient::new(self.client_config()?)?)
    }
}

fn fields_option(fields: &[String]) -> Option<&[String]> {
    (!fields.is_empty()).then_some(fields)
}

impl LookupArgs {
    /// Execute a single lookup and print the record
    pub async fn execute(&self, cli: &Cli) -> Result<(), CliError> {
        let value: Value = serde_json::from_str(&self.query)
            .map_err(|e| CliError::InvalidArgument(format!("--query is not valid JSON: {e}")))?;
        let query = Query::from_value(value)?;

        let client = cli.client()?;
        let record = client
            .lookup_placekey_with(
                query,
                fields_option(&self.fields),
                Verbosity::from_flag(self.verbose),
            )
            .await?;

        let records: Vec<ResultRecord> = record.into_iter().collect();
        println!("{}", render(&records, cli.output_format, true)?);
        Ok(())
    }
}

impl BulkArgs {
    /// Execute a bulk lookup and write the records
    pub async fn execute(&self, cli: &Cli) -> Result<(), CliError> {
        let content = tokio::fs::read_to_string(&self.input)
            .await
            .map_err(|source| CliError::Io {
                path: self.input.clone(),
                source,
            })?;
        let value: Value = serde_json::from_str(&content).map_err(|e| {
            CliError::InvalidArgument(format!("{} is not valid JSON: {e}", self.input.display()))
        })?;
        let queries = queries_from_value(value)?;
        let total = queries.len();

        let mut options = BatchOptions::default()
            .with_batch_size(self.batch_size)
            .with_concurrency(self.concurrency)
            .with_verbosity(Verbosity::from_flag(self.verbose));
        if let Some(fields) = fields_option(&self.fields) {
            options = options.with_fields(fields.to_vec());
        }

        let client = cli.client()?;
        let records = client.lookup_placekeys_with(queries, &options).await?;
        info!(
            queries = total,
            records = records.len(),
            errors = records.iter().filter(|r| r.is_error()).count(),
            "Bulk lookup finished"
        );

        let rendered = render(&records, cli.output_format, false)?;
        match &self.output {
            Some(path) => tokio::fs::write(path, rendered + "\n")
                .await
                .map_err(|source| CliError::Io {
                    path: path.clone(),
                    source,
                })?,
            None => println!("{rendered}"),
        }
        Ok(())
    }
}

/// Render records for printing
///
/// `single` prints a lone JSON record (or `null`) instead of an array.
fn render(records: &[ResultRecord], format: OutputFormat, single: bool) -> Result<String, CliError> {
    match format {
        OutputFormat::Json if single => Ok(serde_json::to_string_pretty(&records.first())?),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(records)?),
        OutputFormat::Human => Ok(records
            .iter()
            .map(|record| match (record.placekey(), record.error_value()) {
                (_, Some(error)) => format!("{}\terror: {}", record.query_id, plain(error)),
                (Some(placekey), None) => format!("{}\t{placekey}", record.query_id),
                (None, None) => format!("{}\t-", record.query_id),
            })
            .collect::<Vec<_>>()
            .join("\n")),
    }
}

fn plain(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
