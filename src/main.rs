use anyhow::{Context, Result};
use clap::Parser;
use countrylayer::config::{ConfigOverrides, CountryLayerConfig};
use countrylayer::country::{CountryLookup, CountryService, InMemoryDirectory};
use serde::Serialize;

/// countrylayer - country data lookup
///
/// Fetch and validate country records from the countrylayer API.
///
/// The API key is read from --api-key or the COUNTRY_LAYER_API_KEY
/// environment variable.
///
/// Examples:
///   countrylayer lookup France                          # Records for France
///   countrylayer retrieve 2 --country France --country Spain
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// API base URL (defaults to https://api.countrylayer.com/v2/)
    #[arg(
        long = "base-url",
        env = "COUNTRY_LAYER_BASE_URL",
        value_name = "URL",
        global = true
    )]
    pub base_url: Option<String>,

    /// API access key
    #[arg(
        long = "api-key",
        env = "COUNTRY_LAYER_API_KEY",
        hide_env_values = true,
        value_name = "KEY",
        global = true
    )]
    pub api_key: Option<String>,

    /// Request timeout in seconds, 0 disables it
    #[arg(long = "timeout", value_name = "SECS", global = true)]
    pub timeout: Option<u64>,

    /// Total attempts for server and network failures
    #[arg(long = "attempts", value_name = "N", global = true)]
    pub attempts: Option<usize>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Look up a country by name
    Lookup(LookupArgs),

    /// Retrieve a locally known country together with its records
    Retrieve(RetrieveArgs),
}

#[derive(clap::Args, Debug)]
pub struct LookupArgs {
    /// Country name, e.g. "France"
    #[arg(value_name = "NAME")]
    pub name: String,

    /// Print JSON on a single line
    #[arg(long)]
    pub compact: bool,
}

#[derive(clap::Args, Debug)]
pub struct RetrieveArgs {
    /// Id of the country, assigned from 1 in the order of --country.
    /// A repeated name keeps the id of its first occurrence.
    #[arg(value_name = "ID")]
    pub id: u64,

    /// Known country names
    #[arg(long = "country", value_name = "NAME", required = true)]
    pub countries: Vec<String>,

    /// Print JSON on a single line
    #[arg(long)]
    pub compact: bool,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            base_url: self.base_url.clone(),
            api_key: self.api_key.clone(),
            timeout_secs: self.timeout,
            max_attempts: self.attempts,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();
    let runtime = countrylayer::runtime::RealRuntime;
    let config = CountryLayerConfig::resolve(&runtime, cli.overrides())?;

    match cli.command {
        Commands::Lookup(args) => lookup(&config, &args).await?,
        Commands::Retrieve(args) => retrieve(&config, args).await?,
    }
    Ok(())
}

async fn lookup(config: &CountryLayerConfig, args: &LookupArgs) -> Result<()> {
    let client = config.build_client()?;
    let records = client
        .get_country_by_name(&args.name)
        .await
        .with_context(|| format!("Failed to look up country {:?}", args.name))?;
    print_json(&records, args.compact)
}

async fn retrieve(config: &CountryLayerConfig, args: RetrieveArgs) -> Result<()> {
    let directory: InMemoryDirectory = args.countries.into_iter().collect();
    let service = CountryService::new(directory, config.build_client()?);
    let details = service
        .retrieve_country(args.id)
        .await
        .with_context(|| format!("Failed to retrieve country {}", args.id))?;
    print_json(&details, args.compact)
}

fn print_json<T: Serialize>(value: &T, compact: bool) -> Result<()> {
    let json = if compact {
        serde_json::to_string(value)?
    } else {
        serde_json::to_string_pretty(value)?
    };
    println!("{}", json);
    Ok(())
}
