use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use seqbins::batch::{BatchOptions, BatchRequest, run_batch};
use seqbins::catalog::{Catalog, SampleCatalog};
use seqbins::config::{ConfigLoader, ResolvedConfig};
use seqbins::domain::{Location, Principal};
use seqbins::error::SeqError;
use seqbins::output::JsonOutput;

#[derive(Parser)]
#[command(name = "seqbins")]
#[command(about = "Query binned sequencing signal and its access-controlled sample catalog")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    config: Option<String>,

    #[arg(long, global = true)]
    admin: bool,

    #[arg(long = "permission", global = true)]
    permissions: Vec<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "List visible platforms for an assembly")]
    Platforms(AssemblyArgs),
    #[command(about = "List visible datasets for an assembly")]
    Datasets(DatasetsArgs),
    #[command(about = "List visible samples of one dataset")]
    Samples(SamplesArgs),
    #[command(about = "Search visible samples for an assembly")]
    Search(SearchArgs),
    #[command(about = "Check whether the principal may view a sample")]
    CanView(SampleArgs),
    #[command(about = "Show a sample record")]
    Resolve(SampleArgs),
    #[command(about = "Read bins for samples over locations")]
    Bins(BinsArgs),
}

#[derive(Args)]
struct AssemblyArgs {
    assembly: String,
}

#[derive(Args)]
struct DatasetsArgs {
    assembly: String,

    #[arg(long)]
    platform: Option<String>,
}

#[derive(Args)]
struct SamplesArgs {
    dataset: String,
}

#[derive(Args)]
struct SearchArgs {
    assembly: String,

    #[arg(default_value = "")]
    query: String,
}

#[derive(Args)]
struct SampleArgs {
    sample: String,
}

#[derive(Args)]
struct BinsArgs {
    #[arg(long = "location", required = true)]
    locations: Vec<String>,

    #[arg(long = "bin-size", required = true)]
    bin_sizes: Vec<i64>,

    #[arg(long = "sample", required = true)]
    samples: Vec<String>,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<SeqError>() {
            return ExitCode::from(error.exit_code());
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ConfigLoader::resolve(cli.config.as_deref())?;
    let catalog = Catalog::from_config(&config);
    let principal = if cli.admin {
        Principal::admin()
    } else {
        Principal::with_permissions(cli.permissions)
    };

    match cli.command {
        Commands::Platforms(args) => {
            let platforms = catalog.platforms(&args.assembly, &principal)?;
            JsonOutput::print_json(&platforms).into_diagnostic()
        }
        Commands::Datasets(args) => {
            let datasets =
                catalog.datasets(&args.assembly, &principal, args.platform.as_deref())?;
            JsonOutput::print_json(&datasets).into_diagnostic()
        }
        Commands::Samples(args) => {
            let samples = catalog.dataset_samples(&args.dataset, &principal)?;
            JsonOutput::print_json(&samples).into_diagnostic()
        }
        Commands::Search(args) => {
            let samples = catalog.search_samples(&args.assembly, &args.query, &principal)?;
            JsonOutput::print_json(&samples).into_diagnostic()
        }
        Commands::CanView(args) => {
            catalog.can_view(&args.sample, &principal)?;
            JsonOutput::print_json(&serde_json::json!({ "sample": args.sample, "canView": true }))
                .into_diagnostic()
        }
        Commands::Resolve(args) => {
            catalog.can_view(&args.sample, &principal)?;
            let sample = catalog.resolve(&args.sample)?;
            JsonOutput::print_json(&sample).into_diagnostic()
        }
        Commands::Bins(args) => run_bins(args, catalog, &principal, &config),
    }
}

fn run_bins(
    args: BinsArgs,
    catalog: Catalog,
    principal: &Principal,
    config: &ResolvedConfig,
) -> miette::Result<()> {
    let locations = args
        .locations
        .iter()
        .map(|value| value.parse::<Location>())
        .collect::<Result<Vec<_>, _>>()?;
    let request = BatchRequest {
        locations,
        bin_sizes: args.bin_sizes,
        samples: args.samples,
    };
    let results = run_batch(
        Arc::new(catalog),
        principal,
        &config.ladder,
        &request,
        &BatchOptions::from(config),
    )?;
    JsonOutput::print_batch(&results).into_diagnostic()
}
