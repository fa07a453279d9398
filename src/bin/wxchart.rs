use std::path::PathBuf;
use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use wxchart_dl::app::{App, FetchRequest, ProgressSink};
use wxchart_dl::config::{ConfigLoader, Settings};
use wxchart_dl::credentials::Credentials;
use wxchart_dl::domain::SourceId;
use wxchart_dl::error::ChartError;
use wxchart_dl::output::{ConsoleProgress, JsonOutput, OutputMode};
use wxchart_dl::queue::SystemClock;
use wxchart_dl::store::Store;
use wxchart_dl::transport::HttpTransport;

const EXIT_ABORTED: u8 = 3;

#[derive(Parser)]
#[command(name = "wxchart")]
#[command(about = "Download the latest weather radar, satellite and lightning charts")]
#[command(version)]
struct Cli {
    #[arg(long, global = true)]
    non_interactive: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "List chart sources and whether they are usable")]
    List(SourceArgs),
    #[command(about = "Download the most recent snapshots of one or more sources")]
    Fetch(FetchArgs),
}

#[derive(Args)]
struct SourceArgs {
    /// Catalog JSON file replacing the built-in source table.
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Credentials file with `user:password:uri` lines.
    #[arg(long)]
    credentials: Option<PathBuf>,
}

#[derive(Args)]
struct FetchArgs {
    #[arg(required = true)]
    ids: Vec<String>,

    #[arg(long, default_value_t = 1)]
    count: u32,

    #[arg(long)]
    dir: Option<Utf8PathBuf>,

    #[command(flatten)]
    sources: SourceArgs,
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => ExitCode::from(code),
        Err(report) => {
            eprintln!("{report:?}");
            if let Some(err) = report.downcast_ref::<ChartError>() {
                return ExitCode::from(map_exit_code(err));
            }
            ExitCode::from(1)
        }
    }
}

fn map_exit_code(error: &ChartError) -> u8 {
    match error {
        ChartError::UnknownSource(_)
        | ChartError::MissingCredentials { .. }
        | ChartError::InvalidSourceId(_) => 2,
        _ => 1,
    }
}

fn run() -> miette::Result<u8> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    match cli.command {
        Commands::List(args) => run_list(args, output_mode),
        Commands::Fetch(args) => {
            let runtime = tokio::runtime::Runtime::new().into_diagnostic()?;
            runtime.block_on(run_fetch(args, output_mode))
        }
    }
}

fn build_app(
    args: &SourceArgs,
    dir: Option<Utf8PathBuf>,
) -> miette::Result<App<HttpTransport>> {
    let settings = Settings::new()?.with_overrides(dir, args.credentials.clone());
    let catalog = ConfigLoader::resolve(args.catalog.as_deref())?;
    let credentials = Credentials::load(&settings.credentials_path)?;
    let transport = HttpTransport::new(credentials.clone())?;
    let store = Store::new_with_root(settings.download_dir);
    Ok(App::new(catalog, credentials, store, transport))
}

fn run_list(args: SourceArgs, output_mode: OutputMode) -> miette::Result<u8> {
    let app = build_app(&args, None)?;
    let result = app.list();
    match output_mode {
        OutputMode::NonInteractive => JsonOutput::print_list(&result).into_diagnostic()?,
        OutputMode::Interactive => {
            for entry in &result.sources {
                let marker = if entry.available { "*" } else { " " };
                println!(
                    "{marker} {:<40} {:>5}s  {}",
                    entry.id.as_str(),
                    entry.interval_secs,
                    entry.name
                );
            }
        }
    }
    Ok(0)
}

async fn run_fetch(args: FetchArgs, output_mode: OutputMode) -> miette::Result<u8> {
    let requests = args
        .ids
        .iter()
        .map(|id| {
            id.parse::<SourceId>().map(|id| FetchRequest {
                id,
                count: args.count,
            })
        })
        .collect::<Result<Vec<_>, ChartError>>()?;

    let app = build_app(&args.sources, args.dir.clone())?;
    let (mut downloader, handle) = app.downloader(SystemClock);

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupted, shutting down");
            handle.shutdown();
        }
    });

    let sink: &dyn ProgressSink = match output_mode {
        OutputMode::Interactive => &ConsoleProgress,
        OutputMode::NonInteractive => &JsonOutput,
    };
    let result = app.fetch(&requests, &mut downloader, sink).await?;

    match output_mode {
        OutputMode::NonInteractive => JsonOutput::print_fetch(&result).into_diagnostic()?,
        OutputMode::Interactive => {
            eprintln!(
                "downloaded {}, already present {}, aborted {}",
                result.downloaded, result.skipped, result.aborted
            );
        }
    }

    Ok(if result.aborted > 0 { EXIT_ABORTED } else { 0 })
}
