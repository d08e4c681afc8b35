// SPDX-License-Identifier: Apache-2.0

use clap::{Parser, ValueEnum};
use std::error::Error;
use std::process::ExitCode;
use tracing::metadata::LevelFilter;
use tracing::{error, info};
use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_log::LogTracer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Registry};

use filesource::bounded_channel::bounded;
use filesource::init::args::CheckArgs;
use filesource::topology::{LogPipe, PipeGraph};

type BoxError = Box<dyn Error + Send + Sync>;

#[derive(Debug, clap::Subcommand)]
enum Commands {
    /// Construct, initialize and shut down a file source, reporting the resolved settings
    Check(Box<CheckArgs>),
    /// Return version
    Version,
}

#[derive(Debug, Parser)]
#[command(name = "filesource")]
#[command(bin_name = "filesource")]
#[command(version, about, long_about = None)]
#[command(subcommand_required = true)]
struct Arguments {
    #[arg(
        value_enum,
        long,
        global = true,
        env = "FILESOURCE_LOG_FORMAT",
        default_value = "text"
    )]
    /// Log format
    log_format: LogFormatArg,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, ValueEnum)]
pub enum LogFormatArg {
    Text,
    Json,
}

fn main() -> ExitCode {
    let opt = Arguments::parse();

    match opt.command {
        Some(Commands::Version) => {
            println!("{}", get_version())
        }
        Some(Commands::Check(args)) => {
            let _guard = match setup_logging(&opt.log_format) {
                Ok(guard) => guard,
                Err(e) => {
                    eprintln!("ERROR: failed to setup logging: {}", e);
                    return ExitCode::from(1);
                }
            };

            if let Err(e) = run_check(&args) {
                error!(error = e, "File source check failed.");
                return ExitCode::from(1);
            }
        }
        _ => {
            // subcommand_required makes this unreachable from the command line
            error!("Must specify a command");
            return ExitCode::from(2);
        }
    }

    ExitCode::SUCCESS
}

fn run_check(args: &CheckArgs) -> Result<(), BoxError> {
    let cfg = args.build_global_config()?;
    let source_config = args.file_source.build_config();

    let (tx, rx) = bounded(args.queue_size);
    let mut driver = source_config.build_driver(&cfg, Some(tx))?;
    let mut graph = PipeGraph::new();

    info!(
        path = %driver.path().display(),
        classification = ?driver.classification(),
        follow_freq = driver.follow_freq(),
        restore_state = driver.restore_state(),
        needs_privileges = driver.needs_privileges(),
        opener = %driver.opener_kind(),
        "Resolved file source settings"
    );

    driver.init(&cfg, &mut graph)?;
    info!(
        persist_name = driver.persist_name().unwrap_or_default(),
        position = driver.reader().map(|r| r.position()).unwrap_or_default(),
        "File source running"
    );

    driver.deinit(&mut graph)?;
    driver.free()?;
    cfg.state.flush()?;

    info!(pending = rx.len(), "File source check complete");
    Ok(())
}

type LoggerGuard = tracing_appender::non_blocking::WorkerGuard;

fn setup_logging(log_format: &LogFormatArg) -> Result<LoggerGuard, BoxError> {
    LogTracer::init()?;
    let (non_blocking_writer, guard) = tracing_appender::non_blocking(std::io::stdout());

    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env()?
        .add_directive("opentelemetry=warn".parse()?);

    if *log_format == LogFormatArg::Json {
        let app_name = format!("{}-{}", env!("CARGO_PKG_NAME"), get_version());
        let bunyan_formatting_layer = BunyanFormattingLayer::new(app_name, non_blocking_writer);
        let subscriber = Registry::default()
            .with(filter)
            .with(JsonStorageLayer)
            .with(bunyan_formatting_layer);
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        use std::io;
        use std::io::IsTerminal;

        // Skip color codes when not in a terminal
        let use_ansi = io::stdout().is_terminal();

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking_writer)
            .with_target(false)
            .with_level(true)
            .with_ansi(use_ansi)
            .compact();

        let subscriber = Registry::default().with(filter).with(fmt_layer);
        tracing::subscriber::set_global_default(subscriber)?;
    }

    Ok(guard)
}

fn get_version() -> String {
    // Set during CI
    let version_build = option_env!("BUILD_SHORT_SHA").unwrap_or("dev");
    format!("{}-{}", env!("CARGO_PKG_VERSION"), version_build)
}
