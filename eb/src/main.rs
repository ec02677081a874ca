// eb/src/main.rs
use std::fs;
use std::process;

use clap::Parser;
use colored::Colorize;
use eb_common::config::Config;
use eb_common::error::EbError;
use tracing::level_filters::LevelFilter;
use tracing::{debug, error};
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

mod cli;
mod pipeline;

use cli::CliArgs;

const LOG_FILE_NAME: &str = "eb.log";

fn init_stderr_logging(env_filter: EnvFilter) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .without_time()
        .try_init();
}

/// Logs go to stderr; with `-v` they are also appended to `eb.log` in the temporary log
/// directory.
fn init_logging(config: Option<&Config>, verbose: u8) {
    let level_filter = match verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    let max_log_level = level_filter.into_level().unwrap_or(tracing::Level::WARN);
    let env_filter = EnvFilter::builder()
        .with_default_directive(level_filter.into())
        .with_env_var("EB_LOG")
        .from_env_lossy();

    let log_dir = match config {
        Some(config) if verbose > 0 => config.tmp_logdir.clone(),
        _ => return init_stderr_logging(env_filter),
    };
    if let Err(e) = fs::create_dir_all(&log_dir) {
        eprintln!(
            "{} Failed to create log directory {}: {}",
            "WARNING:".yellow().bold(),
            log_dir.display(),
            e
        );
        return init_stderr_logging(env_filter);
    }

    let file_appender = tracing_appender::rolling::never(&log_dir, LOG_FILE_NAME);
    let (non_blocking_appender, guard) = tracing_appender::non_blocking(file_appender);
    let stderr_writer = std::io::stderr.with_max_level(max_log_level);
    let file_writer = non_blocking_appender.with_max_level(max_log_level);
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(stderr_writer.and(file_writer))
        .with_ansi(true)
        .without_time()
        .try_init();
    Box::leak(Box::new(guard));

    debug!(
        "Verbose logging enabled. Writing logs to: {}",
        log_dir.join(LOG_FILE_NAME).display()
    );
}

fn exit_with_error(e: &EbError) -> ! {
    error!("Command failed: {}", e);
    eprintln!("{} {}", "ERROR:".red().bold(), e);
    process::exit(1);
}

#[tokio::main]
async fn main() {
    let cli_args = CliArgs::parse();

    if cli_args.version {
        init_logging(None, cli_args.verbose);
        println!("{}", cli::info::version_line());
        return;
    }

    let config = match Config::load(cli_args.raw_config()) {
        Ok(config) => config,
        Err(e) => {
            init_logging(None, cli_args.verbose);
            exit_with_error(&e);
        }
    };
    init_logging(Some(&config), cli_args.verbose);

    if let Err(e) = cli_args.run(&config).await {
        exit_with_error(&e);
    }
    debug!("Command completed successfully.");
}
