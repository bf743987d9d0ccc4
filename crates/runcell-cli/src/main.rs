//! Runcell CLI
//!
//! A command-line tool for running code through the runcell execution
//! engine.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use runcell::{Config, EXAMPLE_CONFIG, ExecRequest, Executor, Outcome, SubmittedFile};
use tracing::{Level, debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "runcell")]
#[command(about = "Run code under resource limits in a namespace sandbox")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new configuration file
    Init {
        /// Output path (default: runcell.toml)
        #[arg(short, long, default_value = "runcell.toml")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Execute a source file
    Run {
        /// Source file to run; becomes the entry file
        #[arg(value_name = "FILE")]
        source: PathBuf,

        /// Language ID (e.g., python, node)
        #[arg(short, long)]
        language: String,

        /// Runtime version, exact or prefix (e.g., 3.11 or 3)
        #[arg(short = 'r', long = "runtime-version")]
        runtime_version: String,

        /// File fed to the program's stdin
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Wall-clock/CPU budget in seconds
        #[arg(short, long)]
        time_limit: Option<f64>,

        /// Memory limit in MB
        #[arg(short, long)]
        memory_limit: Option<u64>,

        /// Process-count limit
        #[arg(short, long)]
        processes: Option<u32>,

        /// Allow network access inside the sandbox
        #[arg(long)]
        internet: bool,

        /// Arguments passed to the program after the entry file
        #[arg(last = true)]
        args: Vec<String>,
    },

    /// List installed language runtimes
    Languages,

    /// Show the sandbox capability report
    Capabilities,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::from_default_env().add_directive(Level::DEBUG.into())
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    // Load configuration
    let config = if let Some(ref path) = cli.config {
        info!(?path, "loading configuration");
        Config::from_file(path).context("failed to load configuration")?
    } else {
        debug!("using configuration from environment and defaults");
        Config::from_env().context("failed to load configuration")?
    };

    match cli.command {
        Commands::Init { output, force } => init_config(&output, force).await,
        Commands::Run {
            source,
            language,
            runtime_version,
            input,
            time_limit,
            memory_limit,
            processes,
            internet,
            args,
        } => {
            let options = RunOptions {
                source,
                language,
                runtime_version,
                input,
                time_limit,
                memory_limit,
                processes,
                internet,
                args,
            };
            run_execute(config, options).await
        }
        Commands::Languages => {
            list_languages(config).await;
            Ok(())
        }
        Commands::Capabilities => {
            show_capabilities(config).await;
            Ok(())
        }
    }
}

struct RunOptions {
    source: PathBuf,
    language: String,
    runtime_version: String,
    input: Option<PathBuf>,
    time_limit: Option<f64>,
    memory_limit: Option<u64>,
    processes: Option<u32>,
    internet: bool,
    args: Vec<String>,
}

async fn run_execute(config: Config, options: RunOptions) -> Result<()> {
    let content = tokio::fs::read(&options.source)
        .await
        .context("failed to read source file")?;
    let entry_name = options
        .source
        .file_name()
        .and_then(|name| name.to_str())
        .context("source path has no usable file name")?
        .to_string();

    let stdin = match options.input {
        Some(ref path) => tokio::fs::read(path)
            .await
            .context("failed to read input file")?,
        None => Vec::new(),
    };

    let mut request = ExecRequest::new(
        &options.language,
        &options.runtime_version,
        vec![SubmittedFile::new(entry_name, content)],
    )
    .with_stdin(stdin)
    .with_args(options.args)
    .with_internet(options.internet);
    request.time_limit_seconds = options.time_limit;
    request.memory_limit_mb = options.memory_limit;
    request.process_limit = options.processes;

    let executor = Executor::new(config).await;

    info!(language = %options.language, "executing program");
    let result = executor
        .execute(request)
        .await
        .context("execution failed")?;

    // Keep stdout clean for piping; diagnostics go through tracing on
    // stderr.
    use std::io::Write;
    std::io::stdout().write_all(&result.stdout)?;
    std::io::stderr().write_all(&result.stderr)?;

    info!(
        outcome = ?result.outcome,
        exit_code = ?result.exit_code,
        signal = ?result.termination_signal,
        wall_time_ms = result.wall_time_ms,
        cpu_time_ms = ?result.cpu_time_ms,
        "execution result"
    );

    if result.is_success() {
        Ok(())
    } else if matches!(result.outcome, Outcome::RuntimeError) {
        std::process::exit(result.exit_code.unwrap_or(1));
    } else {
        std::process::exit(1);
    }
}

async fn list_languages(config: Config) {
    let executor = Executor::new(config).await;

    println!("Installed runtimes:\n");
    for (language, versions) in executor.runtimes() {
        if versions.is_empty() {
            println!("  {language:<10} (none installed)");
        } else {
            println!("  {:<10} {}", language, versions.join(", "));
        }
    }
}

async fn show_capabilities(config: Config) {
    let executor = Executor::new(config).await;
    let caps = executor.capabilities();

    println!("Sandbox mode: {:?}", caps.sandbox_mode);
    if let Some(error) = caps.probe_error {
        println!("Probe error:  {error}");
    }
}

async fn init_config(output: &PathBuf, force: bool) -> Result<()> {
    if output.exists() && !force {
        anyhow::bail!(
            "Configuration file already exists at '{}'. Use --force to overwrite.",
            output.display()
        );
    }

    tokio::fs::write(output, EXAMPLE_CONFIG)
        .await
        .context("failed to write configuration file")?;

    println!("Created configuration file at '{}'", output.display());
    Ok(())
}
