use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use modernizer::cli;
use modernizer::cli::cache::CacheAction;
use modernizer::cli::run::RunArgs;

#[derive(Parser)]
#[command(name = "modernizer", version)]
#[command(about = "Plan the migration of a legacy codebase to a modern stack", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a repository and/or requirements and write a report bundle
    Run {
        /// Repository to analyze: GitHub URL, owner/name, or local path
        #[arg(long)]
        repo: Option<String>,

        /// File with free-text requirements
        #[arg(long)]
        requirements: Option<String>,

        /// Target backend framework (fastapi, flask, django, express, nestjs, spring-boot, ...)
        #[arg(long)]
        backend: String,

        /// Target frontend framework (react, vue, angular, svelte, nextjs)
        #[arg(long)]
        frontend: Option<String>,

        /// Target database (postgresql, mysql, mongodb, sqlite, redis)
        #[arg(long)]
        database: Option<String>,

        /// Maximum number of files parsed (default: from config)
        #[arg(long)]
        max_files: Option<usize>,

        /// Files larger than this many bytes are not parsed (default: from config)
        #[arg(long)]
        max_file_size: Option<u64>,

        /// Report formats, comma separated (markdown, html, json)
        #[arg(long, value_delimiter = ',')]
        format: Option<Vec<String>>,

        /// Output directory; the bundle lands in <output>/<run-id>
        #[arg(short = 'o', long)]
        output: Option<String>,

        /// Path to config file (defaults to ./modernizer.toml or ~/.config/modernizer/config.toml)
        #[arg(long)]
        config: Option<String>,

        /// Override LLM model
        #[arg(long)]
        model: Option<String>,

        /// Neither read nor write the stage cache
        #[arg(long)]
        no_cache: bool,

        /// Use mock LLM client for testing
        #[arg(long)]
        dry_run: bool,
    },
    /// Inspect or prune the stage cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,

        #[arg(long, global = true)]
        config: Option<String>,
    },
    /// Validate config and check that the inference endpoint is reachable
    Check {
        #[arg(long)]
        config: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            repo,
            requirements,
            backend,
            frontend,
            database,
            max_files,
            max_file_size,
            format,
            output,
            config,
            model,
            no_cache,
            dry_run,
        } => {
            cli::run::run(RunArgs {
                repo,
                requirements,
                backend,
                frontend,
                database,
                max_files,
                max_file_size,
                formats: format,
                output,
                config,
                model,
                no_cache,
                dry_run,
            })
            .await?;
        }
        Commands::Cache { action, config } => {
            cli::cache::run(action, config)?;
        }
        Commands::Check { config } => {
            cli::check::run(config).await?;
        }
    }

    Ok(())
}
