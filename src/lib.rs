//! zensession library root.
//! Exposes the CLI parser, the high-level `run()` entry point, and the
//! domain modules the binary is built from.

pub mod cli;
pub mod config;
pub mod core;
pub mod db;
pub mod errors;
pub mod local;
pub mod models;
pub mod repository;
pub mod ui;
pub mod utils;

use clap::Parser;
use cli::Context;
use cli::commands::{config as config_cmd, idea, init, log, project, session, stats, todo, watch};
use cli::parser::{Cli, Commands};
use config::Config;
use errors::AppResult;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Central command dispatcher
pub async fn dispatch(cli: &Cli, ctx: &Context) -> AppResult<()> {
    match &cli.command {
        Commands::Init => init::handle(cli).await,
        Commands::Config { print_config } => config_cmd::handle(ctx, *print_config),
        Commands::Project { action } => project::handle(ctx, action).await,
        Commands::Start {
            project,
            name,
            category,
            at,
            until,
        } => {
            session::start(
                ctx,
                *project,
                name,
                category.as_deref(),
                at.as_deref(),
                until.as_deref(),
            )
            .await
        }
        Commands::Stop { id } => session::stop(ctx, *id).await,
        Commands::Edit {
            id,
            name,
            category,
            start,
            end,
        } => {
            session::edit(
                ctx,
                *id,
                name.as_deref(),
                category.as_deref(),
                start.as_deref(),
                end.as_deref(),
            )
            .await
        }
        Commands::Rm { id } => session::remove(ctx, *id).await,
        Commands::Sessions { project } => session::list(ctx, *project).await,
        Commands::Active => session::active(ctx).await,
        Commands::Watch { seconds } => watch::handle(ctx, *seconds).await,
        Commands::Stats => stats::stats(ctx).await,
        Commands::Grid { days, metric, day } => {
            stats::grid(ctx, *days, metric, day.as_deref()).await
        }
        Commands::Idea { action } => idea::handle(ctx, action).await,
        Commands::Todo { action } => todo::handle(ctx, action).await,
        Commands::Log { print } => log::handle(ctx, *print).await,
    }
}

/// Entry point used by main.rs
pub async fn run() -> AppResult<()> {
    let cli = Cli::parse();

    // Config is loaded once, then the global flags are folded in.
    let mut cfg = Config::load()?;
    Context::apply_overrides(&cli, &mut cfg);
    init_tracing(&cfg.log_level);

    let ctx = Context::new(cfg, cli.test);
    dispatch(&cli, &ctx).await
}

/// `RUST_LOG` wins over the configured level. Logs go to stderr so command
/// output stays clean.
fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}
