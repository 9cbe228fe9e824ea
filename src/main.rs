mod cli;
mod commands;
mod config;
mod engine;
mod progress;
mod schema;
mod state;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command, StateCommand};
use config::Settings;
use std::io;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
    pub settings: Settings,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
        settings: Settings::load(cli.config.as_deref())?,
    };

    let result = run(&ctx, cli.command);
    if let Err(err) = &result
        && let Some(category) = err
            .downcast_ref::<declarative::Error>()
            .and_then(declarative::Error::category)
        && !ctx.quiet
    {
        ui::hint(category.advice());
    }
    result
}

fn run(ctx: &Context, command: Command) -> Result<()> {
    match command {
        Command::Validate { file } => commands::reconcile::validate(ctx, &file),
        Command::Plan {
            file,
            target,
            no_refresh,
        } => commands::reconcile::plan(ctx, &file, target.as_deref(), no_refresh),
        Command::Apply {
            file,
            target,
            yes,
            jobs,
            timeout,
        } => commands::reconcile::apply(ctx, &file, target.as_deref(), yes, jobs, timeout),
        Command::Destroy { target, yes } => {
            commands::reconcile::destroy(ctx, target.as_deref(), yes)
        }
        Command::Refresh { target } => commands::reconcile::refresh(ctx, target.as_deref()),
        Command::Import {
            address,
            id,
            filter,
        } => commands::reconcile::import(ctx, &address, id.as_deref(), &filter),
        Command::State(cmd) => match cmd {
            StateCommand::List => commands::state::list(ctx),
            StateCommand::Show { address } => commands::state::show(ctx, &address),
            StateCommand::Rm { address } => commands::state::rm(ctx, &address),
        },
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "idsync", &mut io::stdout());
            Ok(())
        }
    }
}
