use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use ft_core::task::{NewTask, TaskPatch};
use ft_core::types::UserId;
use ft_cli::commands::{focus, insights, summary, task, timeline};
use ft_cli::{Cli, Commands, Config, FocusAction, SummaryPeriod, TaskAction};

/// Load config and open the database, ensuring the parent directory exists.
fn open_database(config_path: Option<&Path>) -> Result<(ft_db::Database, Config)> {
    let config = Config::load_from(config_path).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");

    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent).context("failed to create database directory")?;
    }

    let db = ft_db::Database::open(&config.database_path).context("failed to open database")?;
    Ok((db, config))
}

fn resolve_user(cli: &Cli, config: &Config) -> Result<UserId> {
    let name = cli.user.as_deref().unwrap_or(&config.user);
    Ok(UserId::new(name)?)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing with verbose flag support
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // Use try_init to avoid panic if tracing is already initialized (e.g., in tests)
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();

    let stdout = std::io::stdout();
    let mut writer = stdout.lock();

    match &cli.command {
        Some(Commands::Task { action }) => {
            let (mut db, config) = open_database(cli.config.as_deref())?;
            let user = resolve_user(&cli, &config)?;
            match action {
                TaskAction::Add {
                    title,
                    description,
                    project,
                    kind,
                    deadline,
                } => {
                    let new_task = NewTask {
                        title: title.clone(),
                        description: description.clone(),
                        project: *project,
                        kind: *kind,
                        deadline: *deadline,
                    };
                    task::add(&mut writer, &mut db, &user, &new_task)?;
                }
                TaskAction::List { scope, json } => {
                    task::list(&mut writer, &db, &user, *scope, *json, &config)?;
                }
                TaskAction::Edit {
                    id,
                    title,
                    description,
                    project,
                    kind,
                    deadline,
                    clear_deadline,
                } => {
                    let deadline = if *clear_deadline {
                        Some(None)
                    } else {
                        (*deadline).map(Some)
                    };
                    let patch = TaskPatch {
                        title: title.clone(),
                        description: description.clone(),
                        project: *project,
                        kind: *kind,
                        deadline,
                    };
                    task::edit(&mut writer, &mut db, &user, id, &patch)?;
                }
                TaskAction::Done { id } => {
                    task::done(&mut writer, &mut db, &user, id)?;
                }
                TaskAction::Delete { id } => {
                    task::delete(&mut writer, &mut db, &user, id)?;
                }
            }
        }
        Some(Commands::Focus { action }) => {
            let (mut db, config) = open_database(cli.config.as_deref())?;
            let user = resolve_user(&cli, &config)?;
            match action {
                FocusAction::Start {
                    mode,
                    project,
                    planned,
                } => {
                    focus::start(&mut writer, &mut db, &user, *mode, *project, *planned)?;
                }
                FocusAction::End { id, rating, note } => {
                    focus::end(
                        &mut writer,
                        &mut db,
                        &user,
                        id.as_deref(),
                        *rating,
                        note.as_deref(),
                    )?;
                }
                FocusAction::Active => {
                    focus::active(&mut writer, &db, &user)?;
                }
                FocusAction::List { range, json } => {
                    focus::list(&mut writer, &db, &user, *range, *json, &config)?;
                }
            }
        }
        Some(Commands::Summary { period }) => {
            let (db, config) = open_database(cli.config.as_deref())?;
            let user = resolve_user(&cli, &config)?;
            match period {
                SummaryPeriod::Daily { json } => {
                    summary::daily(&mut writer, &db, &user, *json, &config)?;
                }
                SummaryPeriod::Weekly { json } => {
                    summary::weekly(&mut writer, &db, &user, *json)?;
                }
            }
        }
        Some(Commands::Insights { json }) => {
            let (db, config) = open_database(cli.config.as_deref())?;
            let user = resolve_user(&cli, &config)?;
            insights::run(&mut writer, &db, &user, *json, &config)?;
        }
        Some(Commands::Timeline { range, json }) => {
            let (db, config) = open_database(cli.config.as_deref())?;
            let user = resolve_user(&cli, &config)?;
            timeline::run(&mut writer, &db, &user, *range, *json, &config)?;
        }
        None => {
            // No subcommand, show help
            use clap::CommandFactory;
            Cli::command().print_help()?;
            writeln!(writer)?;
        }
    }

    Ok(())
}
