//! CLI entry point for the user directory.
//!
//! # Responsibility
//! - Resolve flags, start logging and open the user store.
//! - Wire the service through `build_user_service` and run one command.
//!
//! # Invariants
//! - Failure to open the store is fatal: the process exits non-zero.
//! - The first error aborts the command; nothing is retried.

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use log::{error, info};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use userdi_core::db::{open_db, open_db_in_memory};
use userdi_core::{
    build_user_service, core_version, default_log_level, init_logging, run_demo, LogLevel,
    UserId, UserListQuery, UserService,
};

#[derive(Parser)]
#[command(
    name = "userdi",
    version,
    about = "User directory built on repository and service layers"
)]
struct Cli {
    /// SQLite database file; an in-memory store is used when omitted
    #[arg(long, env = "USERDI_DB_PATH", global = true)]
    db: Option<PathBuf>,
    /// trace|debug|info|warn|error (defaults by build mode)
    #[arg(long, env = "USERDI_LOG_LEVEL", global = true, value_parser = parse_log_level)]
    log_level: Option<LogLevel>,
    /// Directory for rolling log files; logging is off when omitted
    #[arg(long, env = "USERDI_LOG_DIR", global = true)]
    log_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Create the sample user and read it back (default)
    Demo,
    /// Create a user
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
    },
    /// Fetch a user by id
    Get { id: UserId },
    /// Overwrite name and email of an existing user
    Update {
        id: UserId,
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
    },
    /// Delete a user by id
    Delete { id: UserId },
    /// List users ordered by id
    List {
        #[arg(long)]
        limit: Option<u32>,
        #[arg(long, default_value_t = 0)]
        offset: u32,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("event=cli_run module=cli status=error error={err:#}");
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    if let Some(log_dir) = cli.log_dir.as_deref() {
        start_logging(cli.log_level, log_dir)?;
    }
    info!(
        "event=cli_start module=cli status=ok core_version={}",
        core_version()
    );

    let conn = match cli.db.as_deref() {
        Some(path) => open_db(path)
            .with_context(|| format!("failed to open user store `{}`", path.display()))?,
        None => open_db_in_memory().context("failed to open in-memory user store")?,
    };
    let service = build_user_service(&conn).context("failed to build user service")?;

    let output = execute(&service, cli.command.unwrap_or(Command::Demo))?;
    println!("{output}");
    Ok(())
}

fn parse_log_level(value: &str) -> Result<LogLevel, String> {
    value.parse::<LogLevel>().map_err(|err| err.to_string())
}

fn start_logging(level: Option<LogLevel>, log_dir: &Path) -> Result<()> {
    let log_dir = if log_dir.is_absolute() {
        log_dir.to_path_buf()
    } else {
        std::env::current_dir()
            .context("failed to resolve current directory")?
            .join(log_dir)
    };
    let log_dir = log_dir
        .to_str()
        .ok_or_else(|| anyhow!("log directory `{}` is not valid UTF-8", log_dir.display()))?;
    let level = level.unwrap_or_else(default_log_level);

    init_logging(level.as_str(), log_dir)
        .map_err(|err| anyhow!("failed to initialize logging: {err}"))
}

fn execute(service: &dyn UserService, command: Command) -> Result<String> {
    let value = match command {
        Command::Demo => {
            let user = run_demo(service).context("demo flow failed")?;
            serde_json::to_value(user)?
        }
        Command::Create { name, email } => {
            let user = service
                .create_user(&name, &email)
                .context("error creating user")?;
            serde_json::to_value(user)?
        }
        Command::Get { id } => {
            let user = service.get_user(id).context("error getting user")?;
            serde_json::to_value(user)?
        }
        Command::Update { id, name, email } => {
            let user = service
                .update_user(id, &name, &email)
                .context("error updating user")?;
            serde_json::to_value(user)?
        }
        Command::Delete { id } => {
            service.delete_user(id).context("error deleting user")?;
            json!({ "deleted": id })
        }
        Command::List { limit, offset } => {
            let users = service
                .list_users(&UserListQuery { limit, offset })
                .context("error listing users")?;
            serde_json::to_value(users)?
        }
    };

    Ok(serde_json::to_string_pretty(&value)?)
}
