//! Line-oriented transport adapter.
//!
//! # Responsibility
//! - Read one JSON operation envelope per stdin line.
//! - Write one JSON response or error envelope per stdout line.
//!
//! # Invariants
//! - A malformed line produces an error envelope, never a process exit.

use clap::Parser;
use crudgate_core::db::open_db;
use crudgate_core::{
    default_log_level, init_logging, init_stderr_logging, AdapterConfig, Dispatcher,
    ErrorEnvelope, OperationEnvelope, RequestContext, SqliteAuditSink, SqliteStorage,
};
use serde_json::json;
use std::error::Error;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(name = "crudgate", version, about = "Serve CRUD operation envelopes over stdin/stdout")]
struct Cli {
    /// Adapter configuration (JSON).
    #[arg(long)]
    config: PathBuf,
    /// SQLite database file.
    #[arg(long)]
    db: PathBuf,
    /// Actor recorded in audit entries.
    #[arg(long)]
    actor: Option<String>,
    /// Overrides the configured log level.
    #[arg(long)]
    log_level: Option<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("crudgate: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<(), Box<dyn Error>> {
    let config = AdapterConfig::from_path(&cli.config)?;

    let level = cli
        .log_level
        .as_deref()
        .or(config.logging.level.as_deref())
        .unwrap_or(default_log_level());
    match config.logging.dir.as_deref() {
        Some(dir) => init_logging(level, dir)?,
        None => init_stderr_logging(level)?,
    }

    let conn = open_db(&cli.db)?;
    let registry = config.build_registry(&conn)?;
    let storage = SqliteStorage::new(&conn);
    let audit_sink = SqliteAuditSink::new(&conn);
    let dispatcher = Dispatcher::new(&storage, registry)
        .with_options(config.handler_options())
        .with_audit(&audit_sink, config.audit.clone());

    let ctx = RequestContext {
        actor: cli.actor.clone(),
    };
    let stdin = io::stdin();
    let mut stdout = io::stdout().lock();
    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let reply = match serde_json::from_str::<OperationEnvelope>(&line) {
            Ok(envelope) => match dispatcher.dispatch(&ctx, envelope) {
                Ok(response) => serde_json::to_value(response)?,
                Err(error) => error_reply(error),
            },
            Err(err) => error_reply(ErrorEnvelope::new(format!("invalid envelope: {err}"), Some(400))),
        };
        writeln!(stdout, "{reply}")?;
        stdout.flush()?;
    }

    log::info!("event=cli_exit module=cli status=ok");
    Ok(())
}

fn error_reply(error: ErrorEnvelope) -> serde_json::Value {
    let status = error.status_or_default();
    json!({ "error": error, "status": status })
}
