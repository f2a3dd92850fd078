//! platformctl — command-line driver for the platform persistence core.
//!
//! Loads configuration, installs logging, wires the service registry and runs
//! one command against it:
//! - `register <email> <password>` / `login <email> <password>`
//! - `verify <token>`: print the claims of a valid token
//! - `query <sql>`: run a query on the configured backend (`SELECT * FROM <table>`)
//! - `projects <owner-id>`: list the projects of one owner
//! - `backends`: list the adapter families and whether they are bound
//!
//! Run:
//! ```bash
//! STORAGE_PROVIDER=sqlite DB_PATH=./data/platform.db \
//!   cargo run -p platformctl -- register dev@local hunter2
//! ```
//!
//! Configuration: See `config.rs` for all environment variables.

mod config;
mod wiring;

use std::env;
use std::process;

use domain::registry::{Registry, ServiceKey};
use domain::{BackendKind, CoreError};
use serde_json::json;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn print_usage() {
    eprintln!(
        "{}\n\nUsage:\n  platformctl register <email> <password>\n  platformctl login <email> <password>\n  platformctl verify <token>\n  platformctl query <sql>\n  platformctl projects <owner-id>\n  platformctl backends\n\nNotes:\n  - STORAGE_PROVIDER selects the backend (memory by default; memory data is not persisted across runs).",
        domain::about()
    );
}

fn init_tracing(cfg: &config::Config) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.log_level));

    // Logs go to stderr so command output on stdout stays machine readable.
    let registry = tracing_subscriber::registry().with(env_filter);
    match cfg.log_format {
        config::LogFormat::Json => {
            registry
                .with(
                    fmt::layer()
                        .json()
                        .with_target(true)
                        .with_timer(fmt::time::SystemTime)
                        .with_writer(std::io::stderr),
                )
                .init();
        }
        config::LogFormat::Pretty => {
            registry
                .with(
                    fmt::layer()
                        .pretty()
                        .with_target(true)
                        .with_writer(std::io::stderr),
                )
                .init();
        }
    }
}

fn two_args(
    args: &mut impl Iterator<Item = String>,
    cmd: &str,
) -> Result<(String, String), String> {
    match (args.next(), args.next()) {
        (Some(email), Some(password)) => Ok((email, password)),
        _ => Err(format!("missing <email> <password> for {}", cmd)),
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("encode output: {}", e))
}

fn run(registry: &Registry, cfg: &config::Config) -> Result<(), String> {
    let mut args = env::args().skip(1); // skip program name

    let Some(cmd) = args.next() else {
        print_usage();
        return Ok(());
    };

    match cmd.as_str() {
        "register" => {
            let (email, password) = two_args(&mut args, "register")?;
            let credentials = registry
                .credential_service()
                .map_err(|e| format!("wiring failed: {}", e))?;
            match credentials.register(&email, &password) {
                Ok(user) => {
                    println!("{}", to_json(&user)?);
                    Ok(())
                }
                Err(CoreError::AlreadyExists(_)) => Err("user already exists".into()),
                Err(e) => Err(format!("register failed: {}", e)),
            }
        }
        "login" => {
            let (email, password) = two_args(&mut args, "login")?;
            let credentials = registry
                .credential_service()
                .map_err(|e| format!("wiring failed: {}", e))?;
            match credentials.login(&email, &password) {
                Ok(outcome) => {
                    let body = json!({
                        "token": outcome.token,
                        "user": outcome.user.without_secret(),
                    });
                    println!("{}", to_json(&body)?);
                    Ok(())
                }
                Err(e) => Err(format!("login failed: {}", e)),
            }
        }
        "verify" => {
            let Some(token) = args.next() else {
                return Err("missing <token> for verify".into());
            };
            let credentials = registry
                .credential_service()
                .map_err(|e| format!("wiring failed: {}", e))?;
            match credentials.verify_token(&token) {
                Some(claims) => {
                    println!("{}", to_json(&claims)?);
                    Ok(())
                }
                None => Err("invalid or expired token".into()),
            }
        }
        "query" => {
            let sql: Vec<String> = args.collect();
            if sql.is_empty() {
                return Err("missing <sql> for query".into());
            }
            let adapter = registry
                .adapter(cfg.storage_provider)
                .map_err(|e| format!("wiring failed: {}", e))?;
            adapter
                .connect()
                .map_err(|e| format!("connect failed: {}", e))?;
            let rows = adapter
                .query(&sql.join(" "), &[])
                .map_err(|e| format!("query failed: {}", e))?;
            println!("{}", to_json(&rows)?);
            Ok(())
        }
        "projects" => {
            let Some(owner) = args.next() else {
                return Err("missing <owner-id> for projects".into());
            };
            let projects = registry
                .project_repository()
                .map_err(|e| format!("wiring failed: {}", e))?;
            let owned = projects
                .find_by_owner_id(&owner)
                .map_err(|e| format!("projects failed: {}", e))?;
            println!("{}", to_json(&owned)?);
            Ok(())
        }
        "backends" => {
            for kind in BackendKind::ALL {
                let key = ServiceKey::adapter(kind);
                let marker = if kind == cfg.storage_provider { "*" } else { " " };
                let bound = if registry.has(key) { "bound" } else { "unbound" };
                println!(
                    "{} {:<10} {:<18} {}",
                    marker,
                    kind.as_str(),
                    key.as_str(),
                    bound
                );
            }
            Ok(())
        }
        _ => {
            print_usage();
            Ok(())
        }
    }
}

fn main() {
    let cfg = match config::Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("{}", e);
            process::exit(2);
        }
    };
    init_tracing(&cfg);
    cfg.warn_if_insecure();
    info!(backend = %cfg.storage_provider, "starting platformctl");

    let registry = wiring::build_registry(&cfg);
    if let Err(e) = run(&registry, &cfg) {
        error!(error = %e, "command failed");
        eprintln!("error: {}", e);
        process::exit(1);
    }
}
