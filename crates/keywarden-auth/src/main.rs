//! keywarden operator CLI
//!
//! Runs the session operations against the configured key directory and
//! user database. Results are JSON on stdout; logs go to stderr.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{error, info, warn};

use keywarden_auth::server::{ErrorResponse, NewUser, PublicKeyResponse};
use keywarden_auth::{AuthError, SessionService, TokenCodec, UserDatabase};
use keywarden_core::TokenFormat;
use keywarden_core::config::{Config, default_database_path, load_config};
use keywarden_core::tracing_init::init_tracing;
use keywarden_crypto::{KeyManager, KeySource};

#[derive(Parser, Debug)]
#[command(name = "keywarden")]
#[command(version, about = "keywarden - RSA bearer tokens and session operations")]
struct Args {
    /// Project directory searched for `.keywarden/settings.json`.
    #[arg(long, global = true)]
    project_dir: Option<PathBuf>,

    /// Directory holding `private_key.pem` and `public_key.pem`.
    #[arg(long, global = true)]
    key_dir: Option<PathBuf>,

    /// Token format: `signed` (JWS) or `encrypted` (JWE).
    #[arg(long, global = true)]
    token_format: Option<TokenFormat>,

    /// Issuer written into and required of every token.
    #[arg(long, global = true)]
    issuer: Option<String>,

    /// Lifetime of issued tokens in minutes.
    #[arg(long, global = true)]
    ttl_minutes: Option<u32>,

    /// Path to the `SQLite` user database.
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    /// Default log filter when `RUST_LOG` is unset.
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load or create the persistent key pair and print its fingerprint.
    InitKeys,
    /// Print the base64 DER public key.
    PublicKey,
    /// Create a user and print a token for it.
    Register {
        #[arg(short, long)]
        username: String,
        #[arg(short, long)]
        email: String,
        #[arg(short, long, env = "KEYWARDEN_PASSWORD", hide_env_values = true)]
        password: String,
        #[arg(long, default_value = "")]
        first_name: String,
        #[arg(long, default_value = "")]
        last_name: String,
    },
    /// Exchange credentials for a token.
    Login {
        #[arg(short, long)]
        username: String,
        #[arg(short, long, env = "KEYWARDEN_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Exchange a valid token for a fresh one.
    Refresh {
        #[arg(short, long, env = "KEYWARDEN_TOKEN", hide_env_values = true)]
        token: String,
    },
    /// Report whether a token is valid and show its claims.
    Verify {
        #[arg(short, long, env = "KEYWARDEN_TOKEN", hide_env_values = true)]
        token: String,
    },
    /// Show the user a token belongs to.
    Me {
        #[arg(short, long, env = "KEYWARDEN_TOKEN", hide_env_values = true)]
        token: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = resolve_config(&args)?;

    init_tracing(&config.log.level, config.log.json);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        format = %config.tokens.format,
        "Starting keywarden"
    );

    let source = KeySource::from_dir(config.keys.dir.clone());
    if matches!(args.command, Command::InitKeys) {
        return init_keys(&source, config.keys.bits).await;
    }
    if source == KeySource::Ephemeral && needs_stable_keys(&args.command) {
        warn!("No key directory configured; tokens from other processes will not verify");
    }

    let keys = load_keys(source, config.keys.bits).await?;
    let codec = Arc::new(TokenCodec::new(
        keys,
        config.tokens.format,
        config.tokens.issuer.clone(),
    ));

    if matches!(args.command, Command::PublicKey) {
        return emit(&PublicKeyResponse {
            public_key: codec.public_key_base64(),
        });
    }

    let db = open_database(&config).await?;
    let service = SessionService::new(db, codec).with_ttl_minutes(config.tokens.ttl_minutes);

    run(args.command, &service).await
}

/// Config files and `KEYWARDEN_*` variables, then CLI flags on top.
fn resolve_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = load_config(args.project_dir.as_deref())?;
    if let Some(dir) = &args.key_dir {
        config.keys.dir = Some(dir.clone());
    }
    if let Some(format) = args.token_format {
        config.tokens.format = format;
    }
    if let Some(issuer) = &args.issuer {
        config.tokens.issuer.clone_from(issuer);
    }
    if let Some(ttl) = args.ttl_minutes {
        config.tokens.ttl_minutes = ttl;
    }
    if let Some(path) = &args.db_path {
        config.storage.database_path = Some(path.clone());
    }
    if let Some(level) = &args.log_level {
        config.log.level.clone_from(level);
    }
    if args.log_json {
        config.log.json = true;
    }
    config.validate()?;
    Ok(config)
}

const fn needs_stable_keys(command: &Command) -> bool {
    matches!(
        command,
        Command::Refresh { .. } | Command::Verify { .. } | Command::Me { .. }
    )
}

/// RSA generation and file locking block, so keep them off the runtime.
async fn load_keys(source: KeySource, bits: usize) -> anyhow::Result<Arc<KeyManager>> {
    let keys = tokio::task::spawn_blocking(move || KeyManager::initialize(&source, bits))
        .await
        .context("key initialisation task failed")??;
    Ok(Arc::new(keys))
}

#[derive(Serialize)]
struct KeyInfo<'a> {
    dir: &'a Path,
    fingerprint: String,
    public_key: String,
}

async fn init_keys(source: &KeySource, bits: usize) -> anyhow::Result<()> {
    let KeySource::Persistent { dir } = source else {
        anyhow::bail!("init-keys needs a key directory (--key-dir or KEYWARDEN_KEY_DIR)");
    };

    let keys = load_keys(source.clone(), bits).await?;
    emit(&KeyInfo {
        dir,
        fingerprint: keys.fingerprint(),
        public_key: keys.public_key_base64(),
    })
}

async fn open_database(config: &Config) -> anyhow::Result<UserDatabase> {
    let path = match &config.storage.database_path {
        Some(path) => path.clone(),
        None => default_database_path()
            .ok_or_else(|| anyhow::anyhow!("Cannot determine data directory"))?,
    };
    info!(path = %path.display(), "Opening user database");
    let db = UserDatabase::open(&path).await?;
    info!(users = db.count_users().await?, "User database ready");
    Ok(db)
}

async fn run(command: Command, service: &SessionService) -> anyhow::Result<()> {
    match command {
        Command::Register {
            username,
            email,
            password,
            first_name,
            last_name,
        } => {
            let new_user = NewUser {
                username,
                email,
                password,
                first_name,
                last_name,
            };
            respond(service.register(new_user).await)
        }
        Command::Login { username, password } => {
            respond(service.login(&username, &password).await)
        }
        Command::Refresh { token } => respond(service.refresh(Some(&bearer(&token))).await),
        Command::Verify { token } => emit(&service.verify(Some(&bearer(&token)))),
        Command::Me { token } => respond(service.current_user(Some(&bearer(&token))).await),
        Command::InitKeys | Command::PublicKey => Ok(()),
    }
}

fn bearer(token: &str) -> String {
    format!("Bearer {}", token.trim())
}

/// Print the success body, or the public error body and fail the process.
fn respond<T: Serialize>(result: Result<T, AuthError>) -> anyhow::Result<()> {
    match result {
        Ok(body) => emit(&body),
        Err(err) => {
            if err.is_unauthorized() {
                warn!(reason = %err, "Request rejected");
            } else {
                error!(error = %err, "Request failed");
            }
            emit(&ErrorResponse::from(&err))?;
            Err(anyhow::Error::new(err).context("request rejected"))
        }
    }
}

/// User-facing output uses writeln! to stdout (this is a CLI binary, not debug output).
fn emit<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let mut out = io::stdout();
    writeln!(out, "{}", serde_json::to_string_pretty(value)?)?;
    Ok(())
}
