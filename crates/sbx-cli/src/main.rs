//! sbx: strongbox command-line client
//!
//! Identity:
//!   register --backup <path>   - create a key pair, publish it, save the backup
//!   restore <backup>           - install the private key from a backup file
//!   logout                     - clear the local key store
//!
//! Files:
//!   upload <path> [--name]     - encrypt and upload a file
//!   download <id> [--out]      - download and decrypt a file
//!   share <id> <recipient>     - grant another user access
//!   list                       - files you own or that were shared with you
//!
//! Misc:
//!   status                     - local key and storage reachability
//!   config show                - display current configuration

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use sbx_core::config::{expand_tilde, SbxConfig};
use sbx_core::{FileId, FileMetadata, UserId};
use sbx_crypto::KeyPairManager;
use sbx_keystore::Session;
use sbx_transfer::{FailureKind, ObjectStoreBackend, TransferClient, TransferError};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "sbx",
    version,
    about = "strongbox end-to-end encrypted file exchange",
    long_about = "sbx: encrypt files locally, store only ciphertext, share by re-wrapping keys"
)]
struct Cli {
    /// Path to sbx.toml configuration file
    #[arg(
        long,
        short = 'c',
        env = "SBX_CONFIG",
        default_value = "~/.config/strongbox/sbx.toml"
    )]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides [logging] level
    #[arg(long, env = "SBX_LOG")]
    log: Option<String>,

    /// Log format; overrides [logging] format
    #[arg(long, env = "SBX_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate an identity key pair and publish the public half
    ///
    /// The private key backup is written to --backup (mode 0600). Without it
    /// and without this device's key store, your files cannot be recovered.
    Register {
        /// Where to write the private key backup
        #[arg(long)]
        backup: PathBuf,
    },

    /// Install the private key from a backup file
    Restore {
        backup: PathBuf,
    },

    /// Encrypt and upload a file
    Upload {
        path: PathBuf,
        /// Name stored with the file (default: the local file name)
        #[arg(long)]
        name: Option<String>,
    },

    /// Download and decrypt a file
    Download {
        file_id: FileId,
        /// Output path (default: the stored file name in the current dir)
        #[arg(long, short = 'o')]
        out: Option<PathBuf>,
    },

    /// Give another user access to a file
    Share {
        file_id: FileId,
        recipient: String,
    },

    /// List files you own or that were shared with you
    List,

    /// Clear the local key store
    Logout,

    /// Show local key and storage status
    Status,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file)
    Show,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = expand_tilde(&cli.config);
    let config = SbxConfig::load(&config_path)
        .with_context(|| format!("loading config: {}", config_path.display()))?;

    let level = cli.log.clone().unwrap_or_else(|| config.logging.level.clone());
    let format = match &cli.log_format {
        Some(f) => f.clone(),
        None if config.logging.format.eq_ignore_ascii_case("json") => LogFormat::Json,
        None => LogFormat::Text,
    };
    init_logging(&level, &format);
    tracing::debug!(config = %config_path.display(), "sbx starting");

    match cli.command {
        Commands::Config { action: ConfigAction::Show } => cmd_config_show(&config, &config_path),
        Commands::Status => cmd_status(&config).await,
        Commands::Register { backup } => cmd_register(&config, &backup).await,
        Commands::Restore { backup } => cmd_restore(&config, &backup).await,
        Commands::Upload { path, name } => cmd_upload(&config, &path, name).await,
        Commands::Download { file_id, out } => cmd_download(&config, &file_id, out.as_deref()).await,
        Commands::Share { file_id, recipient } => cmd_share(&config, &file_id, &recipient).await,
        Commands::List => cmd_list(&config).await,
        Commands::Logout => cmd_logout(&config),
    }
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

// ── Client construction ───────────────────────────────────────────────────────

fn user_id(config: &SbxConfig) -> Result<UserId> {
    config
        .user
        .user_id()
        .context("set [user] identity in sbx.toml (your email address)")
}

fn build_session(config: &SbxConfig) -> Result<Session> {
    let store = sbx_keystore::open_keystore(&config.keystore).context("opening key store")?;
    let idle = Duration::from_secs(config.session.idle_timeout_secs);
    let session = Session::new(KeyPairManager::new(store), Some(idle))
        .with_activity_file(sbx_keystore::activity_path(&config.keystore));
    if session
        .expire_if_idle()
        .context("clearing idle key store")?
    {
        eprintln!(
            "session idle for over {}s; local key cleared (run `sbx restore <backup>`)",
            config.session.idle_timeout_secs
        );
    }
    Ok(session)
}

fn build_client(config: &SbxConfig) -> Result<TransferClient> {
    let user = user_id(config)?;
    let op = sbx_storage::build_from_core_config(&config.storage)
        .context("building storage operator")?;
    let backend = Arc::new(ObjectStoreBackend::new(op));
    let session = build_session(config)?;
    // ends the session if this process outlives the idle timeout
    let _watchdog = session.spawn_idle_watchdog();
    Ok(TransferClient::with_session(user, backend, session))
}

/// Add a next step to the errors a user can act on.
fn explain(err: TransferError) -> anyhow::Error {
    let hint = match err.kind() {
        FailureKind::KeyNotFound => Some("run `sbx restore <backup>` on this device"),
        FailureKind::AuthenticationFailed => {
            Some("the stored file is corrupted or was tampered with")
        }
        FailureKind::Unauthorized => Some("session expired; local key cleared"),
        FailureKind::RecipientUnavailable => Some("the recipient must run `sbx register` first"),
        FailureKind::Conflict => Some("identity already registered; run `sbx restore <backup>`"),
        _ => None,
    };
    match hint {
        Some(hint) => anyhow::Error::new(err).context(hint),
        None => anyhow::Error::new(err),
    }
}

// ── Progress helpers ──────────────────────────────────────────────────────────

fn make_spinner(prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{prefix:.bold} {spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

// ── `sbx register` / `sbx restore` / `sbx logout` ────────────────────────────

async fn cmd_register(config: &SbxConfig, backup: &Path) -> Result<()> {
    if backup.exists() {
        anyhow::bail!("backup path already exists: {}", backup.display());
    }
    let client = build_client(config)?;
    if client.has_local_key().map_err(explain)? {
        anyhow::bail!(
            "{} already has a key on this device; run `sbx logout` first",
            client.user()
        );
    }

    let pb = make_spinner("register");
    pb.set_message("generating 2048-bit RSA identity key");
    let registration = client.register().await.map_err(explain);
    pb.finish_and_clear();
    let registration = registration?;

    sbx_keystore::write_backup(backup, &registration.backup)?;

    println!("Registered: {}", registration.user);
    println!("  backup:  {}", backup.display());
    println!();
    println!("Keep the backup somewhere safe. It is the only way to read your files");
    println!("if this device's key store is lost.");
    Ok(())
}

async fn cmd_restore(config: &SbxConfig, backup: &Path) -> Result<()> {
    let client = build_client(config)?;
    let bytes = sbx_keystore::read_backup(backup)?;
    client.restore(&bytes).await.map_err(explain)?;
    println!("Restored private key for {}", client.user());
    Ok(())
}

fn cmd_logout(config: &SbxConfig) -> Result<()> {
    let session = build_session(config)?;
    session
        .expire(sbx_keystore::SessionEvent::Logout)
        .context("clearing key store")?;
    println!("Logged out; local key store cleared");
    Ok(())
}

// ── `sbx upload` / `sbx download` / `sbx share` / `sbx list` ──────────────────

async fn cmd_upload(config: &SbxConfig, path: &Path, name: Option<String>) -> Result<()> {
    let client = build_client(config)?;
    let plaintext = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    let filename = match name {
        Some(n) => n,
        None => path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .with_context(|| format!("no file name in {}", path.display()))?,
    };
    let metadata = FileMetadata::new(filename, plaintext.len() as u64);

    let pb = make_spinner("upload");
    pb.set_message(metadata.filename.clone());
    let uploaded = client.upload(&plaintext, metadata).await.map_err(explain);
    pb.finish_and_clear();
    let uploaded = uploaded?;

    println!("Uploaded:");
    println!("  id:     {}", uploaded.file_id);
    println!("  bytes:  {}", fmt_bytes(plaintext.len() as u64));
    println!("  stored: {}", fmt_bytes(uploaded.ciphertext_len as u64));
    Ok(())
}

async fn cmd_download(config: &SbxConfig, file_id: &FileId, out: Option<&Path>) -> Result<()> {
    let client = build_client(config)?;

    let pb = make_spinner("download");
    pb.set_message(file_id.to_string());
    let decrypted = client.download(file_id).await.map_err(explain);
    pb.finish_and_clear();
    let decrypted = decrypted?;

    let dest = match out {
        Some(p) => p.to_path_buf(),
        None => {
            // stored names are untrusted; keep only the final component
            let name = Path::new(&decrypted.metadata.filename)
                .file_name()
                .map(|n| n.to_os_string())
                .unwrap_or_else(|| file_id.to_string().into());
            PathBuf::from(name)
        }
    };
    if dest.exists() {
        anyhow::bail!("refusing to overwrite {}", dest.display());
    }
    tokio::fs::write(&dest, &decrypted.plaintext)
        .await
        .with_context(|| format!("writing {}", dest.display()))?;

    println!("Downloaded:");
    println!("  local:  {}", dest.display());
    println!("  bytes:  {}", fmt_bytes(decrypted.plaintext.len() as u64));
    Ok(())
}

async fn cmd_share(config: &SbxConfig, file_id: &FileId, recipient: &str) -> Result<()> {
    let client = build_client(config)?;
    let shared = client
        .share(file_id, &UserId::new(recipient))
        .await
        .map_err(explain)?;
    println!("Shared {} with {}", shared.file_id, shared.recipient);
    Ok(())
}

async fn cmd_list(config: &SbxConfig) -> Result<()> {
    let client = build_client(config)?;
    let files = client.list_files().await.map_err(explain)?;
    if files.is_empty() {
        println!("No files.");
        return Ok(());
    }
    println!("{:<36}  {:>10}  {:<24}  NAME", "ID", "SIZE", "OWNER");
    for f in files {
        let owner = if f.shared_with_me {
            f.owner.to_string()
        } else {
            "(you)".to_string()
        };
        println!(
            "{:<36}  {:>10}  {:<24}  {}",
            f.id,
            fmt_bytes(f.size),
            owner,
            f.filename
        );
    }
    Ok(())
}

// ── `sbx status` / `sbx config show` ──────────────────────────────────────────

async fn cmd_status(config: &SbxConfig) -> Result<()> {
    match config.user.user_id() {
        Ok(user) => println!("identity:  {user}"),
        Err(_) => println!("identity:  (not set)"),
    }

    let session = build_session(config)?;
    let has_key = session.keys().has_local_key().context("reading key store")?;
    println!(
        "key store: {:?} ({})",
        config.keystore.backend,
        if has_key { "private key present" } else { "empty" }
    );

    let storage = match sbx_storage::build_from_core_config(&config.storage) {
        Ok(op) => match sbx_storage::check_health(&op).await {
            Ok(health) => format!(
                "reachable ({} registered identities)",
                health.registered_users
            ),
            Err(e) => format!("unreachable ({e:#})"),
        },
        Err(e) => format!("misconfigured ({e})"),
    };
    println!("storage:   {:?} {}", config.storage.backend, storage);
    Ok(())
}

fn cmd_config_show(config: &SbxConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!("# Configuration: defaults (no file at {})", config_path.display());
    }
    println!();
    let rendered = toml::to_string_pretty(config).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}

fn fmt_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use sbx_crypto::{KeySlot, KeyStore};

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_share() {
        let id = FileId::generate();
        let cli = Cli::try_parse_from(["sbx", "share", &id.to_string(), "Bob@Example.com"]).unwrap();
        match cli.command {
            Commands::Share { file_id, recipient } => {
                assert_eq!(file_id, id);
                assert_eq!(recipient, "Bob@Example.com");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_rejects_bad_file_id() {
        assert!(Cli::try_parse_from(["sbx", "download", "not-a-uuid"]).is_err());
    }

    #[test]
    fn test_idle_key_cleared_when_session_built() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut config = SbxConfig::default();
        config.keystore.dir = tmp.path().join("keys");
        config.session.idle_timeout_secs = 600;

        let session = build_session(&config).unwrap();
        session
            .keys()
            .store()
            .set(KeySlot::PrivateKey, b"pkcs8")
            .unwrap();
        session.touch();
        assert!(build_session(&config).unwrap().keys().has_local_key().unwrap());

        std::fs::write(sbx_keystore::activity_path(&config.keystore), "0\n").unwrap();
        let session = build_session(&config).unwrap();
        assert!(!session.keys().has_local_key().unwrap());
    }

    #[test]
    fn test_conflict_points_at_restore() {
        let err = explain(TransferError::Backend {
            stage: sbx_transfer::Stage::PublishKey,
            source: sbx_transfer::BackendError::Conflict("alice is already registered".into()),
        });
        assert!(format!("{err:#}").contains("sbx restore"));
    }

    #[test]
    fn test_fmt_bytes() {
        assert_eq!(fmt_bytes(10), "10 B");
        assert_eq!(fmt_bytes(2048), "2.0 KB");
        assert_eq!(fmt_bytes(3 * 1024 * 1024), "3.0 MB");
    }
}
