#![deny(unsafe_code)]

//! The `moonfs` mount binary.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use fuser::MountOption;
use tracing_subscriber::EnvFilter;

use moonfs_core::crypto::{ObjectKey, SeekableCipher};
use moonfs_core::remote::{HttpContentStore, HttpRegistry, Session};
use moonfs_core::{FilesystemAdapter, MountConfig};
use moonfs_fuse::MoonFs;

/// Mount a MoonStorage backend as a local filesystem
#[derive(Parser)]
#[command(name = "moonfs")]
#[command(author, version)]
#[command(after_help = "EXAMPLES:
    # Mount with the token and key prompted interactively
    moonfs http://localhost:5000 /mnt/moon

    # Non-interactive (token and key from the environment)
    MOONFS_TOKEN=... MOONFS_KEY=... moonfs http://localhost:5000 /mnt/moon
")]
struct Cli {
    /// Base URL of the MoonStorage API
    server: String,

    /// Directory to mount the filesystem on
    mountpoint: PathBuf,

    /// Auth token (insecure on the command line, prefer the environment)
    #[arg(long, env = "MOONFS_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Object encryption key, 64 hex digits
    #[arg(long, env = "MOONFS_KEY", hide_env_values = true)]
    key: Option<String>,

    /// TTL for cached attributes and directory listings, in seconds
    #[arg(long, default_value_t = 2)]
    cache_ttl: u64,

    /// Client-side timeout for remote calls, in seconds
    #[arg(long, default_value_t = 30)]
    timeout: u64,

    /// Directory for the on-disk chunk cache (defaults to the platform
    /// cache directory)
    #[arg(long)]
    chunk_cache_dir: Option<PathBuf>,

    /// Allow other users to access the mount
    #[arg(long)]
    allow_other: bool,

    /// Unmount automatically when the process exits
    #[arg(long)]
    auto_unmount: bool,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let token = match cli.token {
        Some(token) => token,
        None => rpassword::prompt_password("API token: ").context("failed to read token")?,
    };
    let key_hex = match cli.key {
        Some(key) => key,
        None => rpassword::prompt_password("Encryption key (hex): ")
            .context("failed to read encryption key")?,
    };
    let key = ObjectKey::from_hex(&key_hex).context("invalid encryption key")?;

    let timeout = Duration::from_secs(cli.timeout);
    let session = Arc::new(
        Session::new(&cli.server, token, timeout).context("invalid server URL")?,
    );
    session
        .ping()
        .with_context(|| format!("server {} is not reachable", cli.server))?;

    let ttl = Duration::from_secs(cli.cache_ttl);
    let mut config = MountConfig::default()
        .attr_ttl(ttl)
        .dir_ttl(ttl)
        .io_timeout(timeout);
    if let Some(dir) = cli.chunk_cache_dir {
        config = config.chunk_cache_dir(dir);
    }

    let adapter = FilesystemAdapter::new(
        HttpRegistry::new(session.clone()),
        HttpContentStore::new(session),
        SeekableCipher::new(key),
        &config,
    )
    .context("failed to initialize filesystem")?;

    let mut options = vec![
        MountOption::FSName("moonfs".to_string()),
        MountOption::Subtype("moonfs".to_string()),
        MountOption::DefaultPermissions,
    ];
    if cli.allow_other {
        options.push(MountOption::AllowOther);
    }
    if cli.auto_unmount {
        options.push(MountOption::AutoUnmount);
    }

    tracing::info!(mountpoint = %cli.mountpoint.display(), server = %cli.server, "mounting");
    let fs = MoonFs::new(Arc::new(adapter), ttl);
    fuser::mount2(fs, &cli.mountpoint, &options)
        .with_context(|| format!("failed to mount on {}", cli.mountpoint.display()))?;
    Ok(())
}

fn init_tracing(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with_writer(std::io::stderr)
        .init();
}
