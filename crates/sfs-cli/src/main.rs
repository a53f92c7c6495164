//! shardfs: chunked encrypted filesystem CLI
//!
//! Commands:
//!   newkey  <keyfile>                              - generate a new key file
//!   scan    <keyfile> <dbfile> <rootdir>           - update the database from a plaintext tree
//!   mount   <keyfile> <dbfile> <chunkdir> <mnt>    - mount the plaintext view over a chunk store
//!   reverse <keyfile> <dbfile> <rootdir> <mnt>     - mount the chunk view over a plaintext tree

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use sfs_crypto::{database, KeyFile};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "shardfs",
    version,
    about = "chunked encrypted filesystem",
    long_about = "shardfs: scan a plaintext tree into an encrypted chunk database and \
                  mount it as a plaintext or chunk-store filesystem"
)]
struct Cli {
    /// Verbose logging (same as RUST_LOG=debug)
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate a new key file (refuses to overwrite an existing one)
    Newkey {
        /// Where to write the key file
        keyfile: PathBuf,
    },

    /// Scan a plaintext tree and update the encrypted database
    Scan {
        /// Key file
        #[arg(long, short = 'k', env = "SHARDFS_KEYFILE")]
        keyfile: PathBuf,
        /// Encrypted database file (created if missing)
        #[arg(long, short = 'd')]
        dbfile: PathBuf,
        /// Plaintext directory to scan
        rootdir: PathBuf,
    },

    /// Mount the plaintext view: decrypted files served from a chunk store
    #[cfg(feature = "fuse")]
    Mount {
        /// Key file
        #[arg(long, short = 'k', env = "SHARDFS_KEYFILE")]
        keyfile: PathBuf,
        /// Encrypted database file
        #[arg(long, short = 'd')]
        dbfile: PathBuf,
        /// Chunk store directory (256 bucket folders)
        chunkdir: PathBuf,
        /// Local mountpoint
        mountpoint: PathBuf,
        /// Allow other users to access the mount
        #[arg(long)]
        allow_other: bool,
        /// Seconds between database reload attempts
        #[arg(long, default_value_t = 300)]
        reload_interval: u64,
    },

    /// Mount the chunk view: encrypted chunks synthesized from a plaintext tree
    #[cfg(feature = "fuse")]
    Reverse {
        /// Key file
        #[arg(long, short = 'k', env = "SHARDFS_KEYFILE")]
        keyfile: PathBuf,
        /// Encrypted database file
        #[arg(long, short = 'd')]
        dbfile: PathBuf,
        /// Plaintext directory the database was scanned from
        rootdir: PathBuf,
        /// Local mountpoint
        mountpoint: PathBuf,
        /// Allow other users to access the mount
        #[arg(long)]
        allow_other: bool,
    },
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Newkey { keyfile } => cmd_newkey(&keyfile),
        Commands::Scan {
            keyfile,
            dbfile,
            rootdir,
        } => cmd_scan(&keyfile, &dbfile, &rootdir),
        #[cfg(feature = "fuse")]
        Commands::Mount {
            keyfile,
            dbfile,
            chunkdir,
            mountpoint,
            allow_other,
            reload_interval,
        } => {
            cmd_mount(
                &keyfile,
                &dbfile,
                &chunkdir,
                &mountpoint,
                allow_other,
                reload_interval,
            )
            .await
        }
        #[cfg(feature = "fuse")]
        Commands::Reverse {
            keyfile,
            dbfile,
            rootdir,
            mountpoint,
            allow_other,
        } => cmd_reverse(&keyfile, &dbfile, &rootdir, &mountpoint, allow_other).await,
    }
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

// ── `shardfs newkey` ──────────────────────────────────────────────────────────

fn cmd_newkey(path: &Path) -> Result<()> {
    KeyFile::generate()
        .save(path)
        .with_context(|| format!("writing key file: {}", path.display()))?;
    println!("Key file written: {}", path.display());
    println!("Back it up somewhere safe — without it every chunk is unreadable.");
    Ok(())
}

// ── `shardfs scan` ────────────────────────────────────────────────────────────

fn cmd_scan(keyfile: &Path, dbfile: &Path, rootdir: &Path) -> Result<()> {
    let kf = KeyFile::load(keyfile).with_context(|| format!("loading key file: {}", keyfile.display()))?;
    let db_key = kf.db_key();

    let previous = database::load(dbfile, &db_key)
        .with_context(|| format!("loading database: {}", dbfile.display()))?;

    let outcome = sfs_scan::scan(rootdir, &previous)
        .with_context(|| format!("scanning: {}", rootdir.display()))?;

    println!("{}", outcome.summary);
    if outcome.changed {
        database::save(dbfile, &db_key, &outcome.tree)
            .with_context(|| format!("saving database: {}", dbfile.display()))?;
        println!("Database updated: {} ({} entries)", dbfile.display(), outcome.tree.len());
    } else {
        println!("Database already up to date.");
    }
    Ok(())
}

// ── `shardfs mount` / `shardfs reverse` (requires fuse feature) ──────────────

#[cfg(feature = "fuse")]
async fn cmd_mount(
    keyfile: &Path,
    dbfile: &Path,
    chunkdir: &Path,
    mountpoint: &Path,
    allow_other: bool,
    reload_interval: u64,
) -> Result<()> {
    use std::time::Duration;

    let kf = KeyFile::load(keyfile).with_context(|| format!("loading key file: {}", keyfile.display()))?;
    let fs = sfs_fuse::PlainFs::new(dbfile, kf, chunkdir, Duration::from_secs(reload_interval))
        .context("opening plaintext view")?;

    println!(
        "Mounting plaintext view of {} → {}",
        chunkdir.display(),
        mountpoint.display()
    );
    println!("Run `fusermount3 -u {}` to stop.", mountpoint.display());

    sfs_fuse::mount_plain(fs, mountpoint, allow_other)
        .await
        .context("FUSE mount failed")
}

#[cfg(feature = "fuse")]
async fn cmd_reverse(
    keyfile: &Path,
    dbfile: &Path,
    rootdir: &Path,
    mountpoint: &Path,
    allow_other: bool,
) -> Result<()> {
    let kf = KeyFile::load(keyfile).with_context(|| format!("loading key file: {}", keyfile.display()))?;
    let fs = sfs_fuse::ChunkFs::new(dbfile, &kf, rootdir).context("opening chunk view")?;

    println!(
        "Mounting chunk view of {} → {}",
        rootdir.display(),
        mountpoint.display()
    );
    println!("Run `fusermount3 -u {}` to stop.", mountpoint.display());

    sfs_fuse::mount_chunks(fs, mountpoint, allow_other)
        .await
        .context("FUSE mount failed")
}
