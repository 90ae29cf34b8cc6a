//! CLI argument parsing for cs3lease.
//!
//! Uses clap derive macros for declarative argument definitions.
//! This module defines the command structure; actual implementations
//! are in the `commands` module.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// cs3lease: cooperative lease locks for files on CS3 storage.
///
/// Every command runs as one editing session against a storage root:
/// - Reading a file takes or refreshes the session's lock
/// - Writing a file another session holds saves a conflict copy instead
/// - Locks lapse after `locks_expiration_time` seconds without a refresh
#[derive(Parser, Debug)]
#[command(name = "cs3lease")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Directory served as the storage root.
    #[arg(long, global = true, default_value = ".")]
    pub root: PathBuf,

    /// Configuration file (YAML). CS3_* environment variables override it.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands for cs3lease.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show a file's metadata and lock state.
    Stat(PathArgs),

    /// Print a file to stdout.
    ///
    /// Takes or refreshes the session's lock. A file locked by another
    /// session is still printed, in read-only mode.
    Read(PathArgs),

    /// Save content to a file.
    ///
    /// Content comes from stdin unless --from is given. If another session
    /// holds the file, the content lands in a conflict copy next to it.
    Write(WriteArgs),

    /// Print the path a write to this file would go to.
    Resolve(PathArgs),

    /// Inspect or take lease locks.
    Lock(LockCommand),

    /// List a directory.
    Ls(LsArgs),

    /// Remove a file or directory.
    Rm(PathArgs),

    /// Move a file or directory. The destination must not exist.
    Mv(MoveArgs),

    /// Create a directory.
    Mkdir(PathArgs),
}

/// A single storage path.
#[derive(Parser, Debug)]
pub struct PathArgs {
    /// Path on the storage, e.g. /home/report.ipynb.
    pub path: String,
}

/// Arguments for the `write` command.
#[derive(Parser, Debug)]
pub struct WriteArgs {
    /// Path on the storage to write.
    pub path: String,

    /// Read content from this local file instead of stdin.
    #[arg(long)]
    pub from: Option<PathBuf>,

    /// Overwrite the file and take its lock even if another session holds it.
    #[arg(long)]
    pub force: bool,
}

/// Arguments for the `ls` command.
#[derive(Parser, Debug)]
pub struct LsArgs {
    /// Directory to list; defaults to the home directory.
    pub path: Option<String>,
}

/// Arguments for the `mv` command.
#[derive(Parser, Debug)]
pub struct MoveArgs {
    pub source: String,

    pub destination: String,
}

/// Lock subcommands.
#[derive(Parser, Debug)]
pub struct LockCommand {
    #[command(subcommand)]
    pub action: LockAction,
}

/// Available lock actions.
#[derive(Subcommand, Debug)]
pub enum LockAction {
    /// Show who holds a file's lock and when it lapses.
    Status(PathArgs),

    /// Take or refresh the lock on a file.
    ///
    /// Fails with a lock conflict if another session holds an unexpired lock.
    Acquire(PathArgs),
}

impl Cli {
    /// Parse command line arguments.
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
