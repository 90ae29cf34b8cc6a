//! Command implementations for cs3lease.
//!
//! This module provides the dispatcher that routes CLI commands to their
//! implementations. Every command runs inside one [`FileCoordinator`]
//! session built from the resolved configuration and the storage root.

use crate::cli::{Cli, Command, LockAction, LockCommand, LsArgs, MoveArgs, PathArgs, WriteArgs};
use cs3lease::SessionContext;
use cs3lease::config::Config;
use cs3lease::error::{LeaseError, Result};
use cs3lease::files::FileCoordinator;
use cs3lease::storage::ResourceInfo;
use std::io::{self, Read, Write};


/// Dispatch a command to its implementation.
///
/// Resolves configuration (file, then `CS3_*` overrides), opens the storage
/// root, and runs the command with stdin and stdout attached.
pub fn dispatch(cli: Cli) -> Result<()> {
    let config = Config::resolve(cli.config.as_deref())?;
    let ctx = SessionContext::open_local(&cli.root, config)?;
    let files = FileCoordinator::new(ctx);

    let stdin = io::stdin();
    let stdout = io::stdout();
    run(&files, cli.command, &mut stdin.lock(), &mut stdout.lock())
}

/// Run one command against an open session.
pub fn run(
    files: &FileCoordinator,
    command: Command,
    input: &mut dyn Read,
    out: &mut dyn Write,
) -> Result<()> {
    match command {
        Command::Stat(args) => cmd_stat(files, args, out),
        Command::Read(args) => cmd_read(files, args, out),
        Command::Write(args) => cmd_write(files, args, input, out),
        Command::Resolve(args) => cmd_resolve(files, args, out),
        Command::Lock(lock_cmd) => dispatch_lock(files, lock_cmd, out),
        Command::Ls(args) => cmd_ls(files, args, out),
        Command::Rm(args) => cmd_rm(files, args, out),
        Command::Mv(args) => cmd_mv(files, args, out),
        Command::Mkdir(args) => cmd_mkdir(files, args, out),
    }
}

/// Dispatch lock subcommands.
fn dispatch_lock(
    files: &FileCoordinator,
    lock_cmd: LockCommand,
    out: &mut dyn Write,
) -> Result<()> {
    match lock_cmd.action {
        LockAction::Status(args) => cmd_lock_status(files, args, out),
        LockAction::Acquire(args) => cmd_lock_acquire(files, args, out),
    }
}

fn output_error(e: io::Error) -> LeaseError {
    LeaseError::UserError(format!("failed to write output: {}", e))
}

fn cmd_stat(files: &FileCoordinator, args: PathArgs, out: &mut dyn Write) -> Result<()> {
    let info = files.stat(&args.path)?;

    writeln!(out, "Path:     {}", info.path()).map_err(output_error)?;
    writeln!(
        out,
        "Kind:     {}",
        if info.is_container() { "directory" } else { "file" }
    )
    .map_err(output_error)?;
    writeln!(out, "Size:     {}", info.size).map_err(output_error)?;
    writeln!(out, "Modified: {}", info.mtime).map_err(output_error)?;
    writeln!(
        out,
        "Id:       {}:{}",
        info.handle.storage_id, info.handle.opaque_id
    )
    .map_err(output_error)?;

    if !info.is_container() {
        let status = files.context().locks().status(&info)?;
        writeln!(out, "Lock:     {}", status).map_err(output_error)?;
    }
    Ok(())
}

fn cmd_read(files: &FileCoordinator, args: PathArgs, out: &mut dyn Write) -> Result<()> {
    let session = files.read(&args.path)?;
    if let Some(reason) = &session.read_only_reason {
        eprintln!("Note: {} {}; opened read-only.", session.info.path(), reason);
    }

    for chunk in session.chunks {
        out.write_all(&chunk?).map_err(output_error)?;
    }
    out.flush().map_err(output_error)
}

fn cmd_write(
    files: &FileCoordinator,
    args: WriteArgs,
    input: &mut dyn Read,
    out: &mut dyn Write,
) -> Result<()> {
    let content = match &args.from {
        Some(source) => std::fs::read(source).map_err(|e| {
            LeaseError::UserError(format!("failed to read {}: {}", source.display(), e))
        })?,
        None => {
            let mut buf = Vec::new();
            input
                .read_to_end(&mut buf)
                .map_err(|e| LeaseError::UserError(format!("failed to read stdin: {}", e)))?;
            buf
        }
    };

    let outcome = if args.force {
        files.write_with_lock(&args.path, &content)?
    } else {
        files.write(&args.path, &content)?
    };

    if outcome.redirected {
        writeln!(
            out,
            "{} is locked by another session; saved a conflict copy at {}",
            args.path, outcome.path
        )
        .map_err(output_error)?;
    } else {
        writeln!(
            out,
            "{} {} ({} bytes)",
            if outcome.created { "Created" } else { "Wrote" },
            outcome.path,
            content.len()
        )
        .map_err(output_error)?;
    }
    Ok(())
}

fn cmd_resolve(files: &FileCoordinator, args: PathArgs, out: &mut dyn Write) -> Result<()> {
    let target = files.resolve_writable_path(&args.path)?;
    writeln!(out, "{}", target).map_err(output_error)
}

fn cmd_lock_status(files: &FileCoordinator, args: PathArgs, out: &mut dyn Write) -> Result<()> {
    let info = files.stat(&args.path)?;
    let status = files.context().locks().status(&info)?;
    writeln!(out, "{}", status).map_err(output_error)
}

fn cmd_lock_acquire(files: &FileCoordinator, args: PathArgs, out: &mut dyn Write) -> Result<()> {
    let info = files.stat(&args.path)?;
    let locks = files.context().locks();
    let record = locks.try_acquire(&info)?;

    writeln!(
        out,
        "Locked {} as {} for {}s",
        info.path(),
        record.identity(),
        files.context().ttl_secs()
    )
    .map_err(output_error)
}

fn describe(entry: &ResourceInfo) -> String {
    format!(
        "{} {:>10}  {}",
        if entry.is_container() { "d" } else { "-" },
        entry.size,
        entry.path()
    )
}

fn cmd_ls(files: &FileCoordinator, args: LsArgs, out: &mut dyn Write) -> Result<()> {
    let path = match args.path {
        Some(path) => path,
        None => files.home_dir()?,
    };

    let mut entries = files.list_directory(&path)?;
    entries.sort_by(|a, b| a.path().cmp(b.path()));
    for entry in &entries {
        writeln!(out, "{}", describe(entry)).map_err(output_error)?;
    }
    Ok(())
}

fn cmd_rm(files: &FileCoordinator, args: PathArgs, out: &mut dyn Write) -> Result<()> {
    files.remove(&args.path)?;
    writeln!(out, "Removed {}", args.path).map_err(output_error)
}

fn cmd_mv(files: &FileCoordinator, args: MoveArgs, out: &mut dyn Write) -> Result<()> {
    files.move_resource(&args.source, &args.destination)?;
    writeln!(out, "Moved {} to {}", args.source, args.destination).map_err(output_error)
}

fn cmd_mkdir(files: &FileCoordinator, args: PathArgs, out: &mut dyn Write) -> Result<()> {
    files.create_directory(&args.path)?;
    writeln!(out, "Created directory {}", args.path).map_err(output_error)
}
