//! CLI command implementations.
//!
//! Every command here is a thin shell over the library modules; the
//! orchestrator owns all run sequencing. Each command resolves to an
//! exit code from the stable set.

use std::fs;
use std::path::PathBuf;

use serde_json::json;

use crate::backup::{self, BackupOptions, BackupResult};
use crate::config::{default_config_path, Config};
use crate::queue::BackupQueue;
use crate::snapshot::SnapshotEngine;
use crate::verify::IntegrityVerifier;

use super::args::{Cli, Command};
use super::errors::{CliError, CliResult};
use super::io::{write_error, write_response};

/// Run a parsed CLI invocation and return the process exit code.
pub fn run(cli: Cli) -> i32 {
    let config_path = cli.config.clone().unwrap_or_else(default_config_path);

    // init-config is the one command that runs without a loadable config.
    if let Command::InitConfig {
        destination,
        sources,
    } = &cli.command
    {
        return match init_config(&config_path, destination.clone(), sources.clone()) {
            Ok(()) => backup::EXIT_SUCCESS,
            Err(e) => {
                write_error(e.code_str(), &e.to_string());
                e.exit_code()
            }
        };
    }

    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            write_error("DEVB_CLI_CONFIG_ERROR", &e.to_string());
            return backup::EXIT_CONFIG_ERROR;
        }
    };

    match dispatch(cli.command, &config) {
        Ok(exit_code) => exit_code,
        Err(e) => {
            write_error(e.code_str(), &e.to_string());
            e.exit_code()
        }
    }
}

fn dispatch(command: Command, config: &Config) -> CliResult<i32> {
    match command {
        Command::Backup {
            no_queue,
            no_space_check,
        } => Ok(cmd_backup(config, no_queue, no_space_check)),
        Command::DrainQueue { max_items } => Ok(cmd_drain_queue(config, max_items)),
        Command::List => cmd_list(config).map(|_| backup::EXIT_SUCCESS),
        Command::Restore { snapshot, path, to } => cmd_restore(config, &snapshot, &path, to),
        Command::Diff { snapshot, path } => {
            cmd_diff(config, &snapshot, path.as_deref()).map(|_| backup::EXIT_SUCCESS)
        }
        Command::Search { pattern, snapshot } => {
            cmd_search(config, &pattern, snapshot.as_deref()).map(|_| backup::EXIT_SUCCESS)
        }
        Command::Verify { snapshot, filter } => cmd_verify(config, &snapshot, filter.as_deref()),
        Command::QueueStatus => cmd_queue_status(config).map(|_| backup::EXIT_SUCCESS),
        Command::QueueClear => cmd_queue_clear(config).map(|_| backup::EXIT_SUCCESS),
        Command::InitConfig { .. } => unreachable!("handled before config load"),
    }
}

fn engine_for(config: &Config) -> SnapshotEngine {
    SnapshotEngine::new(
        &config.backup_destination,
        config.exclude_patterns.clone(),
        config.retry.to_retry_config(),
    )
    .with_program(&config.rsync_program)
}

fn lookup_snapshot(config: &Config, name: &str) -> CliResult<PathBuf> {
    engine_for(config)
        .get_snapshot_by_name(name)
        .ok_or_else(|| CliError::SnapshotNotFound(name.to_string()))
}

fn backup_summary(result: &BackupResult) -> serde_json::Value {
    let snapshot = result.snapshot_result.as_ref();
    json!({
        "status": if result.success { "ok" } else { "error" },
        "exit_code": result.exit_code,
        "queued": result.queued,
        "incomplete_cleaned": result.incomplete_cleaned,
        "snapshot": snapshot.and_then(|s| {
            s.snapshot_path
                .as_ref()
                .and_then(|p| p.file_name())
                .map(|n| n.to_string_lossy().into_owned())
        }),
        "files_transferred": snapshot.map(|s| s.files_transferred),
        "total_files": snapshot.map(|s| s.total_files),
        "total_size": snapshot.map(|s| s.total_size),
        "duration_seconds": snapshot.map(|s| s.duration_seconds),
        "deleted_by_retention": result
            .retention_result
            .as_ref()
            .map(|r| r.deleted_snapshots.len()),
        "error": result.error_message,
    })
}

fn cmd_backup(config: &Config, no_queue: bool, no_space_check: bool) -> i32 {
    let result = backup::run_backup(
        config,
        BackupOptions {
            queue_on_dest_error: !no_queue,
            check_space: !no_space_check,
            progress_callback: None,
        },
    );
    write_response(&backup_summary(&result));
    result.exit_code
}

fn cmd_drain_queue(config: &Config, max_items: usize) -> i32 {
    let mut queue = BackupQueue::open(&config.queue_path);
    let results = backup::process_queue(Some(config), &mut queue, max_items);

    let items: Vec<_> = results
        .iter()
        .map(|(item, result)| {
            json!({
                "destination": item.backup_destination,
                "retry_count": item.retry_count,
                "exit_code": result.exit_code,
                "success": result.success,
            })
        })
        .collect();
    write_response(&json!({
        "processed": results.len(),
        "remaining": queue.size(),
        "results": items,
    }));

    // Drain itself succeeds unless an item hit a destination error.
    results
        .iter()
        .map(|(_, r)| r.exit_code)
        .find(|&code| code == backup::EXIT_DESTINATION_ERROR)
        .unwrap_or(backup::EXIT_SUCCESS)
}

fn cmd_list(config: &Config) -> CliResult<()> {
    let snapshots: Vec<_> = engine_for(config)
        .list_snapshots()
        .into_iter()
        .map(|info| {
            json!({
                "name": info.path.file_name().map(|n| n.to_string_lossy().into_owned()),
                "created": info.timestamp.format("%Y-%m-%dT%H:%M:%S").to_string(),
                "size_bytes": info.size_bytes,
                "file_count": info.file_count,
            })
        })
        .collect();
    write_response(&json!({ "snapshots": snapshots }));
    Ok(())
}

fn cmd_restore(
    config: &Config,
    snapshot_name: &str,
    path: &str,
    to: Option<PathBuf>,
) -> CliResult<i32> {
    let snapshot = lookup_snapshot(config, snapshot_name)?;
    let restored = engine_for(config).restore(
        &snapshot,
        path,
        to.as_deref(),
        &config.source_directories,
    );

    if restored {
        write_response(&json!({
            "status": "ok",
            "snapshot": snapshot_name,
            "path": path,
        }));
        Ok(backup::EXIT_SUCCESS)
    } else {
        Err(CliError::Operation(format!(
            "Failed to restore {} from {}",
            path, snapshot_name
        )))
    }
}

fn cmd_diff(config: &Config, snapshot_name: &str, path: Option<&str>) -> CliResult<()> {
    let snapshot = lookup_snapshot(config, snapshot_name)?;
    let diff = engine_for(config).diff(&snapshot, &config.source_directories, path);
    write_response(&json!({
        "snapshot": snapshot_name,
        "added": diff.added,
        "modified": diff.modified,
        "deleted": diff.deleted,
    }));
    Ok(())
}

fn cmd_search(config: &Config, pattern: &str, snapshot_name: Option<&str>) -> CliResult<()> {
    let engine = engine_for(config);
    let snapshot = match snapshot_name {
        Some(name) => Some(lookup_snapshot(config, name)?),
        None => None,
    };

    let hits: Vec<_> = engine
        .search(pattern, snapshot.as_deref())
        .into_iter()
        .map(|hit| {
            json!({
                "snapshot": hit.snapshot,
                "path": hit.path,
                "size": hit.size,
                "modified": hit.modified,
            })
        })
        .collect();
    write_response(&json!({ "pattern": pattern, "matches": hits }));
    Ok(())
}

fn cmd_verify(config: &Config, snapshot_name: &str, filter: Option<&str>) -> CliResult<i32> {
    let snapshot = lookup_snapshot(config, snapshot_name)?;
    let result = IntegrityVerifier::verify_snapshot(&snapshot, filter);

    write_response(&json!({
        "snapshot": snapshot_name,
        "success": result.success,
        "files_verified": result.files_verified,
        "files_failed": result.files_failed,
        "missing_files": result.missing_files,
        "corrupted_files": result.corrupted_files,
        "errors": result.errors,
    }));

    Ok(if result.success {
        backup::EXIT_SUCCESS
    } else {
        backup::EXIT_SNAPSHOT_ERROR
    })
}

fn cmd_queue_status(config: &Config) -> CliResult<()> {
    let queue = BackupQueue::open(&config.queue_path);
    let items: Vec<_> = queue
        .get_all()
        .iter()
        .map(|item| {
            json!({
                "destination": item.backup_destination,
                "sources": item.source_directories,
                "queued_at": item.queued_at,
                "reason": item.reason,
                "retry_count": item.retry_count,
            })
        })
        .collect();
    write_response(&json!({ "size": queue.size(), "queue": items }));
    Ok(())
}

fn cmd_queue_clear(config: &Config) -> CliResult<()> {
    let mut queue = BackupQueue::open(&config.queue_path);
    let cleared = queue
        .clear()
        .map_err(|e| CliError::Operation(e.to_string()))?;
    write_response(&json!({ "cleared": cleared }));
    Ok(())
}

fn init_config(
    config_path: &std::path::Path,
    destination: PathBuf,
    sources: Vec<PathBuf>,
) -> CliResult<()> {
    let config = Config::new(destination, sources);
    config.validate()?;

    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(config_path, config.to_json()?)?;

    write_response(&json!({
        "status": "ok",
        "config": config_path.display().to_string(),
    }));
    Ok(())
}
