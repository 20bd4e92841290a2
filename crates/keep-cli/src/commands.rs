use std::io::Write;
use std::path::Path;

use anyhow::{bail, Context};
use chrono::{DateTime, Local};
use colored::Colorize;
use keep_sdk::{Depth, FileState, ResourcePath, SyncReport, Workspace, WorkspaceConfig};
use serde_json::json;
use tracing::debug;

use crate::cli::*;

const DEFAULT_CONFIG: &str = "keep.toml";

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(cli.config.as_deref(), cli.root)?;
    let mut ws = Workspace::open(config).context("cannot open workspace")?;
    let json = matches!(cli.format, OutputFormat::Json);

    match cli.command {
        Command::Refresh(args) => cmd_refresh(&mut ws, args, json)?,
        Command::Snapshot(args) => cmd_snapshot(&mut ws, args, json)?,
        Command::History(args) => cmd_history(&mut ws, args, json)?,
        Command::Show(args) => cmd_show(&mut ws, args)?,
        Command::Restore(args) => cmd_restore(&mut ws, args, json)?,
        Command::Deleted(args) => cmd_deleted(&mut ws, args, json)?,
        Command::CopyHistory(args) => cmd_copy_history(&mut ws, args, json)?,
        Command::Mv(args) => cmd_transfer(&mut ws, args, true, json)?,
        Command::Cp(args) => cmd_transfer(&mut ws, args, false, json)?,
        Command::Clean => {
            let report = ws.clean()?;
            if json {
                print_json(&report)?;
            } else {
                println!(
                    "{} Cleaned {} entries, {} states removed",
                    "✓".green().bold(),
                    report.entries_visited,
                    report.states_removed.to_string().bold()
                );
            }
        }
        Command::Gc => {
            let report = ws.remove_garbage()?;
            if json {
                print_json(&report)?;
            } else {
                println!(
                    "{} GC: {} of {} blobs removed",
                    "✓".green(),
                    report.blobs_removed.to_string().bold(),
                    report.blobs_scanned
                );
            }
        }
        Command::Prop(args) => cmd_prop(&mut ws, args, json)?,
    }
    ws.close()?;
    Ok(())
}

/// Explicit `--config`, else `keep.toml` in the current directory, else
/// defaults. `--root` wins over whatever the file says.
fn load_config(
    path: Option<&Path>,
    root: Option<std::path::PathBuf>,
) -> anyhow::Result<WorkspaceConfig> {
    let mut config = match path {
        Some(path) => WorkspaceConfig::load(path)?,
        None if Path::new(DEFAULT_CONFIG).is_file() => {
            WorkspaceConfig::load(Path::new(DEFAULT_CONFIG))?
        }
        None => WorkspaceConfig::default(),
    };
    if let Some(root) = root {
        config.root = root;
    }
    debug!(root = %config.root.display(), "loaded config");
    Ok(config)
}

fn parse_path(s: &str) -> anyhow::Result<ResourcePath> {
    ResourcePath::parse(s).with_context(|| format!("invalid path {s:?}"))
}

fn depth(arg: DepthArg) -> Depth {
    match arg {
        DepthArg::Zero => Depth::Zero,
        DepthArg::One => Depth::One,
        DepthArg::Infinite => Depth::Infinite,
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn format_time(ms: i64) -> String {
    DateTime::from_timestamp_millis(ms)
        .map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| format!("@{ms}"))
}

/// The workspace reopens with the tree it last saw; bring `path` up to
/// date before acting on it.
fn sync_path(ws: &mut Workspace, path: &ResourcePath, depth: Depth) -> anyhow::Result<()> {
    let report = ws.refresh(path, depth)?;
    if !report.is_empty() {
        debug!(%path, "picked up changes before running command");
    }
    Ok(())
}

fn state_at(
    ws: &mut Workspace,
    path: &ResourcePath,
    index: usize,
) -> anyhow::Result<FileState> {
    let states = ws.history(path)?;
    match states.get(index) {
        Some(state) => Ok(*state),
        None if states.is_empty() => bail!("{path} has no history"),
        None => bail!("{path} has only {} states", states.len()),
    }
}

fn cmd_refresh(ws: &mut Workspace, args: RefreshArgs, json: bool) -> anyhow::Result<()> {
    let path = parse_path(&args.path)?;
    let report = ws.refresh(&path, depth(args.depth))?;
    if json {
        return print_json(&report);
    }
    print_report(&report);
    Ok(())
}

fn print_report(report: &SyncReport) {
    if report.is_empty() {
        println!("Up to date.");
        return;
    }
    for change in &report.added {
        println!("  {} {} ({})", "added:".green(), change.path, change.kind);
    }
    for path in &report.removed {
        println!("  {} {}", "removed:".red(), path);
    }
    for change in &report.changed {
        println!("  {} {}", "changed:".yellow(), change.path);
    }
}

fn cmd_snapshot(ws: &mut Workspace, args: PathArgs, json: bool) -> anyhow::Result<()> {
    let path = parse_path(&args.path)?;
    let state = ws.add_state(&path)?;
    if json {
        return print_json(&state);
    }
    match state {
        Some(state) => println!(
            "{} Recorded {} as {}",
            "✓".green().bold(),
            path,
            state.blob_id.short_hex().yellow()
        ),
        None => println!("{} {} is too large to record", "!".yellow().bold(), path),
    }
    Ok(())
}

fn cmd_history(ws: &mut Workspace, args: PathArgs, json: bool) -> anyhow::Result<()> {
    let path = parse_path(&args.path)?;
    let states = ws.history(&path)?;
    if json {
        return print_json(&states);
    }
    if states.is_empty() {
        println!("No history for {path}.");
        return Ok(());
    }
    for (i, state) in states.iter().enumerate() {
        println!(
            "{:>3}  {}  {}",
            i.to_string().bold(),
            state.blob_id.short_hex().yellow(),
            format_time(state.timestamp_ms).dimmed()
        );
    }
    Ok(())
}

fn cmd_show(ws: &mut Workspace, args: StateArgs) -> anyhow::Result<()> {
    let path = parse_path(&args.path)?;
    let state = state_at(ws, &path, args.index)?;
    let bytes = ws.contents(&state)?;
    let mut out = std::io::stdout().lock();
    out.write_all(&bytes)?;
    out.flush()?;
    Ok(())
}

fn cmd_restore(ws: &mut Workspace, args: StateArgs, json: bool) -> anyhow::Result<()> {
    let path = parse_path(&args.path)?;
    sync_path(ws, &path, Depth::Zero)?;
    let state = state_at(ws, &path, args.index)?;
    let bytes = ws.contents(&state)?;
    ws.set_contents(&path, &bytes, true)?;
    if json {
        return print_json(&json!({ "path": path, "restored": state }));
    }
    println!(
        "{} Restored {} from {} ({})",
        "✓".green().bold(),
        path,
        state.blob_id.short_hex().yellow(),
        format_time(state.timestamp_ms)
    );
    Ok(())
}

fn cmd_deleted(ws: &mut Workspace, args: RefreshArgs, json: bool) -> anyhow::Result<()> {
    let path = parse_path(&args.path)?;
    sync_path(ws, &path, depth(args.depth))?;
    let deleted = ws.deleted_with_history(&path, depth(args.depth))?;
    if json {
        return print_json(&deleted);
    }
    if deleted.is_empty() {
        println!("No deleted files with history.");
    }
    for path in deleted {
        println!("  {} {}", "deleted:".red(), path);
    }
    Ok(())
}

fn cmd_copy_history(
    ws: &mut Workspace,
    args: CopyHistoryArgs,
    json: bool,
) -> anyhow::Result<()> {
    let from = parse_path(&args.from)?;
    let to = parse_path(&args.to)?;
    let copied = ws.copy_history(&from, &to, args.move_history)?;
    if json {
        return print_json(&json!({ "from": from, "to": to, "entries": copied }));
    }
    let verb = if args.move_history { "Moved" } else { "Copied" };
    println!(
        "{} {} history of {} entries: {} → {}",
        "✓".green().bold(),
        verb,
        copied.to_string().bold(),
        from,
        to
    );
    Ok(())
}

fn cmd_transfer(
    ws: &mut Workspace,
    args: TransferArgs,
    moving: bool,
    json: bool,
) -> anyhow::Result<()> {
    let from = parse_path(&args.from)?;
    let to = parse_path(&args.to)?;
    sync_path(ws, &from, Depth::Infinite)?;
    if moving {
        ws.move_resource(&from, &to)?;
    } else {
        ws.copy_resource(&from, &to)?;
    }
    if json {
        return print_json(&json!({ "from": from, "to": to, "moved": moving }));
    }
    let verb = if moving { "Moved" } else { "Copied" };
    println!("{} {} {} → {}", "✓".green().bold(), verb, from, to);
    Ok(())
}

fn cmd_prop(ws: &mut Workspace, args: PropArgs, json: bool) -> anyhow::Result<()> {
    let path = parse_path(&args.path)?;
    sync_path(ws, &path, Depth::Zero)?;
    match (args.key, args.value) {
        (Some(key), Some(value)) => {
            let previous = ws.set_property(&path, &key, value.clone())?;
            if json {
                let out = json!({ "key": key, "value": value, "previous": previous });
                return print_json(&out);
            }
            println!("Set {} = {}", key.bold(), value);
        }
        (Some(key), None) => {
            let value = ws.property(&path, &key)?;
            if json {
                return print_json(&json!({ "key": key, "value": value }));
            }
            match value {
                Some(value) => println!("{} = {}", key.bold(), value),
                None => println!("{} = (not set)", key.bold()),
            }
        }
        _ => {
            let props = ws.properties(&path)?;
            if json {
                return print_json(&props);
            }
            if props.is_empty() {
                println!("No properties set.");
            }
            for (key, value) in props {
                println!("{} = {}", key.bold(), value);
            }
        }
    }
    Ok(())
}
