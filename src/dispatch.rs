//! Task execution: in-process serial runs or process-per-task fan-out.
//!
//! Parallel mode never spawns workers directly. Each task is rendered as a
//! shell-escaped invocation of this same binary and the resulting
//! `tasks.txt` is fed to an external line runner (one process per line).
//! Tasks own disjoint byte ranges and page paths, so the runner needs no
//! synchronization; a non-zero exit from it aborts the whole import.

use std::{
    fs::File,
    io::Write,
    path::{Path, PathBuf},
    process::{Command, Stdio},
};

use anyhow::{Context, Result};
use itertools::Itertools;
use log::{debug, info};

use crate::{error::ImportError, plan::TaskSet, task};

pub const DEFAULT_RUNNER: &str = "parallel";

/// Runs every task in order in the current process.
pub fn run_serial(set: &TaskSet) -> Result<()> {
    for (ix, task) in set.tasks.iter().enumerate() {
        debug!("Running task {ix} at offset {}", task.offset);
        task::execute(task)
            .with_context(|| format!("Task {ix} (offset {}) failed", task.offset))?;
    }
    info!("Executed {} task(s) serially", set.tasks.len());
    Ok(())
}

/// Writes `tasks.txt`: one worker command line per task.
pub fn write_tasks_file(set: &TaskSet, pages_dir: &Path, binary: &Path) -> Result<PathBuf> {
    let path = pages_dir.join("tasks.txt");
    let mut file =
        File::create(&path).with_context(|| format!("Creating task file {path:?}"))?;
    for task in &set.tasks {
        let line = std::iter::once(binary.to_string_lossy().into_owned())
            .chain(task.to_command_args())
            .map(|arg| shell_quote(&arg))
            .join(" ");
        writeln!(file, "{line}")?;
    }
    info!("Wrote {} worker line(s) to {path:?}", set.tasks.len());
    Ok(path)
}

/// Fans the task file out to `runner`, which consumes one command per line
/// on stdin and exits non-zero if any worker fails.
pub fn run_parallel(set: &TaskSet, pages_dir: &Path, runner: &str) -> Result<()> {
    let binary = std::env::current_exe().context("Resolving worker binary path")?;
    let tasks_file = write_tasks_file(set, pages_dir, &binary)?;
    let stdin = File::open(&tasks_file)
        .with_context(|| format!("Reopening task file {tasks_file:?}"))?;
    let status = Command::new(runner)
        .stdin(Stdio::from(stdin))
        .status()
        .with_context(|| format!("Spawning worker runner '{runner}'"))?;
    if !status.success() {
        return Err(ImportError::WorkerFailed {
            runner: runner.to_string(),
            status: status.code().unwrap_or(-1),
        }
        .into());
    }
    info!("Runner '{runner}' completed {} task(s)", set.tasks.len());
    Ok(())
}

/// POSIX single-quote escaping; plain tokens pass through untouched.
fn shell_quote(arg: &str) -> String {
    let plain = !arg.is_empty()
        && arg
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'.' | b'/' | b',' | b'='));
    if plain {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', "'\\''"))
    }
}
