pub mod cli;
pub mod data;
pub mod dialect;
pub mod dispatch;
pub mod encoding;
pub mod error;
pub mod index;
pub mod infer;
pub mod page;
pub mod parser;
pub mod pickle;
pub mod plan;
pub mod task;

use std::{env, path::Path, sync::OnceLock, time::Instant};

use anyhow::{Context, Result, ensure};
use chrono::{SecondsFormat, Utc};
use clap::Parser;
use log::{LevelFilter, error, info};

use crate::{
    cli::{Cli, Commands, DialectArgs, ImportArgs, TaskArgs},
    dialect::Dialect,
    plan::PlanRequest,
    task::Task,
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("csv_paged", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Import(args) => {
            run_operation("import", || handle_import(&cli.dialect, &args))
        }
        Commands::Task(args) => run_operation("task", || handle_task(&cli.dialect, &args)),
    }
}

fn run_operation<F>(name: &str, op: F) -> Result<()>
where
    F: FnOnce() -> Result<()>,
{
    let start_clock = Utc::now();
    let start_instant = Instant::now();
    let result = op();
    let end_clock = Utc::now();
    let duration_secs = start_instant.elapsed().as_secs_f64();
    let start_str = start_clock.to_rfc3339_opts(SecondsFormat::Millis, true);
    let end_str = end_clock.to_rfc3339_opts(SecondsFormat::Millis, true);

    match &result {
        Ok(_) => info!(
            "Operation '{name}' completed (status=ok)\nstart: {start_str}\nend: {end_str}\nduration_secs: {duration_secs:.3}"
        ),
        Err(err) => error!(
            "Operation '{name}' failed (status=error)\nstart: {start_str}\nend: {end_str}\nduration_secs: {duration_secs:.3}\nerror: {err:?}"
        ),
    }

    result
}

fn build_dialect(args: &DialectArgs, input: &Path) -> Dialect {
    Dialect {
        delimiter: dialect::resolve_input_delimiter(input, args.delimiter),
        quotechar: args.quotechar,
        escapechar: args.escapechar,
        lineterminator: args.lineterminator,
        doublequote: !args.no_doublequote,
        skipinitialspace: args.skipinitialspace,
        skiptrailingspace: args.skiptrailingspace,
        strict: args.strict,
        quoting: args.quoting,
    }
}

fn handle_import(global: &DialectArgs, args: &ImportArgs) -> Result<()> {
    let dialect = build_dialect(global, &args.input);
    info!(
        "Importing {:?} as {} with delimiter '{}' (page size {})",
        args.input,
        global.encoding.as_str(),
        dialect::printable_char(dialect.delimiter),
        args.page_size,
    );
    let columns = (!args.columns.is_empty()).then_some(args.columns.as_slice());
    let set = plan::plan(&PlanRequest {
        source: &args.input,
        encoding: global.encoding,
        dialect,
        columns,
        page_size: args.page_size,
        guess_dtypes: global.guess_dtypes,
        workdir: &args.dir,
        limit: args.limit,
    })
    .with_context(|| format!("Planning import of {:?}", args.input))?;

    let pages_dir = args.dir.join("pages");
    let manifest = set.save_manifest(&pages_dir)?;
    info!("Plan manifest written to {manifest:?}");

    if args.execute {
        if args.multiprocess {
            dispatch::run_parallel(&set, &pages_dir, &args.runner)
                .context("Executing tasks in parallel")?;
        } else {
            dispatch::run_serial(&set).context("Executing tasks serially")?;
        }
    } else {
        let binary = env::current_exe().context("Resolving worker binary path")?;
        dispatch::write_tasks_file(&set, &pages_dir, &binary)?;
    }
    Ok(())
}

fn handle_task(global: &DialectArgs, args: &TaskArgs) -> Result<()> {
    ensure!(
        args.pages.len() == args.fields.len(),
        "--pages lists {} path(s) but --fields lists {} index(es)",
        args.pages.len(),
        args.fields.len()
    );
    let dialect = build_dialect(global, &args.input);
    let task = Task {
        source: args.input.clone(),
        encoding: global.encoding,
        dialect,
        pages: args.pages.clone(),
        import_fields: args.fields.clone(),
        offset: args.offset,
        rows: args.rows,
        guess_dtypes: global.guess_dtypes,
    };
    task::execute(&task)
        .with_context(|| format!("Slice at offset {} of {:?}", args.offset, args.input))
}
