//! `switchboard apply` - run every resource through its driver

use anyhow::{Context as _, Result};
use colored::Colorize;
use converge::{ApplySummary, Graph, SharedDriverOpts, Worker};
use dialoguer::Confirm;
use std::path::PathBuf;

use super::Input;
use crate::Context;
use crate::cli::ApplyArgs;
use crate::hooks::{self, OutputsHook, ReportHook};
use crate::progress::WaveProgress;
use crate::ui;

pub fn run(ctx: &Context, args: ApplyArgs) -> Result<()> {
    let input = Input::load(&args.input.file, args.input.default_driver.as_deref())?;
    let graph = Graph::build(&input.set.resources)
        .with_context(|| format!("Invalid resource set {}", input.path.display()))?;

    if input.set.is_empty() {
        ui::info("No resources to apply");
        return Ok(());
    }

    let flag = args
        .base_dir
        .as_deref()
        .map(|dir| PathBuf::from(shellexpand::tilde(&dir.to_string_lossy()).into_owned()));
    let base_dir = input.base_dir(flag.as_deref());

    if !ctx.quiet {
        ui::header(&format!("Applying {}", input.path.display()));
        ui::kv("base dir", &base_dir.display().to_string());
        ui::kv("default driver", &input.default_driver);
        for line in ui::wave_lines(&graph.waves()) {
            ui::dim(&line);
        }
        println!();
    }

    if !args.yes && !confirm_proceed()? {
        ui::warn("Aborted");
        return Ok(());
    }

    let mut worker = Worker::new(input.registry()?);
    worker.register_hook("report", ReportHook);
    if let Some(path) = args.outputs {
        let names: Vec<String> = input.set.resources.iter().map(|r| r.name.clone()).collect();
        let queries = hooks::parse_queries(&args.queries, &names)?;
        worker.register_hook("outputs", OutputsHook::new(path, queries));
    }

    let opts = SharedDriverOpts::new(base_dir);
    let mut progress = WaveProgress::new(input.set.len(), ctx.quiet);
    let result = worker.apply_with_progress(&input.set, &opts, &mut progress);
    progress.finish();

    let summary = result?;
    if !ctx.quiet {
        print_summary(&summary);
    }
    Ok(())
}

/// Confirm with user
fn confirm_proceed() -> Result<bool> {
    let confirmed = Confirm::new()
        .with_prompt("Continue?")
        .default(true)
        .interact()?;

    Ok(confirmed)
}

/// Print final summary
fn print_summary(summary: &ApplySummary) {
    println!();
    println!(
        "  {} Applied {} resource(s) in {} wave(s)",
        "✓".green().bold(),
        summary.applied.len(),
        summary.execution.waves
    );
    if !summary.skipped.is_empty() {
        println!(
            "    • {} skipped: {}",
            summary.skipped.len(),
            summary.skipped.join(", ")
        );
    }
}
