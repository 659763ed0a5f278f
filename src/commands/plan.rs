//! `switchboard plan` - show the waves an apply would run

use anyhow::{Context as _, Result};
use colored::Colorize;
use converge::Graph;

use super::Input;
use crate::Context;
use crate::cli::FileArgs;
use crate::ui;

pub fn run(_ctx: &Context, args: FileArgs) -> Result<()> {
    let input = Input::load(&args.file, args.default_driver.as_deref())?;
    let graph = Graph::build(&input.set.resources)
        .with_context(|| format!("Invalid resource set {}", input.path.display()))?;
    let registry = input.registry()?;

    let waves = graph.waves();
    ui::header(&format!("Plan for {}", input.path.display()));

    for (i, names) in waves.iter().enumerate() {
        ui::step(i + 1, waves.len(), &format!("{} resource(s)", names.len()));
        for name in names {
            let Some(node) = graph.node(name) else {
                continue;
            };
            let kind = registry
                .kind_for(node.resource())
                .map_or_else(|e| e.to_string().red().to_string(), ToString::to_string);
            let deps = &node.resource().dependencies;
            if deps.is_empty() {
                println!("    {} ({})", name.bold(), kind.dimmed());
            } else {
                println!(
                    "    {} ({}) after {}",
                    name.bold(),
                    kind.dimmed(),
                    deps.join(", ")
                );
            }
        }
    }
    Ok(())
}
