//! Progress bar for apply runs

use colored::Colorize;
use converge::{NodeState, ProgressCallback};
use indicatif::{ProgressBar, ProgressStyle};

/// Renders engine progress as a single bar with one line per finished resource
pub struct WaveProgress {
    bar: ProgressBar,
    wave: usize,
}

impl WaveProgress {
    pub fn new(total: usize, quiet: bool) -> Self {
        let bar = if quiet {
            ProgressBar::hidden()
        } else {
            ProgressBar::new(total as u64)
        };
        if let Ok(style) =
            ProgressStyle::default_bar().template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        {
            bar.set_style(style.progress_chars("=>-"));
        }
        Self { bar, wave: 0 }
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ProgressCallback for WaveProgress {
    fn on_wave_start(&mut self, count: usize) {
        self.wave += 1;
        self.bar
            .set_message(format!("wave {} ({} resource(s))", self.wave, count));
    }

    fn on_resource_start(&mut self, name: &str) {
        log::trace!("started {}", name);
    }

    fn on_resource_complete(&mut self, name: &str, state: &NodeState) {
        self.bar.inc(1);
        let detail = match state.error() {
            Some(err) => format!(" ({})", err).dimmed().to_string(),
            None => String::new(),
        };
        self.bar
            .suspend(|| println!("  {} {}{}", crate::ui::state_symbol(state), name, detail));
    }

    fn on_wave_complete(&mut self) {
        self.bar.tick();
    }
}
