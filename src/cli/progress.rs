use std::time::{Duration, Instant};

use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use crate::pipeline::events::PipelineEvent;
use crate::pipeline::phase::{PhaseKind, PhaseStatus, ProgressKind};

const PHASE_COUNT: u64 = 3;

/// Renders pipeline events as indicatif progress bars.
pub struct ScanProgress {
    multi: MultiProgress,
    pipeline_bar: Option<ProgressBar>,
    phase_bar: Option<ProgressBar>,
    status_bar: ProgressBar,
    start_time: Instant,
}

fn bar_style(template: &str) -> ProgressStyle {
    ProgressStyle::default_bar()
        .template(template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▓░")
}

fn spinner_style(template: &str) -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template(template)
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

impl ScanProgress {
    pub fn new() -> Self {
        let multi = MultiProgress::new();

        let status_bar = multi.add(ProgressBar::new_spinner());
        status_bar.set_style(spinner_style("  {spinner:.cyan} {msg}"));
        status_bar.set_message("Starting scan engine...");
        status_bar.enable_steady_tick(Duration::from_millis(120));

        Self {
            multi,
            pipeline_bar: None,
            phase_bar: None,
            status_bar,
            start_time: Instant::now(),
        }
    }

    pub fn handle_event(&mut self, event: &PipelineEvent) {
        match event {
            PipelineEvent::ScanStarted { target, .. } => {
                let bar = self.multi.insert_before(&self.status_bar, ProgressBar::new(PHASE_COUNT));
                bar.set_style(bar_style("  {bar:30.cyan/dark_gray} {pos}/{len} phases | {msg}"));
                bar.set_message(format!("Scanning {}", target));
                self.pipeline_bar = Some(bar);
            }
            PipelineEvent::StageChanged { state } => {
                self.status_bar.set_message(format!("{} | {}", format_elapsed(self.start_time.elapsed()), state));
            }
            PipelineEvent::PhaseStarted { phase, display_name, deadline } => {
                let definition = phase.definition();
                let bar = match definition.progress {
                    ProgressKind::Percent => {
                        let bar = ProgressBar::new(100);
                        bar.set_style(bar_style("    {bar:24.yellow/dark_gray} {pos:>3}% {msg}"));
                        bar
                    }
                    ProgressKind::RunningFlag => {
                        // No percentage from the engine, only running or not.
                        let bar = ProgressBar::new_spinner();
                        bar.set_style(spinner_style("    {spinner:.yellow} {elapsed:>4} {msg}"));
                        bar.enable_steady_tick(Duration::from_millis(120));
                        bar
                    }
                };
                let bar = self.multi.insert_before(&self.status_bar, bar);
                bar.set_message(phase_message(display_name, definition.description, *deadline));
                self.phase_bar = Some(bar);
            }
            PipelineEvent::PhaseProgress { percent, .. } => {
                if let Some(bar) = &self.phase_bar {
                    bar.set_position(u64::from(*percent));
                }
            }
            PipelineEvent::PhaseFinished { phase, status, polls, skipped } => {
                if let Some(bar) = self.phase_bar.take() {
                    bar.finish_and_clear();
                }
                if let Some(bar) = &self.pipeline_bar {
                    bar.inc(1);
                }
                self.println(&phase_line(*phase, *status, *polls, *skipped));
            }
            PipelineEvent::FindingsNormalized { total, highest } => {
                let highest = highest.map(|s| format!(", highest {}", s)).unwrap_or_default();
                self.println(&format!("  {} {} findings{}", style("•").cyan(), total, highest));
            }
            PipelineEvent::VerdictReady { .. } => {}
            PipelineEvent::ScanCompleted { exit_code } => {
                if let Some(bar) = self.pipeline_bar.take() {
                    bar.finish_with_message("All phases complete");
                }
                self.status_bar.finish_with_message(format!(
                    "Scan complete in {} (exit {})",
                    format_elapsed(self.start_time.elapsed()),
                    exit_code
                ));
            }
            PipelineEvent::ScanAborted { reason } => {
                if let Some(bar) = self.phase_bar.take() {
                    bar.abandon();
                }
                if let Some(bar) = self.pipeline_bar.take() {
                    bar.abandon_with_message("Aborted");
                }
                self.status_bar.finish_with_message(format!("Scan aborted: {}", reason));
            }
        }
    }

    pub fn println(&self, msg: &str) {
        let _ = self.multi.println(msg);
    }
}

impl Default for ScanProgress {
    fn default() -> Self {
        Self::new()
    }
}

fn phase_line(phase: PhaseKind, status: PhaseStatus, polls: u32, skipped: bool) -> String {
    let name = phase.definition().display_name;
    match status {
        PhaseStatus::Completed if skipped => format!("  {} {} skipped", style("-").dim(), name),
        PhaseStatus::Completed => format!("  {} {} completed ({} polls)", style("✔").green(), name, polls),
        PhaseStatus::TimedOut => format!(
            "  {} {} timed out after {} polls; continuing with partial results",
            style("⚠").yellow(),
            name,
            polls
        ),
        _ => format!("  {} {} failed", style("✘").red(), name),
    }
}

fn phase_message(display_name: &str, description: &str, deadline: Duration) -> String {
    format!("{}: {} (budget {})", display_name, style(description).dim(), format_elapsed(deadline))
}

fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    let mins = secs / 60;
    let remaining_secs = secs % 60;
    if mins > 0 {
        format!("{}m{}s", mins, remaining_secs)
    } else {
        format!("{}s", secs)
    }
}
