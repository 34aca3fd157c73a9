use console::style;

use crate::models::{FindingsDocument, PolicyRule, PolicyVerdict, Severity};
use crate::pipeline::phase::PhaseStatus;

fn styled_severity(severity: Severity) -> String {
    let label = format!("{:<13}", severity.as_str());
    match severity {
        Severity::Critical => style(label).red().bold().to_string(),
        Severity::High => style(label).red().to_string(),
        Severity::Medium => style(label).yellow().to_string(),
        Severity::Low => style(label).cyan().to_string(),
        Severity::Informational => style(label).dim().to_string(),
    }
}

/// Multi-line terminal summary: phases, severity distribution, top
/// categories and the verdict.
pub fn format_scan_summary(document: &FindingsDocument) -> String {
    let mut out = String::new();
    let meta = &document.scan_metadata;

    out.push_str(&format!("\n  {} {}\n", style("Target:").bold(), meta.target));
    out.push_str(&format!("  {} {}\n\n", style("Auth:").bold(), meta.auth_method));

    for phase in &meta.phases {
        let status = match phase.status {
            PhaseStatus::Completed => style("completed").green().to_string(),
            PhaseStatus::TimedOut => style("timed out").yellow().to_string(),
            PhaseStatus::Failed => style("failed").red().to_string(),
            other => format!("{:?}", other).to_lowercase(),
        };
        out.push_str(&format!(
            "  {:<12} {} ({}%, {} polls)\n",
            phase.name.to_string(),
            status,
            phase.progress_percent,
            phase.polls
        ));
    }

    out.push_str(&format!("\n  {} {}\n", style("Findings:").bold(), document.summary.total));
    for severity in Severity::ALL {
        let count = document.summary.by_severity.get(&severity).copied().unwrap_or(0);
        out.push_str(&format!("    {} {}\n", styled_severity(severity), count));
    }

    if !document.summary.top_categories.is_empty() {
        out.push_str(&format!("\n  {}\n", style("Top categories:").bold()));
        for entry in &document.summary.top_categories {
            out.push_str(&format!("    {:<32} {}\n", entry.category, entry.count));
        }
    }

    out.push('\n');
    out.push_str(&format_verdict(&document.verdict));
    out
}

pub fn format_verdict(verdict: &PolicyVerdict) -> String {
    if verdict.passed {
        return format!("  {} Security policy passed\n", style("\u{2714}").green().bold());
    }
    let mut out = format!("  {} Security policy violated\n", style("\u{2718}").red().bold());
    for v in &verdict.violations {
        let what = match v.rule {
            PolicyRule::HighCritical => "High+Critical".to_string(),
            PolicyRule::Medium | PolicyRule::SeverityLimit => v.severity.to_string(),
        };
        out.push_str(&format!("    {} {} found, {} allowed\n", what, v.count, v.threshold));
    }
    out
}
