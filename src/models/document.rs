use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use super::finding::{Finding, Severity};
use super::verdict::PolicyVerdict;
use crate::pipeline::phase::{PhaseKind, PhaseStatus, ScanPhase};
use crate::session::auth::AuthMethod;

/// The canonical document handed to report renderers and uploaders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FindingsDocument {
    pub findings: Vec<Finding>,
    pub verdict: PolicyVerdict,
    pub scan_metadata: ScanMetadata,
    pub summary: FindingsSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanMetadata {
    pub scan_id: String,
    pub target: String,
    pub auth_method: AuthMethod,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub phases: Vec<PhaseRecord>,
    pub engine_version: Option<String>,
    pub scanner_version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseRecord {
    pub name: PhaseKind,
    pub status: PhaseStatus,
    pub progress_percent: u8,
    pub polls: u32,
}

impl From<&ScanPhase> for PhaseRecord {
    fn from(phase: &ScanPhase) -> Self {
        Self {
            name: phase.kind,
            status: phase.status,
            progress_percent: phase.progress_percent,
            polls: phase.polls,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FindingsSummary {
    pub total: usize,
    pub by_severity: BTreeMap<Severity, usize>,
    /// Most frequent categories, most frequent first.
    pub top_categories: Vec<CategoryCount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCount {
    pub category: String,
    pub count: usize,
}

const TOP_CATEGORY_LIMIT: usize = 5;

impl FindingsSummary {
    pub fn from_findings(findings: &[Finding]) -> Self {
        let mut by_category: HashMap<&str, usize> = HashMap::new();
        for f in findings {
            *by_category.entry(f.category.as_str()).or_insert(0) += 1;
        }
        let mut top_categories: Vec<CategoryCount> = by_category
            .into_iter()
            .map(|(category, count)| CategoryCount { category: category.to_string(), count })
            .collect();
        top_categories.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.category.cmp(&b.category)));
        top_categories.truncate(TOP_CATEGORY_LIMIT);

        Self {
            total: findings.len(),
            by_severity: count_by_severity(findings),
            top_categories,
        }
    }
}

/// Counts per severity. Every severity is present, zero when absent.
pub fn count_by_severity(findings: &[Finding]) -> BTreeMap<Severity, usize> {
    let mut counts: BTreeMap<Severity, usize> = Severity::ALL.iter().map(|s| (*s, 0)).collect();
    for f in findings {
        *counts.entry(f.severity).or_insert(0) += 1;
    }
    counts
}
