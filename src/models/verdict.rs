use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use super::finding::Severity;
use crate::errors::classification::{EXIT_OK, EXIT_POLICY_VIOLATION};

pub const DEFAULT_MAX_HIGH_CRITICAL: usize = 0;
pub const DEFAULT_MAX_MEDIUM: usize = 10;

/// Configured maximum finding counts. A count equal to its maximum complies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyThresholds {
    /// Additional per-severity maximums, each checked whenever present.
    #[serde(default)]
    pub limits: BTreeMap<Severity, usize>,
    pub fail_on_high_critical: bool,
    pub max_high_critical: usize,
    pub fail_on_medium: bool,
    pub max_medium: usize,
}

impl Default for PolicyThresholds {
    fn default() -> Self {
        Self {
            limits: BTreeMap::new(),
            fail_on_high_critical: true,
            max_high_critical: DEFAULT_MAX_HIGH_CRITICAL,
            fail_on_medium: false,
            max_medium: DEFAULT_MAX_MEDIUM,
        }
    }
}

/// Which check produced a violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PolicyRule {
    HighCritical,
    Medium,
    SeverityLimit,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub severity: Severity,
    pub count: usize,
    pub threshold: usize,
    pub rule: PolicyRule,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyVerdict {
    pub passed: bool,
    pub violations: Vec<Violation>,
    pub counts_by_severity: BTreeMap<Severity, usize>,
}

impl PolicyVerdict {
    pub fn exit_code(&self) -> i32 {
        if self.passed {
            EXIT_OK
        } else {
            EXIT_POLICY_VIOLATION
        }
    }
}
