use std::collections::BTreeMap;

use crate::models::{PolicyRule, PolicyThresholds, PolicyVerdict, Severity, Violation};

/// Compare finding counts against the thresholds. Pure: the verdict depends
/// only on the two arguments. A count equal to its maximum complies.
pub fn evaluate(counts: &BTreeMap<Severity, usize>, thresholds: &PolicyThresholds) -> PolicyVerdict {
    let count = |s: Severity| counts.get(&s).copied().unwrap_or(0);
    let mut violations = Vec::new();

    if thresholds.fail_on_high_critical {
        let critical = count(Severity::Critical);
        let combined = critical + count(Severity::High);
        if combined > thresholds.max_high_critical {
            violations.push(Violation {
                severity: if critical > 0 { Severity::Critical } else { Severity::High },
                count: combined,
                threshold: thresholds.max_high_critical,
                rule: PolicyRule::HighCritical,
            });
        }
    }

    if thresholds.fail_on_medium {
        let medium = count(Severity::Medium);
        if medium > thresholds.max_medium {
            violations.push(Violation {
                severity: Severity::Medium,
                count: medium,
                threshold: thresholds.max_medium,
                rule: PolicyRule::Medium,
            });
        }
    }

    for (severity, limit) in &thresholds.limits {
        let n = count(*severity);
        if n > *limit {
            violations.push(Violation {
                severity: *severity,
                count: n,
                threshold: *limit,
                rule: PolicyRule::SeverityLimit,
            });
        }
    }

    let mut counts_by_severity: BTreeMap<Severity, usize> = Severity::ALL.iter().map(|s| (*s, 0)).collect();
    for (severity, n) in counts {
        counts_by_severity.insert(*severity, *n);
    }

    PolicyVerdict {
        passed: violations.is_empty(),
        violations,
        counts_by_severity,
    }
}
