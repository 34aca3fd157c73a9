use serde::{Deserialize, Serialize};

/// Severity level for a security finding, ordered from most to least severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Informational,
}

impl Severity {
    pub const ALL: [Severity; 5] = [
        Severity::Critical,
        Severity::High,
        Severity::Medium,
        Severity::Low,
        Severity::Informational,
    ];

    /// Case-insensitive match against the canonical labels. No aliases.
    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim();
        Self::ALL
            .into_iter()
            .find(|s| s.as_str().eq_ignore_ascii_case(label))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "Critical",
            Severity::High => "High",
            Severity::Medium => "Medium",
            Severity::Low => "Low",
            Severity::Informational => "Informational",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One place in the target where an alert was observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindingLocation {
    pub uri: String,
    pub method: String,
    pub parameter: String,
    pub evidence: String,
}

/// A single normalized vulnerability or observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub id: String,
    pub title: String,
    pub severity: Severity,
    /// The engine's label as reported, kept when it did not map cleanly.
    pub raw_severity: String,
    /// OWASP/WASC category label derived from the alert's WASC id or reference.
    pub category: String,
    /// Reference code(s) as reported by the engine.
    pub reference: String,
    pub cwe_id: Option<u32>,
    pub wasc_id: Option<u32>,
    pub plugin_id: Option<String>,
    pub confidence: Option<String>,
    pub description: String,
    pub solution: String,
    pub locations: Vec<FindingLocation>,
    pub tags: Vec<String>,
    /// The untouched alert as JSON text.
    pub raw_evidence: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_from_label_case_insensitive() {
        assert_eq!(Severity::from_label("HIGH"), Some(Severity::High));
        assert_eq!(Severity::from_label("critical"), Some(Severity::Critical));
        assert_eq!(Severity::from_label(" Informational "), Some(Severity::Informational));
    }

    #[test]
    fn test_severity_from_label_no_aliases() {
        assert_eq!(Severity::from_label("Info"), None);
        assert_eq!(Severity::from_label("Severe"), None);
        assert_eq!(Severity::from_label(""), None);
    }

    #[test]
    fn test_severity_ordering_most_severe_first() {
        let mut all = Severity::ALL.to_vec();
        all.reverse();
        all.sort();
        assert_eq!(all, Severity::ALL.to_vec());
    }

    #[test]
    fn test_severity_serialization() {
        let json = serde_json::to_string(&Severity::Informational).unwrap();
        assert_eq!(json, "\"informational\"");
    }
}
