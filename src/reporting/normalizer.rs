use tracing::warn;

use crate::models::{Finding, FindingLocation, RawAlert, RawReport, Severity};
use super::categories::{category_for_wasc, slug};

/// Convert the engine report into canonical findings, one per alert across
/// every site, in report order. Never fails: unknown severities become
/// `Informational` and alerts without instances are kept.
pub fn normalize(report: &RawReport) -> Vec<Finding> {
    report
        .site
        .iter()
        .flat_map(|site| site.alerts.iter())
        .enumerate()
        .map(|(index, alert)| normalize_alert(alert, index + 1))
        .collect()
}

fn normalize_alert(alert: &RawAlert, ordinal: usize) -> Finding {
    let title = non_empty(&alert.alert)
        .or_else(|| non_empty(&alert.name))
        .unwrap_or("Untitled alert")
        .to_string();

    let raw_severity = risk_label(alert);
    let severity = Severity::from_label(&raw_severity).unwrap_or_else(|| {
        warn!(alert = %title, label = %raw_severity, "Unrecognized severity; treating as Informational");
        Severity::Informational
    });

    let cwe_id = parse_id(&alert.cweid);
    let wasc_id = parse_id(&alert.wascid);
    let plugin_id = non_empty(&alert.pluginid).map(str::to_string);
    let category = category_for_wasc(wasc_id);

    let id = format!(
        "{}-{}",
        plugin_id.clone().unwrap_or_else(|| slug(&title)),
        ordinal
    );

    let mut tags = vec!["dast".to_string(), format!("risk-{}", slug(&raw_severity_or(&raw_severity, severity)))];
    if let Some(plugin) = &plugin_id {
        tags.push(format!("plugin-{}", plugin));
    }
    tags.push(format!("owasp-{}", slug(&category)));

    let locations = alert
        .instances
        .iter()
        .map(|instance| FindingLocation {
            uri: instance.uri.clone(),
            method: instance.method.clone(),
            parameter: instance.param.clone(),
            evidence: instance.evidence.clone(),
        })
        .collect();

    Finding {
        id,
        title,
        severity,
        raw_severity,
        category,
        reference: alert.reference.clone().unwrap_or_default(),
        cwe_id,
        wasc_id,
        plugin_id,
        confidence: non_empty(&alert.confidence).map(str::to_string),
        description: alert.desc.clone().unwrap_or_default(),
        solution: alert.solution.clone().unwrap_or_default(),
        locations,
        tags,
        raw_evidence: serde_json::to_string(alert).unwrap_or_default(),
    }
}

/// `risk` when present, otherwise the leading word of `riskdesc`
/// ("High (Medium)" -> "High").
fn risk_label(alert: &RawAlert) -> String {
    if let Some(risk) = non_empty(&alert.risk) {
        return risk.to_string();
    }
    non_empty(&alert.riskdesc)
        .and_then(|desc| desc.split_whitespace().next())
        .unwrap_or_default()
        .to_string()
}

fn raw_severity_or(raw: &str, severity: Severity) -> String {
    if raw.is_empty() {
        severity.as_str().to_string()
    } else {
        raw.to_string()
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Engine ids are numeric strings; "-1" and "0" mean "none".
fn parse_id(value: &Option<String>) -> Option<u32> {
    non_empty(value)
        .and_then(|v| v.parse::<i64>().ok())
        .filter(|id| *id > 0)
        .and_then(|id| u32::try_from(id).ok())
}
