use tracing::debug;

/// Resolve a credential value. If the value starts with '$', treat it as an
/// environment variable reference and resolve from the environment.
pub fn resolve_credential(value: &str) -> String {
    if let Some(var_name) = value.strip_prefix('$') {
        match std::env::var(var_name) {
            Ok(resolved) => {
                debug!(var = %var_name, "Resolved credential from environment");
                resolved
            }
            Err(_) => {
                debug!(var = %var_name, "Environment variable not set, using literal");
                value.to_string()
            }
        }
    } else {
        value.to_string()
    }
}

pub fn resolve_optional(value: Option<&str>) -> Option<String> {
    value.map(resolve_credential)
}

/// Mask the value part of every `name=value` cookie pair.
pub fn redact_cookies(raw: &str) -> String {
    raw.split(';')
        .map(|segment| match segment.split_once('=') {
            Some((name, _)) => format!("{}=[REDACTED]", name),
            None => segment.to_string(),
        })
        .collect::<Vec<_>>()
        .join(";")
}
