use std::path::Path;
use crate::errors::DastError;
use crate::session::AuthMethod;
use super::types::FileConfig;
use super::schema::CONFIG_SCHEMA;
use tracing::warn;

const MAX_CONFIG_BYTES: u64 = 1_048_576;

pub async fn parse_config(path: &Path) -> Result<FileConfig, DastError> {
    if !path.exists() {
        return Err(DastError::Config(format!("Config file not found: {}", path.display())));
    }

    let metadata = tokio::fs::metadata(path).await?;
    if metadata.len() > MAX_CONFIG_BYTES {
        return Err(DastError::Config("Config file exceeds 1MB limit".into()));
    }

    let content = tokio::fs::read_to_string(path).await?;
    parse_config_str(&content)
}

pub fn parse_config_str(content: &str) -> Result<FileConfig, DastError> {
    let yaml: serde_yaml::Value = serde_yaml::from_str(content)?;
    if yaml.is_null() {
        return Ok(FileConfig::default());
    }

    validate_schema(&yaml)?;

    let config: FileConfig = serde_yaml::from_value(yaml)?;
    validate_conflicts(&config)?;
    Ok(config)
}

/// Validate config against the JSON schema for structural correctness.
fn validate_schema(yaml: &serde_yaml::Value) -> Result<(), DastError> {
    let json_value = serde_json::to_value(yaml)
        .map_err(|e| DastError::Config(format!("Config conversion error: {}", e)))?;

    let compiled = jsonschema::JSONSchema::compile(&CONFIG_SCHEMA)
        .map_err(|e| DastError::Config(format!("Schema compilation error: {}", e)))?;

    if let Err(errors) = compiled.validate(&json_value) {
        // Advisory only; typed parsing below is authoritative.
        for e in errors {
            warn!(validation_error = %format!("{} at {}", e, e.instance_path), "Config schema warning");
        }
    }

    Ok(())
}

/// Detect semantic conflicts in the parsed configuration.
fn validate_conflicts(config: &FileConfig) -> Result<(), DastError> {
    if let Some(scan) = &config.scan {
        if scan.max_duration == Some(0) {
            return Err(DastError::Config("scan.max_duration must be greater than zero".into()));
        }
        if scan.ajax_spider == Some(false) && scan.ajax_max_duration.is_some() {
            warn!("scan.ajax_max_duration is ignored because the AJAX spider is disabled");
        }
    }

    if let Some(auth) = &config.authentication {
        let has_token = auth.token.as_ref().is_some_and(|t| !t.is_empty());
        let has_cookies = auth.cookies.as_ref().is_some_and(|c| !c.is_empty());
        match auth.method {
            AuthMethod::Token if has_cookies => {
                return Err(DastError::Config(
                    "authentication.cookies given but method is token".into(),
                ));
            }
            AuthMethod::Cookie if has_token => {
                return Err(DastError::Config(
                    "authentication.token given but method is cookie".into(),
                ));
            }
            AuthMethod::None if auth.username.is_some() || has_token || has_cookies => {
                warn!("Authentication credentials configured but method is none");
            }
            _ => {}
        }
    }

    Ok(())
}
