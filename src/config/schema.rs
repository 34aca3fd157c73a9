use serde_json::{json, Value};
use std::sync::LazyLock;

pub static CONFIG_SCHEMA: LazyLock<Value> = LazyLock::new(|| {
    json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "type": "object",
        "additionalProperties": false,
        "properties": {
            "target": { "type": "string", "format": "uri" },
            "context_name": { "type": "string", "minLength": 1 },
            "authentication": {
                "type": "object",
                "required": ["method"],
                "properties": {
                    "method": { "type": "string", "enum": ["none", "form", "token", "cookie", "oauth"] },
                    "auth_url": { "type": "string" },
                    "login_field": { "type": "string" },
                    "password_field": { "type": "string" },
                    "username": { "type": "string" },
                    "password": { "type": "string" },
                    "token": { "type": "string" },
                    "cookies": { "type": "string" }
                }
            },
            "scan": {
                "type": "object",
                "properties": {
                    "max_duration": { "type": "integer", "minimum": 1 },
                    "spider_timeout": { "type": "integer", "minimum": 1 },
                    "active_scan_timeout": { "type": "integer", "minimum": 1 },
                    "ajax_spider": { "type": "boolean" },
                    "ajax_max_duration": { "type": "integer", "minimum": 1 },
                    "depth": { "type": "integer", "minimum": 0 },
                    "threads": { "type": "integer", "minimum": 1 },
                    "browser_id": { "type": "string" }
                }
            },
            "policy": {
                "type": "object",
                "properties": {
                    "fail_on_high_critical": { "type": "boolean" },
                    "max_high_critical": { "type": "integer", "minimum": 0 },
                    "fail_on_medium": { "type": "boolean" },
                    "max_medium": { "type": "integer", "minimum": 0 },
                    "limits": {
                        "type": "object",
                        "propertyNames": { "enum": ["critical", "high", "medium", "low", "informational"] },
                        "additionalProperties": { "type": "integer", "minimum": 0 }
                    }
                }
            },
            "engine": {
                "type": "object",
                "properties": {
                    "mode": { "type": "string", "enum": ["docker", "external", "simulated"] },
                    "api_url": { "type": "string" },
                    "image": { "type": "string" },
                    "container_name": { "type": "string" },
                    "port": { "type": "integer", "minimum": 1, "maximum": 65535 },
                    "request_timeout": { "type": "integer", "minimum": 1 }
                }
            },
            "output": {
                "type": "object",
                "properties": {
                    "directory": { "type": "string" }
                }
            }
        }
    })
});
