/// WASC threat classification ids and the category labels reported for them.
static WASC_CATEGORIES: [(u32, &str); 20] = [
    (1, "Path Traversal"),
    (2, "SQL Injection"),
    (3, "XSS"),
    (4, "Cross-Site Request Forgery"),
    (5, "Server-Side Include"),
    (6, "Session Hijacking"),
    (7, "Buffer Overflow"),
    (8, "Weak Authentication"),
    (9, "Transport Layer Security"),
    (10, "Insecure Cryptographic Storage"),
    (11, "Insufficient Authorization"),
    (12, "Denial of Service"),
    (13, "Improper Input Validation"),
    (14, "Information Leakage"),
    (15, "Broken Authentication"),
    (16, "Broken Access Control"),
    (17, "Server-Side Request Forgery"),
    (18, "XML External Entity"),
    (19, "Insecure Deserialization"),
    (20, "Security Misconfiguration"),
];

pub const UNCATEGORIZED: &str = "Other";

/// Category label for a WASC id. Unknown ids keep their `WASC-<n>` code.
pub fn category_for_wasc(wasc_id: Option<u32>) -> String {
    match wasc_id {
        Some(id) => WASC_CATEGORIES
            .iter()
            .find(|(known, _)| *known == id)
            .map(|(_, label)| label.to_string())
            .unwrap_or_else(|| format!("WASC-{}", id)),
        None => UNCATEGORIZED.to_string(),
    }
}

/// Lowercase, dash-separated form used in tags and ids.
pub fn slug(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('-') {
            out.push('-');
        }
    }
    out.trim_matches('-').to_string()
}
