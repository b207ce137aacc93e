//! Read-only guard for generated queries

use crate::cypher::mask_literals;
use regex::Regex;
use std::sync::OnceLock;

fn write_clause_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(CREATE|MERGE|DELETE|DETACH|SET|REMOVE|DROP|FOREACH)\b|\bLOAD\s+CSV\b|\bapoc\.(create|merge|refactor|periodic|nodes\.delete|cypher|do|trigger|schema|lock)\b|\bdb\.create",
        )
        .expect("write clause regex")
    })
}

/// `CALL` of a named procedure; subqueries (`CALL {`, `CALL (x) {`) do not match
fn procedure_call_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\bCALL\s+(`|[A-Za-z_][A-Za-z0-9_.]*)").expect("procedure call regex")
    })
}

/// Procedures that only read. Any other procedure call is refused.
const READ_ONLY_PROCEDURES: &[&str] = &[
    "db.index.vector.querynodes",
    "db.index.vector.queryrelationships",
    "db.index.fulltext.querynodes",
    "db.index.fulltext.queryrelationships",
    "db.labels",
    "db.relationshiptypes",
    "db.propertykeys",
    "db.schema.visualization",
    "db.schema.nodetypeproperties",
    "db.schema.reltypeproperties",
];

fn disallowed_procedure(masked: &str) -> Option<String> {
    procedure_call_re().captures_iter(masked).find_map(|caps| {
        let name = caps.get(1)?.as_str();
        if READ_ONLY_PROCEDURES.contains(&name.to_lowercase().as_str()) {
            None
        } else {
            Some(format!("CALL {}", name.to_uppercase()))
        }
    })
}

/// Return the first write operation found outside literals and comments
pub fn find_write_operation(query: &str) -> Option<String> {
    let masked = mask_literals(query);
    write_clause_re()
        .find(&masked)
        .map(|m| {
            m.as_str()
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
                .to_uppercase()
        })
        .or_else(|| disallowed_procedure(&masked))
}

pub fn is_read_only(query: &str) -> bool {
    find_write_operation(query).is_none()
}
