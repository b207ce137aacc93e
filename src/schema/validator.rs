//! Static schema check for generated Cypher
//!
//! Catches the common model mistakes (invented labels, relationship types,
//! properties, reversed relationships) before the query reaches the store,
//! so the repair loop gets a precise message for free.

use crate::cypher::mask_literals;
use crate::schema::SchemaDescriptor;
use regex::Regex;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::{Arc, OnceLock};

/// A single mismatch between a query and the schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaViolation {
    UnknownLabel(String),
    UnknownRelationship(String),
    UnknownProperty { variable: String, owner: String, property: String },
    WrongDirection { relationship: String, source: String, target: String },
}

impl fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaViolation::UnknownLabel(label) => write!(f, "unknown node label `{}`", label),
            SchemaViolation::UnknownRelationship(rel) => {
                write!(f, "unknown relationship type `{}`", rel)
            }
            SchemaViolation::UnknownProperty { variable, owner, property } => write!(
                f,
                "`{}.{}`: {} has no property `{}`",
                variable, property, owner, property
            ),
            SchemaViolation::WrongDirection { relationship, source, target } => write!(
                f,
                "relationship `{}` is not allowed from {} to {}",
                relationship, source, target
            ),
        }
    }
}

const IDENT: &str = r"[A-Za-z_][A-Za-z0-9_]*";

fn node_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(
            r"\(\s*({IDENT})?\s*(:\s*!?{IDENT}(?:\s*[:|&]\s*!?{IDENT})*)"
        ))
            .expect("node pattern regex")
    })
}

fn rel_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(
            r"\[\s*({IDENT})?\s*:\s*({IDENT}(?:\s*\|\s*:?\s*{IDENT})*)"
        ))
        .expect("relationship pattern regex")
    })
}

fn hop_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\(([^()]*)\)\s*(<)?-\s*\[([^\]]*)\]\s*-(>)?\s*\(([^()]*)\)")
            .expect("hop pattern regex")
    })
}

fn property_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(r"(?:^|[^A-Za-z0-9_.$])({IDENT})\.({IDENT})\b"))
            .expect("property access regex")
    })
}

/// Separators inside a node label expression: `:A:B`, `:A|B`, `:A&B`
const LABEL_SEPARATORS: &[char] = &[':', '|', '&'];

fn split_names(chain: &str, separators: &[char]) -> Vec<String> {
    chain
        .split(separators)
        .map(|s| s.trim().trim_start_matches([':', '!']).trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn push_unique(out: &mut Vec<SchemaViolation>, v: SchemaViolation) {
    if !out.contains(&v) {
        out.push(v);
    }
}

/// Validates Cypher text against a schema
#[derive(Debug, Clone)]
pub struct SchemaValidator {
    schema: Arc<SchemaDescriptor>,
}

impl SchemaValidator {
    pub fn new(schema: Arc<SchemaDescriptor>) -> Self {
        Self { schema }
    }

    /// Check a query; returns every violation found, in order of discovery
    pub fn validate(&self, query: &str) -> Result<(), Vec<SchemaViolation>> {
        let text = mask_literals(query);
        let mut violations = Vec::new();

        // variable -> labels or relationship types bound to it
        let mut bindings: HashMap<String, BTreeSet<String>> = HashMap::new();

        for caps in node_re().captures_iter(&text) {
            let labels = split_names(&caps[2], LABEL_SEPARATORS);
            for label in &labels {
                if !self.schema.has_label(label) {
                    push_unique(&mut violations, SchemaViolation::UnknownLabel(label.clone()));
                }
            }
            if let Some(var) = caps.get(1) {
                bindings.entry(var.as_str().to_string()).or_default().extend(labels);
            }
        }

        for caps in rel_re().captures_iter(&text) {
            let types = split_names(&caps[2], &['|']);
            for rel in &types {
                if !self.schema.has_relationship(rel) {
                    push_unique(&mut violations, SchemaViolation::UnknownRelationship(rel.clone()));
                }
            }
            if let Some(var) = caps.get(1) {
                bindings.entry(var.as_str().to_string()).or_default().extend(types);
            }
        }

        for caps in property_re().captures_iter(&text) {
            let (var, property) = (&caps[1], &caps[2]);
            let Some(owners) = bindings.get(var) else {
                continue;
            };
            let known: Vec<&String> = owners
                .iter()
                .filter(|o| self.schema.has_label(o) || self.schema.has_relationship(o))
                .collect();
            if known.is_empty() || known.iter().any(|o| self.schema.has_attribute(o, property)) {
                continue;
            }
            push_unique(
                &mut violations,
                SchemaViolation::UnknownProperty {
                    variable: var.to_string(),
                    owner: known.iter().map(|s| s.as_str()).collect::<Vec<_>>().join("|"),
                    property: property.to_string(),
                },
            );
        }

        self.check_directions(&text, &bindings, &mut violations);

        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations)
        }
    }

    fn check_directions(
        &self,
        text: &str,
        bindings: &HashMap<String, BTreeSet<String>>,
        violations: &mut Vec<SchemaViolation>,
    ) {
        let endpoint_labels = |inner: &str| -> BTreeSet<String> {
            let inner = inner.split('{').next().unwrap_or("").trim();
            let mut parts = inner.splitn(2, ':');
            let var = parts.next().unwrap_or("").trim();
            let mut labels: BTreeSet<String> = parts
                .next()
                .map(|chain| split_names(chain, LABEL_SEPARATORS).into_iter().collect())
                .unwrap_or_default();
            if labels.is_empty() && !var.is_empty() {
                if let Some(bound) = bindings.get(var) {
                    labels.extend(bound.iter().filter(|l| self.schema.has_label(l)).cloned());
                }
            }
            labels
        };

        // Adjacent hops share a node, so resume matching at the right-hand node
        let mut pos = 0;
        while let Some(caps) = hop_re().captures_at(text, pos) {
            let (Some(left_m), Some(right_m)) = (caps.get(1), caps.get(5)) else {
                break;
            };
            pos = right_m.start() - 1;

            let incoming = caps.get(2).is_some();
            let outgoing = caps.get(4).is_some();
            let rel_inner = caps.get(3).map(|m| m.as_str()).unwrap_or("");
            let types = match rel_inner.split_once(':') {
                Some((_, chain)) => {
                    let chain = chain.split(['{', '*']).next().unwrap_or("");
                    split_names(chain, &['|'])
                }
                None => continue,
            };

            let left = endpoint_labels(left_m.as_str());
            let right = endpoint_labels(right_m.as_str());
            let (source, target) = match (incoming, outgoing) {
                (true, false) => (&right, &left),
                (false, true) => (&left, &right),
                _ => continue,
            };

            for name in &types {
                let Some(rel) = self.schema.relationship(name) else {
                    continue;
                };
                let source_ok = source.is_empty() || source.contains(&rel.source);
                let target_ok = target.is_empty() || target.contains(&rel.target);
                if !(source_ok && target_ok) {
                    let describe = |set: &BTreeSet<String>| {
                        if set.is_empty() {
                            "any node".to_string()
                        } else {
                            set.iter().cloned().collect::<Vec<_>>().join("|")
                        }
                    };
                    push_unique(
                        violations,
                        SchemaViolation::WrongDirection {
                            relationship: name.clone(),
                            source: describe(source),
                            target: describe(target),
                        },
                    );
                }
            }
        }
    }
}
