//! BPMN document checks and placeholder substitution.
//!
//! Upstream editors occasionally publish empty or malformed diagrams.
//! The create saga never fails a vid for that: it substitutes the
//! minimal placeholder process from this module so the vid stays
//! deployable, and logs a warning.

use regex::Regex;
use std::sync::OnceLock;

use crate::types::{DiagramPayload, Vid};

fn definitions_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<(?:[A-Za-z0-9_]+:)?definitions[\s/>]").unwrap())
}

fn process_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"<(?:[A-Za-z0-9_]+:)?process\b[^>]*\bid\s*=\s*"([^"]+)""#).unwrap()
    })
}

/// Whether the document can be handed to the engine as-is.
///
/// This is a cheap structural check, not schema validation (the full
/// XML validation lives with the upstream collaborator): the document
/// must be non-empty, carry a BPMN `definitions` root, and contain at
/// least one process element with an id.
pub fn is_deployable(xml: &str) -> bool {
    let xml = xml.trim();
    !xml.is_empty() && definitions_re().is_match(xml) && process_re().is_match(xml)
}

/// Id of the first process element, if any.
pub fn process_id(xml: &str) -> Option<String> {
    process_re()
        .captures(xml)
        .map(|caps| caps[1].to_string())
}

/// Derive a valid process id from a vid.
///
/// XML NCNames must start with a letter or underscore; everything
/// outside `[A-Za-z0-9_-]` is mapped to an underscore.
pub fn placeholder_process_id(vid: &Vid) -> String {
    let cleaned: String = vid
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    match cleaned.chars().next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => cleaned,
        _ => format!("p_{cleaned}"),
    }
}

/// Minimal deployable diagram standing in for malformed content.
pub fn placeholder_diagram(vid: &Vid) -> DiagramPayload {
    let id = placeholder_process_id(vid);
    DiagramPayload {
        xml_deployed: format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<definitions xmlns="http://www.omg.org/spec/BPMN/20100524/MODEL"
             targetNamespace="http://flowgate.dev/placeholder">
  <process id="{id}" isExecutable="true">
    <startEvent id="start"/>
  </process>
</definitions>
"#
        ),
        svg: r##"<svg xmlns="http://www.w3.org/2000/svg" width="240" height="60"><rect width="240" height="60" fill="none" stroke="#999"/><text x="16" y="36" font-family="sans-serif">placeholder</text></svg>"##
            .to_string(),
    }
}
