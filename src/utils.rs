use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use crate::Member;

pub fn escape_xml(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

/// Text lines drawn inside a member node: the name, then the relation label.
pub fn node_label_lines(member: &Member) -> Vec<String> {
    let mut lines = Vec::with_capacity(2);
    let name = member.name.trim();
    lines.push(if name.is_empty() {
        member.id.clone()
    } else {
        name.to_string()
    });
    let relation = member.relation_type.trim();
    if !relation.is_empty() {
        lines.push(relation.to_string());
    }
    lines
}

/// Reads a member collection from a JSON array file.
pub fn read_members(path: &Path) -> Result<Vec<Member>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read members from '{}'", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("'{}' is not a JSON array of family members", path.display()))
}

pub fn write_members(path: &Path, members: &[Member]) -> Result<()> {
    let mut body = serde_json::to_string_pretty(members)?;
    body.push('\n');
    fs::write(path, body)
        .with_context(|| format!("failed to write members to '{}'", path.display()))
}
